//! Configuration for txlog
//!
//! Centralized configuration with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TxLogError};

/// Default capacity of the writer's request queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Default number of connection attempts for the table backend
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Default delay between connection attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Main configuration for a txlog instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Backend Configuration
    // -------------------------------------------------------------------------
    /// Where the transaction log lives
    pub backend: BackendConfig,

    // -------------------------------------------------------------------------
    // Writer Configuration
    // -------------------------------------------------------------------------
    /// Bounded queue capacity; producers block when it is full
    pub queue_capacity: usize,
}

/// Selects the backend variant at construction time
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Append-only record file. `path: None` keeps records in memory.
    File {
        path: Option<PathBuf>,
        sync_policy: SyncPolicy,
    },

    /// PostgreSQL `transactions` table
    Table(TableParams),
}

/// File backend sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// sync_data after every append (safest, slowest)
    EveryWrite,

    /// Leave flushing to the OS
    Never,
}

/// Connection parameters for the table backend
#[derive(Debug, Clone)]
pub struct TableParams {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub sslmode: String,

    /// Liveness probe attempts before giving up
    pub connect_attempts: u32,

    /// Fixed delay between probe attempts
    pub retry_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::File {
                path: Some(PathBuf::from("transaction.log")),
                sync_policy: SyncPolicy::EveryWrite,
            },
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Default for TableParams {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            sslmode: "disable".to_string(),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl TableParams {
    /// Read parameters from `POSTGRES_*` environment variables.
    ///
    /// Unset variables keep their defaults; an unparsable port is an error.
    pub fn from_env() -> Result<Self> {
        let mut params = Self::default();

        if let Ok(host) = env::var("POSTGRES_HOST") {
            params.host = host;
        }
        if let Ok(port) = env::var("POSTGRES_PORT") {
            params.port = port
                .parse()
                .map_err(|_| TxLogError::Config(format!("invalid POSTGRES_PORT: {}", port)))?;
        }
        if let Ok(dbname) = env::var("POSTGRES_DB") {
            params.dbname = dbname;
        }
        if let Ok(user) = env::var("POSTGRES_USER") {
            params.user = user;
        }
        if let Ok(password) = env::var("POSTGRES_PASSWORD") {
            params.password = password;
        }
        if let Ok(sslmode) = env::var("POSTGRES_SSLMODE") {
            params.sslmode = sslmode;
        }

        Ok(params)
    }

    /// libpq-style key/value connection string
    pub fn connection_string(&self) -> String {
        let mut conn = format!(
            "host={} port={} dbname={} user={} sslmode={}",
            self.host, self.port, self.dbname, self.user, self.sslmode
        );
        if !self.password.is_empty() {
            conn.push_str(&format!(" password={}", self.password));
        }
        conn
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Log to an append-only file at `path`
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        let sync_policy = self.current_sync_policy();
        self.config.backend = BackendConfig::File {
            path: Some(path.into()),
            sync_policy,
        };
        self
    }

    /// Log to a disposable in-memory buffer
    pub fn in_memory(mut self) -> Self {
        let sync_policy = self.current_sync_policy();
        self.config.backend = BackendConfig::File {
            path: None,
            sync_policy,
        };
        self
    }

    /// Log to a PostgreSQL table
    pub fn table(mut self, params: TableParams) -> Self {
        self.config.backend = BackendConfig::Table(params);
        self
    }

    /// Set the file backend sync policy (ignored by the table backend)
    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        if let BackendConfig::File { sync_policy, .. } = &mut self.config.backend {
            *sync_policy = policy;
        }
        self
    }

    /// Set the writer queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    fn current_sync_policy(&self) -> SyncPolicy {
        match &self.config.backend {
            BackendConfig::File { sync_policy, .. } => *sync_policy,
            BackendConfig::Table(_) => SyncPolicy::EveryWrite,
        }
    }
}
