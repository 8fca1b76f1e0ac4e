//! txlog Server Binary
//!
//! Replays the transaction log, then serves line commands from stdin
//! (`PUT`, `GET`, `DELETE`) until EOF or `QUIT`.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};
use txlog::command::Command;
use txlog::config::{DEFAULT_CONNECT_ATTEMPTS, DEFAULT_QUEUE_CAPACITY};
use txlog::{Config, Engine, SyncPolicy, TableParams, TxLogError};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendKind {
    File,
    Table,
}

/// txlog Server
#[derive(Parser, Debug)]
#[command(name = "txlog-server")]
#[command(about = "Key-value service backed by a write-ahead transaction log")]
#[command(version)]
struct Args {
    /// Which backend stores the log
    #[arg(short, long, value_enum, default_value = "file")]
    backend: BackendKind,

    /// Transaction log file (file backend)
    #[arg(short, long, default_value = "transaction.log")]
    log_file: PathBuf,

    /// Skip fsync after each append (file backend)
    #[arg(long)]
    no_sync: bool,

    /// Writer queue capacity
    #[arg(short, long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    #[arg(long, env = "POSTGRES_HOST", default_value = "localhost")]
    pg_host: String,

    #[arg(long, env = "POSTGRES_PORT", default_value_t = 5432)]
    pg_port: u16,

    #[arg(long, env = "POSTGRES_DB", default_value = "postgres")]
    pg_db: String,

    #[arg(long, env = "POSTGRES_USER", default_value = "postgres")]
    pg_user: String,

    #[arg(long, env = "POSTGRES_PASSWORD", default_value = "", hide_env_values = true)]
    pg_password: String,

    #[arg(long, env = "POSTGRES_SSLMODE", default_value = "disable")]
    pg_sslmode: String,

    /// Connection attempts before giving up (table backend)
    #[arg(long, default_value_t = DEFAULT_CONNECT_ATTEMPTS)]
    pg_connect_attempts: u32,

    /// Delay between connection attempts in milliseconds (table backend)
    #[arg(long, default_value_t = 500)]
    pg_retry_delay_ms: u64,
}

impl Args {
    fn to_config(&self) -> Config {
        let builder = Config::builder().queue_capacity(self.queue_capacity);

        match self.backend {
            BackendKind::File => builder
                .log_file(&self.log_file)
                .sync_policy(if self.no_sync {
                    SyncPolicy::Never
                } else {
                    SyncPolicy::EveryWrite
                })
                .build(),
            BackendKind::Table => builder
                .table(TableParams {
                    host: self.pg_host.clone(),
                    port: self.pg_port,
                    dbname: self.pg_db.clone(),
                    user: self.pg_user.clone(),
                    password: self.pg_password.clone(),
                    sslmode: self.pg_sslmode.clone(),
                    connect_attempts: self.pg_connect_attempts,
                    retry_delay: Duration::from_millis(self.pg_retry_delay_ms),
                })
                .build(),
        }
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,txlog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("txlog Server v{}", txlog::VERSION);
    tracing::info!("Backend: {:?}", args.backend);

    let mut engine = match Engine::open(args.to_config()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to initialize transaction log: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine initialized, reading commands from stdin");

    let code = match serve(&engine) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("Server error: {}", e);
            1
        }
    };

    if let Err(e) = engine.shutdown() {
        tracing::error!("Error closing transaction log: {}", e);
    }

    tracing::info!("Server stopped");
    std::process::exit(code);
}

fn serve(engine: &Engine) -> txlog::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            break;
        }

        let result = Command::parse(trimmed).and_then(|cmd| {
            tracing::debug!(command = ?cmd.command_type(), "executing command");
            engine.execute(cmd)
        });

        let reply = match result {
            Ok(Some(value)) => value,
            Ok(None) => "OK".to_string(),
            Err(TxLogError::KeyNotFound) => "NOT_FOUND".to_string(),
            Err(e) => format!("ERROR {}", e),
        };
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;

        // A failed append halts the writer; stop serving rather than
        // accept mutations that will never be logged.
        engine.check_writer()?;
    }

    Ok(())
}
