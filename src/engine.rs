//! Engine Module
//!
//! Coordinates the transaction log and the key-value store.
//!
//! ## Responsibilities
//! - Replay the log fully into the store before serving anything
//! - Start the durable writer only after replay succeeded
//! - Route requests: mutate the store, then log the mutation
//! - Close the log on shutdown
//!
//! ## Lifecycle
//! ```text
//! Uninitialized ──start()──▶ Replaying ──▶ Serving ──shutdown()──▶ Closed
//!                                 │
//!                                 └── any replay error ──▶ Closed (startup aborted)
//! ```
//!
//! Replayed events are applied to the store only, never re-appended, because
//! the writer does not exist until replay has reached a clean end of stream.

use std::sync::Arc;

use crossbeam::channel::TryRecvError;

use crate::command::Command;
use crate::config::Config;
use crate::error::{Result, TxLogError};
use crate::store::KvStore;
use crate::wal::{EventKind, LoggerState, ReadySignal, TransactionLogger};

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Replaying,
    Serving,
    Closed,
}

/// Summary of a startup replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub events_replayed: u64,
    pub puts: u64,
    pub deletes: u64,
    pub last_sequence: u64,
}

/// Request-handling context holding the store and its transaction log
///
/// Callers share an `Arc<Engine>` (or `&Engine`) instead of a process-wide
/// logger; all request methods take `&self`.
pub struct Engine {
    config: Config,
    store: Arc<KvStore>,
    logger: Option<TransactionLogger>,
    /// Supplied by `with_logger`; used by `start` instead of opening one
    pending: Option<TransactionLogger>,
    ready: Option<ReadySignal>,
    recovery: Option<RecoveryStats>,
    state: LifecycleState,
}

impl Engine {
    /// Create an engine with an empty store; nothing is opened yet
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(KvStore::new()))
    }

    /// Create an engine that replays into an existing store
    pub fn with_store(config: Config, store: Arc<KvStore>) -> Self {
        Self {
            config,
            store,
            logger: None,
            pending: None,
            ready: None,
            recovery: None,
            state: LifecycleState::Uninitialized,
        }
    }

    /// Create an engine over an already constructed, not yet started logger.
    ///
    /// `config.backend` is ignored; `config.queue_capacity` still applies.
    pub fn with_logger(config: Config, logger: TransactionLogger) -> Self {
        let mut engine = Self::new(config);
        engine.pending = Some(logger);
        engine
    }

    /// Create and start in one step
    pub fn open(config: Config) -> Result<Self> {
        let mut engine = Self::new(config);
        engine.start()?;
        Ok(engine)
    }

    /// Replay the log into the store, then start the writer.
    ///
    /// Any error aborts startup: the engine ends up `Closed` and the writer
    /// is never started.
    pub fn start(&mut self) -> Result<RecoveryStats> {
        if self.state != LifecycleState::Uninitialized {
            return Err(TxLogError::InvalidState(format!(
                "cannot start engine in state {:?}",
                self.state
            )));
        }

        let opened = match self.pending.take() {
            Some(logger) => Ok(logger),
            None => TransactionLogger::open(&self.config.backend),
        };
        let mut logger = opened.map_err(|e| {
            tracing::error!(error = %e, "failed to create event logger");
            self.state = LifecycleState::Closed;
            e
        })?;

        self.state = LifecycleState::Replaying;
        tracing::info!(backend = logger.backend_name(), "replaying transaction log");

        let started = replay_into(&mut logger, &self.store)
            .and_then(|stats| logger.run(self.config.queue_capacity).map(|ready| (stats, ready)));

        let (stats, ready) = match started {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(error = %e, fatal = e.is_fatal(), "startup aborted");
                if let Err(close_err) = logger.shutdown() {
                    tracing::warn!(error = %close_err, "error closing transaction log");
                }
                self.state = LifecycleState::Closed;
                return Err(e);
            }
        };

        tracing::info!(
            events = stats.events_replayed,
            puts = stats.puts,
            deletes = stats.deletes,
            last_sequence = stats.last_sequence,
            keys = self.store.len(),
            "transaction log replayed"
        );

        self.logger = Some(logger);
        self.ready = Some(ready);
        self.recovery = Some(stats);
        self.state = LifecycleState::Serving;
        Ok(stats)
    }

    /// Execute a command
    ///
    /// Routes commands to appropriate handlers
    pub fn execute(&self, command: Command) -> Result<Option<String>> {
        match command {
            Command::Get { key } => self.get(&key).map(Some),
            Command::Put { key, value } => {
                self.put(&key, &value)?;
                Ok(None)
            }
            Command::Delete { key } => {
                self.delete(&key)?;
                Ok(None)
            }
        }
    }

    /// Get a value by key; `KeyNotFound` if absent
    pub fn get(&self, key: &str) -> Result<String> {
        self.store.get(key)
    }

    /// Store a value, then log it
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let logger = self.serving_logger()?;
        if key.is_empty() {
            return Err(TxLogError::InvalidEvent("empty key".to_string()));
        }

        self.store.put(key, value)?;
        logger.write_put(key, value)
    }

    /// Remove a key, then log the removal
    pub fn delete(&self, key: &str) -> Result<()> {
        let logger = self.serving_logger()?;
        if key.is_empty() {
            return Err(TxLogError::InvalidEvent("empty key".to_string()));
        }

        self.store.delete(key)?;
        logger.write_delete(key)
    }

    /// Report a failure the writer has signalled, without blocking.
    ///
    /// A reported error is consumed from the slot; afterwards the halted
    /// writer is still reported as a `Write` error. A writer thread that
    /// died without reporting is a failure too.
    pub fn check_writer(&self) -> Result<()> {
        let Some(logger) = self.logger.as_ref() else {
            return Ok(());
        };

        if let Some(errors) = logger.errors() {
            match errors.try_recv() {
                Ok(e) => return Err(e),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    if logger.state() == LoggerState::Serving {
                        return Err(TxLogError::Write(
                            "writer thread exited unexpectedly".to_string(),
                        ));
                    }
                }
            }
        }

        if logger.is_halted() {
            return Err(TxLogError::Write(
                "writer halted after an earlier failure".to_string(),
            ));
        }
        Ok(())
    }

    /// Stop the writer and close the backend.
    ///
    /// Writes accepted so far are appended first, unless the writer has
    /// halted after a failure.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == LifecycleState::Closed {
            return Ok(());
        }
        self.state = LifecycleState::Closed;

        match self.logger.as_mut() {
            Some(logger) => logger.shutdown(),
            None => Ok(()),
        }
    }

    fn serving_logger(&self) -> Result<&TransactionLogger> {
        match (self.state, self.logger.as_ref()) {
            (LifecycleState::Serving, Some(logger)) => Ok(logger),
            (state, _) => Err(TxLogError::InvalidState(format!(
                "engine is not serving (state {:?})",
                state
            ))),
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn store(&self) -> &Arc<KvStore> {
        &self.store
    }

    /// The transaction log, once started
    pub fn logger(&self) -> Option<&TransactionLogger> {
        self.logger.as_ref()
    }

    /// One-shot signal fired by the first committed append
    pub fn ready(&self) -> Option<&ReadySignal> {
        self.ready.as_ref()
    }

    pub fn recovery_stats(&self) -> Option<RecoveryStats> {
        self.recovery
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Drain a full replay of `logger` into `store`.
///
/// Stops at the first error; events applied before it stay applied.
pub fn replay_into(logger: &mut TransactionLogger, store: &KvStore) -> Result<RecoveryStats> {
    let mut stats = RecoveryStats::default();

    for event in logger.read_events()? {
        let event = event?;
        match event.kind {
            EventKind::Put => {
                store.put(&event.key, &event.value)?;
                stats.puts += 1;
            }
            EventKind::Delete => {
                store.delete(&event.key)?;
                stats.deletes += 1;
            }
            EventKind::Unspecified => {
                return Err(TxLogError::Decode(format!(
                    "unspecified event kind at sequence {}",
                    event.sequence
                )));
            }
        }
        stats.events_replayed += 1;
    }

    stats.last_sequence = logger.last_sequence();
    Ok(stats)
}
