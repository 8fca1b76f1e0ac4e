//! Transaction Logger
//!
//! Owns the backend and the sequence counter, and moves between the two
//! phases that touch them: replay first, then steady-state writing.
//!
//! ```text
//! Replaying ──run()──▶ Serving ──shutdown()──▶ Closed
//!     └────────────────shutdown()────────────────┘
//! ```
//!
//! Replay and writing never overlap. The backend is handed to the writer
//! thread by `run()` and handed back when the writer is stopped.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;
use parking_lot::Mutex;

use crate::backend::{self, Backend};
use crate::config::BackendConfig;
use crate::error::{Result, TxLogError};

use super::writer::{Progress, Writer};
use super::{Event, ReadySignal, Replay};

/// Phase of a [`TransactionLogger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerState {
    /// Constructed; `read_events` is available
    Replaying,

    /// Writer thread running; `write_*` is available
    Serving,

    /// Backend released
    Closed,
}

/// Write-ahead transaction log over a pluggable backend
pub struct TransactionLogger {
    /// Present while replaying; held by the writer thread while serving
    backend: Mutex<Option<Box<dyn Backend>>>,

    backend_name: &'static str,

    progress: Arc<Progress>,

    writer: Option<Writer>,

    state: LoggerState,
}

impl TransactionLogger {
    /// Construct the configured backend and wrap it
    pub fn open(config: &BackendConfig) -> Result<Self> {
        Ok(Self::new(backend::open(config)?))
    }

    pub fn new(backend: Box<dyn Backend>) -> Self {
        let backend_name = backend.name();
        tracing::debug!(backend = backend_name, "transaction logger created");

        Self {
            backend: Mutex::new(Some(backend)),
            backend_name,
            progress: Arc::new(Progress::default()),
            writer: None,
            state: LoggerState::Replaying,
        }
    }

    pub fn state(&self) -> LoggerState {
        self.state
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Scan the whole log from the beginning.
    ///
    /// Each call starts a fresh scan and re-derives `last_sequence` from
    /// zero. Only available before the writer is started.
    pub fn read_events(&mut self) -> Result<Replay<'_>> {
        if self.state != LoggerState::Replaying {
            return Err(TxLogError::InvalidState(format!(
                "cannot replay in state {:?}",
                self.state
            )));
        }

        let backend = self
            .backend
            .get_mut()
            .as_mut()
            .ok_or(TxLogError::BackendClosed)?;

        self.progress.last_sequence.store(0, Ordering::SeqCst);
        let scan = backend.scan()?;

        Ok(Replay::new(scan, &self.progress.last_sequence))
    }

    // =========================================================================
    // Writer
    // =========================================================================

    /// Start the writer thread with a queue of `capacity` requests.
    ///
    /// Sequence numbers continue after the last replayed event. Returns the
    /// one-shot signal fired by the first committed append.
    pub fn run(&mut self, capacity: usize) -> Result<ReadySignal> {
        if self.state != LoggerState::Replaying {
            return Err(TxLogError::InvalidState(format!(
                "cannot start writer in state {:?}",
                self.state
            )));
        }

        if capacity == 0 {
            return Err(TxLogError::Config(
                "writer queue capacity must be at least 1".to_string(),
            ));
        }

        let backend = self
            .backend
            .get_mut()
            .take()
            .ok_or(TxLogError::BackendClosed)?;

        let writer = Writer::spawn(backend, Arc::clone(&self.progress), capacity)?;
        let ready = writer.ready();

        tracing::info!(
            backend = self.backend_name,
            capacity,
            last_sequence = self.last_sequence(),
            "transaction log writer running"
        );

        self.writer = Some(writer);
        self.state = LoggerState::Serving;
        Ok(ready)
    }

    /// Log a put. Blocks while the queue is full.
    pub fn write_put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let event = Event::put(key, value);
        event.validate()?;
        self.writer()?.enqueue(event)
    }

    /// Log a delete. Blocks while the queue is full.
    pub fn write_delete(&self, key: impl Into<String>) -> Result<()> {
        let event = Event::delete(key);
        event.validate()?;
        self.writer()?.enqueue(event)
    }

    /// Log a put, failing with `QueueFull` if no slot frees within `timeout`
    pub fn write_put_timeout(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        timeout: Duration,
    ) -> Result<()> {
        let event = Event::put(key, value);
        event.validate()?;
        self.writer()?.enqueue_timeout(event, timeout)
    }

    /// Log a delete, failing with `QueueFull` if no slot frees within `timeout`
    pub fn write_delete_timeout(&self, key: impl Into<String>, timeout: Duration) -> Result<()> {
        let event = Event::delete(key);
        event.validate()?;
        self.writer()?.enqueue_timeout(event, timeout)
    }

    /// Single-slot channel carrying the writer's failure, if any.
    ///
    /// `None` until the writer is running.
    pub fn errors(&self) -> Option<Receiver<TxLogError>> {
        self.writer.as_ref().map(Writer::errors)
    }

    /// One-shot signal fired by the first committed append
    pub fn ready(&self) -> Option<ReadySignal> {
        self.writer.as_ref().map(Writer::ready)
    }

    /// Highest sequence assigned or replayed
    pub fn last_sequence(&self) -> u64 {
        self.progress.last_sequence.load(Ordering::SeqCst)
    }

    /// Highest sequence durably appended since `run`
    pub fn committed_sequence(&self) -> u64 {
        self.progress.committed.load(Ordering::SeqCst)
    }

    /// `true` once an append has failed and the writer stopped consuming
    pub fn is_halted(&self) -> bool {
        self.progress.halted.load(Ordering::SeqCst)
    }

    /// Requests waiting in the writer queue
    pub fn queued(&self) -> usize {
        self.writer.as_ref().map(Writer::queued).unwrap_or(0)
    }

    fn writer(&self) -> Result<&Writer> {
        match (self.state, self.writer.as_ref()) {
            (LoggerState::Serving, Some(writer)) => Ok(writer),
            (LoggerState::Replaying, _) => Err(TxLogError::InvalidState(
                "writer not started".to_string(),
            )),
            _ => Err(TxLogError::WriterClosed),
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop the writer and close the backend exactly once.
    ///
    /// Requests enqueued before this call are appended first. If the writer
    /// has halted after a failure, whatever is still queued is discarded.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == LoggerState::Closed {
            return Ok(());
        }

        let stopped = match self.writer.take() {
            Some(writer) => writer.stop().map(Some),
            None => Ok(self.backend.get_mut().take()),
        };
        self.state = LoggerState::Closed;

        if let Some(mut backend) = stopped? {
            backend.close()?;
        }

        tracing::info!(
            backend = self.backend_name,
            last_sequence = self.last_sequence(),
            committed = self.committed_sequence(),
            "transaction log closed"
        );
        Ok(())
    }
}

impl Drop for TransactionLogger {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "error closing transaction log");
        }
    }
}
