//! Durable Writer
//!
//! Single background thread that drains a bounded request queue, stamps each
//! event with the next sequence number, and appends it to the backend.
//!
//! ## Thread Lifecycle
//! - The worker owns the backend exclusively while it runs and hands it back
//!   when joined.
//! - `stop` disconnects the request queue. Everything enqueued before that
//!   point is still appended; the worker exits once the queue is empty.
//!   An event taken off the queue is never discarded.
//!
//! ## Failure Policy
//! The first failed append is pushed to the single-slot error channel and the
//! worker stops consuming (fail-stop). The queue stays open, so later
//! requests accumulate and eventually block their producers. Requests still
//! queued behind a halted writer are dropped at shutdown; this is the only
//! case where an accepted write is not flushed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};

use crate::backend::Backend;
use crate::error::{Result, TxLogError};

use super::Event;

/// Sequence bookkeeping shared between the logger and its worker
#[derive(Debug, Default)]
pub(crate) struct Progress {
    /// Highest sequence assigned by the writer or observed by replay
    pub(crate) last_sequence: AtomicU64,

    /// Highest sequence durably appended by the writer
    pub(crate) committed: AtomicU64,

    /// Set once the worker has stopped after a failed append
    pub(crate) halted: AtomicBool,
}

/// One-shot "first event committed" signal
///
/// Fires at most once; clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct ReadySignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ReadySignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that actually fired the signal
    pub(crate) fn fire(&self) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut fired = lock.lock();
        if *fired {
            return false;
        }
        *fired = true;
        cvar.notify_all();
        true
    }

    pub fn is_fired(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block until at least one event has been committed
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut fired = lock.lock();
        while !*fired {
            cvar.wait(&mut fired);
        }
    }

    /// Like [`wait`](Self::wait) with a deadline; `false` on timeout
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut fired = lock.lock();
        while !*fired {
            if cvar.wait_until(&mut fired, deadline).timed_out() {
                return *fired;
            }
        }
        true
    }
}

/// Handle to the running writer thread
pub(crate) struct Writer {
    requests: Sender<Event>,
    errors: Receiver<TxLogError>,
    /// Never sent on; dropping it releases a halted worker
    stop: Sender<()>,
    ready: ReadySignal,
    handle: JoinHandle<Box<dyn Backend>>,
}

/// Everything the worker thread owns
struct Worker {
    backend: Box<dyn Backend>,
    requests: Receiver<Event>,
    stop: Receiver<()>,
    errors: Sender<TxLogError>,
    ready: ReadySignal,
    progress: Arc<Progress>,
}

impl Writer {
    /// Start the worker thread over `backend`.
    ///
    /// Sequence numbers continue from `progress.last_sequence`. `capacity`
    /// must be non-zero.
    pub(crate) fn spawn(
        backend: Box<dyn Backend>,
        progress: Arc<Progress>,
        capacity: usize,
    ) -> Result<Self> {
        let (request_tx, request_rx) = channel::bounded(capacity);
        let (error_tx, error_rx) = channel::bounded(1);
        let (stop_tx, stop_rx) = channel::bounded(0);
        let ready = ReadySignal::new();

        let worker = Worker {
            backend,
            requests: request_rx,
            stop: stop_rx,
            errors: error_tx,
            ready: ready.clone(),
            progress,
        };

        let handle = thread::Builder::new()
            .name("txlog-writer".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            requests: request_tx,
            errors: error_rx,
            stop: stop_tx,
            ready,
            handle,
        })
    }

    /// Enqueue, blocking while the queue is full
    pub(crate) fn enqueue(&self, event: Event) -> Result<()> {
        self.requests
            .send(event)
            .map_err(|_| TxLogError::WriterClosed)
    }

    /// Enqueue, giving up with `QueueFull` after `timeout`
    pub(crate) fn enqueue_timeout(&self, event: Event, timeout: Duration) -> Result<()> {
        self.requests
            .send_timeout(event, timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => TxLogError::QueueFull,
                SendTimeoutError::Disconnected(_) => TxLogError::WriterClosed,
            })
    }

    pub(crate) fn errors(&self) -> Receiver<TxLogError> {
        self.errors.clone()
    }

    pub(crate) fn ready(&self) -> ReadySignal {
        self.ready.clone()
    }

    /// Requests waiting in the queue
    pub(crate) fn queued(&self) -> usize {
        self.requests.len()
    }

    /// Stop the worker and take the backend back.
    ///
    /// Waits for every request enqueued so far to be appended, unless the
    /// worker has halted after a failure. Fails if the worker panicked, in
    /// which case the backend is lost without being closed.
    pub(crate) fn stop(self) -> Result<Box<dyn Backend>> {
        let Writer {
            requests,
            stop,
            handle,
            ..
        } = self;
        drop(requests);
        drop(stop);

        handle.join().map_err(|_| {
            tracing::error!("transaction log writer thread panicked");
            TxLogError::Write("writer thread panicked".to_string())
        })
    }
}

impl Worker {
    fn run(mut self) -> Box<dyn Backend> {
        tracing::debug!(
            backend = self.backend.name(),
            next_sequence = self.progress.last_sequence.load(Ordering::SeqCst).saturating_add(1),
            "transaction log writer started"
        );

        // Ends once every sender is gone and the queue is empty
        while let Ok(event) = self.requests.recv() {
            if let Err(e) = self.append(event) {
                self.halt(e);
                break;
            }
        }

        let dropped = self.requests.len();
        if dropped > 0 {
            tracing::warn!(dropped, "writer stopped with events still queued");
        }
        tracing::debug!("transaction log writer stopped");

        self.backend
    }

    /// Stamp the next sequence onto `event` and persist it
    fn append(&mut self, mut event: Event) -> Result<()> {
        let last = self.progress.last_sequence.load(Ordering::SeqCst);
        let sequence = last.checked_add(1).ok_or_else(|| {
            TxLogError::Write(format!("sequence numbers exhausted after {}", last))
        })?;
        self.progress.last_sequence.store(sequence, Ordering::SeqCst);
        event.sequence = sequence;

        let stored = self.backend.append(&event)?;
        if stored != sequence {
            // The table backend lets the database assign sequences
            self.progress.last_sequence.store(stored, Ordering::SeqCst);
        }
        self.progress.committed.store(stored, Ordering::SeqCst);
        tracing::trace!(sequence = stored, kind = ?event.kind, key = %event.key, "event appended");

        if self.ready.fire() {
            tracing::debug!(sequence = stored, "first event committed");
        }
        Ok(())
    }

    /// Report `error` once, then park until the writer is stopped
    fn halt(&self, error: TxLogError) {
        tracing::error!(
            last_sequence = self.progress.last_sequence.load(Ordering::SeqCst),
            error = %error,
            "error writing event, writer halted"
        );
        self.progress.halted.store(true, Ordering::SeqCst);

        let error = match error {
            TxLogError::Write(msg) => TxLogError::Write(msg),
            other => TxLogError::Write(other.to_string()),
        };
        let _ = self.errors.try_send(error);

        // Keep the queue open but stop consuming until shutdown
        let _ = self.stop.recv();
    }
}
