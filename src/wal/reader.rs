//! Replay Reader
//!
//! Re-derives the ordered event stream from a backend at startup.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::EventScan;
use crate::error::{Result, TxLogError};

use super::Event;

/// Lazy, finite stream of replayed events
///
/// Every yielded event has a sequence strictly greater than the one before
/// it. The first error (decode failure or out-of-sequence record) is yielded
/// once and ends the stream; nothing after the violation is produced.
pub struct Replay<'a> {
    scan: EventScan<'a>,
    last_sequence: &'a AtomicU64,
    replayed: u64,
    done: bool,
}

impl<'a> Replay<'a> {
    pub(crate) fn new(scan: EventScan<'a>, last_sequence: &'a AtomicU64) -> Self {
        Self {
            scan,
            last_sequence,
            replayed: 0,
            done: false,
        }
    }

    /// Events yielded so far
    pub fn events_replayed(&self) -> u64 {
        self.replayed
    }

    /// Highest sequence seen so far
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::SeqCst)
    }

    fn fail(&mut self, error: TxLogError) -> Option<Result<Event>> {
        self.done = true;
        Some(Err(error))
    }
}

impl Iterator for Replay<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let event = match self.scan.next() {
            None => {
                self.done = true;
                return None;
            }
            Some(Err(e)) => {
                tracing::error!(after = self.replayed, error = %e, "transaction log scan failed");
                return self.fail(e);
            }
            Some(Ok(event)) => event,
        };

        let last = self.last_sequence.load(Ordering::SeqCst);
        if event.sequence <= last {
            tracing::error!(
                sequence = event.sequence,
                last_sequence = last,
                "transaction numbers out of sequence"
            );
            return self.fail(TxLogError::OutOfSequence {
                sequence: event.sequence,
                last,
            });
        }

        self.last_sequence.store(event.sequence, Ordering::SeqCst);
        self.replayed += 1;
        Some(Ok(event))
    }
}
