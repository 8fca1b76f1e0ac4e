//! Backend Module
//!
//! Durable storage underneath the transaction log.
//!
//! ## Responsibilities
//! - Append one event at the end of the log
//! - Scan every event from the beginning, in append order
//! - Release the storage handle exactly once
//!
//! ## Variants
//! - [`FileBackend`]: append-only record stream (file or in-memory buffer)
//! - [`TableBackend`]: PostgreSQL `transactions` table
//!
//! The variant is chosen once, when the logger is constructed. Nothing above
//! this module inspects which one is in use.

pub mod file;
pub mod table;

pub use file::{FileBackend, SharedBuffer};
pub use table::TableBackend;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::wal::Event;

/// Lazy, forward-only scan over decoded events
pub type EventScan<'a> = Box<dyn Iterator<Item = Result<Event>> + 'a>;

/// Storage primitive offering sequential append and full scan
pub trait Backend: Send {
    /// Persist one event at the end of the log.
    ///
    /// Returns the sequence number the event is durably stored under.
    fn append(&mut self, event: &Event) -> Result<u64>;

    /// Start a fresh scan from the first record.
    ///
    /// The scan stops after the first error it yields.
    fn scan(&mut self) -> Result<EventScan<'_>>;

    /// Release the storage handle. Safe to call more than once.
    fn close(&mut self) -> Result<()>;

    /// Short name for logging
    fn name(&self) -> &'static str;
}

/// Construct the backend selected by `config`
pub fn open(config: &BackendConfig) -> Result<Box<dyn Backend>> {
    match config {
        BackendConfig::File {
            path: Some(path),
            sync_policy,
        } => Ok(Box::new(FileBackend::open(path, *sync_policy)?)),
        BackendConfig::File { path: None, .. } => Ok(Box::new(FileBackend::in_memory())),
        BackendConfig::Table(params) => Ok(Box::new(TableBackend::connect(params)?)),
    }
}
