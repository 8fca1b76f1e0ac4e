//! # txlog
//!
//! An embedded write-ahead transaction log that gives a key-value service
//! durability and crash recovery:
//! - Append-only event log with monotonic sequence numbers
//! - Single background writer with a bounded, blocking queue
//! - Replay-before-serve startup that rejects corrupt or reordered logs
//! - Pluggable backends: record file or PostgreSQL table
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Request Handling (Engine)                   │
//! │               (many concurrent producers)                    │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ put / delete                 │ write_put / write_delete
//!                ▼                              ▼
//!         ┌─────────────┐              ┌─────────────────┐
//!         │   KvStore   │              │  Bounded Queue  │
//!         │  (RwLock)   │              └────────┬────────┘
//!         └──────▲──────┘                       ▼
//!                │ replay at startup   ┌─────────────────┐
//!                │                     │  Writer Thread  │
//!                │                     │ (sequence, FIFO)│
//!                │                     └────────┬────────┘
//!                │                              ▼
//!         ┌──────┴──────┐              ┌─────────────────┐
//!         │   Replay    │◀─── scan ────│     Backend     │
//!         │   Reader    │              │  (file / table) │
//!         └─────────────┘              └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod backend;
pub mod store;
pub mod command;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{TxLogError, Result};
pub use config::{BackendConfig, Config, SyncPolicy, TableParams};
pub use engine::{Engine, LifecycleState, RecoveryStats};
pub use store::KvStore;
pub use wal::{Event, EventKind, TransactionLogger};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of txlog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
