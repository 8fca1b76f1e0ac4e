//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Define the event record and its codec
//! - Assign monotonically increasing sequence numbers on append
//! - Persist events through a single background writer with backpressure
//! - Replay the log at startup, rejecting corrupt or reordered records
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Record 1                                     │
//! │ ┌─────────┬─────────┬─────────┬────────────┐ │
//! │ │ Seq (8) │ CRC (4) │ Len (4) │ Payload    │ │
//! │ └─────────┴─────────┴─────────┴────────────┘ │
//! ├──────────────────────────────────────────────┤
//! │ Record 2                                     │
//! │ ┌─────────┬─────────┬─────────┬────────────┐ │
//! │ │ Seq (8) │ CRC (4) │ Len (4) │ Payload    │ │
//! │ └─────────┴─────────┴─────────┴────────────┘ │
//! └──────────────────────────────────────────────┘
//! ```

mod entry;
mod logger;
mod reader;
mod writer;

pub use entry::{read_record, Event, EventKind, MAX_PAYLOAD_SIZE, RECORD_HEADER_SIZE};
pub use logger::{LoggerState, TransactionLogger};
pub use reader::Replay;
pub use writer::ReadySignal;
