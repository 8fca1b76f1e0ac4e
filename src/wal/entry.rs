//! Event definitions and the on-disk record codec
//!
//! An [`Event`] is the unit of durability. The file backend stores each
//! event as one self-describing record:
//!
//! ```text
//! ┌──────────────┬─────────┬─────────┬──────────────────────────────┐
//! │ Sequence (8) │ CRC (4) │ Len (4) │ Payload: kind | key | value  │
//! └──────────────┴─────────┴─────────┴──────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The payload is the bincode encoding of
//! `(kind: u8, key: String, value: String)` in that order. The CRC covers
//! the sequence bytes followed by the payload.

use std::io::{self, Cursor, Read};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TxLogError};

/// Sequence (8) + CRC (4) + payload length (4)
pub const RECORD_HEADER_SIZE: usize = 16;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Kind of mutation recorded by an event
///
/// The discriminants are the persisted values in both backends. Zero is
/// reserved so that a zero-initialized record is detectably invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    #[default]
    Unspecified = 0,
    Delete = 1,
    Put = 2,
}

impl EventKind {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// `false` only for [`EventKind::Unspecified`]
    pub fn is_valid(self) -> bool {
        self != EventKind::Unspecified
    }
}

impl TryFrom<u8> for EventKind {
    type Error = TxLogError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(EventKind::Delete),
            2 => Ok(EventKind::Put),
            other => Err(TxLogError::Decode(format!("invalid event kind: {}", other))),
        }
    }
}

impl TryFrom<i16> for EventKind {
    type Error = TxLogError;

    fn try_from(value: i16) -> Result<Self> {
        let byte = u8::try_from(value)
            .map_err(|_| TxLogError::Decode(format!("invalid event kind: {}", value)))?;
        EventKind::try_from(byte)
    }
}

/// A single durable mutation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    /// Assigned by the writer at append time; 0 means "not yet sequenced"
    pub sequence: u64,

    pub kind: EventKind,

    pub key: String,

    /// Always empty for deletes
    pub value: String,
}

/// Borrowed payload layout, field order is part of the file format
#[derive(Serialize)]
struct PayloadRef<'a>(u8, &'a str, &'a str);

#[derive(Deserialize)]
struct Payload(u8, String, String);

impl Event {
    /// An unsequenced put
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            kind: EventKind::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    /// An unsequenced delete
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            kind: EventKind::Delete,
            key: key.into(),
            value: String::new(),
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Check the invariants every persisted event must satisfy
    /// (sequence excluded).
    pub fn validate(&self) -> Result<()> {
        if !self.kind.is_valid() {
            return Err(TxLogError::InvalidEvent("unspecified event kind".to_string()));
        }
        if self.key.is_empty() {
            return Err(TxLogError::InvalidEvent("empty key".to_string()));
        }
        if self.kind == EventKind::Delete && !self.value.is_empty() {
            return Err(TxLogError::InvalidEvent("delete carries a value".to_string()));
        }
        Ok(())
    }

    /// Encode as one complete file record
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        if self.sequence == 0 {
            return Err(TxLogError::InvalidEvent("unsequenced event".to_string()));
        }

        let payload = bincode::serialize(&PayloadRef(self.kind.as_u8(), &self.key, &self.value))
            .map_err(|e| TxLogError::InvalidEvent(format!("failed to encode event: {}", e)))?;

        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(TxLogError::InvalidEvent(format!(
                "payload too large: {} bytes (max {})",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let sequence_bytes = self.sequence.to_le_bytes();
        let crc = compute_crc(&sequence_bytes, &payload);

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        record.extend_from_slice(&sequence_bytes);
        record.extend_from_slice(&crc.to_le_bytes());
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);
        Ok(record)
    }

    /// Decode exactly one record; trailing bytes are an error
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let event = read_record(&mut cursor)?
            .ok_or_else(|| TxLogError::Decode("empty record".to_string()))?;

        if cursor.position() as usize != bytes.len() {
            return Err(TxLogError::Decode(format!(
                "{} trailing bytes after record",
                bytes.len() - cursor.position() as usize
            )));
        }
        Ok(event)
    }
}

/// Read the next record from a stream.
///
/// Returns `Ok(None)` only when the stream ends exactly on a record
/// boundary. Any partial record is a decode error.
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<Event>> {
    let mut header = [0u8; RECORD_HEADER_SIZE];
    let read = read_full(reader, &mut header)?;
    if read == 0 {
        return Ok(None);
    }
    if read < RECORD_HEADER_SIZE {
        return Err(TxLogError::Decode(format!(
            "truncated record header: {} of {} bytes",
            read, RECORD_HEADER_SIZE
        )));
    }

    let mut sequence_bytes = [0u8; 8];
    sequence_bytes.copy_from_slice(&header[0..8]);
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&header[8..12]);
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&header[12..16]);

    let sequence = u64::from_le_bytes(sequence_bytes);
    let stored_crc = u32::from_le_bytes(crc_bytes);
    let payload_len = u32::from_le_bytes(len_bytes);

    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(TxLogError::Decode(format!(
            "payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut payload = vec![0u8; payload_len as usize];
    let read = read_full(reader, &mut payload)?;
    if read < payload.len() {
        return Err(TxLogError::Decode(format!(
            "truncated record payload at sequence {}: {} of {} bytes",
            sequence, read, payload_len
        )));
    }

    let computed_crc = compute_crc(&sequence_bytes, &payload);
    if computed_crc != stored_crc {
        return Err(TxLogError::Decode(format!(
            "CRC mismatch at sequence {}: stored {:#010x}, computed {:#010x}",
            sequence, stored_crc, computed_crc
        )));
    }

    decode_payload(sequence, &payload).map(Some)
}

fn decode_payload(sequence: u64, payload: &[u8]) -> Result<Event> {
    let Payload(kind, key, value) = bincode::deserialize(payload)
        .map_err(|e| TxLogError::Decode(format!("malformed payload at sequence {}: {}", sequence, e)))?;

    if sequence == 0 {
        return Err(TxLogError::Decode("sequence number must be positive".to_string()));
    }

    let kind = EventKind::try_from(kind)?;
    if key.is_empty() {
        return Err(TxLogError::Decode(format!("empty key at sequence {}", sequence)));
    }

    let value = match kind {
        EventKind::Delete => String::new(),
        _ => value,
    };

    Ok(Event {
        sequence,
        kind,
        key,
        value,
    })
}

fn compute_crc(sequence_bytes: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(sequence_bytes);
    hasher.update(payload);
    hasher.finalize()
}

/// Like `read_exact`, but reports how many bytes were read before EOF
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
