//! Tests for Event encoding and decoding
//!
//! These tests verify:
//! - Round-trip encoding for both event kinds
//! - Deletes always decode with an empty value
//! - The reserved zero kind is rejected
//! - CRC, truncation and malformed-payload detection

use txlog::wal::{Event, EventKind, RECORD_HEADER_SIZE};
use txlog::TxLogError;

// =============================================================================
// Helper Functions
// =============================================================================

/// Build a record by hand, bypassing `Event::encode` validation
fn raw_record(sequence: u64, kind: u8, key: &str, value: &str) -> Vec<u8> {
    let payload = bincode::serialize(&(kind, key, value)).unwrap();
    let sequence_bytes = sequence.to_le_bytes();

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&sequence_bytes);
    hasher.update(&payload);
    let crc = hasher.finalize();

    let mut record = Vec::new();
    record.extend_from_slice(&sequence_bytes);
    record.extend_from_slice(&crc.to_le_bytes());
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(&payload);
    record
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_encode_decode_put() {
    let event = Event::put("key1", "value123").with_sequence(1);

    let bytes = event.encode().unwrap();
    let decoded = Event::decode(&bytes).unwrap();

    assert_eq!(decoded.kind, EventKind::Put);
    assert_eq!(decoded.key, "key1");
    assert_eq!(decoded.value, "value123");
    assert_eq!(decoded.sequence, 1);
}

#[test]
fn test_encode_decode_delete() {
    let event = Event::delete("key1").with_sequence(7);

    let decoded = Event::decode(&event.encode().unwrap()).unwrap();

    assert_eq!(decoded, event);
    assert_eq!(decoded.value, "");
}

#[test]
fn test_encode_decode_unicode_and_empty_value() {
    let event = Event::put("ключ", "").with_sequence(3);
    assert_eq!(Event::decode(&event.encode().unwrap()).unwrap(), event);

    let event = Event::put("k", "värde with spaces\nand newline").with_sequence(4);
    assert_eq!(Event::decode(&event.encode().unwrap()).unwrap(), event);
}

#[test]
fn test_record_layout_header() {
    let event = Event::put("a", "b").with_sequence(0x0102);
    let bytes = event.encode().unwrap();

    assert!(bytes.len() > RECORD_HEADER_SIZE);
    assert_eq!(&bytes[0..8], &0x0102u64.to_le_bytes());

    let payload_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
    assert_eq!(bytes.len(), RECORD_HEADER_SIZE + payload_len);
}

#[test]
fn test_hand_built_record_matches_encoder() {
    let event = Event::put("key1", "value123").with_sequence(9);
    assert_eq!(event.encode().unwrap(), raw_record(9, 2, "key1", "value123"));
}

// =============================================================================
// Delete Value Tests
// =============================================================================

#[test]
fn test_delete_record_with_value_decodes_empty() {
    let bytes = raw_record(1, EventKind::Delete.as_u8(), "key1", "leftover");

    let decoded = Event::decode(&bytes).unwrap();

    assert_eq!(decoded.kind, EventKind::Delete);
    assert_eq!(decoded.value, "");
}

#[test]
fn test_encode_rejects_delete_with_value() {
    let mut event = Event::delete("key1").with_sequence(1);
    event.value = "oops".to_string();

    assert!(matches!(event.encode(), Err(TxLogError::InvalidEvent(_))));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_unspecified_kind_is_invalid() {
    let event = Event::default().with_sequence(1);
    assert_eq!(event.kind, EventKind::Unspecified);
    assert!(!event.kind.is_valid());
    assert!(matches!(event.encode(), Err(TxLogError::InvalidEvent(_))));

    let bytes = raw_record(1, 0, "key1", "v");
    assert!(matches!(Event::decode(&bytes), Err(TxLogError::Decode(_))));
}

#[test]
fn test_unknown_kind_is_decode_error() {
    let bytes = raw_record(1, 9, "key1", "v");
    assert!(matches!(Event::decode(&bytes), Err(TxLogError::Decode(_))));
}

#[test]
fn test_kind_conversions() {
    assert_eq!(EventKind::try_from(1u8).unwrap(), EventKind::Delete);
    assert_eq!(EventKind::try_from(2u8).unwrap(), EventKind::Put);
    assert!(EventKind::try_from(0u8).is_err());
    assert_eq!(EventKind::try_from(2i16).unwrap(), EventKind::Put);
    assert!(EventKind::try_from(-1i16).is_err());
    assert!(EventKind::try_from(258i16).is_err());
}

#[test]
fn test_empty_key_rejected() {
    assert!(matches!(
        Event::put("", "v").with_sequence(1).encode(),
        Err(TxLogError::InvalidEvent(_))
    ));

    let bytes = raw_record(1, 2, "", "v");
    assert!(matches!(Event::decode(&bytes), Err(TxLogError::Decode(_))));
}

#[test]
fn test_unsequenced_event_cannot_be_encoded() {
    assert!(matches!(
        Event::put("k", "v").encode(),
        Err(TxLogError::InvalidEvent(_))
    ));

    let bytes = raw_record(0, 2, "k", "v");
    assert!(matches!(Event::decode(&bytes), Err(TxLogError::Decode(_))));
}

// =============================================================================
// Corruption Detection Tests
// =============================================================================

#[test]
fn test_crc_corruption_detected() {
    let mut bytes = Event::put("key1", "value1").with_sequence(1).encode().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    match Event::decode(&bytes) {
        Err(TxLogError::Decode(msg)) => assert!(msg.contains("CRC"), "{}", msg),
        other => panic!("expected CRC error, got {:?}", other),
    }
}

#[test]
fn test_sequence_corruption_detected() {
    let mut bytes = Event::put("key1", "value1").with_sequence(1).encode().unwrap();
    bytes[0] = 2;

    assert!(matches!(Event::decode(&bytes), Err(TxLogError::Decode(_))));
}

#[test]
fn test_truncated_header_detected() {
    let bytes = Event::put("key1", "value1").with_sequence(1).encode().unwrap();

    let result = Event::decode(&bytes[..RECORD_HEADER_SIZE - 1]);
    assert!(matches!(result, Err(TxLogError::Decode(_))));
}

#[test]
fn test_truncated_payload_detected() {
    let bytes = Event::put("key1", "value1").with_sequence(1).encode().unwrap();

    let result = Event::decode(&bytes[..bytes.len() - 2]);
    assert!(matches!(result, Err(TxLogError::Decode(_))));
}

#[test]
fn test_empty_input_is_error() {
    assert!(matches!(Event::decode(&[]), Err(TxLogError::Decode(_))));
}

#[test]
fn test_trailing_bytes_rejected() {
    let mut bytes = Event::put("k", "v").with_sequence(1).encode().unwrap();
    bytes.push(0);

    assert!(matches!(Event::decode(&bytes), Err(TxLogError::Decode(_))));
}

#[test]
fn test_oversized_payload_length_rejected() {
    let mut bytes = Event::put("k", "v").with_sequence(1).encode().unwrap();
    bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());

    match Event::decode(&bytes) {
        Err(TxLogError::Decode(msg)) => assert!(msg.contains("too large"), "{}", msg),
        other => panic!("expected size error, got {:?}", other),
    }
}

#[test]
fn test_garbage_payload_rejected() {
    let payload = [0xFFu8; 5];
    let sequence_bytes = 1u64.to_le_bytes();
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&sequence_bytes);
    hasher.update(&payload);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&sequence_bytes);
    bytes.extend_from_slice(&hasher.finalize().to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&payload);

    assert!(matches!(Event::decode(&bytes), Err(TxLogError::Decode(_))));
}
