//! Metadata payload decoding
//!
//! A metadata payload runs from the byte after the type byte up to the
//! terminator `0xFF 0xFF`. Reading the payload and interpreting it are
//! separate steps: [`read_payload`] scans the stream for the terminator, and
//! [`decode_record`] turns the collected bytes into a [`MetadataRecord`].
//!
//! Length mismatches never fail decoding. A short timestamp becomes
//! [`MetadataRecord::Unknown`]; every other mismatch keeps its kind and is
//! reported as [`Diagnostic::UnexpectedPayloadLength`].

use tracing::trace;

use super::diagnostics::{Diagnostic, DiagnosticSink};
use crate::source::{ByteCursor, ByteSource};
use crate::types::{ESCAPE_BYTE, MetadataKind, MetadataRecord};
use crate::{PowerMonError, Result};

/// Payload bytes collected so far, capped at a limit.
#[derive(Debug)]
struct PayloadBuffer {
    bytes: Vec<u8>,
    received: usize,
    limit: usize,
}

impl PayloadBuffer {
    fn new(limit: usize) -> Self {
        Self { bytes: Vec::new(), received: 0, limit }
    }

    fn push(&mut self, byte: u8) {
        self.received += 1;
        if self.bytes.len() < self.limit {
            self.bytes.push(byte);
        }
    }
}

/// Consume a payload up to and including its terminator.
///
/// The terminator is not part of the returned bytes. A lone `0xFF` followed by
/// any other byte is reported as [`Diagnostic::MalformedEscape`] and both bytes
/// stay in the payload. End of stream before the terminator is
/// [`PowerMonError::UnterminatedMetadata`].
pub(crate) fn read_payload<S, D>(
    cursor: &mut ByteCursor<S>,
    type_byte: u8,
    limit: usize,
    diagnostics: &mut D,
) -> Result<Vec<u8>>
where
    S: ByteSource,
    D: DiagnosticSink,
{
    let mut payload = PayloadBuffer::new(limit);

    loop {
        let byte = next_payload_byte(cursor, type_byte, &payload)?;
        if byte != ESCAPE_BYTE {
            payload.push(byte);
            continue;
        }

        let following = next_payload_byte(cursor, type_byte, &payload)?;
        if following == ESCAPE_BYTE {
            break;
        }

        diagnostics.report(Diagnostic::MalformedEscape {
            type_byte,
            offset: cursor.offset() - 2,
            following,
        });
        payload.push(byte);
        payload.push(following);
    }

    if payload.received > payload.bytes.len() {
        diagnostics.report(Diagnostic::PayloadTruncated {
            type_byte,
            limit,
            actual: payload.received,
        });
    }

    trace!("Collected {} payload bytes for metadata {:#04x}", payload.received, type_byte);
    Ok(payload.bytes)
}

fn next_payload_byte<S: ByteSource>(
    cursor: &mut ByteCursor<S>,
    type_byte: u8,
    payload: &PayloadBuffer,
) -> Result<u8> {
    cursor.next_byte()?.ok_or(PowerMonError::UnterminatedMetadata {
        type_byte: Some(type_byte),
        received: payload.received,
    })
}

/// Interpret a complete payload according to its type byte.
pub fn decode_record<D: DiagnosticSink>(
    type_byte: u8,
    payload: Vec<u8>,
    diagnostics: &mut D,
) -> MetadataRecord {
    let Some(kind) = MetadataKind::from_type_byte(type_byte) else {
        return MetadataRecord::Unknown { raw_type: type_byte, payload };
    };

    if let Some(expected) = kind.expected_payload_len() {
        if payload.len() != expected {
            diagnostics.report(Diagnostic::UnexpectedPayloadLength {
                type_byte,
                expected,
                actual: payload.len(),
            });
        }
    }

    match kind {
        MetadataKind::Error => MetadataRecord::Error { message: text(&payload) },
        MetadataKind::Info => MetadataRecord::Info { message: text(&payload) },
        MetadataKind::Timestamp => match timestamp_fields(&payload) {
            Some((seconds, load_percent)) => MetadataRecord::Timestamp { seconds, load_percent },
            None => MetadataRecord::Unknown { raw_type: type_byte, payload },
        },
        MetadataKind::AcqEnd => MetadataRecord::AcqEnd,
        MetadataKind::Overcurrent => MetadataRecord::Overcurrent,
        MetadataKind::Powerdown => MetadataRecord::Powerdown { payload },
        MetadataKind::VoltageGet => MetadataRecord::VoltageGet { payload },
        MetadataKind::Temperature => MetadataRecord::Temperature { payload },
        MetadataKind::PowerGet => MetadataRecord::PowerGet { payload },
    }
}

/// Big-endian seconds and load percent from the first five bytes.
fn timestamp_fields(payload: &[u8]) -> Option<(u32, u8)> {
    match *payload {
        [s0, s1, s2, s3, load_percent, ..] => {
            Some((u32::from_be_bytes([s0, s1, s2, s3]), load_percent))
        }
        _ => None,
    }
}

fn text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReaderSource;

    fn read(type_byte: u8, bytes: &[u8]) -> (Result<Vec<u8>>, Vec<Diagnostic>) {
        let mut cursor = ByteCursor::new(ReaderSource::new(bytes));
        let mut diagnostics = Vec::<Diagnostic>::new();
        let payload = read_payload(&mut cursor, type_byte, 4096, &mut diagnostics);
        (payload, diagnostics)
    }

    fn decode(type_byte: u8, payload: &[u8]) -> (MetadataRecord, Vec<Diagnostic>) {
        let mut diagnostics = Vec::<Diagnostic>::new();
        let record = decode_record(type_byte, payload.to_vec(), &mut diagnostics);
        (record, diagnostics)
    }

    #[test]
    fn terminator_ends_payload_and_is_not_kept() {
        let (payload, diagnostics) = read(0xF2, &[0x41, 0x42, 0xFF, 0xFF, 0x10]);
        assert_eq!(payload.unwrap(), vec![0x41, 0x42]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn empty_payload() {
        let (payload, _) = read(0xF4, &[0xFF, 0xFF]);
        assert!(payload.unwrap().is_empty());
    }

    #[test]
    fn malformed_escape_keeps_both_bytes() {
        let (payload, diagnostics) = read(0xF2, &[0x41, 0xFF, 0x42, 0x43, 0xFF, 0xFF]);
        assert_eq!(payload.unwrap(), vec![0x41, 0xFF, 0x42, 0x43]);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::MalformedEscape { type_byte: 0xF2, offset: 1, following: 0x42 }]
        );
    }

    #[test]
    fn end_of_stream_inside_payload_is_unterminated() {
        let (payload, _) = read(0xF1, &[0x45]);
        match payload {
            Err(PowerMonError::UnterminatedMetadata { type_byte, received }) => {
                assert_eq!(type_byte, Some(0xF1));
                assert_eq!(received, 1);
            }
            other => panic!("Expected UnterminatedMetadata, got {:?}", other),
        }

        let (dangling_escape, _) = read(0xF1, &[0x45, 0xFF]);
        assert!(matches!(dangling_escape, Err(PowerMonError::UnterminatedMetadata { .. })));
    }

    #[test]
    fn oversized_payload_is_truncated_and_reported() {
        let mut bytes = vec![0x20; 10];
        bytes.extend([0xFF, 0xFF]);
        let mut cursor = ByteCursor::new(ReaderSource::new(&bytes[..]));
        let mut diagnostics: Vec<Diagnostic> = Vec::new();

        let payload = read_payload(&mut cursor, 0xF2, 4, &mut diagnostics).unwrap();
        assert_eq!(payload.len(), 4);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::PayloadTruncated { type_byte: 0xF2, limit: 4, actual: 10 }]
        );
    }

    #[test]
    fn text_records() {
        assert_eq!(decode(0xF2, b"AB").0, MetadataRecord::Info { message: "AB".into() });
        assert_eq!(
            decode(0xF1, b"overrun").0,
            MetadataRecord::Error { message: "overrun".into() }
        );
        let (lossy, _) = decode(0xF2, &[0x41, 0xFF, 0x42]);
        assert!(matches!(lossy, MetadataRecord::Info { message } if message.starts_with('A')));
    }

    #[test]
    fn timestamp_record() {
        let (record, diagnostics) = decode(0xF3, &[0x00, 0x00, 0x00, 0x0A, 0x32]);
        assert_eq!(record, MetadataRecord::Timestamp { seconds: 10, load_percent: 50 });
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn long_timestamp_is_best_effort() {
        let (record, diagnostics) = decode(0xF3, &[0x00, 0x00, 0x01, 0x00, 0x07, 0xAA]);
        assert_eq!(record, MetadataRecord::Timestamp { seconds: 256, load_percent: 7 });
        assert_eq!(
            diagnostics,
            vec![Diagnostic::UnexpectedPayloadLength { type_byte: 0xF3, expected: 5, actual: 6 }]
        );
    }

    #[test]
    fn short_timestamp_becomes_unknown() {
        let (record, diagnostics) = decode(0xF3, &[0x00, 0x01]);
        assert_eq!(record, MetadataRecord::Unknown { raw_type: 0xF3, payload: vec![0x00, 0x01] });
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn payloadless_kinds_tolerate_extra_bytes() {
        let (record, diagnostics) = decode(0xF5, &[0x01]);
        assert_eq!(record, MetadataRecord::Overcurrent);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::UnexpectedPayloadLength { type_byte: 0xF5, expected: 0, actual: 1 }]
        );

        let (record, diagnostics) = decode(0xF4, &[]);
        assert_eq!(record, MetadataRecord::AcqEnd);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn raw_kinds_keep_their_bytes() {
        assert_eq!(decode(0xF6, &[1]).0, MetadataRecord::Powerdown { payload: vec![1] });
        assert_eq!(decode(0xF7, &[2]).0, MetadataRecord::VoltageGet { payload: vec![2] });
        assert_eq!(decode(0xF8, &[3]).0, MetadataRecord::Temperature { payload: vec![3] });
        assert_eq!(decode(0xF9, &[4]).0, MetadataRecord::PowerGet { payload: vec![4] });
        assert_eq!(
            decode(0x42, &[5]).0,
            MetadataRecord::Unknown { raw_type: 0x42, payload: vec![5] }
        );
    }
}
