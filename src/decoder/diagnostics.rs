//! Recoverable decode conditions and the sink they are reported to

use serde::Serialize;
use std::fmt;
use tracing::warn;

/// A condition the decoder recovered from.
///
/// Diagnostics never interrupt the event sequence; they are handed to the
/// decoder's [`DiagnosticSink`] as they are detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Diagnostic {
    /// A lone `0xFF` inside a payload was followed by `following` instead of
    /// a second `0xFF`. Both bytes were kept in the payload.
    MalformedEscape { type_byte: u8, offset: u64, following: u8 },

    /// A fixed-shape metadata payload had the wrong length.
    UnexpectedPayloadLength { type_byte: u8, expected: usize, actual: usize },

    /// An unregistered type byte followed a marker at `offset`. This is what a
    /// sample with exponent 15 and a mantissa below 0x100 looks like at a
    /// frame boundary.
    PossibleMarkerCollision { type_byte: u8, offset: u64 },

    /// Bytes discarded while waiting for the first metadata frame.
    SkippedBytes { count: u64 },

    /// A payload exceeded the buffer limit; bytes past `limit` were dropped.
    PayloadTruncated { type_byte: u8, limit: usize, actual: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MalformedEscape { type_byte, offset, following } => write!(
                f,
                "Expected 0xFF after 0xFF in metadata {:#04x} at byte {}, got {:#04x}",
                type_byte, offset, following
            ),
            Diagnostic::UnexpectedPayloadLength { type_byte, expected, actual } => write!(
                f,
                "Metadata {:#04x} payload is {} bytes, expected {}",
                type_byte, actual, expected
            ),
            Diagnostic::PossibleMarkerCollision { type_byte, offset } => write!(
                f,
                "Unregistered metadata type {:#04x} after marker at byte {} (possible sample collision)",
                type_byte, offset
            ),
            Diagnostic::SkippedBytes { count } => {
                write!(f, "Skipped {} bytes before the first metadata frame", count)
            }
            Diagnostic::PayloadTruncated { type_byte, limit, actual } => write!(
                f,
                "Metadata {:#04x} payload of {} bytes truncated to {}",
                type_byte, actual, limit
            ),
        }
    }
}

/// Receiver for decoder diagnostics.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Logs each diagnostic at `warn` level. The decoder default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for &mut T {
    fn report(&mut self, diagnostic: Diagnostic) {
        (**self).report(diagnostic);
    }
}
