//! Telemetry stream decoder
//!
//! [`FrameDecoder`] turns the raw byte stream produced by the power shield
//! into [`FrameEvent`]s. It is a pull-based state machine: every call to
//! [`Iterator::next`] reads exactly the bytes of one frame from its
//! [`ByteSource`] and never reads ahead.
//!
//! ## Framing
//!
//! At a frame boundary the next byte is either the marker `0xF0`, which opens
//! a metadata frame (type byte, payload, `0xFF 0xFF`), or the high byte of a
//! two-byte sample. Position alone decides: a sample whose high byte happens
//! to be `0xF0` is read as a marker. When the type byte that follows is not a
//! registered metadata type, a [`Diagnostic::PossibleMarkerCollision`] is
//! reported.
//!
//! ## Termination
//!
//! - End of stream at a frame boundary ends the sequence.
//! - An `AcqEnd` record is yielded, then the sequence ends without further
//!   reads.
//! - Any error is yielded once; the decoder is then finished.
//!
//! ## Usage Example
//!
//! ```rust
//! use powermon::decoder::FrameDecoder;
//! use powermon::source::ReaderSource;
//! use powermon::types::{FrameEvent, MetadataRecord};
//!
//! let bytes: &[u8] = &[0x10, 0x05, 0xF0, 0xF2, b'o', b'k', 0xFF, 0xFF, 0xF0, 0xF4, 0xFF, 0xFF];
//! let events: Vec<FrameEvent> =
//!     FrameDecoder::new(ReaderSource::new(bytes)).collect::<Result<_, _>>().unwrap();
//!
//! assert_eq!(events.len(), 3);
//! assert_eq!(events[0].as_sample().map(|s| s.value()), Some(0.3125));
//! assert_eq!(events[1], FrameEvent::Metadata(MetadataRecord::Info { message: "ok".into() }));
//! assert!(events[2].is_acquisition_end());
//! ```

pub mod diagnostics;
pub mod metadata;

pub use diagnostics::{Diagnostic, DiagnosticSink, TracingDiagnostics};
pub use metadata::decode_record;

use serde::Serialize;
use std::iter::FusedIterator;
use tracing::{debug, trace};

use crate::source::{ByteCursor, ByteSource};
use crate::types::{FRAME_MARKER, FrameEvent, MetadataKind, Sample};
use crate::{PowerMonError, Result};

/// Default cap on a stored metadata payload.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 4096;

/// Scanner position within the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScanState {
    /// Discarding bytes until the first metadata marker.
    Synchronizing,
    /// At a frame boundary.
    WaitingMarker,
    /// A marker was read; the type byte and payload follow.
    FrameHeader,
    /// Finished. No further reads happen.
    Done,
}

/// Decoder behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Start in [`ScanState::Synchronizing`] and drop everything before the
    /// first marker.
    pub sync_on_metadata: bool,
    /// Payload bytes stored per metadata frame. Excess bytes are consumed but
    /// dropped.
    pub max_payload_len: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self { sync_on_metadata: false, max_payload_len: DEFAULT_MAX_PAYLOAD_LEN }
    }
}

impl DecoderOptions {
    pub fn with_sync_on_metadata(mut self, sync: bool) -> Self {
        self.sync_on_metadata = sync;
        self
    }

    pub fn with_max_payload_len(mut self, limit: usize) -> Self {
        self.max_payload_len = limit;
        self
    }
}

/// Counts of decoded frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    pub samples: u64,
    pub metadata: u64,
}

/// Lazy decoder over a telemetry byte stream
///
/// Yields `Result<FrameEvent>` items in arrival order. The iterator is fused:
/// after the end of the stream, an `AcqEnd` record or an error, it returns
/// `None` forever.
#[derive(Debug)]
pub struct FrameDecoder<S, D = TracingDiagnostics> {
    cursor: ByteCursor<S>,
    diagnostics: D,
    options: DecoderOptions,
    state: ScanState,
    stats: DecoderStats,
}

impl<S: ByteSource> FrameDecoder<S> {
    /// Decoder with default options, logging diagnostics through `tracing`.
    pub fn new(source: S) -> Self {
        Self::with_options(source, DecoderOptions::default())
    }

    pub fn with_options(source: S, options: DecoderOptions) -> Self {
        Self::with_diagnostics(source, options, TracingDiagnostics)
    }
}

impl<S: ByteSource, D: DiagnosticSink> FrameDecoder<S, D> {
    /// Decoder reporting diagnostics to a caller-supplied sink.
    pub fn with_diagnostics(source: S, options: DecoderOptions, diagnostics: D) -> Self {
        let state = if options.sync_on_metadata {
            ScanState::Synchronizing
        } else {
            ScanState::WaitingMarker
        };
        Self {
            cursor: ByteCursor::new(source),
            diagnostics,
            options,
            state,
            stats: DecoderStats::default(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ScanState::Done
    }

    /// Total bytes read from the source.
    pub fn bytes_consumed(&self) -> u64 {
        self.cursor.offset()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> &D {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut D {
        &mut self.diagnostics
    }

    /// Give the byte source back, e.g. to reuse the transport for commands.
    pub fn into_source(self) -> S {
        self.cursor.into_inner()
    }

    pub fn into_parts(self) -> (S, D) {
        (self.cursor.into_inner(), self.diagnostics)
    }

    /// Decode the next frame.
    ///
    /// `Ok(None)` means the sequence has ended. An error finishes the decoder.
    pub fn next_event(&mut self) -> Result<Option<FrameEvent>> {
        let result = self.advance();
        if !matches!(result, Ok(Some(_))) && self.state != ScanState::Done {
            self.state = ScanState::Done;
        }
        result
    }

    fn advance(&mut self) -> Result<Option<FrameEvent>> {
        loop {
            match self.state {
                ScanState::Done => return Ok(None),
                ScanState::Synchronizing => {
                    if !self.synchronize()? {
                        return Ok(None);
                    }
                }
                ScanState::WaitingMarker => {
                    let Some(high) = self.cursor.next_byte()? else {
                        debug!("Telemetry stream ended after {} bytes", self.cursor.offset());
                        return Ok(None);
                    };
                    if high == FRAME_MARKER {
                        self.state = ScanState::FrameHeader;
                        continue;
                    }
                    return self.read_sample(high).map(Some);
                }
                ScanState::FrameHeader => return self.read_metadata().map(Some),
            }
        }
    }

    /// Skip to the first marker. Returns `false` if the stream ended first.
    ///
    /// Discarded bytes are reported even when a read error ends the scan.
    fn synchronize(&mut self) -> Result<bool> {
        let mut skipped = 0u64;
        let outcome = loop {
            match self.cursor.next_byte() {
                Ok(Some(FRAME_MARKER)) => break Ok(true),
                Ok(Some(_)) => skipped += 1,
                Ok(None) => break Ok(false),
                Err(e) => break Err(e),
            }
        };

        if skipped > 0 {
            self.diagnostics.report(Diagnostic::SkippedBytes { count: skipped });
        }
        if let Ok(true) = outcome {
            self.state = ScanState::FrameHeader;
        }
        outcome
    }

    fn read_sample(&mut self, high: u8) -> Result<FrameEvent> {
        let low =
            self.cursor.next_byte()?.ok_or(PowerMonError::TruncatedSample { high_byte: high })?;
        let sample = Sample::from_wire([high, low]);
        self.stats.samples += 1;
        trace!("Sample {}: {:?} = {}", self.stats.samples, sample, sample.value());
        Ok(FrameEvent::Sample(sample))
    }

    fn read_metadata(&mut self) -> Result<FrameEvent> {
        let marker_offset = self.cursor.offset().saturating_sub(1);
        let type_byte = self
            .cursor
            .next_byte()?
            .ok_or(PowerMonError::UnterminatedMetadata { type_byte: None, received: 0 })?;

        if MetadataKind::from_type_byte(type_byte).is_none() {
            self.diagnostics
                .report(Diagnostic::PossibleMarkerCollision { type_byte, offset: marker_offset });
        }

        let payload = metadata::read_payload(
            &mut self.cursor,
            type_byte,
            self.options.max_payload_len,
            &mut self.diagnostics,
        )?;
        let record = decode_record(type_byte, payload, &mut self.diagnostics);
        self.stats.metadata += 1;
        debug!("Metadata at byte {}: {}", marker_offset, record);

        self.state =
            if record.is_acquisition_end() { ScanState::Done } else { ScanState::WaitingMarker };
        Ok(FrameEvent::Metadata(record))
    }
}

impl<S: ByteSource, D: DiagnosticSink> Iterator for FrameDecoder<S, D> {
    type Item = Result<FrameEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

impl<S: ByteSource, D: DiagnosticSink> FusedIterator for FrameDecoder<S, D> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReaderSource;
    use crate::test_utils::{CountingSource, FailingSource, WireBuilder, init_tracing};
    use std::time::Duration;
    use crate::types::MetadataRecord;
    use proptest::prelude::*;

    fn decode_all(bytes: &[u8]) -> (Vec<Result<FrameEvent>>, Vec<Diagnostic>) {
        let mut decoder = FrameDecoder::with_diagnostics(
            ReaderSource::new(bytes),
            DecoderOptions::default(),
            Vec::<Diagnostic>::new(),
        );
        let events: Vec<_> = decoder.by_ref().collect();
        let (_, diagnostics) = decoder.into_parts();
        (events, diagnostics)
    }

    fn events(bytes: &[u8]) -> Vec<FrameEvent> {
        decode_all(bytes).0.into_iter().map(|event| event.unwrap()).collect()
    }

    #[test]
    fn non_marker_pair_is_one_sample() {
        init_tracing();
        assert_eq!(events(&[0x10, 0x05]), vec![FrameEvent::Sample(Sample::from_word(0x1005))]);
    }

    #[test]
    fn info_record() {
        let decoded = events(&[0xF0, 0xF2, 0x41, 0x42, 0xFF, 0xFF]);
        assert_eq!(
            decoded,
            vec![FrameEvent::Metadata(MetadataRecord::Info { message: "AB".into() })]
        );
    }

    #[test]
    fn timestamp_record() {
        let decoded = events(&[0xF0, 0xF3, 0x00, 0x00, 0x00, 0x0A, 0x32, 0xFF, 0xFF]);
        assert_eq!(
            decoded,
            vec![FrameEvent::Metadata(MetadataRecord::Timestamp { seconds: 10, load_percent: 50 })]
        );
    }

    #[test]
    fn acq_end_stops_reading() {
        let bytes = WireBuilder::new().acq_end().word(0x1005).build();
        let mut source = CountingSource::new(bytes);
        let mut decoder = FrameDecoder::new(&mut source);

        let event = decoder.next().unwrap().unwrap();
        assert_eq!(event, FrameEvent::Metadata(MetadataRecord::AcqEnd));
        assert!(decoder.next().is_none());
        assert!(decoder.next().is_none());
        assert_eq!(decoder.state(), ScanState::Done);
        assert_eq!(decoder.bytes_consumed(), 4);
        drop(decoder);

        assert_eq!(source.reads(), 4);
        assert_eq!(source.remaining(), 2);
    }

    #[test]
    fn unterminated_payload_is_an_error() {
        let (decoded, _) = decode_all(&[0xF0, 0xF1, 0x45]);
        assert_eq!(decoded.len(), 1);
        match &decoded[0] {
            Err(PowerMonError::UnterminatedMetadata { type_byte, received }) => {
                assert_eq!(*type_byte, Some(0xF1));
                assert_eq!(*received, 1);
            }
            other => panic!("Expected UnterminatedMetadata, got {:?}", other),
        }
    }

    #[test]
    fn marker_at_end_of_stream_is_unterminated() {
        let (decoded, _) = decode_all(&[0x10, 0x05, 0xF0]);
        assert_eq!(decoded.len(), 2);
        assert!(matches!(
            decoded[1],
            Err(PowerMonError::UnterminatedMetadata { type_byte: None, received: 0 })
        ));
    }

    #[test]
    fn half_sample_is_truncated() {
        let (decoded, _) = decode_all(&[0x10, 0x05, 0x20]);
        assert_eq!(decoded.len(), 2);
        assert!(matches!(decoded[1], Err(PowerMonError::TruncatedSample { high_byte: 0x20 })));
    }

    #[test]
    fn empty_stream_ends_cleanly() {
        let (decoded, diagnostics) = decode_all(&[]);
        assert!(decoded.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn errors_fuse_the_decoder() {
        let mut source = CountingSource::new(vec![0xF0, 0xF2, 0x41]);
        let mut decoder = FrameDecoder::new(&mut source);

        assert!(decoder.next().unwrap().is_err());
        let reads = decoder.bytes_consumed();
        assert!(decoder.next().is_none());
        assert_eq!(decoder.bytes_consumed(), reads);
        assert!(decoder.is_done());
    }

    #[test]
    fn mixed_stream_keeps_arrival_order() {
        let bytes = WireBuilder::new()
            .info("start")
            .word(0x1005)
            .timestamp(1, 20)
            .word(0x0FFF)
            .word(0xE001)
            .acq_end()
            .build();

        let decoded = events(&bytes);
        assert_eq!(decoded.len(), 6);
        assert_eq!(
            decoded[0],
            FrameEvent::Metadata(MetadataRecord::Info { message: "start".into() })
        );
        assert_eq!(decoded[1].as_sample().map(Sample::to_word), Some(0x1005));
        assert_eq!(
            decoded[2],
            FrameEvent::Metadata(MetadataRecord::Timestamp { seconds: 1, load_percent: 20 })
        );
        assert_eq!(decoded[3].as_sample().map(Sample::to_word), Some(0x0FFF));
        assert_eq!(decoded[4].as_sample().map(Sample::to_word), Some(0xE001));
        assert!(decoded[5].is_acquisition_end());
    }

    #[test]
    fn stats_count_frames() {
        let bytes = WireBuilder::new().info("x").samples(10).acq_end().build();
        let mut decoder = FrameDecoder::new(ReaderSource::new(&bytes[..]));
        let count = decoder.by_ref().count();

        assert_eq!(count, 12);
        assert_eq!(decoder.stats(), DecoderStats { samples: 10, metadata: 2 });
        assert_eq!(decoder.bytes_consumed(), bytes.len() as u64);
    }

    #[test]
    fn colliding_sample_is_flagged() {
        // 0xF012 is exponent 15, mantissa 0x012; at a boundary it reads as a marker.
        let bytes =
            WireBuilder::new().word(0xF012).raw(&[0x33, 0xFF, 0xFF]).word(0x1005).build();
        let (decoded, diagnostics) = decode_all(&bytes);

        assert_eq!(
            decoded[0].as_ref().unwrap(),
            &FrameEvent::Metadata(MetadataRecord::Unknown { raw_type: 0x12, payload: vec![0x33] })
        );
        assert_eq!(decoded[1].as_ref().unwrap().as_sample().map(Sample::to_word), Some(0x1005));
        assert_eq!(
            diagnostics,
            vec![Diagnostic::PossibleMarkerCollision { type_byte: 0x12, offset: 0 }]
        );
    }

    #[test]
    fn malformed_escape_reports_stream_offset() {
        let bytes = [0x10, 0x05, 0xF0, 0xF2, 0x41, 0xFF, 0x42, 0xFF, 0xFF];
        let (decoded, diagnostics) = decode_all(&bytes);

        let message = String::from_utf8_lossy(&[0x41, 0xFF, 0x42]).into_owned();
        assert_eq!(
            decoded[1].as_ref().unwrap(),
            &FrameEvent::Metadata(MetadataRecord::Info { message })
        );
        assert_eq!(
            diagnostics,
            vec![Diagnostic::MalformedEscape { type_byte: 0xF2, offset: 5, following: 0x42 }]
        );
    }

    #[test]
    fn synchronizing_skips_to_first_marker() {
        let bytes = WireBuilder::new().raw(b"ok\r\n\x12").info("go").word(0x1005).build();
        let mut decoder = FrameDecoder::with_diagnostics(
            ReaderSource::new(&bytes[..]),
            DecoderOptions::default().with_sync_on_metadata(true),
            Vec::<Diagnostic>::new(),
        );
        assert_eq!(decoder.state(), ScanState::Synchronizing);

        let decoded: Vec<_> = decoder.by_ref().map(|event| event.unwrap()).collect();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], FrameEvent::Metadata(MetadataRecord::Info { message: "go".into() }));
        assert_eq!(decoder.diagnostics(), &vec![Diagnostic::SkippedBytes { count: 5 }]);
    }

    #[test]
    fn synchronizing_without_marker_ends() {
        let mut decoder = FrameDecoder::with_diagnostics(
            ReaderSource::new(&[0x01u8, 0x02, 0x03][..]),
            DecoderOptions::default().with_sync_on_metadata(true),
            Vec::<Diagnostic>::new(),
        );
        assert!(decoder.next().is_none());
        assert_eq!(decoder.diagnostics(), &vec![Diagnostic::SkippedBytes { count: 3 }]);
    }

    #[test]
    fn skipped_bytes_reported_when_sync_times_out() {
        let timeout = PowerMonError::Timeout { duration: Duration::from_secs(1) };
        let mut decoder = FrameDecoder::with_diagnostics(
            FailingSource::new(vec![0x01, 0x02, 0x03, 0x04], timeout),
            DecoderOptions::default().with_sync_on_metadata(true),
            Vec::<Diagnostic>::new(),
        );

        assert!(matches!(decoder.next(), Some(Err(PowerMonError::Timeout { .. }))));
        assert_eq!(decoder.bytes_consumed(), 4);
        assert_eq!(decoder.diagnostics(), &vec![Diagnostic::SkippedBytes { count: 4 }]);
        assert!(decoder.next().is_none());
    }

    #[test]
    fn transport_errors_end_the_stream() {
        let failure = PowerMonError::transport(
            "reading telemetry",
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "cable pulled"),
        );
        let mut decoder = FrameDecoder::new(FailingSource::new(vec![0x10, 0x05, 0xF0], failure));

        assert_eq!(decoder.next().unwrap().unwrap().as_sample(), Some(Sample::from_word(0x1005)));
        match decoder.next() {
            Some(Err(err @ PowerMonError::Transport { .. })) => {
                assert!(err.is_stream_error());
                assert!(!err.is_retryable());
            }
            other => panic!("Expected Transport error, got {:?}", other),
        }
        assert!(decoder.next().is_none());
        assert!(decoder.is_done());
    }

    #[test]
    fn payload_limit_applies() {
        let long = "x".repeat(64);
        let bytes = WireBuilder::new().info(&long).build();
        let mut decoder = FrameDecoder::with_diagnostics(
            ReaderSource::new(&bytes[..]),
            DecoderOptions::default().with_max_payload_len(8),
            Vec::<Diagnostic>::new(),
        );

        let event = decoder.next().unwrap().unwrap();
        assert_eq!(event, FrameEvent::Metadata(MetadataRecord::Info { message: "x".repeat(8) }));
        assert_eq!(
            decoder.diagnostics(),
            &vec![Diagnostic::PayloadTruncated { type_byte: 0xF2, limit: 8, actual: 64 }]
        );
    }

    #[test]
    fn into_source_resumes_after_acq_end() {
        let bytes = WireBuilder::new().acq_end().raw(b"ok\n").build();
        let mut decoder = FrameDecoder::new(ReaderSource::new(std::io::Cursor::new(bytes)));
        assert!(decoder.next().unwrap().unwrap().is_acquisition_end());

        let cursor = decoder.into_source().into_inner();
        assert_eq!(&cursor.get_ref()[cursor.position() as usize..], b"ok\n");
    }

    proptest! {
        #[test]
        fn prop_arbitrary_bytes_never_panic(
            bytes in proptest::collection::vec(any::<u8>(), 0..512)
        ) {
            let mut decoder = FrameDecoder::with_diagnostics(
                ReaderSource::new(&bytes[..]),
                DecoderOptions::default(),
                Vec::<Diagnostic>::new(),
            );
            let mut errors = 0;
            for event in decoder.by_ref() {
                if event.is_err() {
                    errors += 1;
                }
            }
            prop_assert!(errors <= 1);
            prop_assert!(decoder.bytes_consumed() <= bytes.len() as u64);
            prop_assert!(decoder.next().is_none());
        }

        #[test]
        fn prop_non_marker_pairs_are_samples(
            high in any::<u8>().prop_filter("not a marker", |b| *b != 0xF0),
            low in any::<u8>()
        ) {
            let decoded = events(&[high, low]);
            prop_assert_eq!(decoded, vec![FrameEvent::Sample(Sample::from_wire([high, low]))]);
        }

        #[test]
        fn prop_sample_streams_roundtrip(words in proptest::collection::vec(0u16..0xF000, 0..64)) {
            let mut builder = WireBuilder::new();
            for word in &words {
                builder = builder.word(*word);
            }
            let decoded: Vec<u16> = events(&builder.build())
                .into_iter()
                .filter_map(|event| event.as_sample().map(|s| s.to_word()))
                .collect();
            prop_assert_eq!(decoded, words);
        }
    }
}
