//! Test utilities for building telemetry streams and scripting device exchanges
//!
//! This module provides helpers that are shared by unit tests and benchmarks:
//! a [`WireBuilder`] for composing raw telemetry byte streams, a
//! [`CountingSource`] that records how often the decoder reads, and a
//! [`MockTransport`] that stands in for the serial port.

#![cfg(any(test, feature = "benchmark"))]

use std::io::{self, Cursor, Read, Write};

use crate::source::{ByteSource, ReaderSource};
use crate::types::{ESCAPE_BYTE, FRAME_MARKER, MetadataKind, Sample};
use crate::{PowerMonError, Result};

/// Install a test subscriber once; later calls are no-ops.
#[cfg(test)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Builder for raw telemetry byte streams
///
/// ```rust,ignore
/// let bytes = WireBuilder::new().info("ready").word(0x1005).acq_end().build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct WireBuilder {
    bytes: Vec<u8>,
}

impl WireBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample frame.
    pub fn sample(mut self, sample: Sample) -> Self {
        self.bytes.extend(sample.to_wire());
        self
    }

    /// Append a sample frame from its packed word.
    pub fn word(self, word: u16) -> Self {
        self.sample(Sample::from_word(word))
    }

    /// Append `count` sample frames cycling through exponents 0..=14.
    pub fn samples(mut self, count: usize) -> Self {
        for i in 0..count {
            let exponent = (i % 15) as u16;
            let mantissa = (i as u16).wrapping_mul(37) & 0x0FFF;
            self = self.word((exponent << 12) | mantissa);
        }
        self
    }

    /// Append a metadata frame with a terminated payload.
    ///
    /// The payload is written verbatim; it is up to the caller to avoid
    /// `0xFF 0xFF` inside it.
    pub fn metadata(mut self, type_byte: u8, payload: &[u8]) -> Self {
        self.bytes.push(FRAME_MARKER);
        self.bytes.push(type_byte);
        self.bytes.extend_from_slice(payload);
        self.bytes.extend([ESCAPE_BYTE, ESCAPE_BYTE]);
        self
    }

    pub fn info(self, message: &str) -> Self {
        self.metadata(MetadataKind::Info.type_byte(), message.as_bytes())
    }

    pub fn error(self, message: &str) -> Self {
        self.metadata(MetadataKind::Error.type_byte(), message.as_bytes())
    }

    pub fn timestamp(self, seconds: u32, load_percent: u8) -> Self {
        let mut payload = seconds.to_be_bytes().to_vec();
        payload.push(load_percent);
        self.metadata(MetadataKind::Timestamp.type_byte(), &payload)
    }

    pub fn acq_end(self) -> Self {
        self.metadata(MetadataKind::AcqEnd.type_byte(), &[])
    }

    /// Append bytes as-is.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    /// Finish into an in-memory byte source.
    pub fn source(self) -> ReaderSource<Cursor<Vec<u8>>> {
        ReaderSource::new(Cursor::new(self.bytes))
    }
}

/// Byte source over a buffer that counts every `read` call
#[derive(Debug)]
pub struct CountingSource {
    inner: ReaderSource<Cursor<Vec<u8>>>,
    reads: usize,
}

impl CountingSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { inner: ReaderSource::new(Cursor::new(bytes)), reads: 0 }
    }

    /// Number of `read` calls so far, including ones that hit end of stream.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Bytes not yet handed out.
    pub fn remaining(&self) -> usize {
        let cursor = self.inner.get_ref();
        cursor.get_ref().len().saturating_sub(cursor.position() as usize)
    }
}

impl ByteSource for CountingSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reads += 1;
        self.inner.read(buf)
    }
}

/// Byte source that hands out its bytes one per read, then fails once
///
/// After the failure it reports end of stream.
#[derive(Debug)]
pub struct FailingSource {
    bytes: std::vec::IntoIter<u8>,
    failure: Option<PowerMonError>,
}

impl FailingSource {
    pub fn new(bytes: Vec<u8>, failure: PowerMonError) -> Self {
        Self { bytes: bytes.into_iter(), failure: Some(failure) }
    }
}

impl ByteSource for FailingSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(byte) = self.bytes.next() {
            buf[0] = byte;
            return Ok(1);
        }
        match self.failure.take() {
            Some(failure) => Err(failure),
            None => Ok(0),
        }
    }
}

/// In-memory duplex transport standing in for the serial port
///
/// Reads come from a scripted input buffer; writes are captured. Once the
/// input is exhausted, reads either report end of stream or, with
/// [`MockTransport::timing_out`], fail with `TimedOut` like an idle serial
/// port.
#[derive(Debug, Default)]
pub struct MockTransport {
    input: Cursor<Vec<u8>>,
    written: Vec<u8>,
    time_out_when_empty: bool,
}

impl MockTransport {
    pub fn new(input: impl Into<Vec<u8>>) -> Self {
        Self { input: Cursor::new(input.into()), ..Self::default() }
    }

    /// A transport that times out instead of ending once its input is used up.
    pub fn timing_out(input: impl Into<Vec<u8>>) -> Self {
        Self { time_out_when_empty: true, ..Self::new(input) }
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Written bytes split into lines, without terminators.
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written).lines().map(str::to_owned).collect()
    }

    /// Bytes of scripted input not yet read.
    pub fn unread(&self) -> &[u8] {
        let position = (self.input.position() as usize).min(self.input.get_ref().len());
        &self.input.get_ref()[position..]
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.input.read(buf)?;
        if n == 0 && self.time_out_when_empty && !buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data from device"));
        }
        Ok(n)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
