//! Byte source trait for telemetry transports

use std::io::{ErrorKind, Read};
use std::time::Duration;

use crate::{PowerMonError, Result};

/// Trait for raw telemetry byte sources
///
/// Sources abstract over the transport (serial port, captured file, test
/// buffer). The decoder owns or exclusively borrows its source and pulls
/// exactly the bytes the current frame needs.
///
/// `read` returns:
/// - `Ok(n)` with `n > 0` - `n` bytes were written to the front of `buf`
/// - `Ok(0)` - End of stream (normal termination)
/// - `Err(PowerMonError::Timeout { .. })` - Nothing arrived within the source's bound
/// - `Err(e)` - Transport fault
///
/// The decoder never calls `read` with an empty buffer.
pub trait ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }
}

/// Byte source over any [`std::io::Read`]
///
/// Maps I/O errors onto the source contract: `TimedOut` and `WouldBlock`
/// become [`PowerMonError::Timeout`], `UnexpectedEof` becomes end of stream,
/// `Interrupted` is retried, anything else is a transport error.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    timeout: Duration,
}

impl<R: Read> ReaderSource<R> {
    /// Wrap a reader that never times out (files, in-memory buffers).
    pub fn new(reader: R) -> Self {
        Self { reader, timeout: Duration::ZERO }
    }

    /// Wrap a reader whose reads are bounded by `timeout` (serial ports).
    ///
    /// The duration is only used to describe timeouts; the reader itself
    /// enforces the bound.
    pub fn with_timeout(reader: R, timeout: Duration) -> Self {
        Self { reader, timeout }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.reader.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Err(PowerMonError::Timeout { duration: self.timeout });
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(0),
                Err(e) => return Err(PowerMonError::transport("reading telemetry", e)),
            }
        }
    }
}

/// Single-byte cursor the decoder reads through, tracking the stream offset.
#[derive(Debug)]
pub(crate) struct ByteCursor<S> {
    source: S,
    offset: u64,
}

impl<S: ByteSource> ByteCursor<S> {
    pub(crate) fn new(source: S) -> Self {
        Self { source, offset: 0 }
    }

    /// Next byte, or `None` at end of stream.
    pub(crate) fn next_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.source.read(&mut byte)? {
            0 => Ok(None),
            _ => {
                self.offset += 1;
                Ok(Some(byte[0]))
            }
        }
    }

    /// Number of bytes consumed so far.
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn into_inner(self) -> S {
        self.source
    }
}
