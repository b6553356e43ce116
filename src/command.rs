//! Line-oriented ASCII command protocol
//!
//! The host drives the power shield with newline-terminated text commands.
//! The device answers each one with at least one non-empty acknowledgement
//! line. Blank lines are padding and never count as an acknowledgement.
//!
//! Acknowledgements are read one byte at a time so that nothing past the
//! final line is consumed: after `start` the same transport carries binary
//! telemetry, which belongs to the decoder.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::{PowerMonError, Result};

/// Telemetry encoding selected with `format`.
///
/// Only the binary mantissa/exponent encoding is decodable by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataFormat {
    #[default]
    BinHexa,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::BinHexa => f.write_str("bin_hexa"),
        }
    }
}

/// A command understood by the power shield firmware.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// `htc`: open a host-controlled session.
    HostTakeControl,
    /// `hrc`: hand control back to the board.
    HostReleaseControl,
    Format(DataFormat),
    /// `freq <hz>`
    Frequency(u32),
    /// `volt <mv>m`
    Voltage(u32),
    /// `acqtime <seconds>`, where 0 runs until stopped.
    AcquisitionTime(u32),
    Start,
    Stop,
    /// `psrst`: hardware reset. The board needs several seconds to settle.
    Reset,
    /// `lcd <line> "<text>"`
    Lcd { line: u8, text: String },
}

impl Command {
    /// The wire form, terminated by `\n`.
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }

    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::HostTakeControl => "htc",
            Command::HostReleaseControl => "hrc",
            Command::Format(_) => "format",
            Command::Frequency(_) => "freq",
            Command::Voltage(_) => "volt",
            Command::AcquisitionTime(_) => "acqtime",
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Reset => "psrst",
            Command::Lcd { .. } => "lcd",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Format(format) => write!(f, "format {}", format),
            Command::Frequency(hz) => write!(f, "freq {}", hz),
            Command::Voltage(mv) => write!(f, "volt {}m", mv),
            Command::AcquisitionTime(seconds) => write!(f, "acqtime {}", seconds),
            Command::Lcd { line, text } => write!(f, "lcd {} \"{}\"", line, text),
            other => f.write_str(other.name()),
        }
    }
}

/// Command sender over a duplex transport
#[derive(Debug)]
pub struct CommandChannel<T> {
    transport: T,
    ack_timeout: Duration,
}

impl<T: Read + Write> CommandChannel<T> {
    /// `ack_timeout` bounds the wait for each batch of acknowledgement lines.
    pub fn new(transport: T, ack_timeout: Duration) -> Self {
        Self { transport, ack_timeout }
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    /// Write one command line and flush it.
    pub fn send(&mut self, command: &Command) -> Result<()> {
        debug!("$ {}", command);
        let context = format!("sending `{}`", command);
        self.transport
            .write_all(command.to_line().as_bytes())
            .map_err(|e| PowerMonError::transport(context.clone(), e))?;
        self.transport.flush().map_err(|e| PowerMonError::transport(context, e))
    }

    /// Collect `lines` non-empty acknowledgement lines for `command`.
    ///
    /// Lines are returned without their terminator or surrounding whitespace.
    /// Fails with [`PowerMonError::AckTimeout`] if they do not all arrive
    /// within the ack timeout, or [`PowerMonError::TransportClosed`] if the
    /// transport ends first.
    pub fn wait_for_ack(&mut self, command: &Command, lines: usize) -> Result<Vec<String>> {
        let deadline = Instant::now() + self.ack_timeout;
        let mut acks = Vec::with_capacity(lines);

        while acks.len() < lines {
            let line = self.read_line(command, deadline)?;
            if line.is_empty() {
                debug!("Empty line");
                continue;
            }
            debug!("Line: {}", line);
            acks.push(line);
        }

        Ok(acks)
    }

    /// Send a command and wait for its acknowledgement.
    pub fn execute(&mut self, command: &Command) -> Result<Vec<String>> {
        self.send(command)?;
        self.wait_for_ack(command, 1)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn read_line(&mut self, command: &Command, deadline: Instant) -> Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match self.transport.read(&mut byte) {
                Ok(0) => return Err(PowerMonError::TransportClosed),
                Ok(_) if byte[0] == b'\n' => {
                    return Ok(String::from_utf8_lossy(&line).trim().to_string());
                }
                Ok(_) => line.push(byte[0]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(e) => return Err(PowerMonError::transport("reading acknowledgement", e)),
            }

            if Instant::now() >= deadline {
                return Err(PowerMonError::AckTimeout {
                    command: command.to_string(),
                    duration: self.ack_timeout,
                });
            }
        }
    }
}
