//! Power monitor session
//!
//! [`PowerMon`] owns the command channel to one power shield. A session is
//! opened with `htc` and closed with `hrc`; in between, acquisitions are
//! configured and started, and the telemetry that follows `start` is decoded
//! straight off the same transport.
//!
//! ```rust,no_run
//! use powermon::{PowerMon, SessionConfig};
//!
//! # fn main() -> powermon::Result<()> {
//! let config = SessionConfig::default();
//! let acquisition = config.acquisition.clone().with_duration_s(5);
//! let mut monitor = PowerMon::connect(config)?;
//!
//! for event in monitor.start(&acquisition)? {
//!     if let Some(sample) = event?.as_sample() {
//!         println!("{}", sample.value());
//!     }
//! }
//! monitor.close()?;
//! # Ok(())
//! # }
//! ```

use serialport::SerialPort;
use std::io::{Read, Write};
use tracing::{debug, info};

use crate::Result;
use crate::command::{Command, CommandChannel};
use crate::config::{AcquisitionConfig, SessionConfig};
use crate::decoder::FrameDecoder;
use crate::device;
use crate::source::ReaderSource;

/// An open session with a power shield.
#[derive(Debug)]
pub struct PowerMon<T = Box<dyn SerialPort>> {
    channel: CommandChannel<T>,
    config: SessionConfig,
}

impl PowerMon {
    /// Open the serial port described by `config` and take control of the
    /// board.
    pub fn connect(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let port = device::open_port(&config.serial)?;
        Self::from_transport(port, config)
    }
}

impl<T: Read + Write> PowerMon<T> {
    /// Take control of a board over an already-open transport.
    pub fn from_transport(transport: T, config: SessionConfig) -> Result<Self> {
        let mut channel = CommandChannel::new(transport, config.serial.ack_timeout);
        debug!("Opening connection");
        channel.execute(&Command::HostTakeControl)?;
        info!("Power monitor session open");
        Ok(Self { channel, config })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Send the acquisition parameters, each acknowledged by the board.
    pub fn configure(&mut self, acquisition: &AcquisitionConfig) -> Result<()> {
        acquisition.validate()?;
        for command in acquisition.commands() {
            self.channel.execute(&command)?;
        }
        Ok(())
    }

    /// Configure and start an acquisition without decoding it.
    ///
    /// Telemetry follows immediately on the transport; hand it to a decoder
    /// via [`PowerMon::into_transport`] or [`PowerMon::into_decoder`].
    pub fn begin(&mut self, acquisition: &AcquisitionConfig) -> Result<()> {
        self.configure(acquisition)?;
        info!(
            "Starting capture: {} mV, {} Hz, {} s",
            acquisition.voltage_mv, acquisition.frequency_hz, acquisition.duration_s
        );
        self.channel.execute(&Command::Start)?;
        Ok(())
    }

    /// Configure and start an acquisition, decoding it from the borrowed
    /// transport.
    ///
    /// The session is usable again once the decoder is dropped.
    pub fn start(
        &mut self,
        acquisition: &AcquisitionConfig,
    ) -> Result<FrameDecoder<ReaderSource<&mut T>>> {
        self.begin(acquisition)?;
        let read_timeout = self.config.serial.read_timeout;
        let source = ReaderSource::with_timeout(self.channel.transport_mut(), read_timeout);
        Ok(FrameDecoder::with_options(source, acquisition.decoder_options()))
    }

    /// Start an acquisition and give the transport to the decoder.
    pub fn into_decoder(
        mut self,
        acquisition: &AcquisitionConfig,
    ) -> Result<FrameDecoder<ReaderSource<T>>> {
        self.begin(acquisition)?;
        let read_timeout = self.config.serial.read_timeout;
        let source = ReaderSource::with_timeout(self.channel.into_inner(), read_timeout);
        Ok(FrameDecoder::with_options(source, acquisition.decoder_options()))
    }

    /// Ask the board to stop sampling.
    ///
    /// No acknowledgement is awaited: telemetry already in flight would be
    /// read as one. Drain the decoder before sending further commands.
    pub fn stop(&mut self) -> Result<()> {
        info!("Stopping capture");
        self.channel.send(&Command::Stop)
    }

    /// Write `text` on one line of the board's display.
    pub fn lcd(&mut self, line: u8, text: impl Into<String>) -> Result<Vec<String>> {
        self.channel.execute(&Command::Lcd { line, text: text.into() })
    }

    /// Hardware reset. Blocks for the configured settle delay.
    pub fn reset(&mut self) -> Result<()> {
        info!("Resetting board, please wait");
        self.channel.send(&Command::Reset)?;
        std::thread::sleep(self.config.serial.reset_settle);
        Ok(())
    }

    /// Run any command and collect its acknowledgement.
    pub fn execute(&mut self, command: &Command) -> Result<Vec<String>> {
        self.channel.execute(command)
    }

    /// Release control of the board and return the transport.
    pub fn close(mut self) -> Result<T> {
        self.channel.execute(&Command::HostReleaseControl)?;
        debug!("Power monitor session closed");
        Ok(self.channel.into_inner())
    }

    /// Give up the transport without closing the session.
    pub fn into_transport(self) -> T {
        self.channel.into_inner()
    }
}
