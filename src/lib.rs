//! Host-side driver for the STM32 Nucleo power shield.
//!
//! The power shield (USB product id `0x5740`) is configured over a
//! line-oriented ASCII command channel and then streams binary telemetry on
//! the same serial link. This crate sends the commands and decodes the
//! telemetry into [`FrameEvent`]s: power [`Sample`]s interleaved with
//! [`MetadataRecord`]s.
//!
//! # Features
//!
//! - **Stream decoding**: a lazy, allocation-light [`FrameDecoder`] over any
//!   [`ByteSource`], usable on live ports and captured files alike
//! - **Sample codec**: mantissa/exponent decoding and encoding ([`Sample`])
//! - **Device control**: discovery, configuration and the session lifecycle
//!   ([`PowerMon`])
//! - **Async consumption**: decoding on a blocking thread exposed as a
//!   `Stream` ([`Acquisition`])
//!
//! # Quick Start
//!
//! ## Decoding a capture
//!
//! ```rust,no_run
//! use powermon::{FrameDecoder, ReaderSource};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! fn main() -> powermon::Result<()> {
//!     let file = File::open("capture.bin")?;
//!     for event in FrameDecoder::new(ReaderSource::new(BufReader::new(file))) {
//!         match event? {
//!             powermon::FrameEvent::Sample(sample) => println!("{}", sample.value()),
//!             powermon::FrameEvent::Metadata(record) => println!("# {}", record),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Live acquisition
//!
//! ```rust,no_run
//! use powermon::{PowerMon, SessionConfig};
//!
//! fn main() -> powermon::Result<()> {
//!     let config = SessionConfig::from_yaml_file("powermon.yaml")?;
//!     let acquisition = config.acquisition.clone();
//!     let mut monitor = PowerMon::connect(config)?;
//!
//!     let samples = monitor
//!         .start(&acquisition)?
//!         .filter_map(|event| event.map(|e| e.as_sample()).transpose())
//!         .collect::<powermon::Result<Vec<_>>>()?;
//!     println!("{} samples", samples.len());
//!
//!     monitor.close()?;
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Telemetry decoding
pub mod decoder;
pub mod source;

// Device control
pub mod command;
pub mod config;
pub mod device;
pub mod session;

// Async consumption
pub mod acquisition;
pub mod driver;

// Core exports
pub use error::*;
pub use types::*;

pub use decoder::{
    DecoderOptions, DecoderStats, Diagnostic, DiagnosticSink, FrameDecoder, ScanState,
    TracingDiagnostics,
};
pub use source::{ByteSource, ReaderSource};

// Main API exports
pub use acquisition::Acquisition;
pub use command::{Command, CommandChannel, DataFormat};
pub use config::{AcquisitionConfig, SerialConfig, SessionConfig};
pub use session::PowerMon;
