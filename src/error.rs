//! Error types for power monitor sessions and telemetry decoding.
//!
//! Every fallible operation in the crate returns [`PowerMonError`]. Errors are
//! terminal for the operation that raised them: a decoder that yields an error
//! is finished, and a failed command leaves the session in an unknown state.
//!
//! Recoverable decoding conditions (malformed escapes, unexpected payload
//! lengths, suspected marker collisions) are *not* errors. They are reported
//! through a [`DiagnosticSink`](crate::decoder::DiagnosticSink) and decoding
//! continues.
//!
//! ## Error Categories
//!
//! - **Discovery Errors**: no device with the expected USB product id, or the
//!   port could not be enumerated or opened
//! - **Transport Errors**: read timeouts, closed or faulted connections
//! - **Protocol Errors**: missing acknowledgements, unterminated metadata
//!   frames, truncated samples
//! - **Configuration Errors**: invalid acquisition parameters or unreadable
//!   configuration files
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use powermon::PowerMonError;
//!
//! let error = PowerMonError::DeviceNotFound { product_id: 0x5740 };
//! if !error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for power monitor operations.
pub type Result<T, E = PowerMonError> = std::result::Result<T, E>;

/// Main error type for power monitor operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PowerMonError {
    #[error("No power monitor found (USB product id {product_id:#06x})")]
    DeviceNotFound { product_id: u16 },

    #[error("Serial port enumeration failed")]
    PortEnumeration {
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to open serial port {port}")]
    PortOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Read timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("No acknowledgement for `{command}` within {duration:?}")]
    AckTimeout { command: String, duration: Duration },

    #[error("Transport closed by the device")]
    TransportClosed,

    #[error("Transport error: {context}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream ended inside a metadata frame after {received} payload bytes")]
    UnterminatedMetadata { type_byte: Option<u8>, received: usize },

    #[error("Stream ended after the first byte ({high_byte:#04x}) of a sample")]
    TruncatedSample { high_byte: u8 },

    #[error("Invalid sample: {details}")]
    InvalidSample { details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },
}

impl PowerMonError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Retrying always means starting a new session or decoder; nothing in the
    /// crate retries internally.
    pub fn is_retryable(&self) -> bool {
        match self {
            PowerMonError::DeviceNotFound { .. } => true,
            PowerMonError::PortEnumeration { .. } => true,
            PowerMonError::PortOpen { .. } => true,
            PowerMonError::Timeout { .. } => true,
            PowerMonError::AckTimeout { .. } => true,
            PowerMonError::TransportClosed => false,
            PowerMonError::Transport { .. } => false,
            PowerMonError::UnterminatedMetadata { .. } => false,
            PowerMonError::TruncatedSample { .. } => false,
            PowerMonError::InvalidSample { .. } => false,
            PowerMonError::Config { .. } => false,
            PowerMonError::ConfigFile { .. } => false,
            PowerMonError::Parse { .. } => false,
        }
    }

    /// Returns whether the error ended a telemetry stream (as opposed to a
    /// setup or configuration failure).
    pub fn is_stream_error(&self) -> bool {
        matches!(
            self,
            PowerMonError::Timeout { .. }
                | PowerMonError::TransportClosed
                | PowerMonError::Transport { .. }
                | PowerMonError::UnterminatedMetadata { .. }
                | PowerMonError::TruncatedSample { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PowerMonError::DeviceNotFound { .. } => vec![
                "Check the power shield is plugged in and powered",
                "Check the USB cable carries data",
                "Set the serial port explicitly in the session configuration",
            ],
            PowerMonError::PortEnumeration { .. } | PowerMonError::PortOpen { .. } => vec![
                "Check permissions on the serial device (dialout group on Linux)",
                "Close other programs holding the port",
                "Unplug and reconnect the device",
            ],
            PowerMonError::Timeout { .. } => vec![
                "Increase the read timeout",
                "Check an acquisition was started",
                "Lower the sampling frequency",
            ],
            PowerMonError::AckTimeout { .. } => vec![
                "Increase the acknowledgement timeout",
                "Reset the board with psrst and reconnect",
                "Check the firmware accepts the command",
            ],
            PowerMonError::TransportClosed | PowerMonError::Transport { .. } => vec![
                "Check the USB connection",
                "Reopen the session",
            ],
            PowerMonError::UnterminatedMetadata { .. } | PowerMonError::TruncatedSample { .. } => {
                vec![
                    "Check the capture was not cut short",
                    "Verify the device is in bin_hexa format",
                    "Start a new acquisition",
                ]
            }
            PowerMonError::InvalidSample { .. } => vec![
                "Keep the exponent within 0..=15 and the mantissa within 0..=4095",
                "Only encode finite, non-negative values up to 4095",
            ],
            PowerMonError::Config { .. } => vec![
                "Check voltage is within 1800..=3300 mV",
                "Check frequency is within 1..=100000 Hz",
            ],
            PowerMonError::ConfigFile { .. } => vec![
                "Check the file exists and is readable",
                "Check file permissions",
            ],
            PowerMonError::Parse { .. } => vec![
                "Check the configuration syntax",
                "Compare against the documented field names",
            ],
        }
    }

    /// Helper constructor for transport errors with context.
    pub fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        PowerMonError::Transport { context: context.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        PowerMonError::Config { reason: reason.into() }
    }

    /// Helper constructor for sample field errors.
    pub fn invalid_sample(details: impl Into<String>) -> Self {
        PowerMonError::InvalidSample { details: details.into() }
    }
}

impl From<std::io::Error> for PowerMonError {
    fn from(err: std::io::Error) -> Self {
        PowerMonError::Transport { context: "I/O".to_string(), source: err }
    }
}
