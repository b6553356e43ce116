//! Core types for power monitor telemetry.
//!
//! The device interleaves two kinds of frames on one byte stream:
//! - **Sample frames**: two bytes, a 4-bit power-of-16 exponent and a 12-bit
//!   mantissa ([`Sample`])
//! - **Metadata frames**: the marker byte [`FRAME_MARKER`], one type byte, a
//!   payload, and the terminator `0xFF 0xFF` ([`MetadataRecord`])
//!
//! Both decode into a [`FrameEvent`].
//!
//! ## Usage Example
//!
//! ```rust
//! use powermon::types::{FrameEvent, Sample};
//!
//! let sample = Sample::from_wire([0x10, 0x05]);
//! assert_eq!(sample.exponent(), 1);
//! assert_eq!(sample.mantissa(), 5);
//! assert_eq!(sample.value(), 0.3125);
//!
//! let event = FrameEvent::from(sample);
//! assert!(!event.is_acquisition_end());
//! ```

mod event;
mod metadata;
mod sample;

pub use event::FrameEvent;
pub use metadata::{MetadataKind, MetadataRecord, TIMESTAMP_PAYLOAD_LEN};
pub use sample::{MAX_EXPONENT, MAX_MANTISSA, SAMPLE_SIZE, Sample};

/// Byte that opens a metadata frame when read at a frame boundary.
pub const FRAME_MARKER: u8 = 0xF0;

/// Escape byte; two in a row terminate a metadata payload.
pub const ESCAPE_BYTE: u8 = 0xFF;
