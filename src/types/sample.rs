//! Mantissa/exponent sample codec
//!
//! Each sample travels as one big-endian 16-bit word: the high nibble is a
//! power-of-16 scale, the low 12 bits a magnitude. The physical value is
//! `mantissa * 16^(-exponent)`.

use serde::Serialize;

use super::FRAME_MARKER;
use crate::{PowerMonError, Result};

/// Largest exponent a sample can carry (4 bits).
pub const MAX_EXPONENT: u8 = 0x0F;

/// Largest mantissa a sample can carry (12 bits).
pub const MAX_MANTISSA: u16 = 0x0FFF;

/// Size of a sample on the wire.
pub const SAMPLE_SIZE: usize = 2;

/// One power reading as sent by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Sample {
    exponent: u8,
    mantissa: u16,
}

impl Sample {
    /// Create a sample from its fields, checking both ranges.
    pub fn new(exponent: u8, mantissa: u16) -> Result<Self> {
        if exponent > MAX_EXPONENT {
            return Err(PowerMonError::invalid_sample(format!(
                "exponent {} exceeds {}",
                exponent, MAX_EXPONENT
            )));
        }
        if mantissa > MAX_MANTISSA {
            return Err(PowerMonError::invalid_sample(format!(
                "mantissa {} exceeds {}",
                mantissa, MAX_MANTISSA
            )));
        }
        Ok(Self { exponent, mantissa })
    }

    /// Decode a 16-bit wire word. Every word is a valid sample.
    pub const fn from_word(word: u16) -> Self {
        Self { exponent: ((word >> 12) & 0x0F) as u8, mantissa: word & MAX_MANTISSA }
    }

    /// Decode the two wire bytes (big-endian).
    pub const fn from_wire(bytes: [u8; SAMPLE_SIZE]) -> Self {
        Self::from_word(u16::from_be_bytes(bytes))
    }

    /// Pack into a 16-bit wire word.
    pub const fn to_word(self) -> u16 {
        ((self.exponent as u16) << 12) | self.mantissa
    }

    /// Pack into the two wire bytes (big-endian).
    pub const fn to_wire(self) -> [u8; SAMPLE_SIZE] {
        self.to_word().to_be_bytes()
    }

    pub const fn exponent(self) -> u8 {
        self.exponent
    }

    pub const fn mantissa(self) -> u16 {
        self.mantissa
    }

    /// Physical value, `mantissa * 16^(-exponent)`.
    pub fn value(self) -> f64 {
        self.mantissa as f64 * self.resolution()
    }

    /// Value of one mantissa step at this sample's scale.
    pub fn resolution(self) -> f64 {
        16f64.powi(-(self.exponent as i32))
    }

    /// Whether the packed high byte equals the frame marker.
    ///
    /// Such a sample cannot be told apart from a metadata frame at a frame
    /// boundary; the scanner always reads it as a marker.
    pub const fn collides_with_marker(self) -> bool {
        self.to_wire()[0] == FRAME_MARKER
    }

    /// Encode a physical value using the finest scale whose rounded mantissa
    /// still fits in 12 bits.
    ///
    /// Zero encodes as exponent 0. A result whose high byte would equal the
    /// frame marker is re-encoded one scale coarser. Negative, non-finite and
    /// values that round above 4095 are rejected.
    pub fn encode(value: f64) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(PowerMonError::invalid_sample(format!(
                "{} is not a finite non-negative value",
                value
            )));
        }
        if value == 0.0 {
            return Ok(Self { exponent: 0, mantissa: 0 });
        }

        for exponent in (0..=MAX_EXPONENT).rev() {
            let scaled = (value * 16f64.powi(exponent as i32)).round();
            if scaled > MAX_MANTISSA as f64 {
                continue;
            }

            let sample = Self { exponent, mantissa: scaled as u16 };
            if sample.collides_with_marker() {
                let coarser = exponent - 1;
                let mantissa = (value * 16f64.powi(coarser as i32)).round() as u16;
                return Ok(Self { exponent: coarser, mantissa });
            }
            return Ok(sample);
        }

        Err(PowerMonError::invalid_sample(format!(
            "{} exceeds the largest encodable value {}",
            value, MAX_MANTISSA
        )))
    }
}

impl From<u16> for Sample {
    fn from(word: u16) -> Self {
        Self::from_word(word)
    }
}

impl From<Sample> for u16 {
    fn from(sample: Sample) -> Self {
        sample.to_word()
    }
}
