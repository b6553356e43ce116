//! Metadata record types

use serde::Serialize;
use std::fmt;

/// Registered metadata types, keyed by their wire type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum MetadataKind {
    Error = 0xF1,
    Info = 0xF2,
    Timestamp = 0xF3,
    AcqEnd = 0xF4,
    Overcurrent = 0xF5,
    Powerdown = 0xF6,
    VoltageGet = 0xF7,
    Temperature = 0xF8,
    PowerGet = 0xF9,
}

impl MetadataKind {
    /// Every registered kind, in type byte order.
    pub const ALL: [MetadataKind; 9] = [
        MetadataKind::Error,
        MetadataKind::Info,
        MetadataKind::Timestamp,
        MetadataKind::AcqEnd,
        MetadataKind::Overcurrent,
        MetadataKind::Powerdown,
        MetadataKind::VoltageGet,
        MetadataKind::Temperature,
        MetadataKind::PowerGet,
    ];

    /// Look up the kind for a wire type byte.
    pub const fn from_type_byte(type_byte: u8) -> Option<Self> {
        match type_byte {
            0xF1 => Some(MetadataKind::Error),
            0xF2 => Some(MetadataKind::Info),
            0xF3 => Some(MetadataKind::Timestamp),
            0xF4 => Some(MetadataKind::AcqEnd),
            0xF5 => Some(MetadataKind::Overcurrent),
            0xF6 => Some(MetadataKind::Powerdown),
            0xF7 => Some(MetadataKind::VoltageGet),
            0xF8 => Some(MetadataKind::Temperature),
            0xF9 => Some(MetadataKind::PowerGet),
            _ => None,
        }
    }

    pub const fn type_byte(self) -> u8 {
        self as u8
    }

    /// Payload length this kind must carry, when its shape is known.
    pub const fn expected_payload_len(self) -> Option<usize> {
        match self {
            MetadataKind::Timestamp => Some(TIMESTAMP_PAYLOAD_LEN),
            MetadataKind::AcqEnd | MetadataKind::Overcurrent => Some(0),
            _ => None,
        }
    }
}

/// Payload length of a timestamp record: 4 bytes of seconds and 1 byte of load.
pub const TIMESTAMP_PAYLOAD_LEN: usize = 5;

/// A decoded metadata frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataRecord {
    /// Error text reported by the device firmware.
    Error { message: String },
    Info { message: String },
    /// Seconds since acquisition start and the device's processing load.
    Timestamp { seconds: u32, load_percent: u8 },
    /// The acquisition finished; no more frames follow.
    AcqEnd,
    Overcurrent,
    Powerdown { payload: Vec<u8> },
    VoltageGet { payload: Vec<u8> },
    Temperature { payload: Vec<u8> },
    PowerGet { payload: Vec<u8> },
    /// Any unregistered type byte, or a registered one whose payload could not
    /// be interpreted.
    Unknown { raw_type: u8, payload: Vec<u8> },
}

impl MetadataRecord {
    /// The wire type byte this record was decoded from.
    pub fn type_byte(&self) -> u8 {
        match self {
            MetadataRecord::Unknown { raw_type, .. } => *raw_type,
            other => other.kind().map(MetadataKind::type_byte).unwrap_or_default(),
        }
    }

    /// The registered kind, or `None` for [`MetadataRecord::Unknown`].
    pub fn kind(&self) -> Option<MetadataKind> {
        match self {
            MetadataRecord::Error { .. } => Some(MetadataKind::Error),
            MetadataRecord::Info { .. } => Some(MetadataKind::Info),
            MetadataRecord::Timestamp { .. } => Some(MetadataKind::Timestamp),
            MetadataRecord::AcqEnd => Some(MetadataKind::AcqEnd),
            MetadataRecord::Overcurrent => Some(MetadataKind::Overcurrent),
            MetadataRecord::Powerdown { .. } => Some(MetadataKind::Powerdown),
            MetadataRecord::VoltageGet { .. } => Some(MetadataKind::VoltageGet),
            MetadataRecord::Temperature { .. } => Some(MetadataKind::Temperature),
            MetadataRecord::PowerGet { .. } => Some(MetadataKind::PowerGet),
            MetadataRecord::Unknown { .. } => None,
        }
    }

    pub fn is_acquisition_end(&self) -> bool {
        matches!(self, MetadataRecord::AcqEnd)
    }

    /// Whether the device reported an error or an overcurrent condition.
    pub fn is_fault(&self) -> bool {
        matches!(self, MetadataRecord::Error { .. } | MetadataRecord::Overcurrent)
    }
}

impl fmt::Display for MetadataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataRecord::Error { message } => write!(f, "error: {}", message),
            MetadataRecord::Info { message } => write!(f, "info: {}", message),
            MetadataRecord::Timestamp { seconds, load_percent } => {
                write!(f, "timestamp: {}s (load {}%)", seconds, load_percent)
            }
            MetadataRecord::AcqEnd => f.write_str("acquisition end"),
            MetadataRecord::Overcurrent => f.write_str("overcurrent"),
            MetadataRecord::Powerdown { payload } => write!(f, "powerdown: {}", hex(payload)),
            MetadataRecord::VoltageGet { payload } => write!(f, "voltage: {}", hex(payload)),
            MetadataRecord::Temperature { payload } => write!(f, "temperature: {}", hex(payload)),
            MetadataRecord::PowerGet { payload } => write!(f, "power: {}", hex(payload)),
            MetadataRecord::Unknown { raw_type, payload } => {
                write!(f, "unknown {:#04x}: {}", raw_type, hex(payload))
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
