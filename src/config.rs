//! Session configuration
//!
//! Configuration is plain serde data. Every field has a default taken from
//! the power shield's factory behaviour, so a configuration file only needs
//! the values that differ:
//!
//! ```yaml
//! serial:
//!   port: /dev/ttyACM0
//!   ack_timeout_ms: 5000
//! acquisition:
//!   voltage_mv: 1800
//!   frequency_hz: 10000
//!   duration_s: 30
//! ```
//!
//! Durations are written as whole milliseconds (`*_ms` keys).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::command::{Command, DataFormat};
use crate::decoder::DecoderOptions;
use crate::{PowerMonError, Result};

/// USB product id of the STM32 power shield.
pub const POWER_SHIELD_PRODUCT_ID: u16 = 0x5740;

/// Serial line rate used by the power shield.
pub const DEFAULT_BAUD_RATE: u32 = 3_864_000;

/// Supply voltage range accepted by the board, in millivolts.
pub const VOLTAGE_RANGE_MV: std::ops::RangeInclusive<u32> = 1800..=3300;

/// Sampling frequency range accepted by the board, in hertz.
pub const FREQUENCY_RANGE_HZ: std::ops::RangeInclusive<u32> = 1..=100_000;

/// Parameters of one acquisition run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Supply voltage applied to the target.
    pub voltage_mv: u32,
    pub frequency_hz: u32,
    /// Run length in seconds; 0 runs until stopped.
    pub duration_s: u32,
    /// Drop everything received before the first metadata frame.
    pub sync_on_metadata: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self { voltage_mv: 3000, frequency_hz: 100_000, duration_s: 0, sync_on_metadata: true }
    }
}

impl AcquisitionConfig {
    pub fn with_voltage_mv(mut self, voltage_mv: u32) -> Self {
        self.voltage_mv = voltage_mv;
        self
    }

    pub fn with_frequency_hz(mut self, frequency_hz: u32) -> Self {
        self.frequency_hz = frequency_hz;
        self
    }

    pub fn with_duration_s(mut self, duration_s: u32) -> Self {
        self.duration_s = duration_s;
        self
    }

    pub fn with_sync_on_metadata(mut self, sync: bool) -> Self {
        self.sync_on_metadata = sync;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !VOLTAGE_RANGE_MV.contains(&self.voltage_mv) {
            return Err(PowerMonError::config(format!(
                "voltage {} mV outside {}..={} mV",
                self.voltage_mv,
                VOLTAGE_RANGE_MV.start(),
                VOLTAGE_RANGE_MV.end()
            )));
        }
        if !FREQUENCY_RANGE_HZ.contains(&self.frequency_hz) {
            return Err(PowerMonError::config(format!(
                "frequency {} Hz outside {}..={} Hz",
                self.frequency_hz,
                FREQUENCY_RANGE_HZ.start(),
                FREQUENCY_RANGE_HZ.end()
            )));
        }
        Ok(())
    }

    /// Configuration commands in the order the board expects them.
    pub fn commands(&self) -> Vec<Command> {
        vec![
            Command::Format(DataFormat::BinHexa),
            Command::Frequency(self.frequency_hz),
            Command::Voltage(self.voltage_mv),
            Command::AcquisitionTime(self.duration_s),
        ]
    }

    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions::default().with_sync_on_metadata(self.sync_on_metadata)
    }
}

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name; discovered by USB product id when unset.
    pub port: Option<String>,
    pub product_id: u16,
    pub baud_rate: u32,
    /// Bound on a single read from the port.
    #[serde(rename = "read_timeout_ms", with = "duration_ms")]
    pub read_timeout: Duration,
    /// Bound on collecting the acknowledgement of one command.
    #[serde(rename = "ack_timeout_ms", with = "duration_ms")]
    pub ack_timeout: Duration,
    /// Wait after `psrst` before the board accepts commands again.
    #[serde(rename = "reset_settle_ms", with = "duration_ms")]
    pub reset_settle: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            product_id: POWER_SHIELD_PRODUCT_ID,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_secs(1),
            ack_timeout: Duration::from_secs(3),
            reset_settle: Duration::from_secs(10),
        }
    }
}

impl SerialConfig {
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(PowerMonError::config("baud rate must be non-zero"));
        }
        if self.port.as_deref().is_some_and(|port| port.trim().is_empty()) {
            return Err(PowerMonError::config("serial port name is empty"));
        }
        Ok(())
    }
}

/// Complete configuration for a [`PowerMon`](crate::PowerMon) session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub serial: SerialConfig,
    pub acquisition: AcquisitionConfig,
}

impl SessionConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SessionConfig =
            serde_yaml_ng::from_str(yaml).map_err(|e| PowerMonError::Parse {
                context: "session configuration".to_string(),
                details: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| PowerMonError::ConfigFile { path: path.to_path_buf(), source })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| PowerMonError::Parse {
            context: "session configuration".to_string(),
            details: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.serial.validate()?;
        self.acquisition.validate()
    }
}

/// Serde adapter writing a [`Duration`] as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
