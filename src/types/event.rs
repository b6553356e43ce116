//! Decoded stream events

use serde::Serialize;

use super::{MetadataRecord, Sample};

/// One decoded unit of the telemetry stream, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FrameEvent {
    Sample(Sample),
    Metadata(MetadataRecord),
}

impl FrameEvent {
    pub fn as_sample(&self) -> Option<Sample> {
        match self {
            FrameEvent::Sample(sample) => Some(*sample),
            FrameEvent::Metadata(_) => None,
        }
    }

    pub fn as_metadata(&self) -> Option<&MetadataRecord> {
        match self {
            FrameEvent::Sample(_) => None,
            FrameEvent::Metadata(record) => Some(record),
        }
    }

    /// Whether this event ends the acquisition (and the stream).
    pub fn is_acquisition_end(&self) -> bool {
        self.as_metadata().is_some_and(MetadataRecord::is_acquisition_end)
    }
}

impl From<Sample> for FrameEvent {
    fn from(sample: Sample) -> Self {
        FrameEvent::Sample(sample)
    }
}

impl From<MetadataRecord> for FrameEvent {
    fn from(record: MetadataRecord) -> Self {
        FrameEvent::Metadata(record)
    }
}
