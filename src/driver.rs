//! Driver runs a blocking decoder on a Tokio blocking thread

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::Result;
use crate::decoder::{DecoderStats, DiagnosticSink, FrameDecoder};
use crate::source::ByteSource;
use crate::types::FrameEvent;

/// Default number of decoded events buffered between the decode thread and
/// the consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Result of spawning a decode task
#[derive(Debug)]
pub struct DriverChannels {
    /// Receiver for decoded events, in arrival order
    pub events: mpsc::Receiver<Result<FrameEvent>>,
    /// Cancellation token for stopping the decode task between frames
    pub cancel: CancellationToken,
    /// Decode task handle; resolves to the decoder's final counts
    pub task: JoinHandle<DecoderStats>,
}

/// Driver spawns and manages the decode task
///
/// The decoder is pull-based and blocks on its byte source, so it runs on
/// Tokio's blocking pool. Events are forwarded over a bounded channel: while
/// the channel is full the task waits and reads nothing from the source.
pub struct Driver;

impl Driver {
    /// Spawn a decode task with the default channel capacity.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<S, D>(decoder: FrameDecoder<S, D>) -> DriverChannels
    where
        S: ByteSource + Send + 'static,
        D: DiagnosticSink + Send + 'static,
    {
        Self::spawn_with_capacity(decoder, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Spawn a decode task buffering at most `capacity` events.
    pub fn spawn_with_capacity<S, D>(
        decoder: FrameDecoder<S, D>,
        capacity: usize,
    ) -> DriverChannels
    where
        S: ByteSource + Send + 'static,
        D: DiagnosticSink + Send + 'static,
    {
        let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();

        let task = tokio::task::spawn_blocking(move || {
            Self::decode_task(decoder, event_tx, cancel_task)
        });

        DriverChannels { events: event_rx, cancel, task }
    }

    fn decode_task<S, D>(
        mut decoder: FrameDecoder<S, D>,
        event_tx: mpsc::Sender<Result<FrameEvent>>,
        cancel: CancellationToken,
    ) -> DecoderStats
    where
        S: ByteSource,
        D: DiagnosticSink,
    {
        info!("Decode task started");

        loop {
            // Checked between frames; a read in progress finishes first.
            if cancel.is_cancelled() {
                info!("Decode task cancelled");
                break;
            }

            let Some(item) = decoder.next() else {
                info!("Telemetry stream ended");
                break;
            };

            if let Err(e) = &item {
                error!("Telemetry stream failed: {}", e);
            }

            if event_tx.blocking_send(item).is_err() {
                debug!("Event receiver dropped, shutting down");
                break;
            }
        }

        let stats = decoder.stats();
        info!(
            "Decode task ended ({} samples, {} metadata records, {} bytes)",
            stats.samples,
            stats.metadata,
            decoder.bytes_consumed()
        );
        stats
    }
}
