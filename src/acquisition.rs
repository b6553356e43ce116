//! Async acquisition stream
//!
//! [`Acquisition`] wraps a [`Driver`] task and exposes its events as a
//! [`Stream`]. Dropping it cancels the decode task.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use powermon::{Acquisition, PowerMon, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> powermon::Result<()> {
//!     let config = SessionConfig::default();
//!     let acquisition = config.acquisition.clone();
//!     let decoder = PowerMon::connect(config)?.into_decoder(&acquisition)?;
//!
//!     let mut samples = Acquisition::spawn(decoder).samples();
//!     while let Some(sample) = samples.next().await {
//!         println!("{}", sample?.value());
//!     }
//!     Ok(())
//! }
//! ```

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::Result;
use crate::decoder::{DecoderStats, DiagnosticSink, FrameDecoder};
use crate::driver::{Driver, DriverChannels};
use crate::source::ByteSource;
use crate::types::{FrameEvent, Sample};

/// A running acquisition, decoded on a background thread.
pub struct Acquisition {
    events: ReceiverStream<Result<FrameEvent>>,
    cancel: CancellationToken,
    task: JoinHandle<DecoderStats>,
    _cancel_on_drop: DropGuard,
}

impl Acquisition {
    /// Start decoding on Tokio's blocking pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<S, D>(decoder: FrameDecoder<S, D>) -> Self
    where
        S: ByteSource + Send + 'static,
        D: DiagnosticSink + Send + 'static,
    {
        Self::from_channels(Driver::spawn(decoder))
    }

    /// Start decoding with at most `capacity` events buffered.
    pub fn with_capacity<S, D>(decoder: FrameDecoder<S, D>, capacity: usize) -> Self
    where
        S: ByteSource + Send + 'static,
        D: DiagnosticSink + Send + 'static,
    {
        Self::from_channels(Driver::spawn_with_capacity(decoder, capacity))
    }

    pub fn from_channels(channels: DriverChannels) -> Self {
        let DriverChannels { events, cancel, task } = channels;
        Self {
            events: ReceiverStream::new(events),
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }

    /// Stop decoding. Events already buffered are still yielded, then the
    /// stream ends.
    pub fn cancel(&mut self) {
        debug!("Cancelling acquisition");
        self.cancel.cancel();
        self.events.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next decoded event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<Result<FrameEvent>> {
        self.events.next().await
    }

    /// Sample stream with metadata records filtered out. Errors are kept.
    pub fn samples(self) -> BoxStream<'static, Result<Sample>> {
        self.filter_map(|event| async move {
            match event {
                Ok(FrameEvent::Sample(sample)) => Some(Ok(sample)),
                Ok(FrameEvent::Metadata(_)) => None,
                Err(e) => Some(Err(e)),
            }
        })
        .boxed()
    }

    /// Cancel, wait for the decode task to exit and return its counts.
    ///
    /// Returns `None` if the task panicked.
    pub async fn shutdown(mut self) -> Option<DecoderStats> {
        self.cancel();
        let Acquisition { events, task, .. } = self;
        drop(events);
        task.await.ok()
    }
}

impl Stream for Acquisition {
    type Item = Result<FrameEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl std::fmt::Debug for Acquisition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquisition").field("cancelled", &self.is_cancelled()).finish()
    }
}
