//! Progress narration and the keepalive-aware event channel.
//!
//! The orchestrator talks to a `ProgressSink`. Transports that need a push
//! stream use `progress_channel`, whose receiver injects `ping` events
//! whenever nothing was emitted for the keepalive interval.

use std::time::Duration;

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use super::cancel::{CancelOnDrop, CancelToken};
use crate::domain::{ProgressEvent, ProgressUpdate, Requirement};

pub const ANALYZING_PERCENT: u8 = 5;
pub const CORPUS_READY_PERCENT: u8 = 10;
pub const DISCOVERING_PERCENT: u8 = 15;
pub const TAXONOMY_READY_PERCENT: u8 = 20;
pub const SAVING_PERCENT: u8 = 95;
pub const COMPLETE_PERCENT: u8 = 100;

const EXTRACTION_SPAN: usize = 70;

/// Percent for the extraction stage: 20 + 70 * processed / total
pub fn extraction_percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return TAXONOMY_READY_PERCENT;
    }
    let processed = processed.min(total);
    TAXONOMY_READY_PERCENT + (EXTRACTION_SPAN * processed / total) as u8
}

/// Receives progress events. Delivery is best effort.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink feeding an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!("Progress receiver gone, dropping event");
        }
    }
}

/// Create a sink and the receiver that turns it into a stream.
///
/// Dropping the receiver cancels `cancel`, so a disconnected client stops
/// the run behind it.
pub fn progress_channel(keepalive: Duration, cancel: &CancelToken) -> (ChannelSink, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let receiver = ProgressReceiver {
        rx,
        keepalive,
        finished: false,
        _cancel_on_drop: cancel.drop_guard(),
    };
    (ChannelSink { tx }, receiver)
}

pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    keepalive: Duration,
    finished: bool,
    _cancel_on_drop: CancelOnDrop,
}

impl ProgressReceiver {
    /// Next event, a `Ping` after `keepalive` of silence, or `None` once the
    /// stream has ended
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }

        match tokio::time::timeout(self.keepalive, self.rx.recv()).await {
            Ok(Some(event)) => {
                if event.is_end() {
                    self.finished = true;
                }
                Some(event)
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(_) => Some(ProgressEvent::Ping),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures_util::stream::unfold(self, |mut receiver| async move {
            receiver.next_event().await.map(|event| (event, receiver))
        })
    }
}

/// Typed front over a sink that keeps `percent` non-decreasing
pub struct Narrator<'a> {
    sink: &'a dyn ProgressSink,
    last_percent: u8,
}

impl<'a> Narrator<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last_percent: 0,
        }
    }

    pub fn last_percent(&self) -> u8 {
        self.last_percent
    }

    pub fn start(&mut self, message: impl Into<String>) {
        self.sink.emit(ProgressEvent::Start {
            message: message.into(),
        });
    }

    pub fn progress(&mut self, mut update: ProgressUpdate) {
        update.progress = update.progress.max(self.last_percent);
        self.last_percent = update.progress;
        self.sink.emit(ProgressEvent::Progress(update));
    }

    pub fn retry(&mut self, category: &str, attempt: u32, max_attempts: u32, wait: Duration) {
        self.sink.emit(ProgressEvent::Retry {
            message: format!(
                "{} extraction hit a temporary error, retrying (attempt {}/{})",
                category, attempt, max_attempts
            ),
            current_type: category.to_string(),
            attempt,
            max_attempts,
            wait_time: wait.as_secs_f64(),
        });
    }

    pub fn complete(&mut self, requirements: &[Requirement]) {
        self.last_percent = COMPLETE_PERCENT;
        self.sink.emit(ProgressEvent::Complete {
            message: format!("Extracted {} requirements", requirements.len()),
            progress: COMPLETE_PERCENT,
            total_extracted: requirements.len(),
            data: requirements.to_vec(),
        });
    }

    pub fn error(&mut self, message: impl Into<String>, error: impl Into<String>) {
        self.sink.emit(ProgressEvent::Error {
            message: message.into(),
            error: error.into(),
        });
    }

    pub fn end(&mut self) {
        self.sink.emit(ProgressEvent::End);
    }
}
