//! In-memory channel that records what it was asked to send.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{ChannelKind, NotificationChannel, OutboundMessage};
use crate::error::{ChannelError, Result};

/// A message captured by [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct RecordingState {
    sent: Vec<SentMessage>,
    attempts: usize,
    fail_on_send: bool,
    panic_on_send: bool,
    delay: Option<Duration>,
}

/// In-memory channel for testing.
#[derive(Debug, Clone)]
pub struct RecordingChannel {
    kind: ChannelKind,
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configures the channel to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state().fail_on_send = fail;
    }

    /// Configures the channel to panic on every send.
    pub fn set_panic_on_send(&self, panic: bool) {
        self.state().panic_on_send = panic;
    }

    /// Makes every send wait before completing.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    /// Messages delivered so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    /// Number of sends attempted, including failures.
    pub fn attempts(&self) -> usize {
        self.state().attempts
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn provider(&self) -> &'static str {
        "recording"
    }

    fn sender(&self) -> Option<&str> {
        None
    }

    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<String> {
        let (delay, fail, panic) = {
            let mut state = self.state();
            state.attempts += 1;
            (state.delay, state.fail_on_send, state.panic_on_send)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if panic {
            panic!("{} channel exploded", self.kind);
        }
        if fail {
            return Err(ChannelError::Rejected(format!("{} provider down", self.kind)));
        }

        let mut state = self.state();
        state.sent.push(SentMessage {
            to: to.to_string(),
            subject: message.subject.clone(),
            body: message.body.clone(),
        });
        Ok(format!("{}-{:04}", self.kind, state.sent.len()))
    }
}
