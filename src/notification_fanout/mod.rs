//! NotificationFanout - Multi-Channel Alert Dispatch
//!
//! ## Responsibilities
//!
//! - Hold the ordered set of channels registered at startup
//! - Dispatch one escalation to every channel
//! - Isolate failures: a failing channel never blocks the ones after it
//!
//! ## Channels
//!
//! - `chat`: Telegram bot (text, or photo with caption)
//! - `siren`: local alarm sound, fire-and-forget
//! - `speech`: synthesized voice announcement
//!
//! Delivery is best-effort; nothing is queued or retried.

pub mod chat;
pub mod player;
pub mod siren;
pub mod speech;

pub use chat::TelegramChannel;
pub use player::AudioPlayer;
pub use siren::SirenChannel;
pub use speech::{SpeechChannel, SpeechFormat};

use crate::models::ChannelOutcome;
use async_trait::async_trait;

/// Media attached to an alert (the frame that triggered it)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl Media {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/jpeg".to_string(),
            file_name: "alert.jpg".to_string(),
        }
    }
}

/// What a channel did with an alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Deliberately not delivered (resource absent, nothing to do)
    Skipped(String),
}

/// Uniform notification capability
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Stable identifier used in logs and outcomes
    fn id(&self) -> &str;

    /// Deliver `message`, with optional media
    async fn send(&self, message: &str, media: Option<&Media>) -> crate::Result<Delivery>;
}

/// Ordered set of notification channels
#[derive(Default)]
pub struct NotificationFanout {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel at the end of the dispatch order
    pub fn register(&mut self, channel: Box<dyn NotificationChannel>) {
        tracing::info!(channel = %channel.id(), "Notification channel registered");
        self.channels.push(channel);
    }

    /// Builder-style registration
    pub fn with_channel(mut self, channel: Box<dyn NotificationChannel>) -> Self {
        self.register(channel);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_ids(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.id()).collect()
    }

    /// Dispatch to every channel in order
    ///
    /// Returns one outcome per channel; never fails as a whole.
    pub async fn dispatch(&self, message: &str, media: Option<&Media>) -> Vec<ChannelOutcome> {
        let mut outcomes = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let outcome = match channel.send(message, media).await {
                Ok(Delivery::Sent) => {
                    tracing::info!(channel = %channel.id(), "Alert delivered");
                    ChannelOutcome::delivered(channel.id())
                }
                Ok(Delivery::Skipped(reason)) => {
                    tracing::info!(channel = %channel.id(), reason = %reason, "Alert channel skipped");
                    ChannelOutcome::skipped(channel.id())
                }
                Err(e) => {
                    tracing::error!(channel = %channel.id(), error = %e, "Alert delivery failed");
                    ChannelOutcome::failed(channel.id(), e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<(String, String, bool)>>>,
    }

    struct RecordingChannel {
        id: String,
        fail: bool,
        recorder: Recorder,
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn id(&self) -> &str {
            &self.id
        }

        async fn send(&self, message: &str, media: Option<&Media>) -> crate::Result<Delivery> {
            self.recorder
                .calls
                .lock()
                .unwrap()
                .push((self.id.clone(), message.to_string(), media.is_some()));
            if self.fail {
                Err(Error::channel(&self.id, "connection reset"))
            } else {
                Ok(Delivery::Sent)
            }
        }
    }

    fn channel(id: &str, fail: bool, recorder: &Recorder) -> Box<dyn NotificationChannel> {
        Box::new(RecordingChannel {
            id: id.to_string(),
            fail,
            recorder: recorder.clone(),
        })
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let recorder = Recorder::default();
        let fanout = NotificationFanout::new()
            .with_channel(channel("a", true, &recorder))
            .with_channel(channel("b", false, &recorder));

        let outcomes = fanout.dispatch("🚨 ALERT!\nsmoke", None).await;

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, "b");
        assert_eq!(calls[1].1, "🚨 ALERT!\nsmoke");

        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(outcomes[1], ChannelOutcome::delivered("b"));
    }

    #[tokio::test]
    async fn test_dispatch_order_and_media() {
        let recorder = Recorder::default();
        let fanout = NotificationFanout::new()
            .with_channel(channel("chat", false, &recorder))
            .with_channel(channel("siren", false, &recorder))
            .with_channel(channel("speech", false, &recorder));
        let media = Media::jpeg(vec![1, 2, 3]);

        fanout.dispatch("fall detected", Some(&media)).await;

        let ids: Vec<String> = recorder.calls.lock().unwrap().iter().map(|c| c.0.clone()).collect();
        assert_eq!(ids, vec!["chat", "siren", "speech"]);
        assert!(recorder.calls.lock().unwrap().iter().all(|c| c.2));
        assert_eq!(fanout.channel_ids(), vec!["chat", "siren", "speech"]);
    }

    #[tokio::test]
    async fn test_empty_fanout() {
        let fanout = NotificationFanout::new();
        assert!(fanout.is_empty());
        assert!(fanout.dispatch("x", None).await.is_empty());
    }
}
