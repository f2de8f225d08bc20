//! Speech synthesis channel
//!
//! Requests synthesized audio for the alert text, writes it locally and plays
//! it. Optionally re-announces once after a fixed delay.

use super::{AudioPlayer, Delivery, Media, NotificationChannel};
use crate::error::Error;
use crate::models::truncate_chars;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Audio container requested from the speech endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechFormat {
    Mp3,
    Ogg,
}

impl SpeechFormat {
    /// Content type the endpoint is expected to declare
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Ogg => "audio/ogg",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Mp3 => "alert.mp3",
            Self::Ogg => "alert.ogg",
        }
    }

    /// Value for the endpoint's `response_format`
    pub fn response_format(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Ogg => "opus",
        }
    }
}

/// Speech channel settings
#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub format: SpeechFormat,
    pub output_dir: PathBuf,
    /// Delay before the single re-announcement; `None` disables it
    pub repeat_after: Option<Duration>,
    pub playback_timeout: Duration,
}

/// Announces alerts through a text-to-speech endpoint
pub struct SpeechChannel {
    http: reqwest::Client,
    settings: SpeechSettings,
    player: AudioPlayer,
}

impl SpeechChannel {
    pub fn new(settings: SpeechSettings, player: AudioPlayer) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            settings,
            player,
        })
    }

    async fn synthesize(&self, text: &str) -> crate::Result<Vec<u8>> {
        if self.settings.endpoint.trim().is_empty() {
            return Err(Error::channel(self.id(), "speech endpoint not configured"));
        }

        let mut req = self.http.post(&self.settings.endpoint).json(&serde_json::json!({
            "model": self.settings.model,
            "voice": self.settings.voice,
            "input": text,
            "response_format": self.settings.format.response_format(),
        }));
        if let Some(ref key) = self.settings.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::channel(self.id(), e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::channel(
                self.id(),
                format!("HTTP {}: {}", status.as_u16(), truncate_chars(&body, 120)),
            ));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type_matches(&content_type, self.settings.format) {
            tracing::warn!(
                expected = %self.settings.format.mime_type(),
                received = %content_type,
                "Speech response content type mismatch, attempting playback anyway"
            );
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::channel(self.id(), e.without_url().to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Whether a declared content type matches the requested format
pub fn content_type_matches(content_type: &str, format: SpeechFormat) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match format {
        SpeechFormat::Mp3 => essence == "audio/mpeg" || essence == "audio/mp3",
        SpeechFormat::Ogg => essence == "audio/ogg" || essence == "audio/opus",
    }
}

#[async_trait]
impl NotificationChannel for SpeechChannel {
    fn id(&self) -> &str {
        "speech"
    }

    async fn send(&self, message: &str, _media: Option<&Media>) -> crate::Result<Delivery> {
        let audio = self.synthesize(message).await?;

        tokio::fs::create_dir_all(&self.settings.output_dir).await?;
        let path = self.settings.output_dir.join(self.settings.format.file_name());
        tokio::fs::write(&path, &audio).await?;

        tracing::debug!(path = %path.display(), size = audio.len(), "Speech audio written");

        self.player
            .play(&path, self.settings.playback_timeout)
            .await
            .map_err(|e| Error::channel(self.id(), e.to_string()))?;

        if let Some(delay) = self.settings.repeat_after {
            let player = self.player.clone();
            let timeout = self.settings.playback_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = player.play(&path, timeout).await {
                    tracing::warn!(error = %e, "Speech re-announcement failed");
                }
            });
        }

        Ok(Delivery::Sent)
    }
}
