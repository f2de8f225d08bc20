//! Chat channel (Telegram bot API)

use super::{Delivery, Media, NotificationChannel};
use crate::error::Error;
use crate::models::truncate_chars;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Telegram caption limit for sendPhoto
pub const MAX_CAPTION_CHARS: usize = 1024;
/// Telegram text limit for sendMessage
pub const MAX_TEXT_CHARS: usize = 4096;

/// Prefix put in front of every chat alert
pub const ALERT_PREFIX: &str = "🚨 ALERT!";

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Sends alerts to a Telegram chat
pub struct TelegramChannel {
    http: reqwest::Client,
    api_base: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramChannel {
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token: bot_token.filter(|t| !t.trim().is_empty()),
            chat_id: chat_id.filter(|c| !c.trim().is_empty()),
        })
    }

    /// Override the API base URL (self-hosted bot API server)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn credentials(&self) -> crate::Result<(&str, &str)> {
        match (self.bot_token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat_id)) => Ok((token, chat_id)),
            _ => Err(Error::channel(self.id(), "Telegram credentials not configured")),
        }
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, token, method)
    }
}

/// Alert text as posted to the chat
pub fn format_alert(message: &str) -> String {
    format!("{}\n{}", ALERT_PREFIX, message)
}

/// Caption as sent with a photo
pub fn caption_for(message: &str) -> String {
    truncate_chars(&format_alert(message), MAX_CAPTION_CHARS)
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn id(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &str, media: Option<&Media>) -> crate::Result<Delivery> {
        let (token, chat_id) = self.credentials()?;

        let request = match media {
            Some(media) => {
                let photo = Part::bytes(media.bytes.clone())
                    .file_name(media.file_name.clone())
                    .mime_str(&media.mime_type)?;
                let form = Form::new()
                    .text("chat_id", chat_id.to_string())
                    .text("caption", caption_for(message))
                    .part("photo", photo);
                self.http
                    .post(self.method_url(token, "sendPhoto"))
                    .multipart(form)
            }
            None => self
                .http
                .post(self.method_url(token, "sendMessage"))
                .json(&serde_json::json!({
                    "chat_id": chat_id,
                    "text": truncate_chars(&format_alert(message), MAX_TEXT_CHARS),
                })),
        };

        let resp = request
            .send()
            .await
            // The request URL embeds the bot token
            .map_err(|e| Error::channel(self.id(), e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::channel(
                self.id(),
                format!("HTTP {}: {}", status.as_u16(), truncate_chars(&body, 120)),
            ));
        }

        tracing::debug!(with_photo = media.is_some(), "Telegram message accepted");
        Ok(Delivery::Sent)
    }
}
