//! Audible siren channel

use super::{AudioPlayer, Delivery, Media, NotificationChannel};
use crate::error::Error;
use async_trait::async_trait;
use std::path::PathBuf;

/// Plays a local alarm sound without waiting for it to finish
pub struct SirenChannel {
    sound_file: PathBuf,
    player: AudioPlayer,
}

impl SirenChannel {
    pub fn new(sound_file: PathBuf, player: AudioPlayer) -> Self {
        Self { sound_file, player }
    }
}

#[async_trait]
impl NotificationChannel for SirenChannel {
    fn id(&self) -> &str {
        "siren"
    }

    async fn send(&self, _message: &str, _media: Option<&Media>) -> crate::Result<Delivery> {
        if !tokio::fs::try_exists(&self.sound_file).await.unwrap_or(false) {
            return Ok(Delivery::Skipped(format!(
                "sound file {} not found",
                self.sound_file.display()
            )));
        }

        self.player
            .spawn_detached(&self.sound_file)
            .map_err(|e| Error::channel(self.id(), e.to_string()))?;

        tracing::debug!(file = %self.sound_file.display(), "Siren started");
        Ok(Delivery::Sent)
    }
}
