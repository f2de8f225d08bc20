//! V4L2 camera source
//!
//! Captures one frame per cycle with ffmpeg, scaled to a maximum width and
//! encoded as JPEG.

use super::ObservationSource;
use crate::error::{Error, Result};
use crate::models::{Observation, ObservationWindow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Device indices probed when scanning
pub const SCAN_INDICES: std::ops::Range<u32> = 0..5;

/// Camera capture settings
#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub index: u32,
    /// Probe indices on reacquire instead of reopening `index`
    pub auto_scan: bool,
    pub max_width: u32,
    /// ffmpeg `-q:v` (2 best, 31 worst)
    pub jpeg_quality: u8,
    pub capture_timeout: Duration,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            auto_scan: true,
            max_width: 640,
            jpeg_quality: 3,
            capture_timeout: Duration::from_secs(10),
        }
    }
}

/// Single-frame camera source
pub struct CameraSource {
    settings: CameraSettings,
    /// Index currently in use
    active_index: u32,
    id: String,
}

impl CameraSource {
    pub fn new(settings: CameraSettings) -> Self {
        let active_index = settings.index;
        Self {
            id: format!("camera{}", active_index),
            active_index,
            settings,
        }
    }

    /// Open the first device that yields a frame
    pub async fn open(settings: CameraSettings) -> Result<Self> {
        let mut source = Self::new(settings);
        if source.settings.auto_scan {
            source.reacquire().await?;
        }
        Ok(source)
    }

    pub fn active_index(&self) -> u32 {
        self.active_index
    }

    fn set_active(&mut self, index: u32) {
        self.active_index = index;
        self.id = format!("camera{}", index);
    }

    /// Capture one JPEG frame from `/dev/video<index>`
    ///
    /// The ffmpeg child is killed when the timeout drops it.
    async fn capture(&self, index: u32) -> Result<Vec<u8>> {
        let device = device_path(index);
        let child = Command::new("ffmpeg")
            .args(capture_args(&device, &self.settings))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Source(format!("ffmpeg spawn failed: {}", e)))?;

        let timeout = self.settings.capture_timeout;
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Source(format!(
                        "ffmpeg failed on {}: {}",
                        device,
                        stderr.trim()
                    )));
                }
                if output.stdout.is_empty() {
                    return Err(Error::Source(format!("ffmpeg returned no frame from {}", device)));
                }
                Ok(output.stdout)
            }
            Ok(Err(e)) => Err(Error::Source(format!("ffmpeg execution failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    device = %device,
                    timeout_sec = timeout.as_secs(),
                    "ffmpeg timeout, process killed via kill_on_drop"
                );
                Err(Error::Source(format!(
                    "ffmpeg timeout on {} ({}s)",
                    device,
                    timeout.as_secs()
                )))
            }
        }
    }
}

pub fn device_path(index: u32) -> String {
    format!("/dev/video{}", index)
}

/// ffmpeg arguments for a single scaled JPEG frame written to stdout
pub fn capture_args(device: &str, settings: &CameraSettings) -> Vec<String> {
    let scale = format!("scale='min({},iw)':-2", settings.max_width);
    let quality = settings.jpeg_quality.to_string();
    [
        "-f", "v4l2",
        "-i", device,
        "-frames:v", "1",
        "-vf", scale.as_str(),
        "-q:v", quality.as_str(),
        "-f", "image2pipe",
        "-vcodec", "mjpeg",
        "-loglevel", "error",
        "-y",
        "-",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[async_trait]
impl ObservationSource for CameraSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn acquire(&mut self, span: Duration, now: DateTime<Utc>) -> Result<ObservationWindow> {
        let frame = self.capture(self.active_index).await?;
        tracing::debug!(camera = %self.id, size = frame.len(), "Frame captured");
        Ok(ObservationWindow::new(
            vec![Observation::jpeg_frame(self.id.clone(), frame, now)],
            span,
        ))
    }

    async fn reacquire(&mut self) -> Result<()> {
        if !self.settings.auto_scan {
            let index = self.settings.index;
            self.capture(index).await?;
            self.set_active(index);
            tracing::info!(camera = %self.id, "Camera reopened");
            return Ok(());
        }

        for index in SCAN_INDICES {
            match self.capture(index).await {
                Ok(_) => {
                    self.set_active(index);
                    tracing::info!(camera = %self.id, "Camera found");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(device = %device_path(index), error = %e, "Camera probe failed");
                }
            }
        }

        Err(Error::Source(format!(
            "no camera yielded a frame on indices {}..{}",
            SCAN_INDICES.start, SCAN_INDICES.end
        )))
    }
}
