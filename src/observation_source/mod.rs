//! ObservationSource - Window Acquisition
//!
//! ## Responsibilities
//!
//! - Supply one bounded, ordered observation window per cycle
//! - Release and reopen the underlying device or file on request
//!
//! ## Sources
//!
//! - [`EventLogSource`]: NDJSON event log filtered to a trailing window
//! - [`CameraSource`]: single ffmpeg frame capture from a V4L2 device

mod camera;
mod event_log;

pub use camera::{CameraSettings, CameraSource};
pub use event_log::EventLogSource;

use crate::error::Result;
use crate::models::ObservationWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Supplier of observation windows
#[async_trait]
pub trait ObservationSource: Send {
    /// Short identifier used in logs
    fn id(&self) -> &str;

    /// Window covering `span` up to `now`
    async fn acquire(&mut self, span: Duration, now: DateTime<Utc>) -> Result<ObservationWindow>;

    /// Release and reopen the underlying source
    async fn reacquire(&mut self) -> Result<()>;
}
