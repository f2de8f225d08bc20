//! Shared models for riskwatch
//!
//! Types passed between the source, client, gate, fanout and scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placeholder used when the analyzer returns no narrative text
pub const NO_SUMMARY: &str = "no summary";

/// Observation payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured event line (from the event log)
    Event {
        description: String,
        value: Option<f64>,
    },
    /// Encoded still image (JPEG from the camera)
    Image { bytes: Vec<u8>, mime_type: String },
}

/// One input unit
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub source: String,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    /// Create an event observation
    pub fn event(
        source: impl Into<String>,
        description: impl Into<String>,
        value: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source: source.into(),
            payload: Payload::Event {
                description: description.into(),
                value,
            },
            timestamp,
        }
    }

    /// Create a JPEG frame observation
    pub fn jpeg_frame(source: impl Into<String>, bytes: Vec<u8>, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            payload: Payload::Image {
                bytes,
                mime_type: "image/jpeg".to_string(),
            },
            timestamp,
        }
    }

    /// Image bytes and mime type, if this observation carries a frame
    pub fn image(&self) -> Option<(&[u8], &str)> {
        match &self.payload {
            Payload::Image { bytes, mime_type } => Some((bytes.as_slice(), mime_type.as_str())),
            Payload::Event { .. } => None,
        }
    }
}

/// Ordered, time-bounded snapshot of observations consumed by one cycle
#[derive(Debug, Clone, Default)]
pub struct ObservationWindow {
    observations: Vec<Observation>,
    span: Duration,
}

impl ObservationWindow {
    /// Build a window; observations are ordered by timestamp
    pub fn new(mut observations: Vec<Observation>, span: Duration) -> Self {
        observations.sort_by_key(|o| o.timestamp);
        Self { observations, span }
    }

    /// Empty window covering `span`
    pub fn empty(span: Duration) -> Self {
        Self {
            observations: Vec::new(),
            span,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Most recent frame in the window, used as alert media
    pub fn latest_image(&self) -> Option<&Observation> {
        self.observations.iter().rev().find(|o| o.image().is_some())
    }
}

/// Normalized output of inference
///
/// `score` is always within `[0,1]`; construction never fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ScoreResult {
    /// Create a result, clamping the score into `[0,1]`
    pub fn new(score: f64, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            score: clamp_unit(score),
            text: if text.trim().is_empty() {
                NO_SUMMARY.to_string()
            } else {
                text
            },
            raw: None,
        }
    }

    /// Zero-score result carrying a diagnostic message
    pub fn degraded(diagnostic: impl Into<String>) -> Self {
        Self::new(0.0, diagnostic)
    }

    /// Attach truncated raw analyzer content for diagnostics
    pub fn with_raw(mut self, raw: &str) -> Self {
        self.raw = Some(truncate_chars(raw, 200));
        self
    }
}

/// Clamp into `[0,1]`; non-finite values collapse to zero
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Truncate to at most `max` characters (not bytes)
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Risk as determined from analyzer output
///
/// `Unknown` is distinct from `Known(0.0)` and never triggers an alert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskValue {
    Known(f64),
    Unknown,
}

impl RiskValue {
    /// Known risk if `value` lies in `[0,1]`, otherwise unknown
    pub fn from_unit(value: f64) -> Self {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            RiskValue::Known(value)
        } else {
            RiskValue::Unknown
        }
    }

    pub fn known(&self) -> Option<f64> {
        match self {
            RiskValue::Known(v) => Some(*v),
            RiskValue::Unknown => None,
        }
    }
}

impl std::fmt::Display for RiskValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskValue::Known(v) => write!(f, "{:.2}", v),
            RiskValue::Unknown => write!(f, "unknown"),
        }
    }
}

/// Whether the scoring endpoint could be reached at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// Endpoint answered (possibly with an error status)
    Reached,
    /// All attempts failed at the transport level
    Unreachable,
}

/// Full output of one inference call
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub result: ScoreResult,
    pub risk: RiskValue,
    pub reachability: Reachability,
}

impl Assessment {
    /// Assessment where the result carries a usable score
    pub fn scored(result: ScoreResult) -> Self {
        let risk = RiskValue::Known(result.score);
        Self {
            result,
            risk,
            reachability: Reachability::Reached,
        }
    }

    /// Degraded assessment: zero score, no determinable risk
    pub fn degraded(result: ScoreResult, reachability: Reachability) -> Self {
        Self {
            result,
            risk: RiskValue::Unknown,
            reachability,
        }
    }
}

/// Alert gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertDecision {
    pub triggered: bool,
    pub at: DateTime<Utc>,
}

/// Result of one channel delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub channel_id: String,
    pub success: bool,
    /// Channel deliberately did nothing (e.g. resource absent)
    #[serde(default)]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChannelOutcome {
    pub fn delivered(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            success: true,
            skipped: false,
            error: None,
        }
    }

    pub fn skipped(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            success: true,
            skipped: true,
            error: None,
        }
    }

    pub fn failed(channel_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            success: false,
            skipped: false,
            error: Some(error.into()),
        }
    }
}
