//! NDJSON event log source

use super::ObservationSource;
use crate::error::{Error, Result};
use crate::models::{Observation, ObservationWindow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// One line of the event log
#[derive(Debug, Deserialize)]
struct EventRecord {
    #[serde(default = "unknown_source")]
    source: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    value: Option<f64>,
    timestamp: String,
}

fn unknown_source() -> String {
    "unknown".to_string()
}

/// Reads events newer than the window start from an NDJSON file
pub struct EventLogSource {
    path: PathBuf,
}

impl EventLogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// Parse an RFC3339 timestamp, or a naive ISO timestamp taken as UTC
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::Parse(format!("invalid timestamp: {}", raw)))
}

fn parse_line(line: &str) -> Result<Observation> {
    let record: EventRecord = serde_json::from_str(line)?;
    let timestamp = parse_timestamp(&record.timestamp)?;
    Ok(Observation::event(
        record.source,
        record.description,
        record.value,
        timestamp,
    ))
}

#[async_trait]
impl ObservationSource for EventLogSource {
    fn id(&self) -> &str {
        "event_log"
    }

    async fn acquire(&mut self, span: Duration, now: DateTime<Utc>) -> Result<ObservationWindow> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Event log not found, empty window");
                return Ok(ObservationWindow::empty(span));
            }
            Err(e) => {
                return Err(Error::Source(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let span_chrono = chrono::Duration::from_std(span)
            .map_err(|e| Error::Internal(format!("window span out of range: {}", e)))?;
        let cutoff = now - span_chrono;

        let mut observations = Vec::new();
        let mut skipped = 0usize;
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok(obs) if obs.timestamp > cutoff => observations.push(obs),
                Ok(_) => {}
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(line = lineno + 1, error = %e, "Skipping malformed event line");
                }
            }
        }

        tracing::debug!(
            path = %self.path.display(),
            events = observations.len(),
            skipped = skipped,
            "Event window read"
        );

        Ok(ObservationWindow::new(observations, span))
    }

    async fn reacquire(&mut self) -> Result<()> {
        // File is reopened on every read
        tracing::info!(path = %self.path.display(), "Event log reacquired");
        Ok(())
    }
}
