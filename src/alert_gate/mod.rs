//! AlertGate - Threshold and Rate Limit
//!
//! ## Responsibilities
//!
//! - Compare risk to the alert threshold
//! - Enforce a minimum interval between alerts
//! - Record the alert time before dispatch begins
//!
//! `last_alert` is the only alert history kept; it lives in memory and is
//! lost on restart. Check and update happen under one write lock, so a slow
//! dispatch can never let a near-simultaneous evaluation trigger twice.

use crate::models::{AlertDecision, RiskValue};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::RwLock;

/// Alert gate configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    /// Minimum risk that escalates
    pub threshold: f64,
    /// Minimum time between two alerts
    pub min_interval: Duration,
}

/// Threshold + rate-limit decision point
pub struct AlertGate {
    policy: AlertPolicy,
    last_alert: RwLock<Option<DateTime<Utc>>>,
}

impl AlertGate {
    /// Create gate that has never alerted
    pub fn new(policy: AlertPolicy) -> Self {
        Self {
            policy,
            last_alert: RwLock::new(None),
        }
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    /// Decide whether `risk` at `now` escalates
    ///
    /// On trigger the alert time is recorded immediately.
    pub async fn evaluate(&self, risk: RiskValue, now: DateTime<Utc>) -> AlertDecision {
        let value = match risk {
            RiskValue::Known(v) => v,
            RiskValue::Unknown => {
                tracing::debug!("Risk unknown, not escalating");
                return AlertDecision { triggered: false, at: now };
            }
        };

        if value < self.policy.threshold {
            return AlertDecision { triggered: false, at: now };
        }

        let mut last_alert = self.last_alert.write().await;

        if let Some(last) = *last_alert {
            let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
            if elapsed < self.policy.min_interval {
                tracing::info!(
                    risk = value,
                    elapsed_secs = elapsed.as_secs(),
                    min_interval_secs = self.policy.min_interval.as_secs(),
                    "Alert suppressed by rate limit"
                );
                return AlertDecision { triggered: false, at: now };
            }
        }

        *last_alert = Some(now);
        AlertDecision { triggered: true, at: now }
    }

    /// Time of the last triggered alert
    pub async fn last_alert(&self) -> Option<DateTime<Utc>> {
        *self.last_alert.read().await
    }
}
