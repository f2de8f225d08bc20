//! ResilienceSupervisor - Failure Counting and Recovery
//!
//! ## Responsibilities
//!
//! - Count consecutive source-acquisition failures; ask for reacquisition
//! - Count consecutive connectivity failures; ask for a restart
//! - Ask for a scheduled restart once the uptime ceiling is reached
//!
//! Counters live in memory only and are owned by the scheduler. A handled HTTP
//! error (the endpoint answered) is not a connectivity failure.

use crate::models::Reachability;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default thresholds
pub mod defaults {
    pub const SOURCE_FAILURE_THRESHOLD: u32 = 10;
    pub const CONNECTIVITY_FAILURE_THRESHOLD: u32 = 20;
    pub const UPTIME_CEILING_HOURS: u64 = 24;
}

/// Supervisor thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorPolicy {
    pub source_failure_threshold: u32,
    pub connectivity_failure_threshold: u32,
    pub uptime_ceiling: Duration,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            source_failure_threshold: defaults::SOURCE_FAILURE_THRESHOLD,
            connectivity_failure_threshold: defaults::CONNECTIVITY_FAILURE_THRESHOLD,
            uptime_ceiling: Duration::from_secs(defaults::UPTIME_CEILING_HOURS * 3600),
        }
    }
}

/// Consecutive failure counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCounters {
    pub source_acquisition: u32,
    pub connectivity: u32,
}

/// Why a restart was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartCause {
    /// Endpoint unreachable for too many consecutive cycles
    ConnectivityLost { failures: u32 },
    /// Process has been up for the configured ceiling
    UptimeCeiling { uptime: Duration },
}

impl std::fmt::Display for RestartCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectivityLost { failures } => {
                write!(f, "connectivity lost ({} consecutive failures)", failures)
            }
            Self::UptimeCeiling { uptime } => {
                write!(f, "uptime ceiling reached ({}h)", uptime.as_secs() / 3600)
            }
        }
    }
}

/// What the scheduler should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorAction {
    Continue,
    /// Release and reopen the observation source
    Reacquire { failures: u32 },
    /// Stop the loop and restart the process
    Restart(RestartCause),
}

/// Failure-counting recovery policy
pub struct ResilienceSupervisor {
    policy: SupervisorPolicy,
    counters: FailureCounters,
    started_at: DateTime<Utc>,
    restart_issued: bool,
}

impl ResilienceSupervisor {
    pub fn new(policy: SupervisorPolicy, started_at: DateTime<Utc>) -> Self {
        Self {
            policy,
            counters: FailureCounters::default(),
            started_at,
            restart_issued: false,
        }
    }

    pub fn counters(&self) -> FailureCounters {
        self.counters
    }

    pub fn policy(&self) -> SupervisorPolicy {
        self.policy
    }

    /// Observation source could not supply a window
    ///
    /// At the threshold, asks for reacquisition once and starts counting anew.
    pub fn record_source_failure(&mut self, error: &str) -> SupervisorAction {
        self.counters.source_acquisition += 1;
        let failures = self.counters.source_acquisition;

        tracing::warn!(
            failures = failures,
            threshold = self.policy.source_failure_threshold,
            error = %error,
            "Source acquisition failed"
        );

        if failures >= self.policy.source_failure_threshold {
            tracing::warn!(failures = failures, "Source failure threshold reached, reacquiring source");
            self.counters.source_acquisition = 0;
            return SupervisorAction::Reacquire { failures };
        }

        SupervisorAction::Continue
    }

    /// Observation source supplied a window
    pub fn record_source_success(&mut self) {
        if self.counters.source_acquisition > 0 {
            tracing::info!(
                previous_failures = self.counters.source_acquisition,
                "Source acquisition recovered"
            );
        }
        self.counters.source_acquisition = 0;
    }

    /// Outcome of an inference call
    pub fn record_inference(&mut self, reachability: Reachability) -> SupervisorAction {
        match reachability {
            Reachability::Reached => {
                if self.counters.connectivity > 0 {
                    tracing::info!(
                        previous_failures = self.counters.connectivity,
                        "Connectivity recovered"
                    );
                }
                self.counters.connectivity = 0;
                SupervisorAction::Continue
            }
            Reachability::Unreachable => {
                self.counters.connectivity += 1;
                let failures = self.counters.connectivity;

                tracing::warn!(
                    failures = failures,
                    threshold = self.policy.connectivity_failure_threshold,
                    "Scoring endpoint unreachable"
                );

                if failures >= self.policy.connectivity_failure_threshold {
                    return self.issue_restart(RestartCause::ConnectivityLost { failures });
                }
                SupervisorAction::Continue
            }
        }
    }

    /// Scheduled restart once uptime reaches the ceiling
    pub fn check_uptime(&mut self, now: DateTime<Utc>) -> SupervisorAction {
        let uptime = (now - self.started_at).to_std().unwrap_or(Duration::ZERO);
        if uptime >= self.policy.uptime_ceiling {
            return self.issue_restart(RestartCause::UptimeCeiling { uptime });
        }
        SupervisorAction::Continue
    }

    fn issue_restart(&mut self, cause: RestartCause) -> SupervisorAction {
        if self.restart_issued {
            return SupervisorAction::Continue;
        }
        self.restart_issued = true;
        tracing::error!(cause = %cause, "Restart requested");
        SupervisorAction::Restart(cause)
    }
}
