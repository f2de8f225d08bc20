//! Scheduler - Monitoring Cycle Loop
//!
//! ## Responsibilities
//!
//! - Run one cycle: acquire window, score, decide, dispatch
//! - Optional startup burst of short-window cycles
//! - Steady-state cycles at the configured interval
//! - Feed outcomes to the ResilienceSupervisor and act on its requests
//!
//! One task runs cycles sequentially. A restart request ends the loop with
//! [`Shutdown::Restart`]; the binary performs the actual re-exec.

use crate::ai_client::AiClient;
use crate::alert_gate::AlertGate;
use crate::clock::Clock;
use crate::models::{AlertDecision, Assessment, ChannelOutcome, ObservationWindow};
use crate::notification_fanout::{Media, NotificationFanout};
use crate::observation_source::ObservationSource;
use crate::resilience_supervisor::{
    ResilienceSupervisor, RestartCause, SupervisorAction, SupervisorPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Cycle timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Delay between steady-state cycles
    pub interval: Duration,
    /// Window span of steady-state cycles
    pub window_span: Duration,
    /// Extra cycles run at startup (0 to 2)
    pub burst_cycles: u32,
    /// Window span of burst cycles
    pub burst_window: Duration,
    /// Pause after a burst cycle that alerted
    pub burst_settle: Duration,
    /// Delay after a failed acquisition
    pub source_retry_delay: Duration,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            window_span: Duration::from_secs(600),
            burst_cycles: 0,
            burst_window: Duration::from_secs(10),
            burst_settle: Duration::from_secs(5),
            source_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Stop requested through a [`StopHandle`]
    Stopped,
    /// Supervisor asked for a process restart
    Restart(RestartCause),
}

/// Summary of a completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub observations: usize,
    pub assessment: Assessment,
    pub decision: AlertDecision,
    /// Empty unless the cycle alerted
    pub outcomes: Vec<ChannelOutcome>,
}

/// Result of one cycle
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed {
        report: CycleReport,
        action: SupervisorAction,
    },
    SourceFailed {
        error: String,
        action: SupervisorAction,
    },
}

impl CycleOutcome {
    pub fn action(&self) -> SupervisorAction {
        match self {
            Self::Completed { action, .. } | Self::SourceFailed { action, .. } => *action,
        }
    }

    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed { report, .. } => Some(report),
            Self::SourceFailed { .. } => None,
        }
    }

    fn alerted(&self) -> bool {
        self.report().is_some_and(|r| r.decision.triggered)
    }
}

/// Requests a graceful stop between cycles
#[derive(Clone)]
pub struct StopHandle {
    notify: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.notify.notify_one();
    }
}

/// Monitoring loop
pub struct Scheduler {
    source: Box<dyn ObservationSource>,
    ai_client: AiClient,
    gate: Arc<AlertGate>,
    fanout: NotificationFanout,
    supervisor: ResilienceSupervisor,
    clock: Arc<dyn Clock>,
    policy: SchedulePolicy,
    stop: Arc<Notify>,
}

impl Scheduler {
    pub fn new(
        source: Box<dyn ObservationSource>,
        ai_client: AiClient,
        gate: Arc<AlertGate>,
        fanout: NotificationFanout,
        supervisor_policy: SupervisorPolicy,
        clock: Arc<dyn Clock>,
        policy: SchedulePolicy,
    ) -> Self {
        let supervisor = ResilienceSupervisor::new(supervisor_policy, clock.now());
        Self {
            source,
            ai_client,
            gate,
            fanout,
            supervisor,
            clock,
            policy,
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            notify: self.stop.clone(),
        }
    }

    pub fn gate(&self) -> Arc<AlertGate> {
        self.gate.clone()
    }

    pub fn supervisor(&self) -> &ResilienceSupervisor {
        &self.supervisor
    }

    pub fn policy(&self) -> SchedulePolicy {
        self.policy
    }

    /// Run cycles until stopped or a restart is requested
    pub async fn run(&mut self) -> Shutdown {
        tracing::info!(
            source = %self.source.id(),
            interval_sec = self.policy.interval.as_secs(),
            window_sec = self.policy.window_span.as_secs(),
            burst_cycles = self.policy.burst_cycles,
            "Starting monitoring loop"
        );

        for n in 0..self.policy.burst_cycles {
            if let Some(cause) = self.uptime_exceeded() {
                return Shutdown::Restart(cause);
            }

            tracing::debug!(cycle = n + 1, "Burst cycle");
            let outcome = self.run_cycle(self.policy.burst_window).await;
            if let SupervisorAction::Restart(cause) = outcome.action() {
                return Shutdown::Restart(cause);
            }

            let delay = match &outcome {
                CycleOutcome::SourceFailed { .. } => self.policy.source_retry_delay,
                _ if outcome.alerted() => self.policy.burst_settle,
                _ => Duration::ZERO,
            };
            if self.pause(delay).await {
                return self.stopped();
            }
        }

        loop {
            if let Some(cause) = self.uptime_exceeded() {
                return Shutdown::Restart(cause);
            }

            let outcome = self.run_cycle(self.policy.window_span).await;
            if let SupervisorAction::Restart(cause) = outcome.action() {
                return Shutdown::Restart(cause);
            }

            let delay = match outcome {
                CycleOutcome::SourceFailed { .. } => self.policy.source_retry_delay,
                CycleOutcome::Completed { .. } => self.policy.interval,
            };
            if self.pause(delay).await {
                return self.stopped();
            }
        }
    }

    /// One acquire → score → decide → dispatch pass
    pub async fn run_cycle(&mut self, span: Duration) -> CycleOutcome {
        let window = match self.source.acquire(span, self.clock.now()).await {
            Ok(window) => {
                self.supervisor.record_source_success();
                window
            }
            Err(e) => {
                let error = e.to_string();
                let action = self.supervisor.record_source_failure(&error);
                if let SupervisorAction::Reacquire { .. } = action {
                    self.reacquire_source().await;
                }
                return CycleOutcome::SourceFailed { error, action };
            }
        };

        let assessment = self.ai_client.analyze(&window).await;

        tracing::info!(
            observations = window.len(),
            score = assessment.result.score,
            risk = %assessment.risk,
            reachability = ?assessment.reachability,
            text = %assessment.result.text,
            "Cycle assessed"
        );

        let action = self.supervisor.record_inference(assessment.reachability);

        let decision = self.gate.evaluate(assessment.risk, self.clock.now()).await;

        let outcomes = if decision.triggered {
            tracing::warn!(
                risk = %assessment.risk,
                threshold = self.gate.policy().threshold,
                "Alert triggered"
            );
            let media = alert_media(&window);
            let outcomes = self
                .fanout
                .dispatch(&assessment.result.text, media.as_ref())
                .await;
            let failed = outcomes.iter().filter(|o| !o.success).count();
            tracing::info!(
                channels = outcomes.len(),
                failed = failed,
                "Alert dispatch finished"
            );
            outcomes
        } else {
            tracing::debug!(risk = %assessment.risk, "No alert");
            Vec::new()
        };

        CycleOutcome::Completed {
            report: CycleReport {
                observations: window.len(),
                assessment,
                decision,
                outcomes,
            },
            action,
        }
    }

    async fn reacquire_source(&mut self) {
        match self.source.reacquire().await {
            Ok(()) => tracing::info!(source = %self.source.id(), "Source reacquired"),
            Err(e) => tracing::error!(
                source = %self.source.id(),
                error = %e,
                "Source reacquisition failed"
            ),
        }
    }

    fn uptime_exceeded(&mut self) -> Option<RestartCause> {
        match self.supervisor.check_uptime(self.clock.now()) {
            SupervisorAction::Restart(cause) => Some(cause),
            _ => None,
        }
    }

    /// Sleep for `delay`; true if a stop was requested
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.stop.notified() => true,
        }
    }

    fn stopped(&self) -> Shutdown {
        tracing::info!("Monitoring loop stopped");
        Shutdown::Stopped
    }
}

/// Latest frame in the window, attached to the alert
fn alert_media(window: &ObservationWindow) -> Option<Media> {
    let (bytes, mime_type) = window.latest_image()?.image()?;
    let mut media = Media::jpeg(bytes.to_vec());
    if mime_type != media.mime_type {
        media.mime_type = mime_type.to_string();
    }
    Some(media)
}
