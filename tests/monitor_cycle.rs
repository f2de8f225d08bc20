//! End-to-end monitoring cycles against scripted collaborators

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use riskwatch::ai_client::{AiClient, InferenceSettings, InferenceTransport, RetryPolicy, TransportReply};
use riskwatch::alert_gate::{AlertGate, AlertPolicy};
use riskwatch::clock::{Clock, ManualClock};
use riskwatch::models::{Observation, ObservationWindow, RiskValue};
use riskwatch::notification_fanout::{Delivery, Media, NotificationChannel, NotificationFanout};
use riskwatch::observation_source::ObservationSource;
use riskwatch::resilience_supervisor::{RestartCause, SupervisorAction, SupervisorPolicy};
use riskwatch::scheduler::{CycleOutcome, SchedulePolicy, Scheduler, Shutdown, StopHandle};
use riskwatch::{Error, Result};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ========================================
// Scripted collaborators
// ========================================

/// Replies the same way to every call
struct ScriptedTransport {
    reply: TransportReply,
    calls: Mutex<usize>,
}

impl ScriptedTransport {
    fn always(reply: TransportReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl InferenceTransport for ScriptedTransport {
    async fn post(&self, _body: &Value) -> TransportReply {
        *self.calls.lock().unwrap() += 1;
        self.reply.clone()
    }
}

fn scored(score: f64, text: &str) -> TransportReply {
    let content = json!({"score": score, "text": text}).to_string();
    TransportReply::Response {
        status: 200,
        body: json!({"choices": [{"message": {"content": content}}]}).to_string(),
    }
}

/// Source yielding one event per cycle, or scripted failures
struct FakeSource {
    failures_left: usize,
    acquired_spans: Arc<Mutex<Vec<Duration>>>,
    reacquires: Arc<Mutex<usize>>,
    stop_after: Option<(usize, Arc<Mutex<Option<StopHandle>>>)>,
}

impl FakeSource {
    fn healthy() -> Self {
        Self {
            failures_left: 0,
            acquired_spans: Arc::new(Mutex::new(Vec::new())),
            reacquires: Arc::new(Mutex::new(0)),
            stop_after: None,
        }
    }

    fn failing(times: usize) -> Self {
        Self {
            failures_left: times,
            ..Self::healthy()
        }
    }
}

#[async_trait]
impl ObservationSource for FakeSource {
    fn id(&self) -> &str {
        "fake"
    }

    async fn acquire(&mut self, span: Duration, now: chrono::DateTime<Utc>) -> Result<ObservationWindow> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(Error::Source("device busy".to_string()));
        }

        let count = {
            let mut spans = self.acquired_spans.lock().unwrap();
            spans.push(span);
            spans.len()
        };
        if let Some((limit, handle)) = &self.stop_after {
            if count >= *limit {
                if let Some(handle) = handle.lock().unwrap().as_ref() {
                    handle.stop();
                }
            }
        }

        Ok(ObservationWindow::new(
            vec![
                Observation::event("door", "front door opened", None, now),
                Observation::jpeg_frame("fake", vec![0xff, 0xd8, 0xff], now),
            ],
            span,
        ))
    }

    async fn reacquire(&mut self) -> Result<()> {
        *self.reacquires.lock().unwrap() += 1;
        Ok(())
    }
}

type Deliveries = Arc<Mutex<Vec<(String, String, bool)>>>;

/// Records (channel, message, had_media)
struct RecordingChannel {
    id: String,
    fail: bool,
    deliveries: Deliveries,
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, message: &str, media: Option<&Media>) -> Result<Delivery> {
        self.deliveries
            .lock()
            .unwrap()
            .push((self.id.clone(), message.to_string(), media.is_some()));
        if self.fail {
            return Err(Error::channel(&self.id, "HTTP 502: bad gateway"));
        }
        Ok(Delivery::Sent)
    }
}

/// Slow channel that re-evaluates the gate while its own dispatch is in flight
struct SlowChannel {
    gate: Arc<AlertGate>,
    clock: Arc<ManualClock>,
    reentrant_triggered: Arc<Mutex<Option<bool>>>,
}

#[async_trait]
impl NotificationChannel for SlowChannel {
    fn id(&self) -> &str {
        "slow"
    }

    async fn send(&self, _message: &str, _media: Option<&Media>) -> Result<Delivery> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let decision = self.gate.evaluate(RiskValue::Known(0.99), self.clock.now()).await;
        *self.reentrant_triggered.lock().unwrap() = Some(decision.triggered);
        Ok(Delivery::Sent)
    }
}

// ========================================
// Harness
// ========================================

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

fn client(transport: Arc<ScriptedTransport>) -> AiClient {
    let settings = InferenceSettings {
        retry: RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        },
        ..InferenceSettings::default()
    };
    AiClient::with_transport(transport, settings)
}

fn gate() -> Arc<AlertGate> {
    Arc::new(AlertGate::new(AlertPolicy {
        threshold: 0.5,
        min_interval: Duration::from_secs(60),
    }))
}

fn recording(id: &str, fail: bool, deliveries: &Deliveries) -> Box<dyn NotificationChannel> {
    Box::new(RecordingChannel {
        id: id.to_string(),
        fail,
        deliveries: deliveries.clone(),
    })
}

fn scheduler(
    source: FakeSource,
    transport: Arc<ScriptedTransport>,
    gate: Arc<AlertGate>,
    fanout: NotificationFanout,
    clock: Arc<ManualClock>,
) -> Scheduler {
    Scheduler::new(
        Box::new(source),
        client(transport),
        gate,
        fanout,
        SupervisorPolicy::default(),
        clock,
        SchedulePolicy::default(),
    )
}

// ========================================
// Tests
// ========================================

#[tokio::test]
async fn test_alert_then_rate_limited_then_alert_again() {
    let clock = Arc::new(ManualClock::new(start()));
    let deliveries: Deliveries = Arc::default();
    let fanout = NotificationFanout::new()
        .with_channel(recording("chat", false, &deliveries))
        .with_channel(recording("siren", false, &deliveries));
    let transport = ScriptedTransport::always(scored(0.9, "intruder at the door"));
    let mut sched = scheduler(FakeSource::healthy(), transport, gate(), fanout, clock.clone());

    let first = sched.run_cycle(Duration::from_secs(600)).await;
    let report = first.report().unwrap();
    assert!(report.decision.triggered);
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.iter().all(|o| o.success));

    clock.advance(chrono::Duration::seconds(10));
    let second = sched.run_cycle(Duration::from_secs(600)).await;
    assert!(!second.report().unwrap().decision.triggered);
    assert!(second.report().unwrap().outcomes.is_empty());

    clock.advance(chrono::Duration::seconds(51));
    let third = sched.run_cycle(Duration::from_secs(600)).await;
    assert!(third.report().unwrap().decision.triggered);

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 4);
    assert_eq!(deliveries[0].1, "intruder at the door");
    assert!(deliveries[0].2, "latest frame attached as media");
}

#[tokio::test]
async fn test_low_score_does_not_alert() {
    let clock = Arc::new(ManualClock::new(start()));
    let deliveries: Deliveries = Arc::default();
    let fanout = NotificationFanout::new().with_channel(recording("chat", false, &deliveries));
    let transport = ScriptedTransport::always(scored(0.2, "all quiet"));
    let mut sched = scheduler(FakeSource::healthy(), transport, gate(), fanout, clock);

    let outcome = sched.run_cycle(Duration::from_secs(600)).await;

    let report = outcome.report().unwrap();
    assert_eq!(report.assessment.result.score, 0.2);
    assert!(!report.decision.triggered);
    assert!(deliveries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failing_channel_does_not_block_next() {
    let clock = Arc::new(ManualClock::new(start()));
    let deliveries: Deliveries = Arc::default();
    let fanout = NotificationFanout::new()
        .with_channel(recording("chat", true, &deliveries))
        .with_channel(recording("speech", false, &deliveries));
    let transport = ScriptedTransport::always(scored(0.95, "fall detected"));
    let mut sched = scheduler(FakeSource::healthy(), transport, gate(), fanout, clock);

    let outcome = sched.run_cycle(Duration::from_secs(600)).await;

    let outcomes = &outcome.report().unwrap().outcomes;
    assert_eq!(outcomes.len(), 2);
    assert!(!outcomes[0].success);
    assert!(outcomes[0].error.as_deref().unwrap().contains("502"));
    assert!(outcomes[1].success);
    assert_eq!(deliveries.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_gate_recorded_before_slow_dispatch_finishes() {
    let clock = Arc::new(ManualClock::new(start()));
    let gate = gate();
    let reentrant = Arc::new(Mutex::new(None));
    let fanout = NotificationFanout::new().with_channel(Box::new(SlowChannel {
        gate: gate.clone(),
        clock: clock.clone(),
        reentrant_triggered: reentrant.clone(),
    }));
    let transport = ScriptedTransport::always(scored(0.9, "smoke"));
    let mut sched = scheduler(FakeSource::healthy(), transport, gate.clone(), fanout, clock);

    let outcome = sched.run_cycle(Duration::from_secs(600)).await;

    assert!(outcome.report().unwrap().decision.triggered);
    assert_eq!(*reentrant.lock().unwrap(), Some(false));
    assert_eq!(gate.last_alert().await, Some(start()));
}

#[tokio::test]
async fn test_source_failures_trigger_single_reacquire() {
    let clock = Arc::new(ManualClock::new(start()));
    let source = FakeSource::failing(11);
    let reacquires = source.reacquires.clone();
    let transport = ScriptedTransport::always(scored(0.1, "quiet"));
    let mut sched = scheduler(source, transport.clone(), gate(), NotificationFanout::new(), clock);

    let mut actions = Vec::new();
    for _ in 0..11 {
        actions.push(sched.run_cycle(Duration::from_secs(600)).await.action());
    }

    assert_eq!(*reacquires.lock().unwrap(), 1);
    assert_eq!(actions[9], SupervisorAction::Reacquire { failures: 10 });
    assert_eq!(transport.calls(), 0);

    let recovered = sched.run_cycle(Duration::from_secs(600)).await;
    assert!(matches!(recovered, CycleOutcome::Completed { .. }));
    assert_eq!(sched.supervisor().counters().source_acquisition, 0);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_unreachable_endpoint_requests_restart() {
    let clock = Arc::new(ManualClock::new(start()));
    let transport = ScriptedTransport::always(TransportReply::Timeout("timed out".to_string()));
    let mut sched = scheduler(
        FakeSource::healthy(),
        transport.clone(),
        gate(),
        NotificationFanout::new(),
        clock,
    );

    let shutdown = sched.run().await;

    assert_eq!(
        shutdown,
        Shutdown::Restart(RestartCause::ConnectivityLost { failures: 20 })
    );
    assert_eq!(transport.calls(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_handled_http_errors_never_request_restart() {
    let clock = Arc::new(ManualClock::new(start()));
    let transport = ScriptedTransport::always(TransportReply::Response {
        status: 401,
        body: "unauthorized".to_string(),
    });
    let mut sched = scheduler(
        FakeSource::healthy(),
        transport.clone(),
        gate(),
        NotificationFanout::new(),
        clock,
    );

    for _ in 0..25 {
        let outcome = sched.run_cycle(Duration::from_secs(600)).await;
        assert_eq!(outcome.action(), SupervisorAction::Continue);
        let report = outcome.report().unwrap();
        assert_eq!(report.assessment.risk, RiskValue::Unknown);
        assert!(!report.decision.triggered);
    }
    assert_eq!(sched.supervisor().counters().connectivity, 0);
}

#[tokio::test(start_paused = true)]
async fn test_uptime_ceiling_restarts_before_cycling() {
    let clock = Arc::new(ManualClock::new(start()));
    let transport = ScriptedTransport::always(scored(0.1, "quiet"));
    let mut sched = scheduler(
        FakeSource::healthy(),
        transport.clone(),
        gate(),
        NotificationFanout::new(),
        clock.clone(),
    );

    clock.advance(chrono::Duration::hours(24));
    let shutdown = sched.run().await;

    assert!(matches!(
        shutdown,
        Shutdown::Restart(RestartCause::UptimeCeiling { .. })
    ));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_burst_cycles_use_short_window_then_stop() {
    let clock = Arc::new(ManualClock::new(start()));
    let handle_slot: Arc<Mutex<Option<StopHandle>>> = Arc::default();
    let mut source = FakeSource::healthy();
    source.stop_after = Some((3, handle_slot.clone()));
    let spans = source.acquired_spans.clone();

    let transport = ScriptedTransport::always(scored(0.1, "quiet"));
    let policy = SchedulePolicy {
        burst_cycles: 2,
        burst_window: Duration::from_secs(10),
        window_span: Duration::from_secs(600),
        ..SchedulePolicy::default()
    };
    let mut sched = Scheduler::new(
        Box::new(source),
        client(transport),
        gate(),
        NotificationFanout::new(),
        SupervisorPolicy::default(),
        clock,
        policy,
    );
    *handle_slot.lock().unwrap() = Some(sched.stop_handle());

    let shutdown = sched.run().await;

    assert_eq!(shutdown, Shutdown::Stopped);
    assert_eq!(
        *spans.lock().unwrap(),
        vec![
            Duration::from_secs(10),
            Duration::from_secs(10),
            Duration::from_secs(600)
        ]
    );
}
