//! AIClient - Scoring Endpoint Adapter
//!
//! ## Responsibilities
//!
//! - Serialize an observation window into a chat-completions request
//! - Retry transient failures (timeout, 429, 5xx) with backoff and jitter
//! - Recover malformed analyzer responses
//! - Always produce a well-formed assessment (never returns an error)

pub mod response;
pub mod retry;
pub mod transport;

pub use retry::{AttemptOutcome, RetryCause, RetryPolicy};
pub use transport::{HttpTransport, InferenceTransport, TransportReply};

use crate::models::{
    Assessment, ObservationWindow, Payload, Reachability, RiskValue, ScoreResult,
};
use crate::risk_extractor::extract_risk;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Default inference settings
pub mod defaults {
    pub const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
    pub const MODEL: &str = "gpt-4.1";
    pub const TIMEOUT_SECS: u64 = 30;
    pub const TEMPERATURE: f32 = 0.0;
    pub const SYSTEM_PROMPT: &str = "You are a security monitoring expert. \
        Reply ONLY with a valid JSON object with keys \
        {\"score\": float between 0 and 1, \"text\": string}. \
        Do not include anything outside the JSON object.";
    pub const ANALYSIS_PROMPT: &str =
        "Analyze the events and return JSON {\"score\":float,\"text\":string}.";
    pub const VISION_SYSTEM_PROMPT: &str = "You are a monitoring assistant caring for an elderly person. \
        Describe briefly what happens in the image, whether the person is standing, sitting, \
        lying down or absent, and whether they seem to need help (fall, disorientation, \
        prolonged inactivity). Use an empathetic, professional tone.\n\
        Output format:\n\
        Description: <what happens in the scene>\n\
        Assessment: <normal activity or possible risk>\n\
        Alert: <notify caregivers if appropriate>\n\
        RISK=<value between 0.0 and 1.0>";
}

/// How the analyzer encodes its verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// JSON object `{score, text}`
    Structured,
    /// Free text ending in a `RISK=<value>` marker
    RiskMarker,
}

impl std::str::FromStr for ResponseMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" | "structured" => Ok(Self::Structured),
            "marker" | "risk_marker" | "text" => Ok(Self::RiskMarker),
            other => Err(crate::Error::Config(format!("unknown response mode: {}", other))),
        }
    }
}

/// Inference client settings
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub system_prompt: String,
    pub analysis_prompt: String,
    pub mode: ResponseMode,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            endpoint: defaults::ENDPOINT.to_string(),
            api_key: None,
            model: defaults::MODEL.to_string(),
            system_prompt: defaults::SYSTEM_PROMPT.to_string(),
            analysis_prompt: defaults::ANALYSIS_PROMPT.to_string(),
            mode: ResponseMode::Structured,
            temperature: defaults::TEMPERATURE,
            max_tokens: None,
            timeout: Duration::from_secs(defaults::TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Terminal state of the retry loop
enum CallOutcome {
    Body(String),
    Rejected(String),
    Exhausted { cause: RetryCause, detail: String },
}

/// Scoring endpoint client
pub struct AiClient {
    transport: Arc<dyn InferenceTransport>,
    settings: InferenceSettings,
}

impl AiClient {
    /// Create client over HTTP
    pub fn new(settings: InferenceSettings) -> crate::Result<Self> {
        let transport = HttpTransport::new(
            settings.endpoint.clone(),
            settings.api_key.clone(),
            settings.timeout,
        )?;
        Ok(Self::with_transport(Arc::new(transport), settings))
    }

    /// Create client over an arbitrary transport
    pub fn with_transport(transport: Arc<dyn InferenceTransport>, settings: InferenceSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    /// Score a window
    ///
    /// Total: every failure path converges to a valid assessment.
    pub async fn analyze(&self, window: &ObservationWindow) -> Assessment {
        if window.is_empty() {
            let result = ScoreResult::new(
                0.0,
                format!("no recent observations @ {}", Utc::now().to_rfc3339()),
            );
            return Assessment::scored(result);
        }

        let body = self.build_request(window);

        match self.request_with_retry(&body).await {
            CallOutcome::Body(body) => self.interpret(&body),
            CallOutcome::Rejected(detail) => Assessment::degraded(
                ScoreResult::degraded(format!("analyzer request rejected: {}", detail)),
                Reachability::Reached,
            ),
            CallOutcome::Exhausted { cause, detail } => {
                let reachability = if cause.is_network() {
                    Reachability::Unreachable
                } else {
                    Reachability::Reached
                };
                Assessment::degraded(
                    ScoreResult::degraded(format!("analyzer unavailable ({}): {}", cause, detail)),
                    reachability,
                )
            }
        }
    }

    async fn request_with_retry(&self, body: &Value) -> CallOutcome {
        let policy = self.settings.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let reply = self.transport.post(body).await;

            match AttemptOutcome::classify(reply) {
                AttemptOutcome::Success(body) => {
                    if attempt > 1 {
                        tracing::info!(attempt = attempt, "Analyzer request succeeded after retry");
                    }
                    return CallOutcome::Body(body);
                }
                AttemptOutcome::Fatal(detail) => {
                    tracing::warn!(attempt = attempt, detail = %detail, "Analyzer request rejected, not retrying");
                    return CallOutcome::Rejected(detail);
                }
                AttemptOutcome::Retriable { cause, detail } => {
                    if attempt >= max_attempts {
                        tracing::warn!(
                            attempts = attempt,
                            cause = %cause,
                            detail = %detail,
                            "Analyzer request failed, retries exhausted"
                        );
                        return CallOutcome::Exhausted { cause, detail };
                    }

                    let delay = policy.delay(attempt, cause);
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        cause = %cause,
                        delay_ms = delay.as_millis() as u64,
                        detail = %detail,
                        "Analyzer request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn interpret(&self, body: &str) -> Assessment {
        let content = match response::extract_content(body) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, raw = %crate::models::truncate_chars(body, 200), "Unexpected analyzer envelope");
                return Assessment::degraded(
                    ScoreResult::degraded("unexpected analyzer response").with_raw(body),
                    Reachability::Reached,
                );
            }
        };

        match self.settings.mode {
            ResponseMode::Structured => match response::recover_score(&content) {
                Some(result) => Assessment::scored(result),
                None => {
                    tracing::warn!(raw = %crate::models::truncate_chars(&content, 200), "Invalid analyzer response");
                    Assessment::degraded(
                        ScoreResult::degraded("invalid analyzer response").with_raw(&content),
                        Reachability::Reached,
                    )
                }
            },
            ResponseMode::RiskMarker => {
                let risk = extract_risk(&content);
                if risk == RiskValue::Unknown {
                    tracing::warn!(raw = %crate::models::truncate_chars(&content, 200), "No usable risk marker in analyzer response");
                }
                Assessment {
                    result: ScoreResult::new(risk.known().unwrap_or(0.0), content),
                    risk,
                    reachability: Reachability::Reached,
                }
            }
        }
    }

    /// Build the chat-completions request body
    pub fn build_request(&self, window: &ObservationWindow) -> Value {
        let settings = &self.settings;

        let user_content = match window.latest_image() {
            Some(frame) => {
                let mut parts = Vec::new();
                if !settings.analysis_prompt.trim().is_empty() {
                    parts.push(json!({"type": "text", "text": settings.analysis_prompt}));
                }
                if let Some((bytes, mime)) = frame.image() {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                    parts.push(json!({
                        "type": "image_url",
                        "image_url": {"url": format!("data:{};base64,{}", mime, encoded)}
                    }));
                }
                Value::Array(parts)
            }
            None => Value::String(format!(
                "{}\n\nEvents:\n{}",
                settings.analysis_prompt,
                render_events(window)
            )),
        };

        let mut body = json!({
            "model": settings.model,
            "messages": [
                {"role": "system", "content": settings.system_prompt},
                {"role": "user", "content": user_content},
            ],
            "temperature": settings.temperature,
        });

        if settings.mode == ResponseMode::Structured {
            body["response_format"] = json!({"type": "json_object"});
        }
        if let Some(max_tokens) = settings.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        body
    }
}

/// One line per event: `[timestamp] source: description (value=...)`
fn render_events(window: &ObservationWindow) -> String {
    window
        .observations()
        .iter()
        .filter_map(|o| match &o.payload {
            Payload::Event { description, value } => Some(format!(
                "[{}] {}: {} (value={})",
                o.timestamp.to_rfc3339(),
                o.source,
                description,
                value.map(|v| v.to_string()).unwrap_or_else(|| "none".to_string())
            )),
            Payload::Image { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
