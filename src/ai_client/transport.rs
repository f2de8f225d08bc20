//! Transport seam for the scoring endpoint
//!
//! The client only needs "post this JSON, tell me what came back"; keeping
//! that behind a trait lets cycles run against scripted endpoints.

use async_trait::async_trait;
use std::time::Duration;

/// What a single POST produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportReply {
    /// Endpoint answered with a status and body
    Response { status: u16, body: String },
    /// Per-call timeout elapsed
    Timeout(String),
    /// Connection could not be established or was dropped
    Unreachable(String),
}

/// POSTs an inference request body
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    async fn post(&self, body: &serde_json::Value) -> TransportReply;
}

/// reqwest-backed transport for OpenAI-compatible chat completions
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTransport {
    /// Create transport with a per-call timeout
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl InferenceTransport for HttpTransport {
    async fn post(&self, body: &serde_json::Value) -> TransportReply {
        let mut req = self.client.post(&self.endpoint).json(body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => return classify_reqwest_error(e),
        };

        let status = resp.status().as_u16();
        match resp.text().await {
            Ok(body) => TransportReply::Response { status, body },
            Err(e) => classify_reqwest_error(e),
        }
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportReply {
    if e.is_timeout() {
        TransportReply::Timeout(e.to_string())
    } else {
        TransportReply::Unreachable(e.to_string())
    }
}
