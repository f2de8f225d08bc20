//! Retry policy for the scoring endpoint
//!
//! Each attempt is classified into an explicit outcome; the retry loop
//! branches on that tag.

use super::transport::TransportReply;
use crate::models::truncate_chars;
use rand::Rng;
use std::time::Duration;

/// Default retry bounds
pub mod defaults {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_DELAY_MS: u64 = 1_000;
    pub const MAX_DELAY_MS: u64 = 30_000;
}

/// Why an attempt may be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    /// Per-call timeout
    Timeout,
    /// Connection refused / DNS / reset
    Transport,
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError(u16),
}

impl RetryCause {
    /// Transport-level failure (the endpoint was never reached)
    pub fn is_network(&self) -> bool {
        matches!(self, RetryCause::Timeout | RetryCause::Transport)
    }
}

impl std::fmt::Display for RetryCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ServerError(status) => write!(f, "server_error_{}", status),
        }
    }
}

/// Tagged result of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx with body
    Success(String),
    /// Transient failure; try again after backoff
    Retriable { cause: RetryCause, detail: String },
    /// Permanent failure; abort without retry
    Fatal(String),
}

impl AttemptOutcome {
    /// Classify a transport reply
    pub fn classify(reply: TransportReply) -> Self {
        match reply {
            TransportReply::Response { status, body } if (200..300).contains(&status) => {
                AttemptOutcome::Success(body)
            }
            TransportReply::Response { status: 429, body } => AttemptOutcome::Retriable {
                cause: RetryCause::RateLimited,
                detail: format!("HTTP 429: {}", truncate_chars(&body, 150)),
            },
            TransportReply::Response { status, body } if (500..600).contains(&status) => {
                AttemptOutcome::Retriable {
                    cause: RetryCause::ServerError(status),
                    detail: format!("HTTP {}: {}", status, truncate_chars(&body, 150)),
                }
            }
            TransportReply::Response { status, body } => {
                AttemptOutcome::Fatal(format!("HTTP {}: {}", status, truncate_chars(&body, 150)))
            }
            TransportReply::Timeout(detail) => AttemptOutcome::Retriable {
                cause: RetryCause::Timeout,
                detail,
            },
            TransportReply::Unreachable(detail) => AttemptOutcome::Retriable {
                cause: RetryCause::Transport,
                detail,
            },
        }
    }
}

/// Exponential backoff with jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::BASE_DELAY_MS),
            max_delay: Duration::from_millis(defaults::MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed `attempt` (1-based), before jitter
    ///
    /// `min(max_delay, base * 2^(attempt-1))`, doubled for rate limiting.
    pub fn pre_jitter_delay(&self, attempt: u32, cause: RetryCause) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);

        match cause {
            RetryCause::RateLimited => delay.saturating_mul(2),
            _ => delay,
        }
    }

    /// Jittered delay after failed `attempt`
    pub fn delay(&self, attempt: u32, cause: RetryCause) -> Duration {
        self.pre_jitter_delay(attempt, cause).mul_f64(jitter_factor())
    }
}

/// Uniform factor in `[0.5, 1.5)`
fn jitter_factor() -> f64 {
    rand::thread_rng().gen_range(0.5..1.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        }
    }

    #[test]
    fn test_pre_jitter_delay_grows_and_caps() {
        let p = policy();
        let cause = RetryCause::ServerError(500);
        assert_eq!(p.pre_jitter_delay(1, cause), Duration::from_millis(500));
        assert_eq!(p.pre_jitter_delay(2, cause), Duration::from_millis(1000));
        assert_eq!(p.pre_jitter_delay(3, cause), Duration::from_millis(2000));
        assert_eq!(p.pre_jitter_delay(4, cause), Duration::from_secs(4));
        assert_eq!(p.pre_jitter_delay(9, cause), Duration::from_secs(4));
    }

    #[test]
    fn test_rate_limited_delay_is_double_server_error() {
        let p = policy();
        for attempt in 1..=6 {
            assert_eq!(
                p.pre_jitter_delay(attempt, RetryCause::RateLimited),
                p.pre_jitter_delay(attempt, RetryCause::ServerError(500)) * 2,
                "attempt {}",
                attempt
            );
        }
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let p = policy();
        for _ in 0..200 {
            let d = p.delay(2, RetryCause::Timeout);
            assert!(d >= Duration::from_millis(500));
            assert!(d < Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_classify_statuses() {
        let ok = AttemptOutcome::classify(TransportReply::Response {
            status: 200,
            body: "{}".to_string(),
        });
        assert_eq!(ok, AttemptOutcome::Success("{}".to_string()));

        let limited = AttemptOutcome::classify(TransportReply::Response {
            status: 429,
            body: String::new(),
        });
        assert!(matches!(
            limited,
            AttemptOutcome::Retriable { cause: RetryCause::RateLimited, .. }
        ));

        let server = AttemptOutcome::classify(TransportReply::Response {
            status: 503,
            body: String::new(),
        });
        assert!(matches!(
            server,
            AttemptOutcome::Retriable { cause: RetryCause::ServerError(503), .. }
        ));

        let bad = AttemptOutcome::classify(TransportReply::Response {
            status: 401,
            body: "bad key".to_string(),
        });
        assert_eq!(bad, AttemptOutcome::Fatal("HTTP 401: bad key".to_string()));
    }

    #[test]
    fn test_classify_network_failures() {
        let timeout = AttemptOutcome::classify(TransportReply::Timeout("30s".to_string()));
        match timeout {
            AttemptOutcome::Retriable { cause, .. } => assert!(cause.is_network()),
            other => panic!("unexpected {:?}", other),
        }
        let refused = AttemptOutcome::classify(TransportReply::Unreachable("refused".to_string()));
        assert!(matches!(
            refused,
            AttemptOutcome::Retriable { cause: RetryCause::Transport, .. }
        ));
        assert!(!RetryCause::RateLimited.is_network());
    }
}
