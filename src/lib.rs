//! Riskwatch Library
//!
//! Unattended observation monitor
//!
//! ## Architecture (7 Components)
//!
//! 1. ObservationSource - Window acquisition (event log, camera)
//! 2. AiClient - Scoring endpoint adapter with retry and response recovery
//! 3. RiskExtractor - Risk marker parsing from free text
//! 4. AlertGate - Threshold and minimum-interval decision
//! 5. NotificationFanout - Multi-channel alert dispatch
//! 6. ResilienceSupervisor - Failure counting, reacquisition and restart
//! 7. Scheduler - Cycle loop tying the above together
//!
//! ## Design Principles
//!
//! - Every cycle yields a score; inference never fails the loop
//! - One failing channel never blocks the others
//! - Unknown risk never escalates

pub mod ai_client;
pub mod alert_gate;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod notification_fanout;
pub mod observation_source;
pub mod resilience_supervisor;
pub mod risk_extractor;
pub mod scheduler;

pub use error::{Error, Result};
pub use config::AppConfig;
