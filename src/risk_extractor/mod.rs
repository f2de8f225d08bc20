//! RiskExtractor - Risk Marker Parsing
//!
//! ## Responsibilities
//!
//! - Pull a normalized risk out of free-text analyzer output
//! - Distinguish "no determinable risk" from "zero risk"
//!
//! The vision prompt asks the model to finish its answer with a line such as
//! `RISK=0.35`. The marker is matched case-insensitively as a whole word, so
//! `LOWRISK=0.9` is not a marker. Extra fraction digits are accepted.

use crate::models::RiskValue;
use regex::Regex;
use std::sync::OnceLock;

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"(?i)\bRISK\s*=\s*([0-9]+(?:\.[0-9]+)?)").expect("risk marker pattern is valid")
    })
}

/// Extract the first in-range risk marker from analyzer text
///
/// Returns `RiskValue::Unknown` when there is no marker, or when every marker
/// is out of `[0,1]`. Callers must treat `Unknown` as non-triggering, not as
/// safe.
pub fn extract_risk(text: &str) -> RiskValue {
    for caps in marker_regex().captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        let literal = m.as_str();

        match literal.parse::<f64>() {
            Ok(value) => {
                if let RiskValue::Known(v) = RiskValue::from_unit(value) {
                    return RiskValue::Known(v);
                }
                tracing::debug!(marker = %literal, "Risk marker out of range");
            }
            Err(e) => {
                tracing::debug!(marker = %literal, error = %e, "Risk marker not numeric");
            }
        }
    }

    RiskValue::Unknown
}
