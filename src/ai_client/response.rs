//! Analyzer response recovery
//!
//! Models asked for `{"score": float, "text": string}` frequently wrap it in
//! prose or code fences, drop a brace, or send the score as a string. Recovery
//! runs in order: direct decode, bracket repair, first balanced `{...}` block.

use crate::error::{Error, Result};
use crate::models::{clamp_unit, ScoreResult, NO_SUMMARY};
use serde_json::{Map, Value};

/// Pull `choices[0].message.content` out of a chat-completions body
pub fn extract_content(body: &str) -> Result<String> {
    let envelope: Value = serde_json::from_str(body)?;

    let content = envelope
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .ok_or_else(|| Error::Parse("missing choices[0].message.content".to_string()))?;

    match content {
        Value::String(s) => Ok(s.trim().to_string()),
        // Some servers return content parts
        Value::Array(parts) => {
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect();
            if text.is_empty() {
                Err(Error::Parse("content parts carry no text".to_string()))
            } else {
                Ok(text.join("\n").trim().to_string())
            }
        }
        other => Err(Error::Parse(format!("unexpected content type: {}", other))),
    }
}

/// Recover a score object from message content
///
/// Returns `None` when every recovery step fails.
pub fn recover_score(content: &str) -> Option<ScoreResult> {
    let trimmed = content.trim();

    if let Some(result) = decode(trimmed) {
        return Some(result);
    }

    if let Some(repaired) = repair_brackets(trimmed) {
        if let Some(result) = decode(&repaired) {
            tracing::debug!("Analyzer response recovered by bracket repair");
            return Some(result);
        }
    }

    if let Some(block) = first_balanced_object(trimmed) {
        if let Some(result) = decode(block) {
            tracing::debug!("Analyzer response recovered from embedded object");
            return Some(result);
        }
    }

    None
}

/// Decode an object carrying a `score` key
fn decode(candidate: &str) -> Option<ScoreResult> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) if map.contains_key("score") => Some(normalize(&map)),
        _ => None,
    }
}

/// Coerce score to f64 in `[0,1]` and default missing text
fn normalize(map: &Map<String, Value>) -> ScoreResult {
    let score = match map.get("score") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };

    let text = ["text", "message"]
        .iter()
        .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(NO_SUMMARY);

    ScoreResult::new(clamp_unit(score), text)
}

/// Wrap content in braces where they are missing
fn repair_brackets(content: &str) -> Option<String> {
    if content.is_empty() {
        return None;
    }

    let open = content.starts_with('{');
    let close = content.ends_with('}');
    if open && close {
        return None;
    }

    let mut repaired = String::with_capacity(content.len() + 2);
    if !open {
        repaired.push('{');
    }
    repaired.push_str(content);
    if !close {
        repaired.push('}');
    }
    Some(repaired)
}

/// First `{...}` block with balanced braces, ignoring braces inside strings
fn first_balanced_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}
