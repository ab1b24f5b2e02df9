//! Repairing structured output from free-text model replies.
//!
//! Replies are tried as JSON in this order:
//! 1. the whole text
//! 2. the last fenced ```` ```json ```` block
//! 3. the first balanced `{ ... }` span that parses, trying at most
//!    [`MAX_OBJECT_CANDIDATES`] opening braces

use serde_json::{Map, Value};

use super::state::JsonObject;

/// Sections every synthesised plan must carry.
pub const PLAN_SECTIONS: [&str; 4] = ["overview", "itinerary", "safety", "finance"];

/// Opening braces tried as the start of an embedded object. Keeps the scan
/// linear in the reply length.
pub const MAX_OBJECT_CANDIDATES: usize = 64;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty response")]
    Empty,

    #[error("no valid JSON found: {0}")]
    InvalidJson(String),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("score must be a number between 0 and 1, got {0}")]
    InvalidScore(String),

    #[error("missing section '{0}'")]
    MissingSection(&'static str),
}

/// Find and parse the JSON value in a model reply.
pub fn extract_json(text: &str) -> Result<Value, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let whole_error = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    if let Some(block) = last_fenced_block(text) {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            return Ok(value);
        }
    }

    for (start, _) in text.match_indices('{').take(MAX_OBJECT_CANDIDATES) {
        if let Some(end) = balanced_object_end(&text[start..]) {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..start + end]) {
                return Ok(value);
            }
        }
    }

    Err(ParseError::InvalidJson(whole_error))
}

fn last_fenced_block(text: &str) -> Option<&str> {
    let mut last = None;
    let mut search_from = 0;
    while let Some(start) = text[search_from..].find("```json") {
        let body_start = search_from + start + "```json".len();
        match text[body_start..].find("```") {
            Some(end) => {
                last = Some(text[body_start..body_start + end].trim());
                search_from = body_start + end + 3;
            }
            None => break,
        }
    }
    last
}

/// Byte length of the `{ ... }` span at the start of `text`, honouring
/// string literals and escapes.
fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse a reply that must be a JSON object.
pub fn parse_object(text: &str) -> Result<JsonObject, ParseError> {
    match extract_json(text)? {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::NotAnObject(kind(&other))),
    }
}

/// Parse the gate's reply into a score in `[0, 1]`.
///
/// The score is read from `score`, falling back to `confidence_score`. A
/// reply without either key scores zero.
pub fn parse_confidence(text: &str) -> Result<f64, ParseError> {
    let fields = parse_object(text)?;
    let raw = fields
        .get("score")
        .filter(|v| !v.is_null())
        .or_else(|| fields.get("confidence_score").filter(|v| !v.is_null()));

    let score = match raw {
        None => return Ok(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(other) => return Err(ParseError::InvalidScore(other.to_string())),
    };

    match score {
        Some(score) if score.is_finite() && (0.0..=1.0).contains(&score) => Ok(score),
        _ => Err(ParseError::InvalidScore(
            raw.map(|v| v.to_string()).unwrap_or_default(),
        )),
    }
}

/// Parse the synthesised plan and check it carries every section.
pub fn parse_plan(text: &str) -> Result<JsonObject, ParseError> {
    let plan = parse_object(text)?;
    check_plan_sections(&plan)?;
    Ok(plan)
}

pub fn check_plan_sections(plan: &Map<String, Value>) -> Result<(), ParseError> {
    for section in PLAN_SECTIONS {
        match plan.get(section) {
            None | Some(Value::Null) => return Err(ParseError::MissingSection(section)),
            Some(_) => {}
        }
    }
    Ok(())
}
