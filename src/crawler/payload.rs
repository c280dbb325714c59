//! Comment payload decoding
//!
//! This module turns a raw response body into validated data:
//! - Stripping the optional callback wrapper around the JSON document
//! - Enforcing the minimal `result.commentList` shape
//! - Projecting each loosely typed entry onto a strict [`CommentView`]
//!
//! Unknown fields are ignored everywhere; only the fields the collector
//! relies on are enforced.

use crate::{HarvestError, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Fields every comment entry must carry with a non-empty value
pub const REQUIRED_FIELDS: [&str; 3] = ["commentNo", "contents", "regTime"];

fn callback_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)^[^(]*\((.*)\)\s*;?\s*$").ok())
        .as_ref()
}

/// Decodes a response body into a JSON value
///
/// Accepts bare JSON objects and callback-wrapped JSON such as
/// `_callback({...});`. HTML error pages and empty bodies are rejected.
///
/// # Arguments
///
/// * `body` - Raw response text
///
/// # Returns
///
/// * `Ok(Value)` - The decoded document
/// * `Err(HarvestError::Parse)` - The body is not a recognizable payload
pub fn parse_payload(body: &str) -> Result<Value> {
    let text = body.trim();
    if text.is_empty() {
        return Err(HarvestError::Parse("Empty response body".to_string()));
    }
    if text.starts_with('<') {
        return Err(HarvestError::Parse("HTML response detected".to_string()));
    }

    let json = if text.starts_with('{') {
        text
    } else {
        callback_pattern()
            .and_then(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| HarvestError::Parse("Unable to strip callback wrapper".to_string()))?
    };

    serde_json::from_str(json).map_err(|e| HarvestError::Parse(format!("JSON decode failed: {}", e)))
}

/// Checks the minimal payload shape: an object `result` holding an array `commentList`
pub fn validate_schema(payload: &Value) -> Result<()> {
    let result = payload
        .get("result")
        .ok_or_else(|| HarvestError::Schema("Missing 'result' container".to_string()))?;

    if !result.is_object() {
        return Err(HarvestError::Schema("'result' is not an object".to_string()));
    }

    match result.get("commentList") {
        Some(Value::Array(_)) => Ok(()),
        Some(_) => Err(HarvestError::Schema(
            "'result.commentList' is not an array".to_string(),
        )),
        None => Err(HarvestError::Schema(
            "Missing 'result.commentList'".to_string(),
        )),
    }
}

/// Returns the comment entries of a schema-valid payload
pub fn extract_comments(payload: &Value) -> &[Value] {
    payload
        .pointer("/result/commentList")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Returns the continuation cursor, if the payload announces another page
///
/// An empty string or a numeric zero marks the last page.
pub fn extract_cursor(payload: &Value) -> Option<String> {
    match payload.pointer("/result/pageModel/next")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Returns the comment total the API reports for the whole article
pub fn extract_total_count(payload: &Value) -> Option<i64> {
    let result = payload.get("result")?;
    [
        result.get("commentCount"),
        result.get("realCommentCount"),
        result.pointer("/count/comment"),
        result.pointer("/count/total"),
    ]
    .into_iter()
    .flatten()
    .find_map(parse_int)
}

/// Strict projection of one comment entry
#[derive(Debug, Clone, PartialEq)]
pub struct CommentView {
    pub comment_id: String,
    pub body: String,
    /// Raw authored-at value, normalized later
    pub authored_at: String,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub sympathy_count: i64,
    pub antipathy_count: i64,
    pub reply_count: i64,
    pub is_deleted: bool,
    pub is_blind: bool,
}

impl CommentView {
    /// Projects an entry, returning the names of absent required fields on failure
    pub fn project(entry: &Value) -> std::result::Result<Self, Vec<&'static str>> {
        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| entry.get(field).map_or(true, is_blank))
            .collect();

        if !missing.is_empty() {
            return Err(missing);
        }

        let text = |field: &str| entry.get(field).and_then(scalar_text).unwrap_or_default();

        let reply_count = match entry.get("replyCount") {
            Some(v) if !v.is_null() => lenient_int(v),
            _ => entry.get("childCount").map_or(0, lenient_int),
        };

        Ok(Self {
            comment_id: text("commentNo"),
            body: text("contents"),
            authored_at: text("regTime"),
            author_id: ["userId", "profileUserId"]
                .iter()
                .filter_map(|f| entry.get(*f))
                .find(|v| !is_blank(v))
                .and_then(scalar_text),
            author_name: entry
                .get("userName")
                .filter(|v| !is_blank(v))
                .and_then(scalar_text),
            sympathy_count: entry.get("sympathyCount").map_or(0, lenient_int),
            antipathy_count: entry.get("antipathyCount").map_or(0, lenient_int),
            reply_count,
            is_deleted: entry.get("isDeleted").map_or(false, |v| !is_blank(v)),
            is_blind: entry.get("isBlind").map_or(false, |v| !is_blank(v)),
        })
    }
}

/// Formats the violation reason for a list of missing fields
pub fn missing_fields_reason(missing: &[&str]) -> String {
    format!("Missing fields on comment: {}", missing.join(","))
}

/// Null, empty, zero and false count as absent
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses an integer from a number or a numeric string
pub(crate) fn parse_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn lenient_int(value: &Value) -> i64 {
    parse_int(value).unwrap_or(0)
}
