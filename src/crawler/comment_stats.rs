//! Demographic statistics payload normalization

use crate::crawler::payload::extract_total_count;
use crate::storage::{CommentStats, AGE_BUCKETS};
use crate::{HarvestError, Result};
use serde_json::Value;

/// Normalizes a decoded statistics payload
///
/// Gender entries map `M`/`F` onto male/female ratios and age entries map the
/// decade labels `10`..`70` onto [`AGE_BUCKETS`]. Entries that are absent stay
/// `None`; unknown labels are ignored.
pub fn normalize_stats(payload: &Value) -> Result<CommentStats> {
    let result = payload
        .get("result")
        .filter(|r| r.is_object())
        .ok_or_else(|| HarvestError::Parse("Invalid stats payload: missing 'result'".to_string()))?;

    let mut stats = CommentStats {
        total_comments: extract_total_count(payload),
        ..CommentStats::default()
    };

    for entry in entries(result, "commentByGender") {
        let gender = entry
            .get("gender")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_ascii_uppercase();
        let ratio = entry.get("ratio").and_then(parse_ratio);
        match gender.as_str() {
            "M" => stats.male_ratio = ratio,
            "F" => stats.female_ratio = ratio,
            _ => {}
        }
    }

    for entry in entries(result, "commentByAge") {
        let label = match entry.get("age") {
            Some(Value::String(s)) => s.trim().parse::<u8>().ok(),
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
            _ => None,
        };
        if let Some(slot) = label.and_then(|age| AGE_BUCKETS.iter().position(|&b| b == age)) {
            stats.age_ratios[slot] = entry.get("ratio").and_then(parse_ratio);
        }
    }

    Ok(stats)
}

fn entries<'a>(result: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> {
    result
        .get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn parse_ratio(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
