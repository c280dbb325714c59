//! Conversion of validated comment views into storage records
//!
//! Every timestamp written by a run is rendered in one fixed UTC offset so
//! records from the same snapshot compare lexically.

use crate::config::{ReferenceTime, SnapshotConfig};
use crate::crawler::payload::CommentView;
use crate::privacy::AuthorHasher;
use crate::state::{ArticleKey, PageScope};
use crate::storage::CommentRecord;
use crate::ConfigError;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};

/// Builds the fixed offset for a whole-hour UTC shift
pub fn fixed_offset(hours: i32) -> Result<FixedOffset, ConfigError> {
    FixedOffset::east_opt(hours * 3600).ok_or_else(|| {
        ConfigError::Validation(format!("Invalid timezone offset: {} hours", hours))
    })
}

/// Resolves the snapshot marker of a new run
///
/// `start` anchors the run to `now`; `manual` uses the configured instant.
/// Either way the marker is rendered in `offset`.
pub fn resolve_snapshot(
    config: &SnapshotConfig,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<String, ConfigError> {
    match config.reference_time {
        ReferenceTime::Start => Ok(now.with_timezone(&offset).to_rfc3339()),
        ReferenceTime::Manual => {
            let raw = config.manual_snapshot_time.as_deref().unwrap_or("");
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&offset).to_rfc3339())
                .map_err(|e| {
                    ConfigError::Validation(format!("Invalid manual snapshot time '{}': {}", raw, e))
                })
        }
    }
}

/// Normalizes an authored-at value to RFC 3339 in `offset`
///
/// Accepts epoch seconds, epoch milliseconds (more than ten digits), RFC 3339
/// and `2024-01-01T09:00:00+0900` style values.
///
/// # Returns
///
/// `None` if the value matches none of the accepted forms
pub fn normalize_timestamp(raw: &str, offset: FixedOffset) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        let number: i64 = value.parse().ok()?;
        let instant = if value.len() > 10 {
            offset.timestamp_millis_opt(number).single()?
        } else {
            offset.timestamp_opt(number, 0).single()?
        };
        return Some(instant.to_rfc3339());
    }

    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|dt| dt.with_timezone(&offset).to_rfc3339())
}

/// Turns comment views into records anchored to one run snapshot
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    hasher: AuthorHasher,
    allow_pii: bool,
    offset: FixedOffset,
    snapshot_at: String,
}

/// A record plus whether its authored-at value had to be kept verbatim
#[derive(Debug, Clone)]
pub struct BuiltRecord {
    pub record: CommentRecord,
    pub timestamp_anomaly: bool,
}

impl RecordBuilder {
    pub fn new(hasher: AuthorHasher, allow_pii: bool, offset: FixedOffset, snapshot_at: &str) -> Self {
        Self {
            hasher,
            allow_pii,
            offset,
            snapshot_at: snapshot_at.to_string(),
        }
    }

    pub fn snapshot_at(&self) -> &str {
        &self.snapshot_at
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Current wall-clock time in the run offset
    pub fn now(&self) -> String {
        Utc::now().with_timezone(&self.offset).to_rfc3339()
    }

    /// Builds the record for one entry of a `scope` page
    ///
    /// `parent_id` is only kept for reply pages.
    pub fn build(
        &self,
        key: &ArticleKey,
        view: CommentView,
        scope: PageScope,
        parent_id: Option<&str>,
    ) -> BuiltRecord {
        let normalized = normalize_timestamp(&view.authored_at, self.offset);
        let timestamp_anomaly = normalized.is_none();

        let author_hash = view
            .author_id
            .as_deref()
            .and_then(|id| self.hasher.hash(id));
        let author_raw = if self.allow_pii { view.author_name } else { None };

        let record = CommentRecord {
            comment_id: view.comment_id,
            oid: key.oid.clone(),
            aid: key.aid.clone(),
            parent_id: match scope {
                PageScope::Reply => parent_id.map(str::to_string),
                PageScope::Comment => None,
            },
            depth: scope.depth(),
            body: view.body,
            author_hash,
            author_raw,
            authored_at: normalized.unwrap_or(view.authored_at),
            collected_at: self.now(),
            snapshot_at: self.snapshot_at.clone(),
            sympathy_count: view.sympathy_count,
            antipathy_count: view.antipathy_count,
            reply_count: view.reply_count,
            is_deleted: view.is_deleted,
            is_blind: view.is_blind,
        };

        BuiltRecord {
            record,
            timestamp_anomaly,
        }
    }
}
