//! Storage module for persisting harvest data
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Run lifecycle and finalization
//! - Article status tracking for idempotent resume
//! - Comment, statistics and event persistence

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::ArticleStatus;
use crate::HarvestError;

use std::path::Path;

/// Decades covered by the age breakdown of the statistics endpoint
pub const AGE_BUCKETS: [u8; 7] = [10, 20, 30, 40, 50, 60, 70];

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// One collected comment or reply
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub comment_id: String,
    pub oid: String,
    pub aid: String,
    /// Set iff `depth == 1`
    pub parent_id: Option<String>,
    pub depth: u8,
    pub body: String,
    pub author_hash: Option<String>,
    pub author_raw: Option<String>,
    pub authored_at: String,
    pub collected_at: String,
    pub snapshot_at: String,
    pub sympathy_count: i64,
    pub antipathy_count: i64,
    pub reply_count: i64,
    pub is_deleted: bool,
    pub is_blind: bool,
}

/// Represents an article row of one run
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    pub run_id: String,
    pub oid: String,
    pub aid: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub status: ArticleStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub updated_at: String,
}

/// Parameters of a run being started or resumed
#[derive(Debug, Clone)]
pub struct NewRun {
    pub run_id: String,
    pub snapshot_at: String,
    pub timezone: String,
    pub config_hash: String,
}

/// Terminal values written when a run is finalized
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub status: RunStatus,
    pub notes: String,
    pub total_articles: u64,
    pub total_comments: u64,
    pub volume_grade: Option<String>,
    pub health_score: Option<u32>,
    pub health_flags: Option<String>,
}

/// Represents a harvester run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub snapshot_at: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub timezone: String,
    pub config_hash: String,
    /// None while the run is still in progress
    pub status: Option<RunStatus>,
    pub notes: Option<String>,
    pub total_articles: u64,
    pub total_comments: u64,
    pub volume_grade: Option<String>,
    pub health_score: Option<u32>,
    pub health_flags: Option<String>,
}

/// One persisted operational event
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: i64,
    pub run_id: String,
    pub timestamp: String,
    pub event_type: String,
    pub summary: String,
    pub details: Option<String>,
}

/// Normalized demographic breakdown of an article's commenters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentStats {
    pub total_comments: Option<i64>,
    pub male_ratio: Option<f64>,
    pub female_ratio: Option<f64>,
    /// Ratios aligned with [`AGE_BUCKETS`]
    pub age_ratios: [Option<f64>; 7],
}

/// Final status of a harvester run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every article was processed
    Success,
    /// Interrupted by an unexpected error, a panic or a signal
    Partial,
    /// The stop strategy ended the run early
    Stopped,
    /// A structural abort or ban signal ended the run
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Partial => "PARTIAL",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(Self::Success),
            "PARTIAL" => Some(Self::Partial),
            "STOPPED" => Some(Self::Stopped),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}
