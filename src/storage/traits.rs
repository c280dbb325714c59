//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{ArticleKey, ArticleStatus};
use crate::storage::{
    ArticleRecord, CommentRecord, CommentStats, EventRecord, NewRun, RunRecord, RunSummary,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Article not registered: {0}")]
    ArticleNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the harvester.
/// Every method addresses rows of a single run through `run_id`.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a run row, or reopens an existing one for resumption
    ///
    /// Reopening clears the terminal fields so the run can be finalized again.
    fn start_run(&mut self, run: &NewRun) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: &str) -> StorageResult<RunRecord>;

    /// Gets the most recently started run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Writes the terminal status of a run
    ///
    /// # Returns
    ///
    /// `false` if the run was already finalized, in which case nothing is written
    fn finalize_run(&mut self, run_id: &str, summary: &RunSummary) -> StorageResult<bool>;

    // ===== Article Management =====

    /// Registers an article as `PENDING` unless a row already exists
    fn register_article(
        &mut self,
        run_id: &str,
        key: &ArticleKey,
        url: Option<&str>,
        title: Option<&str>,
    ) -> StorageResult<()>;

    /// Returns true if the article already reached `SUCCESS` in this run
    fn is_article_completed(&self, run_id: &str, key: &ArticleKey) -> StorageResult<bool>;

    /// Records the status of an article
    ///
    /// # Arguments
    ///
    /// * `status` - New status
    /// * `error_code` - Machine-readable failure code, if any
    /// * `error_message` - Human-readable failure description, if any
    fn set_article_status(
        &mut self,
        run_id: &str,
        key: &ArticleKey,
        status: ArticleStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Gets an article row, if registered
    fn get_article(&self, run_id: &str, key: &ArticleKey) -> StorageResult<Option<ArticleRecord>>;

    /// Counts the articles of a run per status
    fn count_articles_by_status(&self, run_id: &str)
        -> StorageResult<Vec<(ArticleStatus, u64)>>;

    // ===== Comment Persistence =====

    /// Persists one page of records atomically
    ///
    /// Existing rows keep their identity and body; only counters, flags,
    /// reply count and collection time are refreshed.
    ///
    /// # Returns
    ///
    /// The number of records written
    fn persist_comments(&mut self, run_id: &str, records: &[CommentRecord]) -> StorageResult<usize>;

    /// Gets a comment by ID
    fn get_comment(&self, run_id: &str, comment_id: &str) -> StorageResult<Option<CommentRecord>>;

    /// Counts the comments of a run, optionally restricted to one article
    fn count_comments(&self, run_id: &str, key: Option<&ArticleKey>) -> StorageResult<u64>;

    /// Persists the statistics breakdown of an article, replacing any previous one
    fn persist_comment_stats(
        &mut self,
        run_id: &str,
        key: &ArticleKey,
        stats: &CommentStats,
        snapshot_at: &str,
    ) -> StorageResult<()>;

    /// Gets the statistics breakdown of an article
    fn get_comment_stats(&self, run_id: &str, key: &ArticleKey)
        -> StorageResult<Option<CommentStats>>;

    // ===== Events =====

    /// Appends an operational event
    fn log_event(
        &mut self,
        run_id: &str,
        event_type: &str,
        summary: &str,
        details: Option<&serde_json::Value>,
    ) -> StorageResult<()>;

    /// Lists the most recent events of a run, newest first
    fn list_events(&self, run_id: &str, limit: usize) -> StorageResult<Vec<EventRecord>>;

    /// Counts events of one type within a run
    fn count_events(&self, run_id: &str, event_type: &str) -> StorageResult<u64>;
}
