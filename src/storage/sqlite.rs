//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{ArticleKey, ArticleStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    ArticleRecord, CommentRecord, CommentStats, EventRecord, NewRun, RunRecord, RunStatus,
    RunSummary,
};
use crate::HarvestError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "run_id, snapshot_at, started_at, finished_at, timezone, config_hash,
     status, notes, total_articles, total_comments, volume_grade, health_score, health_flags";

const COMMENT_COLUMNS: &str = "comment_id, oid, aid, parent_id, depth, body, author_hash,
     author_raw, authored_at, collected_at, snapshot_at, sympathy_count, antipathy_count,
     reply_count, is_deleted, is_blind";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: Option<String> = row.get(6)?;
    Ok(RunRecord {
        run_id: row.get(0)?,
        snapshot_at: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        timezone: row.get(4)?,
        config_hash: row.get(5)?,
        status: status.as_deref().and_then(RunStatus::from_db_string),
        notes: row.get(7)?,
        total_articles: row.get::<_, i64>(8)?.max(0) as u64,
        total_comments: row.get::<_, i64>(9)?.max(0) as u64,
        volume_grade: row.get(10)?,
        health_score: row.get(11)?,
        health_flags: row.get(12)?,
    })
}

fn row_to_comment(row: &Row<'_>) -> rusqlite::Result<CommentRecord> {
    Ok(CommentRecord {
        comment_id: row.get(0)?,
        oid: row.get(1)?,
        aid: row.get(2)?,
        parent_id: row.get(3)?,
        depth: row.get(4)?,
        body: row.get(5)?,
        author_hash: row.get(6)?,
        author_raw: row.get(7)?,
        authored_at: row.get(8)?,
        collected_at: row.get(9)?,
        snapshot_at: row.get(10)?,
        sympathy_count: row.get(11)?,
        antipathy_count: row.get(12)?,
        reply_count: row.get(13)?,
        is_deleted: row.get(14)?,
        is_blind: row.get(15)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn start_run(&mut self, run: &NewRun) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (run_id, snapshot_at, started_at, timezone, config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(run_id) DO UPDATE SET
                finished_at = NULL,
                status = NULL,
                notes = NULL,
                config_hash = excluded.config_hash",
            params![run.run_id, run.snapshot_at, now, run.timezone, run.config_hash],
        )?;
        Ok(())
    }

    fn get_run(&self, run_id: &str) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE run_id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], row_to_run)
            .optional()?
            .ok_or_else(|| StorageError::RunNotFound(run_id.to_string()))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM runs ORDER BY started_at DESC, run_id DESC LIMIT 1",
            RUN_COLUMNS
        );
        Ok(self.conn.query_row(&sql, [], row_to_run).optional()?)
    }

    fn finalize_run(&mut self, run_id: &str, summary: &RunSummary) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET
                finished_at = ?1,
                status = ?2,
                notes = ?3,
                total_articles = ?4,
                total_comments = ?5,
                volume_grade = ?6,
                health_score = ?7,
                health_flags = ?8
             WHERE run_id = ?9 AND finished_at IS NULL",
            params![
                now,
                summary.status.to_db_string(),
                summary.notes,
                summary.total_articles as i64,
                summary.total_comments as i64,
                summary.volume_grade,
                summary.health_score,
                summary.health_flags,
                run_id,
            ],
        )?;

        if updated == 0 {
            // Distinguish "already finalized" from "never started"
            self.get_run(run_id)?;
        }

        Ok(updated > 0)
    }

    // ===== Article Management =====

    fn register_article(
        &mut self,
        run_id: &str,
        key: &ArticleKey,
        url: Option<&str>,
        title: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO articles (run_id, oid, aid, url, title, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                key.oid,
                key.aid,
                url,
                title,
                ArticleStatus::Pending.to_db_string(),
                now
            ],
        )?;
        Ok(())
    }

    fn is_article_completed(&self, run_id: &str, key: &ArticleKey) -> StorageResult<bool> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM articles WHERE run_id = ?1 AND oid = ?2 AND aid = ?3",
                params![run_id, key.oid, key.aid],
                |row| row.get(0),
            )
            .optional()?;

        Ok(status.as_deref() == Some(ArticleStatus::Success.to_db_string()))
    }

    fn set_article_status(
        &mut self,
        run_id: &str,
        key: &ArticleKey,
        status: ArticleStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE articles SET status = ?1, error_code = ?2, error_message = ?3, updated_at = ?4
             WHERE run_id = ?5 AND oid = ?6 AND aid = ?7",
            params![
                status.to_db_string(),
                error_code,
                error_message,
                now,
                run_id,
                key.oid,
                key.aid
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::ArticleNotFound(key.to_string()));
        }

        Ok(())
    }

    fn get_article(&self, run_id: &str, key: &ArticleKey) -> StorageResult<Option<ArticleRecord>> {
        let article = self
            .conn
            .query_row(
                "SELECT run_id, oid, aid, url, title, status, error_code, error_message, updated_at
                 FROM articles WHERE run_id = ?1 AND oid = ?2 AND aid = ?3",
                params![run_id, key.oid, key.aid],
                |row| {
                    Ok(ArticleRecord {
                        run_id: row.get(0)?,
                        oid: row.get(1)?,
                        aid: row.get(2)?,
                        url: row.get(3)?,
                        title: row.get(4)?,
                        status: ArticleStatus::from_db_string(&row.get::<_, String>(5)?)
                            .unwrap_or(ArticleStatus::FailUnknown),
                        error_code: row.get(6)?,
                        error_message: row.get(7)?,
                        updated_at: row.get(8)?,
                    })
                },
            )
            .optional()?;

        Ok(article)
    }

    fn count_articles_by_status(
        &self,
        run_id: &str,
    ) -> StorageResult<Vec<(ArticleStatus, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM articles WHERE run_id = ?1 GROUP BY status")?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let counts = ArticleStatus::all_states()
            .into_iter()
            .filter_map(|status| {
                rows.iter()
                    .find(|(s, _)| s == status.to_db_string())
                    .map(|(_, count)| (status, *count as u64))
            })
            .collect();

        Ok(counts)
    }

    // ===== Comment Persistence =====

    fn persist_comments(&mut self, run_id: &str, records: &[CommentRecord]) -> StorageResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO comments (
                    run_id, comment_id, oid, aid, parent_id, depth, body, author_hash,
                    author_raw, authored_at, collected_at, snapshot_at, sympathy_count,
                    antipathy_count, reply_count, is_deleted, is_blind
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(run_id, comment_id) DO UPDATE SET
                    sympathy_count = excluded.sympathy_count,
                    antipathy_count = excluded.antipathy_count,
                    reply_count = excluded.reply_count,
                    is_deleted = excluded.is_deleted,
                    is_blind = excluded.is_blind,
                    collected_at = excluded.collected_at",
            )?;

            for record in records {
                written += stmt.execute(params![
                    run_id,
                    record.comment_id,
                    record.oid,
                    record.aid,
                    record.parent_id,
                    record.depth,
                    record.body,
                    record.author_hash,
                    record.author_raw,
                    record.authored_at,
                    record.collected_at,
                    record.snapshot_at,
                    record.sympathy_count,
                    record.antipathy_count,
                    record.reply_count,
                    record.is_deleted,
                    record.is_blind,
                ])?;
            }
        }
        tx.commit()?;

        Ok(written)
    }

    fn get_comment(&self, run_id: &str, comment_id: &str) -> StorageResult<Option<CommentRecord>> {
        let sql = format!(
            "SELECT {} FROM comments WHERE run_id = ?1 AND comment_id = ?2",
            COMMENT_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![run_id, comment_id], row_to_comment)
            .optional()?)
    }

    fn count_comments(&self, run_id: &str, key: Option<&ArticleKey>) -> StorageResult<u64> {
        let count: i64 = match key {
            Some(key) => self.conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE run_id = ?1 AND oid = ?2 AND aid = ?3",
                params![run_id, key.oid, key.aid],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )?,
        };
        Ok(count as u64)
    }

    fn persist_comment_stats(
        &mut self,
        run_id: &str,
        key: &ArticleKey,
        stats: &CommentStats,
        snapshot_at: &str,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let ages = &stats.age_ratios;
        self.conn.execute(
            "INSERT OR REPLACE INTO comment_stats (
                run_id, oid, aid, total_comments, male_ratio, female_ratio,
                age_10s, age_20s, age_30s, age_40s, age_50s, age_60s, age_70s,
                snapshot_at, collected_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                run_id,
                key.oid,
                key.aid,
                stats.total_comments,
                stats.male_ratio,
                stats.female_ratio,
                ages[0],
                ages[1],
                ages[2],
                ages[3],
                ages[4],
                ages[5],
                ages[6],
                snapshot_at,
                now
            ],
        )?;
        Ok(())
    }

    fn get_comment_stats(
        &self,
        run_id: &str,
        key: &ArticleKey,
    ) -> StorageResult<Option<CommentStats>> {
        let stats = self
            .conn
            .query_row(
                "SELECT total_comments, male_ratio, female_ratio,
                        age_10s, age_20s, age_30s, age_40s, age_50s, age_60s, age_70s
                 FROM comment_stats WHERE run_id = ?1 AND oid = ?2 AND aid = ?3",
                params![run_id, key.oid, key.aid],
                |row| {
                    let mut age_ratios = [None; 7];
                    for (i, slot) in age_ratios.iter_mut().enumerate() {
                        *slot = row.get(3 + i)?;
                    }
                    Ok(CommentStats {
                        total_comments: row.get(0)?,
                        male_ratio: row.get(1)?,
                        female_ratio: row.get(2)?,
                        age_ratios,
                    })
                },
            )
            .optional()?;

        Ok(stats)
    }

    // ===== Events =====

    fn log_event(
        &mut self,
        run_id: &str,
        event_type: &str,
        summary: &str,
        details: Option<&serde_json::Value>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let details = details
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.conn.execute(
            "INSERT INTO events (run_id, timestamp, event_type, summary, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, now, event_type, summary, details],
        )?;
        Ok(())
    }

    fn list_events(&self, run_id: &str, limit: usize) -> StorageResult<Vec<EventRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, timestamp, event_type, summary, details
             FROM events WHERE run_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let events = stmt
            .query_map(params![run_id, limit as i64], |row| {
                Ok(EventRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    event_type: row.get(3)?,
                    summary: row.get(4)?,
                    details: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    fn count_events(&self, run_id: &str, event_type: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE run_id = ?1 AND event_type = ?2",
            params![run_id, event_type],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
