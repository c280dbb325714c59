//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the harvester database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per harvester run
CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    snapshot_at TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    timezone TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    status TEXT CHECK(status IS NULL OR status IN ('SUCCESS', 'PARTIAL', 'STOPPED', 'FAILED')),
    notes TEXT,
    total_articles INTEGER NOT NULL DEFAULT 0,
    total_comments INTEGER NOT NULL DEFAULT 0,
    volume_grade TEXT,
    health_score INTEGER,
    health_flags TEXT
);

-- Per-run article work units
CREATE TABLE IF NOT EXISTS articles (
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    oid TEXT NOT NULL,
    aid TEXT NOT NULL,
    url TEXT,
    title TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING',
    error_code TEXT,
    error_message TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (run_id, oid, aid)
);

CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(run_id, status);

-- Collected comments and replies
CREATE TABLE IF NOT EXISTS comments (
    run_id TEXT NOT NULL,
    comment_id TEXT NOT NULL,
    oid TEXT NOT NULL,
    aid TEXT NOT NULL,
    parent_id TEXT,
    depth INTEGER NOT NULL DEFAULT 0,
    body TEXT NOT NULL,
    author_hash TEXT,
    author_raw TEXT,
    authored_at TEXT NOT NULL,
    collected_at TEXT NOT NULL,
    snapshot_at TEXT NOT NULL,
    sympathy_count INTEGER NOT NULL DEFAULT 0,
    antipathy_count INTEGER NOT NULL DEFAULT 0,
    reply_count INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    is_blind INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (run_id, comment_id),
    FOREIGN KEY (run_id, oid, aid) REFERENCES articles(run_id, oid, aid)
);

CREATE INDEX IF NOT EXISTS idx_comments_article ON comments(run_id, oid, aid);
CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);

-- Operational audit trail
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    timestamp TEXT NOT NULL,
    event_type TEXT NOT NULL,
    summary TEXT NOT NULL,
    details TEXT
);

CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id, event_type);

-- Demographic breakdown per article
CREATE TABLE IF NOT EXISTS comment_stats (
    run_id TEXT NOT NULL,
    oid TEXT NOT NULL,
    aid TEXT NOT NULL,
    total_comments INTEGER,
    male_ratio REAL,
    female_ratio REAL,
    age_10s REAL,
    age_20s REAL,
    age_30s REAL,
    age_40s REAL,
    age_50s REAL,
    age_60s REAL,
    age_70s REAL,
    snapshot_at TEXT NOT NULL,
    collected_at TEXT NOT NULL,
    PRIMARY KEY (run_id, oid, aid),
    FOREIGN KEY (run_id, oid, aid) REFERENCES articles(run_id, oid, aid)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
