//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! run statistics from the storage layer.

use crate::state::ArticleStatus;
use crate::storage::{EventRecord, RunRecord, Storage, StorageError};
use crate::HarvestError;

/// Number of recent events shown by default
pub const RECENT_EVENTS: usize = 10;

/// Event types counted separately in the summary
const TRACKED_EVENTS: [&str; 5] = [
    "THROTTLE_UP",
    "THROTTLE_DOWN",
    "STRUCTURE_MONITOR",
    "STRUCTURAL_HEURISTIC",
    "CANDIDATE_RETRY",
];

/// Run statistics summary
#[derive(Debug, Clone)]
pub struct RunStatistics {
    pub run: RunRecord,

    /// Count of articles by status, non-zero entries only
    pub articles_by_status: Vec<(ArticleStatus, u64)>,

    pub total_articles: u64,

    /// Comments and replies stored for the run
    pub total_comments: u64,

    /// Counts of the tracked operational event types
    pub event_counts: Vec<(&'static str, u64)>,

    /// Most recent events, newest first
    pub recent_events: Vec<EventRecord>,
}

/// Loads statistics for a run, or for the latest run when `run_id` is None
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `run_id` - Run to describe
/// * `event_limit` - How many recent events to include
///
/// # Returns
///
/// * `Ok(RunStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - No such run, or the query failed
pub fn load_statistics(
    storage: &dyn Storage,
    run_id: Option<&str>,
    event_limit: usize,
) -> Result<RunStatistics, HarvestError> {
    let run = match run_id {
        Some(id) => storage.get_run(id)?,
        None => storage
            .get_latest_run()?
            .ok_or_else(|| StorageError::RunNotFound("(latest)".to_string()))?,
    };

    let articles_by_status: Vec<_> = storage
        .count_articles_by_status(&run.run_id)?
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect();
    let total_articles = articles_by_status.iter().map(|(_, count)| count).sum();
    let total_comments = storage.count_comments(&run.run_id, None)?;

    let mut event_counts = Vec::with_capacity(TRACKED_EVENTS.len());
    for event_type in TRACKED_EVENTS {
        event_counts.push((event_type, storage.count_events(&run.run_id, event_type)?));
    }

    let recent_events = storage.list_events(&run.run_id, event_limit)?;

    Ok(RunStatistics {
        run,
        articles_by_status,
        total_articles,
        total_comments,
        event_counts,
        recent_events,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &RunStatistics) {
    let run = &stats.run;
    println!("=== Run {} ===\n", run.run_id);

    println!("Overview:");
    println!(
        "  Status: {}",
        run.status
            .map(|s| s.to_db_string())
            .unwrap_or("IN PROGRESS")
    );
    println!("  Snapshot: {} ({})", run.snapshot_at, run.timezone);
    println!("  Started: {}", run.started_at);
    if let Some(finished) = &run.finished_at {
        println!("  Finished: {}", finished);
    }
    println!("  Articles: {}", stats.total_articles);
    println!("  Comments stored: {}", stats.total_comments);
    if let (Some(grade), Some(score)) = (&run.volume_grade, run.health_score) {
        println!("  Volume grade: {}  Health score: {}", grade, score);
    }
    if let Some(flags) = run.health_flags.as_deref().filter(|f| !f.is_empty()) {
        println!("  Flags: {}", flags);
    }
    if let Some(notes) = &run.notes {
        println!("  Notes: {}", notes);
    }
    println!();

    println!("Articles by Status:");
    let mut status_counts = stats.articles_by_status.clone();
    status_counts.sort_by(|a, b| b.1.cmp(&a.1));

    for (status, count) in status_counts {
        let percentage = if stats.total_articles > 0 {
            (count as f64 / stats.total_articles as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    let tracked: Vec<_> = stats.event_counts.iter().filter(|(_, c)| *c > 0).collect();
    if !tracked.is_empty() {
        println!("Operational Events:");
        for (event_type, count) in tracked {
            println!("  {}: {}", event_type, count);
        }
        println!();
    }

    if !stats.recent_events.is_empty() {
        println!("Recent Events ({}):", stats.recent_events.len());
        for event in &stats.recent_events {
            println!("  [{}] {} {}", event.timestamp, event.event_type, event.summary);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ArticleKey;
    use crate::storage::{NewRun, SqliteStorage};

    fn seeded() -> SqliteStorage {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .start_run(&NewRun {
                run_id: "20240101_000000".to_string(),
                snapshot_at: "2024-01-01T00:00:00+09:00".to_string(),
                timezone: "+09:00".to_string(),
                config_hash: "abc".to_string(),
            })
            .unwrap();

        let run_id = "20240101_000000";
        for (aid, status) in [
            ("1", ArticleStatus::Success),
            ("2", ArticleStatus::Success),
            ("3", ArticleStatus::FailHttp),
        ] {
            let key = ArticleKey::new("001", aid);
            storage.register_article(run_id, &key, None, None).unwrap();
            storage
                .set_article_status(run_id, &key, status, None, None)
                .unwrap();
        }
        storage
            .log_event(run_id, "THROTTLE_UP", "up", None)
            .unwrap();
        storage
    }

    #[test]
    fn test_load_latest_run_statistics() {
        let storage = seeded();
        let stats = load_statistics(&storage, None, RECENT_EVENTS).unwrap();

        assert_eq!(stats.run.run_id, "20240101_000000");
        assert_eq!(stats.total_articles, 3);
        assert_eq!(stats.total_comments, 0);
        assert!(stats
            .articles_by_status
            .contains(&(ArticleStatus::Success, 2)));
        assert!(stats.event_counts.contains(&("THROTTLE_UP", 1)));
        assert_eq!(stats.recent_events.len(), 1);
    }

    #[test]
    fn test_unknown_run() {
        let storage = seeded();
        assert!(load_statistics(&storage, Some("missing"), 5).is_err());
    }

    #[test]
    fn test_empty_database() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(load_statistics(&storage, None, 5).is_err());
    }
}
