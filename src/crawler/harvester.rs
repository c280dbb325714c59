//! Run driver
//!
//! The harvester owns one run end to end: it creates or resumes the run
//! record, walks the configured article list with candidate fallback, feeds
//! the volume estimator and stop strategy, and finalizes the run exactly once.

use crate::config::{ArticleEntry, Config, EndpointParams, VolumeConfig};
use crate::crawler::collector::CommentCollector;
use crate::crawler::fetcher::CommentFetcher;
use crate::crawler::records::{fixed_offset, resolve_snapshot, RecordBuilder};
use crate::monitor::{
    grade_volume, health_score, EvidenceRecorder, FixedTargetStrategy, HealthInputs,
    VolumeEstimator, VolumeGrade, VolumeStrategy, REVIEW_FLAG,
};
use crate::privacy::build_hasher;
use crate::state::{ArticleKey, ArticleStatus};
use crate::storage::{NewRun, RunStatus, RunSummary, Storage};
use crate::{ErrorKind, HarvestError, Result};
use chrono::Utc;
use serde_json::json;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

/// Supplies the ordered endpoint candidates for an article
pub trait ParameterProbe {
    fn candidates(&self, article: &ArticleEntry) -> Vec<EndpointParams>;
}

/// Probe returning a fixed candidate list for every article
#[derive(Debug, Clone)]
pub struct StaticProbe {
    candidates: Vec<EndpointParams>,
}

impl StaticProbe {
    pub fn new(candidates: Vec<EndpointParams>) -> Self {
        Self { candidates }
    }

    /// Uses the configured candidates, or the two common news templates
    pub fn from_config(config: &Config) -> Self {
        if config.candidates.is_empty() {
            Self::new(vec![
                EndpointParams::new("news", "default_society"),
                EndpointParams::new("news", "view_politics"),
            ])
        } else {
            Self::new(config.candidates.clone())
        }
    }
}

impl ParameterProbe for StaticProbe {
    fn candidates(&self, _article: &ArticleEntry) -> Vec<EndpointParams> {
        self.candidates.clone()
    }
}

/// How the article loop ended without an error
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopEnd {
    Completed,
    Stopped(String),
}

/// Final state of a run as written to the run record
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub notes: String,
    pub total_articles: u64,
    pub total_comments: u64,
    pub volume_grade: VolumeGrade,
    pub health_score: u32,
    pub needs_review: bool,
    /// The error that ended the run, if any
    pub failure: Option<String>,
}

/// Drives one harvester run over the configured articles
pub struct Harvester<S: Storage, P: ParameterProbe> {
    config: Config,
    collector: CommentCollector<S>,
    probe: P,
    estimator: VolumeEstimator,
    strategy: FixedTargetStrategy,
    run_id: String,
    articles_processed: u64,
    comments_collected: u64,
    expansion_advised: bool,
    started: Instant,
}

impl<S: Storage, P: ParameterProbe> Harvester<S, P> {
    /// Creates a new run, or reopens `resume` keeping its id and snapshot
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `config_hash` - Hash of the configuration file, stored on the run
    /// * `storage` - Opened storage
    /// * `probe` - Candidate source for each article
    /// * `resume` - Run id to resume, if any
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Ready to run
    /// * `Err(HarvestError)` - The run could not be opened
    pub fn start(
        config: Config,
        config_hash: &str,
        mut storage: S,
        probe: P,
        resume: Option<&str>,
    ) -> Result<Self> {
        let offset = fixed_offset(config.snapshot.timezone_offset_hours)?;

        let (run_id, snapshot_at) = match resume {
            Some(run_id) => {
                let run = storage.get_run(run_id)?;
                info!("Resuming run {} (snapshot {})", run.run_id, run.snapshot_at);
                (run.run_id, run.snapshot_at)
            }
            None => {
                let now = Utc::now();
                let run_id = now.with_timezone(&offset).format("%Y%m%d_%H%M%S").to_string();
                let snapshot_at = resolve_snapshot(&config.snapshot, offset, now)?;
                info!("Starting run {} (snapshot {})", run_id, snapshot_at);
                (run_id, snapshot_at)
            }
        };

        if config.privacy.allow_pii {
            warn!("PII collection is ENABLED (allow-pii = true); raw author names will be stored");
        }

        // Everything that can fail without touching storage runs before the
        // run row exists, so an aborted start never leaves an open run behind.
        let hasher = build_hasher(&config.privacy)?;
        let evidence =
            EvidenceRecorder::new(&run_id, Path::new(&config.storage.evidence_dir), offset)?;
        let fetcher = CommentFetcher::new(&config, Some(evidence))?;
        let builder = RecordBuilder::new(hasher, config.privacy.allow_pii, offset, &snapshot_at);

        storage.start_run(&NewRun {
            run_id: run_id.clone(),
            snapshot_at: snapshot_at.clone(),
            timezone: offset.to_string(),
            config_hash: config_hash.to_string(),
        })?;

        let (event_type, summary) = if resume.is_some() {
            ("RUN_RESUME", format!("Run {} resumed", run_id))
        } else {
            ("RUN_START", format!("Run {} started", run_id))
        };
        let details = json!({ "snapshot_at": snapshot_at, "articles": config.articles.len() });
        let opened = storage
            .count_comments(&run_id, None)
            .and_then(|count| {
                storage.log_event(&run_id, event_type, &summary, Some(&details))?;
                Ok(count)
            });

        let comments_collected = match opened {
            Ok(count) => count,
            Err(e) => {
                let err = HarvestError::from(e);
                error!("Run {} could not be opened: {}", run_id, err);
                let reason = format!("Run start failed: {}", err);
                if let Err(e) =
                    finalize_interrupted_run(&mut storage, &run_id, &config.volume, &reason)
                {
                    error!("Failed to finalize run {}: {}", run_id, e);
                }
                return Err(err);
            }
        };

        let collector = CommentCollector::new(&run_id, storage, fetcher, builder, &config);

        Ok(Self {
            strategy: FixedTargetStrategy::new(config.volume.target_comments),
            config,
            collector,
            probe,
            estimator: VolumeEstimator::new(),
            run_id,
            articles_processed: 0,
            comments_collected,
            expansion_advised: false,
            started: Instant::now(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn collector(&self) -> &CommentCollector<S> {
        &self.collector
    }

    pub fn estimator(&self) -> &VolumeEstimator {
        &self.estimator
    }

    /// Processes every article and finalizes the run
    ///
    /// Article-level failures are recorded and the loop moves on. Fatal
    /// errors end the loop; the run is finalized with the status they imply
    /// and the outcome carries the failure text.
    pub async fn run(mut self) -> Result<(RunOutcome, S)> {
        let result = self.process_articles().await;

        let (status, stop_reason, failure) = match result {
            Ok(LoopEnd::Completed) => (RunStatus::Success, None, None),
            Ok(LoopEnd::Stopped(reason)) => (RunStatus::Stopped, Some(reason), None),
            Err(err) => {
                let status = match err.kind() {
                    ErrorKind::Structural | ErrorKind::Http => RunStatus::Failed,
                    _ => RunStatus::Partial,
                };
                error!("Run {} aborted: {}", self.run_id, err);
                (status, None, Some(err.to_string()))
            }
        };

        let outcome = self.finalize(status, stop_reason.as_deref(), failure)?;
        Ok((outcome, self.collector.into_storage()))
    }

    async fn process_articles(&mut self) -> Result<LoopEnd> {
        let articles = self.config.articles.clone();

        for article in &articles {
            let key = ArticleKey::new(&article.oid, &article.aid);
            self.articles_processed += 1;
            info!(
                "Processing ({}) {}: {}",
                self.articles_processed,
                key,
                article.title.as_deref().unwrap_or("")
            );

            self.process_article(article, &key).await?;

            if let Some(reason) = self.collector.fetcher().governor().stop_reason() {
                return Err(HarvestError::Halted {
                    reason: reason.to_string(),
                });
            }

            let elapsed = self.started.elapsed().as_secs_f64();
            let decision = self.strategy.decide(self.comments_collected, elapsed);
            if decision.should_stop {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "TARGET_REACHED".to_string());
                info!(
                    "Volume strategy triggered stop ({}) at {} comments",
                    reason, self.comments_collected
                );
                self.collector.log_event(
                    "STOP_TARGET",
                    &reason,
                    Some(&json!({ "comments": self.comments_collected })),
                )?;
                return Ok(LoopEnd::Stopped(reason));
            }

            self.advise_expansion()?;
        }

        Ok(LoopEnd::Completed)
    }

    /// Runs the candidate loop for one article
    async fn process_article(&mut self, article: &ArticleEntry, key: &ArticleKey) -> Result<()> {
        let run_id = self.run_id.clone();
        let storage = self.collector.storage_mut();

        if storage.is_article_completed(&run_id, key)? {
            info!("Skipping completed article {}", key);
            return Ok(());
        }
        storage.register_article(&run_id, key, article.url.as_deref(), article.title.as_deref())?;

        let candidates = self.probe.candidates(article);
        if candidates.is_empty() {
            warn!("No endpoint candidates for {}", key);
            let storage = self.collector.storage_mut();
            storage.set_article_status(
                &run_id,
                key,
                ArticleStatus::FailNoCandidate,
                Some("NO_CANDIDATE"),
                Some("Probe did not emit any comment API candidates."),
            )?;
            self.collector.log_event(
                "CANDIDATE_MISSING",
                "Probe produced zero candidates",
                Some(&json!({ "oid": key.oid, "aid": key.aid, "url": article.url })),
            )?;
            return Ok(());
        }

        for (attempt, params) in candidates.iter().enumerate() {
            let attempt = attempt + 1;
            match self
                .collector
                .collect_article(key, params, article.url.as_deref())
                .await
            {
                Ok(count) => {
                    self.comments_collected += count;
                    self.estimator.add_count(count as i64);
                    return Ok(());
                }
                Err(err) => {
                    let details = json!({
                        "oid": key.oid,
                        "aid": key.aid,
                        "attempt": attempt,
                        "params": params,
                    });
                    if err.is_fatal() {
                        self.collector
                            .log_event("CANDIDATE_FAIL", &err.to_string(), Some(&details))?;
                        return Err(err);
                    }
                    warn!(
                        "Candidate {}/{} failed for {}: {}",
                        attempt,
                        candidates.len(),
                        key,
                        err
                    );
                    self.collector
                        .log_event("CANDIDATE_RETRY", &err.to_string(), Some(&details))?;
                }
            }
        }

        error!("All endpoint candidates failed for {}", key);
        Ok(())
    }

    fn advise_expansion(&mut self) -> Result<()> {
        if self.expansion_advised {
            return Ok(());
        }

        let volume = &self.config.volume;
        let remaining_capacity = volume
            .max_total_articles
            .saturating_sub(self.articles_processed);
        if !self.estimator.should_expand(
            volume.target_comments,
            self.comments_collected,
            remaining_capacity,
        ) {
            return Ok(());
        }

        let estimate = self
            .estimator
            .estimate_remaining_articles(volume.target_comments, self.comments_collected);
        warn!(
            "Volume estimate suggests expanding the article list: ~{} more articles needed, {} remaining",
            estimate.unwrap_or_default(),
            remaining_capacity
        );
        let details = json!({
            "trimmed_mean": self.estimator.current_trimmed_mean(),
            "estimated_articles": estimate,
            "remaining_capacity": remaining_capacity,
            "collected": self.comments_collected,
        });
        self.expansion_advised = true;
        self.collector.log_event(
            "VOLUME_EXPAND",
            "Volume estimate exceeds remaining article capacity",
            Some(&details),
        )
    }

    fn finalize(
        &mut self,
        status: RunStatus,
        stop_reason: Option<&str>,
        failure: Option<String>,
    ) -> Result<RunOutcome> {
        let metrics = self.collector.metrics().clone();
        let run_id = self.run_id.clone();
        let articles_processed = self.articles_processed;
        let volume = self.config.volume.clone();

        let summary = build_summary(
            self.collector.storage(),
            &run_id,
            &volume,
            status,
            articles_processed,
            HealthInputs {
                duplicate_rate: metrics.duplicate_rate(),
                timestamp_anomalies: metrics.timestamp_anomalies,
                total_mismatch: false,
            },
            stop_reason,
            failure.as_deref(),
        )?;

        self.collector.log_event(
            "RUN_END",
            &format!("Run {} finished with {}", run_id, status),
            Some(&json!({ "notes": summary.notes, "pages_fetched": metrics.pages_fetched })),
        )?;
        self.collector.storage_mut().finalize_run(&run_id, &summary)?;

        info!(
            "Run {} complete: {} ({} articles, {} comments, health {})",
            run_id,
            status,
            summary.total_articles,
            summary.total_comments,
            summary.health_score.unwrap_or_default()
        );

        let grade = grade_volume(
            summary.total_comments,
            volume.target_comments,
            volume.min_acceptable_comments,
        );
        let health = summary.health_score.unwrap_or_default();
        Ok(RunOutcome {
            run_id,
            status,
            needs_review: summary.health_flags.is_some(),
            notes: summary.notes,
            total_articles: summary.total_articles,
            total_comments: summary.total_comments,
            volume_grade: grade,
            health_score: health,
            failure,
        })
    }
}

/// Computes the terminal summary of a run from what storage holds
#[allow(clippy::too_many_arguments)]
fn build_summary<S: Storage>(
    storage: &S,
    run_id: &str,
    volume: &VolumeConfig,
    status: RunStatus,
    total_articles: u64,
    mut inputs: HealthInputs,
    stop_reason: Option<&str>,
    failure: Option<&str>,
) -> Result<RunSummary> {
    let total_comments = storage.count_comments(run_id, None)?;
    let grade = grade_volume(
        total_comments,
        volume.target_comments,
        volume.min_acceptable_comments,
    );
    inputs.total_mismatch = grade == VolumeGrade::C;
    let (score, needs_review) = health_score(&inputs);

    let mut notes = vec![format!("volume_grade={}:{}", grade.as_str(), grade.note())];
    if let Some(reason) = stop_reason {
        notes.push(format!("stop_reason={}", reason));
    }
    if let Some(failure) = failure {
        notes.push(format!("failure={}", failure));
    }

    Ok(RunSummary {
        status,
        notes: notes.join(" | "),
        total_articles,
        total_comments,
        volume_grade: Some(grade.as_str().to_string()),
        health_score: Some(score),
        health_flags: needs_review.then(|| REVIEW_FLAG.to_string()),
    })
}

/// Finalizes a run whose driver never returned, as `PARTIAL`
///
/// Used after a panic or an interrupt. Totals come from storage; the health
/// score only reflects the volume shortfall since process metrics are lost.
///
/// # Returns
///
/// * `Ok(true)` - The run was finalized by this call
/// * `Ok(false)` - The run had already been finalized
pub fn finalize_interrupted_run<S: Storage>(
    storage: &mut S,
    run_id: &str,
    volume: &VolumeConfig,
    reason: &str,
) -> Result<bool> {
    if storage.get_run(run_id)?.finished_at.is_some() {
        return Ok(false);
    }

    let total_articles = storage
        .count_articles_by_status(run_id)?
        .into_iter()
        .map(|(_, count)| count)
        .sum();

    let summary = build_summary(
        &*storage,
        run_id,
        volume,
        RunStatus::Partial,
        total_articles,
        HealthInputs::default(),
        None,
        Some(reason),
    )?;

    storage.log_event(run_id, "RUN_INTERRUPTED", reason, None)?;
    let finalized = storage.finalize_run(run_id, &summary)?;
    warn!("Run {} finalized as PARTIAL: {}", run_id, reason);
    Ok(finalized)
}
