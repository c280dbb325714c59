//! Per-article pagination walk
//!
//! The collector walks the top-level comment listing of one article page by
//! page and, for every comment announcing replies, the reply listing under
//! it. Each page is decoded, validated and persisted before the cursor is
//! followed. The article row ends in exactly one terminal status.

use crate::config::{CollectionConfig, CommentStatsConfig, Config, EndpointParams};
use crate::crawler::comment_stats::normalize_stats;
use crate::crawler::fetcher::CommentFetcher;
use crate::crawler::payload::{
    extract_comments, extract_cursor, extract_total_count, missing_fields_reason, parse_payload,
    validate_schema, CommentView,
};
use crate::crawler::records::RecordBuilder;
use crate::monitor::{FailureContext, FailureKind, StructuralBreaker};
use crate::state::{ArticleKey, ArticleStatus, PageScope};
use crate::storage::Storage;
use crate::{ErrorKind, HarvestError, Result};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Cursors consumed by one pagination walk
#[derive(Debug, Default)]
pub struct CursorTrail {
    seen: HashSet<String>,
}

/// What a walk does after a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorStep {
    /// Continue with the next page
    Next,
    /// No cursor: this was the last page
    End,
    /// The cursor was already consumed in this walk
    Repeat(String),
}

impl CursorTrail {
    pub fn advance(&mut self, cursor: Option<String>) -> CursorStep {
        match cursor {
            None => CursorStep::End,
            Some(cursor) if self.seen.contains(&cursor) => CursorStep::Repeat(cursor),
            Some(cursor) => {
                self.seen.insert(cursor);
                CursorStep::Next
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Counters accumulated across every article of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectorMetrics {
    pub pages_fetched: u64,
    pub records_seen: u64,
    /// Records whose id the API repeated within one article walk
    pub duplicate_records: u64,
    pub timestamp_anomalies: u64,
}

impl CollectorMetrics {
    pub fn duplicate_rate(&self) -> f64 {
        if self.records_seen == 0 {
            return 0.0;
        }
        self.duplicate_records as f64 / self.records_seen as f64
    }
}

/// Location of a page within an article walk
#[derive(Debug, Clone, Copy)]
struct PageRef<'a> {
    key: &'a ArticleKey,
    params: &'a EndpointParams,
    source_url: Option<&'a str>,
    scope: PageScope,
    page: u32,
    parent_id: Option<&'a str>,
}

impl PageRef<'_> {
    fn context(&self) -> FailureContext {
        FailureContext::new(self.key, self.scope, self.page)
            .with_url(self.source_url)
            .with_parent(self.parent_id)
            .with_params(self.params)
    }
}

/// Walks and persists the comment tree of articles within one run
pub struct CommentCollector<S: Storage> {
    run_id: String,
    storage: S,
    fetcher: CommentFetcher,
    breaker: StructuralBreaker,
    builder: RecordBuilder,
    collection: CollectionConfig,
    stats: CommentStatsConfig,
    metrics: CollectorMetrics,
    seen_ids: HashSet<String>,
}

impl<S: Storage> CommentCollector<S> {
    pub fn new(
        run_id: &str,
        storage: S,
        fetcher: CommentFetcher,
        builder: RecordBuilder,
        config: &Config,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            storage,
            fetcher,
            breaker: StructuralBreaker::new(config.collection.structural_threshold),
            builder,
            collection: config.collection.clone(),
            stats: config.comment_stats.clone(),
            metrics: CollectorMetrics::default(),
            seen_ids: HashSet::new(),
        }
    }

    /// Collects every comment and reply of an article
    ///
    /// Articles already in `SUCCESS` for this run are skipped without any
    /// request. On failure the article is marked with the status of the
    /// error's family and the error is returned to the caller.
    ///
    /// # Arguments
    ///
    /// * `key` - The article to collect
    /// * `params` - The endpoint candidate to use
    /// * `source_url` - Article URL, kept for failure context
    ///
    /// # Returns
    ///
    /// * `Ok(u64)` - Number of records written (top-level plus replies)
    /// * `Err(HarvestError)` - The walk ended on an unrecovered error
    pub async fn collect_article(
        &mut self,
        key: &ArticleKey,
        params: &EndpointParams,
        source_url: Option<&str>,
    ) -> Result<u64> {
        if self.storage.is_article_completed(&self.run_id, key)? {
            info!("Article {} already SUCCESS, skipping", key);
            return Ok(0);
        }

        info!(
            oid = %key.oid,
            aid = %key.aid,
            template = %params.template_id,
            "Collecting comments"
        );
        self.storage
            .register_article(&self.run_id, key, source_url, None)?;
        self.breaker.record_success();
        // A fallback candidate re-walks pages an earlier attempt already stored
        self.seen_ids.clear();

        match self.walk_comments(key, params, source_url).await {
            Ok((written, reported_total)) => {
                self.storage.set_article_status(
                    &self.run_id,
                    key,
                    ArticleStatus::Success,
                    None,
                    None,
                )?;
                info!("Article {} complete: {} records written", key, written);

                let total = written.max(reported_total);
                self.maybe_collect_stats(key, params, total).await;
                Ok(written)
            }
            Err(err) => {
                let kind = err.kind();
                let status = ArticleStatus::from_error_kind(kind);
                if let Err(e) = self.storage.set_article_status(
                    &self.run_id,
                    key,
                    status,
                    Some(kind.as_str()),
                    Some(&err.to_string()),
                ) {
                    error!("Failed to record {} for article {}: {}", status, key, e);
                }
                warn!("Article {} failed ({}): {}", key, status, err);
                Err(err)
            }
        }
    }

    /// Walks the top-level listing, descending into replies
    ///
    /// Returns the records written and the largest total the API reported.
    async fn walk_comments(
        &mut self,
        key: &ArticleKey,
        params: &EndpointParams,
        source_url: Option<&str>,
    ) -> Result<(u64, u64)> {
        let mut trail = CursorTrail::default();
        let mut written = 0u64;
        let mut reported_total = 0u64;
        let mut page = 1;

        while page <= self.collection.max_comment_pages {
            let at = PageRef {
                key,
                params,
                source_url,
                scope: PageScope::Comment,
                page,
                parent_id: None,
            };

            let payload = self.fetch_valid_page(&at).await?;
            let views = self.project_entries(&at, extract_comments(&payload))?;
            if let Some(total) = extract_total_count(&payload) {
                reported_total = reported_total.max(total.max(0) as u64);
            }

            if views.is_empty() {
                break;
            }

            let parents: Vec<String> = views
                .iter()
                .filter(|v| v.reply_count > 0)
                .map(|v| v.comment_id.clone())
                .collect();
            written += self.persist_views(&at, views)?;

            for parent_id in &parents {
                written += self.walk_replies(key, params, source_url, parent_id).await?;
            }

            match trail.advance(extract_cursor(&payload)) {
                CursorStep::Next => page += 1,
                CursorStep::End => break,
                CursorStep::Repeat(cursor) => {
                    warn!(
                        "Cursor repeat detected for {} ({}). Stopping pagination.",
                        key, cursor
                    );
                    break;
                }
            }
        }

        if page > self.collection.max_comment_pages {
            warn!("Comment page cap reached for {}", key);
        }

        Ok((written, reported_total))
    }

    /// Walks the reply listing under one parent comment
    async fn walk_replies(
        &mut self,
        key: &ArticleKey,
        params: &EndpointParams,
        source_url: Option<&str>,
        parent_id: &str,
    ) -> Result<u64> {
        let mut trail = CursorTrail::default();
        let mut written = 0u64;
        let mut page = 1;

        while page <= self.collection.max_reply_pages {
            let at = PageRef {
                key,
                params,
                source_url,
                scope: PageScope::Reply,
                page,
                parent_id: Some(parent_id),
            };

            let payload = self.fetch_valid_page(&at).await?;
            let views = self.project_entries(&at, extract_comments(&payload))?;
            if views.is_empty() {
                break;
            }
            written += self.persist_views(&at, views)?;

            match trail.advance(extract_cursor(&payload)) {
                CursorStep::Next => page += 1,
                CursorStep::End => break,
                CursorStep::Repeat(_) => {
                    warn!(
                        "Reply cursor repeat for parent {}. Stopping reply pagination.",
                        parent_id
                    );
                    break;
                }
            }
        }

        debug!("Parent {} of {}: {} replies written", parent_id, key, written);
        Ok(written)
    }

    /// Fetches a page and checks its wrapper and minimal shape
    async fn fetch_valid_page(&mut self, at: &PageRef<'_>) -> Result<Value> {
        let fetched = self
            .fetcher
            .fetch(at.key, at.page, at.scope, at.parent_id, at.params)
            .await;
        let fetched = self.after_fetch(fetched)?;
        self.metrics.pages_fetched += 1;

        let decoded = parse_payload(&fetched.body).and_then(|payload| {
            validate_schema(&payload)?;
            Ok(payload)
        });

        match decoded {
            Ok(payload) => {
                self.breaker.record_success();
                Ok(payload)
            }
            Err(err) => {
                let kind = match err.kind() {
                    ErrorKind::Schema => FailureKind::Schema,
                    _ => FailureKind::Parse,
                };
                let context = at.context().with_url(Some(fetched.url.as_str()));
                self.fetcher.log_evidence(
                    &fetched.url,
                    Some(fetched.status),
                    &format!("{}_ERROR", kind.as_str()),
                    context.to_json(),
                    Some(fetched.body.as_bytes()),
                );
                self.record_monitor_failure(&err.to_string(), kind, &context)?;
                Err(err)
            }
        }
    }

    /// Projects every entry of a page, failing on the first field violation
    fn project_entries(&mut self, at: &PageRef<'_>, entries: &[Value]) -> Result<Vec<CommentView>> {
        let mut views = Vec::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            match CommentView::project(entry) {
                Ok(view) => views.push(view),
                Err(missing) => {
                    let reason = missing_fields_reason(&missing);
                    let context = at.context().with_comment_index(index);
                    self.log_event("STRUCTURAL_HEURISTIC", &reason, Some(&context.to_json()))?;
                    self.breaker
                        .record_failure(&reason, FailureKind::Structural, &context)?;
                    return Err(HarvestError::Structural {
                        reason,
                        context: Box::new(context),
                    });
                }
            }
        }

        Ok(views)
    }

    fn persist_views(&mut self, at: &PageRef<'_>, views: Vec<CommentView>) -> Result<u64> {
        let mut records = Vec::with_capacity(views.len());
        for view in views {
            let built = self.builder.build(at.key, view, at.scope, at.parent_id);
            if built.timestamp_anomaly {
                self.metrics.timestamp_anomalies += 1;
            }
            self.metrics.records_seen += 1;
            if !self.seen_ids.insert(built.record.comment_id.clone()) {
                self.metrics.duplicate_records += 1;
            }
            records.push(built.record);
        }

        let written = self.storage.persist_comments(&self.run_id, &records)?;
        debug!(
            scope = %at.scope,
            page = at.page,
            "Persisted {} records for {}",
            written,
            at.key
        );
        Ok(written as u64)
    }

    /// Fetches and stores the statistics breakdown when the article is large enough
    ///
    /// Failures are logged and recorded as events; they never fail the article.
    async fn maybe_collect_stats(&mut self, key: &ArticleKey, params: &EndpointParams, total: u64) {
        if !self.stats.enabled || total < self.stats.min_comments {
            return;
        }

        let outcome = self.collect_stats(key, params).await;
        if let Err(err) = outcome {
            warn!("Failed to fetch stats for {}: {}", key, err);
            let details = serde_json::json!({ "oid": key.oid, "aid": key.aid });
            if let Err(e) = self.log_event("STATS_FAILED", &err.to_string(), Some(&details)) {
                error!("Failed to record stats failure event: {}", e);
            }
        }
    }

    async fn collect_stats(&mut self, key: &ArticleKey, params: &EndpointParams) -> Result<()> {
        let fetched = self.fetcher.fetch_stats(key, params).await;
        let fetched = self.after_fetch(fetched)?;
        let payload = parse_payload(&fetched.body)?;
        let stats = normalize_stats(&payload)?;
        self.storage.persist_comment_stats(
            &self.run_id,
            key,
            &stats,
            self.builder.snapshot_at(),
        )?;
        debug!("Stored comment statistics for {}", key);
        Ok(())
    }

    fn record_monitor_failure(
        &mut self,
        reason: &str,
        kind: FailureKind,
        context: &FailureContext,
    ) -> Result<()> {
        self.breaker.record_failure(reason, kind, context)?;
        let mut details = context.to_json();
        if let Value::Object(map) = &mut details {
            map.insert("failure_kind".to_string(), Value::from(kind.as_str()));
        }
        self.log_event("STRUCTURE_MONITOR", reason, Some(&details))
    }

    /// Flushes governor events, keeping the fetch error when both fail
    fn after_fetch<T>(&mut self, fetched: Result<T>) -> Result<T> {
        match fetched {
            Ok(value) => {
                self.flush_governor_events()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = self.flush_governor_events() {
                    error!("Failed to record governor events: {}", e);
                }
                Err(err)
            }
        }
    }

    fn flush_governor_events(&mut self) -> Result<()> {
        for event in self.fetcher.drain_events() {
            self.storage.log_event(
                &self.run_id,
                event.event_type(),
                &event.summary(),
                Some(&event.details()),
            )?;
        }
        Ok(())
    }

    /// Appends a run event
    pub fn log_event(
        &mut self,
        event_type: &str,
        summary: &str,
        details: Option<&Value>,
    ) -> Result<()> {
        self.storage
            .log_event(&self.run_id, event_type, summary, details)?;
        Ok(())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn fetcher(&self) -> &CommentFetcher {
        &self.fetcher
    }

    pub fn fetcher_mut(&mut self) -> &mut CommentFetcher {
        &mut self.fetcher
    }

    pub fn breaker(&self) -> &StructuralBreaker {
        &self.breaker
    }

    pub fn builder(&self) -> &RecordBuilder {
        &self.builder
    }

    pub fn metrics(&self) -> &CollectorMetrics {
        &self.metrics
    }
}
