//! Pre-flight health check
//!
//! Before a run, up to three configured articles are probed on their first
//! comment page. A sample passes when some candidate returns a decodable,
//! successful, schema-valid payload whose first comment carries the required
//! fields.

use crate::config::{ArticleEntry, Config};
use crate::crawler::fetcher::CommentFetcher;
use crate::crawler::harvester::ParameterProbe;
use crate::crawler::payload::{extract_comments, parse_payload, validate_schema, CommentView};
use crate::state::{ArticleKey, PageScope};
use crate::{HarvestError, Result};
use serde_json::{json, Value};
use tracing::{error, info, warn};

/// Articles sampled by the check
pub const SAMPLE_SIZE: usize = 3;

/// Samples that must pass when a full sample is available
pub const PASS_THRESHOLD: usize = 2;

/// Outcome of the pre-flight check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub samples: usize,
    pub passed: usize,
}

impl PreflightReport {
    /// Passing requires two of three samples, or every sample when fewer exist
    pub fn is_pass(&self) -> bool {
        let threshold = if self.samples >= SAMPLE_SIZE {
            PASS_THRESHOLD
        } else {
            self.samples
        };
        self.samples > 0 && self.passed >= threshold
    }
}

/// Runs the check against the first configured articles
pub async fn run_preflight<P: ParameterProbe>(
    config: &Config,
    fetcher: &mut CommentFetcher,
    probe: &P,
) -> PreflightReport {
    info!("Executing pre-flight health check");

    let samples: Vec<&ArticleEntry> = config.articles.iter().take(SAMPLE_SIZE).collect();
    if samples.len() < SAMPLE_SIZE {
        warn!("Pre-flight: only {} sample(s) available", samples.len());
    }

    let mut passed = 0;
    for (index, article) in samples.iter().enumerate() {
        let key = ArticleKey::new(&article.oid, &article.aid);
        info!("Pre-flight sample {}: {}", index + 1, key);

        if check_sample(fetcher, probe, article, &key).await {
            passed += 1;
        } else {
            error!("Pre-flight sample {} exhausted all candidates", index + 1);
        }
    }

    let report = PreflightReport {
        samples: samples.len(),
        passed,
    };
    if report.is_pass() {
        info!("Pre-flight health check PASSED ({}/{})", passed, report.samples);
    } else {
        error!("Pre-flight health check FAILED ({}/{})", passed, report.samples);
    }
    report
}

async fn check_sample<P: ParameterProbe>(
    fetcher: &mut CommentFetcher,
    probe: &P,
    article: &ArticleEntry,
    key: &ArticleKey,
) -> bool {
    for (attempt, params) in probe.candidates(article).iter().enumerate() {
        let attempt = attempt + 1;
        let fetched = match fetcher.fetch(key, 1, PageScope::Comment, None, params).await {
            Ok(fetched) => fetched,
            Err(err @ HarvestError::Halted { .. }) | Err(err @ HarvestError::Banned { .. }) => {
                error!("Pre-flight stopped by ban signal: {}", err);
                return false;
            }
            Err(err) => {
                warn!("Pre-flight attempt {} for {} failed: {}", attempt, key, err);
                continue;
            }
        };

        match deep_validate(&fetched.body) {
            Ok(()) => {
                info!("Pre-flight sample {} passed on attempt {}", key, attempt);
                return true;
            }
            Err(err) => {
                warn!("Pre-flight attempt {} for {} invalid: {}", attempt, key, err);
                fetcher.log_evidence(
                    &fetched.url,
                    Some(fetched.status),
                    &format!("PREFLIGHT_{}", err.kind().as_str()),
                    json!({
                        "oid": key.oid,
                        "aid": key.aid,
                        "stage": "health_check",
                        "attempt": attempt,
                    }),
                    Some(fetched.body.as_bytes()),
                );
            }
        }
    }

    false
}

/// Validates a first page the way the collector would read it
pub fn deep_validate(body: &str) -> Result<()> {
    let payload = parse_payload(body)?;

    if payload.get("success").and_then(Value::as_bool) != Some(true) {
        return Err(HarvestError::Schema(
            "Payload is not flagged successful".to_string(),
        ));
    }
    validate_schema(&payload)?;

    if let Some(first) = extract_comments(&payload).first() {
        CommentView::project(first).map_err(|missing| {
            HarvestError::Schema(format!(
                "First comment lacks required fields: {}",
                missing.join(",")
            ))
        })?;
    }

    Ok(())
}
