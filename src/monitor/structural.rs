//! Structural circuit breaker
//!
//! Counts consecutive structural failures across a whole run. Isolated
//! malformed pages are expected noise; an unbroken streak of shape
//! violations means the payload the collector was built against is gone.

use crate::config::EndpointParams;
use crate::state::{ArticleKey, PageScope};
use crate::HarvestError;
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

/// Classification of a failure reported to the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Payload shape violation; the only kind that moves the counter
    Structural,
    Parse,
    Schema,
    Transient,
    Data,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "STRUCTURAL",
            Self::Parse => "PARSE",
            Self::Schema => "SCHEMA",
            Self::Transient => "TRANSIENT",
            Self::Data => "DATA",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a failure happened, kept for post-mortem analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureContext {
    pub oid: String,
    pub aid: String,
    pub scope: PageScope,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<EndpointParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_index: Option<usize>,
}

impl FailureContext {
    pub fn new(key: &ArticleKey, scope: PageScope, page: u32) -> Self {
        Self {
            oid: key.oid.clone(),
            aid: key.aid.clone(),
            scope,
            page,
            url: None,
            parent_id: None,
            params: None,
            comment_index: None,
        }
    }

    pub fn with_url(mut self, url: Option<&str>) -> Self {
        self.url = url.map(str::to_string);
        self
    }

    pub fn with_parent(mut self, parent_id: Option<&str>) -> Self {
        self.parent_id = parent_id.map(str::to_string);
        self
    }

    pub fn with_params(mut self, params: &EndpointParams) -> Self {
        self.params = Some(params.clone());
        self
    }

    pub fn with_comment_index(mut self, index: usize) -> Self {
        self.comment_index = Some(index);
        self
    }

    /// Renders the context as a JSON value for events and evidence
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Run-scoped breaker over consecutive structural failures
#[derive(Debug)]
pub struct StructuralBreaker {
    threshold: u32,
    failure_count: u32,
}

impl StructuralBreaker {
    /// Creates a breaker that trips on the `threshold`-th consecutive structural failure
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failure_count: 0,
        }
    }

    /// Records a failure
    ///
    /// Every kind is logged. Only [`FailureKind::Structural`] increments the
    /// counter, and reaching the threshold returns
    /// [`HarvestError::CircuitOpen`] carrying the triggering reason and context.
    pub fn record_failure(
        &mut self,
        reason: &str,
        kind: FailureKind,
        context: &FailureContext,
    ) -> Result<(), HarvestError> {
        if kind != FailureKind::Structural {
            info!(
                kind = kind.as_str(),
                oid = %context.oid,
                aid = %context.aid,
                page = context.page,
                "Non-structural failure observed: {}",
                reason
            );
            return Ok(());
        }

        self.failure_count += 1;
        warn!(
            oid = %context.oid,
            aid = %context.aid,
            scope = %context.scope,
            page = context.page,
            "Structural failure #{}/{} detected: {}",
            self.failure_count,
            self.threshold,
            reason
        );

        if self.failure_count >= self.threshold {
            error!(
                "Structural integrity threshold exceeded ({} failures). Reason: {}",
                self.failure_count, reason
            );
            return Err(HarvestError::CircuitOpen {
                failures: self.failure_count,
                reason: reason.to_string(),
                context: Box::new(context.clone()),
            });
        }

        Ok(())
    }

    /// Resets the consecutive failure streak
    pub fn record_success(&mut self) {
        if self.failure_count > 0 {
            info!("Structural failure counter reset (was {})", self.failure_count);
            self.failure_count = 0;
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
