//! Comment-Harvester: a rate-governed, resumable comment thread collector
//!
//! This crate walks cursor-paginated comment and reply listings of a news
//! comment API, pacing requests adaptively, aborting when the remote payload
//! shape drifts, and persisting every article as an idempotent unit of work.

pub mod config;
pub mod crawler;
pub mod monitor;
pub mod output;
pub mod privacy;
pub mod state;
pub mod storage;

use monitor::FailureContext;
use thiserror::Error;

/// Main error type for Comment-Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network request failed for {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Ban signal (HTTP {status}) from {url}")]
    Banned { url: String, status: u16 },

    #[error("Collection halted: {reason}")]
    Halted { reason: String },

    #[error("Response parse failed: {0}")]
    Parse(String),

    #[error("Schema mismatch: {0}")]
    Schema(String),

    #[error("Structural failure: {reason}")]
    Structural {
        reason: String,
        context: Box<FailureContext>,
    },

    #[error("Structural integrity threshold exceeded ({failures} failures). Reason: {reason}")]
    CircuitOpen {
        failures: u32,
        reason: String,
        context: Box<FailureContext>,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

/// Failure family used to map errors onto article status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Http,
    Parse,
    Schema,
    Structural,
    Unknown,
}

/// How a caller should react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warn,
    /// The caller may try the next endpoint candidate
    Retry,
    /// The whole run must stop
    Abort,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Parse => "PARSE",
            Self::Schema => "SCHEMA",
            Self::Structural => "STRUCTURAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl HarvestError {
    /// Returns the failure family of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. }
            | Self::HttpStatus { .. }
            | Self::Banned { .. }
            | Self::Halted { .. } => ErrorKind::Http,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Schema(_) => ErrorKind::Schema,
            Self::Structural { .. } | Self::CircuitOpen { .. } => ErrorKind::Structural,
            _ => ErrorKind::Unknown,
        }
    }

    /// Returns the recovery policy for this error
    ///
    /// Transport, status, parse and schema failures are candidate-retryable.
    /// Ban signals, governor stops and structural failures abort the run.
    /// Unclassified failures are surfaced as aborts and never retried.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Network { .. } | Self::HttpStatus { .. } | Self::Parse(_) | Self::Schema(_) => {
                Severity::Retry
            }
            _ => Severity::Abort,
        }
    }

    /// Returns true if continuing the run after this error is unsafe
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Abort
    }

    /// Returns the structural context attached to this error, if any
    pub fn context(&self) -> Option<&FailureContext> {
        match self {
            Self::Structural { context, .. } | Self::CircuitOpen { context, .. } => Some(context),
            _ => None,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Comment-Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CommentCollector, CommentFetcher, Harvester, RateGovernor};
pub use monitor::{StructuralBreaker, VolumeEstimator};
pub use state::{ArticleKey, ArticleStatus};
pub use storage::RunStatus;
