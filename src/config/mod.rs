//! Configuration module for Comment-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use comment_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Comment page cap: {}", config.collection.max_comment_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArticleEntry, AutoThrottleConfig, CollectionConfig, CommentStatsConfig, Config,
    EndpointConfig, EndpointParams, PrivacyConfig, PrivacyMode, RateLimitConfig, ReferenceTime,
    SnapshotConfig, StorageConfig, VolumeConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
