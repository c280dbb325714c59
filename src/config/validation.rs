use crate::config::types::{
    ArticleEntry, AutoThrottleConfig, CollectionConfig, Config, EndpointConfig, PrivacyConfig,
    PrivacyMode, RateLimitConfig, ReferenceTime, SnapshotConfig, StorageConfig,
};
use crate::ConfigError;
use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_snapshot_config(&config.snapshot)?;
    validate_endpoint_config(&config.endpoint)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_auto_throttle_config(&config.auto_throttle)?;
    validate_collection_config(&config.collection)?;
    validate_storage_config(&config.storage)?;
    validate_privacy_config(&config.privacy)?;
    validate_articles(&config.articles)?;
    Ok(())
}

fn validate_snapshot_config(config: &SnapshotConfig) -> Result<(), ConfigError> {
    if !(-12..=14).contains(&config.timezone_offset_hours) {
        return Err(ConfigError::Validation(format!(
            "timezone_offset_hours must be between -12 and 14, got {}",
            config.timezone_offset_hours
        )));
    }

    if config.reference_time == ReferenceTime::Manual {
        let manual = config.manual_snapshot_time.as_deref().unwrap_or("");
        if chrono::DateTime::parse_from_rfc3339(manual).is_err() {
            return Err(ConfigError::Validation(format!(
                "manual_snapshot_time must be an RFC 3339 instant when reference_time = \"manual\", got '{}'",
                manual
            )));
        }
    }

    Ok(())
}

fn validate_endpoint_config(config: &EndpointConfig) -> Result<(), ConfigError> {
    Url::parse(&config.comment_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid comment_url: {}", e)))?;
    Url::parse(&config.stats_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid stats_url: {}", e)))?;

    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    for (name, value) in &config.extra_headers {
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ConfigError::Validation(format!("Invalid extra header name '{}': {}", name, e))
        })?;
        HeaderValue::from_str(value).map_err(|e| {
            ConfigError::Validation(format!("Invalid value for extra header '{}': {}", name, e))
        })?;
    }

    Ok(())
}

fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("baseline_min_delay", config.baseline_min_delay),
        ("min_delay", config.min_delay),
        ("max_delay", config.max_delay),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{} must be a non-negative number of seconds, got {}",
                name, value
            )));
        }
    }

    if config.max_delay < config.min_delay {
        return Err(ConfigError::Validation(format!(
            "max_delay ({}) must be >= min_delay ({})",
            config.max_delay, config.min_delay
        )));
    }

    Ok(())
}

fn validate_auto_throttle_config(config: &AutoThrottleConfig) -> Result<(), ConfigError> {
    if config.window == 0 || config.recovery_window == 0 {
        return Err(ConfigError::Validation(format!(
            "throttle windows must be >= 1, got window={} recovery_window={}",
            config.window, config.recovery_window
        )));
    }

    for (name, value) in [
        ("up_ratio", config.up_ratio),
        ("down_ratio", config.down_ratio),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "{} must be between 0 and 1, got {}",
                name, value
            )));
        }
    }

    if config.step_up <= 0.0 || config.step_down < 0.0 {
        return Err(ConfigError::Validation(format!(
            "step_up must be > 0 and step_down >= 0, got {} / {}",
            config.step_up, config.step_down
        )));
    }

    Ok(())
}

fn validate_collection_config(config: &CollectionConfig) -> Result<(), ConfigError> {
    if config.max_comment_pages < 1 || config.max_reply_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "page caps must be >= 1, got max_comment_pages={} max_reply_pages={}",
            config.max_comment_pages, config.max_reply_pages
        )));
    }

    if config.structural_threshold < 1 {
        return Err(ConfigError::Validation(
            "structural_threshold must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs == 0 || config.read_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeouts must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.evidence_dir.is_empty() {
        return Err(ConfigError::Validation(
            "evidence_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_privacy_config(config: &PrivacyConfig) -> Result<(), ConfigError> {
    let has_salt = config
        .fixed_salt
        .as_deref()
        .map(|s| !s.is_empty())
        .unwrap_or(false);

    if config.mode == PrivacyMode::Longitudinal && !has_salt {
        return Err(ConfigError::Validation(
            "privacy.fixed_salt is required when privacy.mode = \"longitudinal\"".to_string(),
        ));
    }

    Ok(())
}

fn validate_articles(articles: &[ArticleEntry]) -> Result<(), ConfigError> {
    for entry in articles {
        if entry.oid.trim().is_empty() || entry.aid.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "article entries need both oid and aid (url: {})",
                entry.url.as_deref().unwrap_or("<none>")
            )));
        }

        if let Some(url) = &entry.url {
            Url::parse(url).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid article URL '{}': {}", url, e))
            })?;
        }
    }

    Ok(())
}
