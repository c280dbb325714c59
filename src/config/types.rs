use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration structure for Comment-Harvester
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auto_throttle: AutoThrottleConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub comment_stats: CommentStatsConfig,
    #[serde(default)]
    pub volume: VolumeConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub candidates: Vec<EndpointParams>,
    #[serde(default)]
    pub articles: Vec<ArticleEntry>,
}

/// How the run's snapshot marker is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceTime {
    Start,
    Manual,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotConfig {
    /// Fixed UTC offset (hours) every stored timestamp is rendered in
    #[serde(default = "default_timezone_offset")]
    pub timezone_offset_hours: i32,

    #[serde(default = "default_reference_time")]
    pub reference_time: ReferenceTime,

    /// RFC 3339 instant used when `reference-time = "manual"`
    pub manual_snapshot_time: Option<String>,
}

/// Remote comment API addressing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EndpointConfig {
    #[serde(default = "default_comment_url")]
    pub comment_url: String,

    #[serde(default = "default_stats_url")]
    pub stats_url: String,

    #[serde(default = "default_referer")]
    pub referer: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_lang")]
    pub lang: String,

    #[serde(default = "default_country")]
    pub country: String,

    /// Prefix of the `objectId` query value (`<prefix><oid>,<aid>`)
    #[serde(default = "default_object_prefix")]
    pub object_prefix: String,

    /// Additional request headers; never written to evidence logs
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

/// Baseline request pacing, in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitConfig {
    /// Floor the governor never steps below
    #[serde(default = "default_min_delay")]
    pub baseline_min_delay: f64,

    #[serde(default = "default_min_delay")]
    pub min_delay: f64,

    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
}

/// Sliding-window adaptive throttling policy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AutoThrottleConfig {
    /// Size of the short (step-up) window
    #[serde(default = "default_window")]
    pub window: usize,

    /// Rejection ratio above which the delay steps up
    #[serde(default = "default_up_ratio")]
    pub up_ratio: f64,

    #[serde(default = "default_step_up")]
    pub step_up: f64,

    /// Size of the long (recovery) window
    #[serde(default = "default_recovery_window")]
    pub recovery_window: usize,

    /// Rejection ratio below which the delay steps down
    #[serde(default = "default_down_ratio")]
    pub down_ratio: f64,

    #[serde(default = "default_step_down")]
    pub step_down: f64,

    #[serde(default = "default_true")]
    pub stop_on_ban: bool,

    #[serde(default = "default_ban_status")]
    pub ban_status: u16,

    #[serde(default = "default_throttle_status")]
    pub throttle_status: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CollectionConfig {
    #[serde(default = "default_max_comment_pages")]
    pub max_comment_pages: u32,

    #[serde(default = "default_max_reply_pages")]
    pub max_reply_pages: u32,

    /// Consecutive structural failures tolerated before the run aborts
    #[serde(default = "default_structural_threshold")]
    pub structural_threshold: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommentStatsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Articles below this comment total skip the statistics fetch
    #[serde(default = "default_stats_min_comments")]
    pub min_comments: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VolumeConfig {
    #[serde(default = "default_target_comments")]
    pub target_comments: u64,

    #[serde(default = "default_min_acceptable")]
    pub min_acceptable_comments: u64,

    #[serde(default = "default_max_total_articles")]
    pub max_total_articles: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Directory receiving failed-request evidence
    #[serde(default = "default_evidence_dir")]
    pub evidence_dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyMode {
    /// Fresh random salt per run; hashes cannot be linked across runs
    Ephemeral,
    /// Fixed salt; the same author hashes identically across runs
    Longitudinal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PrivacyConfig {
    #[serde(default)]
    pub allow_pii: bool,

    #[serde(default = "default_privacy_mode")]
    pub mode: PrivacyMode,

    pub fixed_salt: Option<String>,
}

/// One candidate endpoint configuration for the comment API
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EndpointParams {
    #[serde(default = "default_ticket")]
    pub ticket: String,

    #[serde(default = "default_template_id")]
    pub template_id: String,

    #[serde(default = "default_pool")]
    pub pool: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_page_size")]
    pub reply_page_size: u32,

    #[serde(default = "default_index_size")]
    pub index_size: u32,

    #[serde(default = "default_sort")]
    pub sort: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub more_type: Option<String>,
}

/// An article handed over by the external discoverer
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleEntry {
    pub url: Option<String>,
    pub oid: String,
    pub aid: String,
    pub title: Option<String>,
}

impl Config {
    /// Builds a configuration with every section at its defaults
    pub fn with_database(database_path: &str) -> Self {
        Self {
            snapshot: SnapshotConfig::default(),
            endpoint: EndpointConfig::default(),
            rate_limit: RateLimitConfig::default(),
            auto_throttle: AutoThrottleConfig::default(),
            collection: CollectionConfig::default(),
            comment_stats: CommentStatsConfig::default(),
            volume: VolumeConfig::default(),
            storage: StorageConfig {
                database_path: database_path.to_string(),
                evidence_dir: default_evidence_dir(),
            },
            privacy: PrivacyConfig::default(),
            candidates: Vec::new(),
            articles: Vec::new(),
        }
    }
}

impl EndpointParams {
    /// Builds a parameter bag for the given ticket and template
    pub fn new(ticket: &str, template_id: &str) -> Self {
        Self {
            ticket: ticket.to_string(),
            template_id: template_id.to_string(),
            ..Self::default()
        }
    }
}

impl Default for EndpointParams {
    fn default() -> Self {
        Self {
            ticket: default_ticket(),
            template_id: default_template_id(),
            pool: default_pool(),
            page_size: default_page_size(),
            reply_page_size: default_page_size(),
            index_size: default_index_size(),
            sort: default_sort(),
            cv: None,
            template: None,
            more_type: None,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            timezone_offset_hours: default_timezone_offset(),
            reference_time: default_reference_time(),
            manual_snapshot_time: None,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            comment_url: default_comment_url(),
            stats_url: default_stats_url(),
            referer: default_referer(),
            user_agent: default_user_agent(),
            lang: default_lang(),
            country: default_country(),
            object_prefix: default_object_prefix(),
            extra_headers: BTreeMap::new(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            baseline_min_delay: default_min_delay(),
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
        }
    }
}

impl Default for AutoThrottleConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            up_ratio: default_up_ratio(),
            step_up: default_step_up(),
            recovery_window: default_recovery_window(),
            down_ratio: default_down_ratio(),
            step_down: default_step_down(),
            stop_on_ban: true,
            ban_status: default_ban_status(),
            throttle_status: default_throttle_status(),
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_comment_pages: default_max_comment_pages(),
            max_reply_pages: default_max_reply_pages(),
            structural_threshold: default_structural_threshold(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

impl Default for CommentStatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_comments: default_stats_min_comments(),
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            target_comments: default_target_comments(),
            min_acceptable_comments: default_min_acceptable(),
            max_total_articles: default_max_total_articles(),
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            allow_pii: false,
            mode: default_privacy_mode(),
            fixed_salt: None,
        }
    }
}

fn default_timezone_offset() -> i32 {
    9
}

fn default_reference_time() -> ReferenceTime {
    ReferenceTime::Start
}

fn default_comment_url() -> String {
    "https://apis.naver.com/commentBox/cbox/web_naver_list_jsonp.json".to_string()
}

fn default_stats_url() -> String {
    "https://apis.naver.com/commentBox/cbox/web_naver_statistics_jsonp.json".to_string()
}

fn default_referer() -> String {
    "https://n.news.naver.com/".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36".to_string()
}

fn default_lang() -> String {
    "ko".to_string()
}

fn default_country() -> String {
    "KR".to_string()
}

fn default_object_prefix() -> String {
    "news".to_string()
}

fn default_min_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    3.0
}

fn default_window() -> usize {
    50
}

fn default_up_ratio() -> f64 {
    0.05
}

fn default_step_up() -> f64 {
    0.5
}

fn default_recovery_window() -> usize {
    200
}

fn default_down_ratio() -> f64 {
    0.01
}

fn default_step_down() -> f64 {
    0.2
}

fn default_true() -> bool {
    true
}

fn default_ban_status() -> u16 {
    403
}

fn default_throttle_status() -> u16 {
    429
}

fn default_max_comment_pages() -> u32 {
    400
}

fn default_max_reply_pages() -> u32 {
    200
}

fn default_structural_threshold() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    30
}

fn default_stats_min_comments() -> u64 {
    100
}

fn default_target_comments() -> u64 {
    50_000
}

fn default_min_acceptable() -> u64 {
    30_000
}

fn default_max_total_articles() -> u64 {
    2_000
}

fn default_evidence_dir() -> String {
    "./logs".to_string()
}

fn default_privacy_mode() -> PrivacyMode {
    PrivacyMode::Ephemeral
}

fn default_ticket() -> String {
    "news".to_string()
}

fn default_template_id() -> String {
    "default_society".to_string()
}

fn default_pool() -> String {
    "cbox5".to_string()
}

fn default_page_size() -> u32 {
    20
}

fn default_index_size() -> u32 {
    10
}

fn default_sort() -> String {
    "FAVORITE".to_string()
}
