//! Crawler module for comment collection
//!
//! This module contains the adaptive collection engine, including:
//! - Request pacing with the adaptive rate governor
//! - Governed HTTP fetching with failure classification
//! - Payload decoding and record building
//! - The per-article pagination walk
//! - The run driver and pre-flight check

mod collector;
mod comment_stats;
mod fetcher;
mod governor;
mod harvester;
mod payload;
mod preflight;
mod records;

pub use collector::{CollectorMetrics, CommentCollector, CursorStep, CursorTrail};
pub use comment_stats::normalize_stats;
pub use fetcher::{build_http_client, CommentFetcher, FetchedPage};
pub use governor::{GovernorEvent, RateGovernor};
pub use harvester::{finalize_interrupted_run, Harvester, ParameterProbe, RunOutcome, StaticProbe};
pub use payload::{
    extract_comments, extract_cursor, extract_total_count, parse_payload, validate_schema,
    CommentView, REQUIRED_FIELDS,
};
pub use preflight::{deep_validate, run_preflight, PreflightReport};
pub use records::{fixed_offset, normalize_timestamp, resolve_snapshot, BuiltRecord, RecordBuilder};
