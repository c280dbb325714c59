//! Output module for run summaries
//!
//! This module handles:
//! - Loading per-run statistics from storage
//! - Printing them for the `--stats` command

pub mod stats;

pub use stats::{load_statistics, print_statistics, RunStatistics, RECENT_EVENTS};
