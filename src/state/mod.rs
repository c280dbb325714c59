//! State module for tracking collection progress
//!
//! # Components
//!
//! - `ArticleKey`: identifies an article by its (oid, aid) pair
//! - `ArticleStatus`: per-run collection status of an article
//! - `PageScope`: whether a page belongs to the comment or reply listing

mod article_state;

// Re-export main types
pub use article_state::{ArticleKey, ArticleStatus, PageScope};
