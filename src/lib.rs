//! # Citation Harvester
//!
//! Extracts bibliographic records (formatted citation, abstract and author
//! affiliations) from the articles of a journal issue listing and exports
//! them as CSV or Excel.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`listing`]: fetches an issue listing and resolves its article links
//! - [`session`]: rendered-page sessions (headless Chrome, scripted mocks)
//! - [`extract`]: per-article extraction protocol over a session
//! - [`harvest`]: bounded-concurrency coordinator and the end-to-end pipeline
//! - [`export`]: CSV and XLSX writers
//! - [`document`]: HTML query capability
//! - [`models`]: records, links and citation styles
//! - [`utils`]: HTTP client, retry and progress helpers
//! - [`config`]: Configuration management

pub mod config;
pub mod document;
pub mod export;
pub mod extract;
pub mod harvest;
pub mod listing;
pub mod models;
pub mod session;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use harvest::{Harvester, HarvestError, HarvestSummary};
pub use models::{ArticleLink, ArticleRecord, CitationStyle, ResultSet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
