//! Core data models for article extraction.

mod record;
mod style;

pub use record::{ArticleLink, ArticleRecord, ResultSet, AFFILIATION_DELIMITER, RECORD_HEADERS};
pub use style::{CitationStyle, UnknownStyle};
