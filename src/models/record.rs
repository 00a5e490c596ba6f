//! Article links, extracted records and the per-run result set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delimiter used to join the affiliations of authors 2..n
pub const AFFILIATION_DELIMITER: &str = " / ";

/// Column headers of every tabular export, in output order
pub const RECORD_HEADERS: [&str; 4] = [
    "Chicago Citation",
    "Abstract",
    "First Author Institution",
    "Other Author Institutions",
];

/// Absolute URL of one article detail page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleLink(String);

impl ArticleLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<url::Url> for ArticleLink {
    fn from(url: url::Url) -> Self {
        Self(url.into())
    }
}

/// One successfully extracted article
///
/// Records are only built from a complete extraction; fields are read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    citation: String,
    abstract_text: String,
    first_author_institution: String,
    other_author_institutions: String,
}

impl ArticleRecord {
    /// Build a record from its parts.
    ///
    /// `affiliations` must be in author order; the first entry becomes the
    /// first-author institution and the rest are joined with
    /// [`AFFILIATION_DELIMITER`]. Returns `None` when `affiliations` is empty.
    pub fn new(citation: String, abstract_text: String, affiliations: &[String]) -> Option<Self> {
        let (first, others) = affiliations.split_first()?;
        Some(Self {
            citation,
            abstract_text,
            first_author_institution: first.clone(),
            other_author_institutions: others.join(AFFILIATION_DELIMITER),
        })
    }

    pub fn citation(&self) -> &str {
        &self.citation
    }

    pub fn abstract_text(&self) -> &str {
        &self.abstract_text
    }

    pub fn first_author_institution(&self) -> &str {
        &self.first_author_institution
    }

    pub fn other_author_institutions(&self) -> &str {
        &self.other_author_institutions
    }

    /// Cells in [`RECORD_HEADERS`] order
    pub fn columns(&self) -> [&str; 4] {
        [
            &self.citation,
            &self.abstract_text,
            &self.first_author_institution,
            &self.other_author_institutions,
        ]
    }
}

/// Successful records of one run, in completion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    records: Vec<ArticleRecord>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed record.
    pub fn push(&mut self, record: ArticleRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ArticleRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[ArticleRecord] {
        &self.records
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ArticleRecord;
    type IntoIter = std::slice::Iter<'a, ArticleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
