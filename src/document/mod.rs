//! Structured queries over parsed HTML documents.
//!
//! [`DocumentQuery`] is the small capability the listing resolver and the
//! article extractor need from an HTML engine. [`HtmlDocument`] implements it
//! on top of the `scraper` crate.
//!
//! Parsed documents are not `Send`; parse, query and drop them without
//! holding them across an `.await`.

use scraper::{ElementRef, Html, Selector};

/// Errors raised while querying a document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The CSS selector could not be parsed
    #[error("Invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },
}

/// Query capability over an opaque document handle
pub trait DocumentQuery {
    /// Normalized text of the first element matching `selector`.
    fn find_first(&self, selector: &str) -> Result<Option<String>, QueryError>;

    /// Normalized text of every element matching `selector`, in document order.
    fn find_all(&self, selector: &str) -> Result<Vec<String>, QueryError>;

    /// Links of the section that starts at the first `heading` match.
    ///
    /// Walks the heading's following siblings up to (excluding) the next
    /// sibling with the heading's tag name and returns the `href` of the
    /// first `link` match inside each one. Siblings without a link are
    /// skipped. Returns `None` when no heading matches.
    fn find_section(&self, heading: &str, link: &str) -> Result<Option<Vec<String>>, QueryError>;
}

/// A parsed HTML document
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }
}

impl std::fmt::Debug for HtmlDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlDocument").finish_non_exhaustive()
    }
}

fn selector(raw: &str) -> Result<Selector, QueryError> {
    Selector::parse(raw).map_err(|e| QueryError::Selector {
        selector: raw.to_string(),
        reason: format!("{e:?}"),
    })
}

/// Concatenated text of an element with runs of whitespace collapsed.
///
/// Text nodes are joined as-is before collapsing, so inline markup such as
/// `CO<sub>2</sub>` reads as `CO2`.
pub fn normalized_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl DocumentQuery for HtmlDocument {
    fn find_first(&self, raw: &str) -> Result<Option<String>, QueryError> {
        let sel = selector(raw)?;
        Ok(self.html.select(&sel).next().map(|e| normalized_text(&e)))
    }

    fn find_all(&self, raw: &str) -> Result<Vec<String>, QueryError> {
        let sel = selector(raw)?;
        Ok(self.html.select(&sel).map(|e| normalized_text(&e)).collect())
    }

    fn find_section(&self, heading: &str, link: &str) -> Result<Option<Vec<String>>, QueryError> {
        let heading_sel = selector(heading)?;
        let link_sel = selector(link)?;

        let Some(start) = self.html.select(&heading_sel).next() else {
            return Ok(None);
        };
        let heading_tag = start.value().name();

        let mut hrefs = Vec::new();
        for sibling in start.next_siblings().filter_map(ElementRef::wrap) {
            if sibling.value().name() == heading_tag {
                break;
            }

            let href = sibling
                .select(&link_sel)
                .find_map(|a| a.value().attr("href"))
                .map(str::trim)
                .filter(|h| !h.is_empty());

            match href {
                Some(href) => hrefs.push(href.to_string()),
                None => tracing::debug!(
                    tag = sibling.value().name(),
                    "Skipping section entry without a link"
                ),
            }
        }

        Ok(Some(hrefs))
    }
}
