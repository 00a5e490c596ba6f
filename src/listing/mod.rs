//! Discovery of article links on an issue listing page.
//!
//! A listing groups articles under headings per article type. The resolver
//! fetches the listing, finds the heading that opens the configured section
//! and collects one link per entry until the next heading of the same kind.

use async_trait::async_trait;
use url::Url;

use crate::config::{SelectorConfig, SiteConfig};
use crate::document::{DocumentQuery, HtmlDocument, QueryError};
use crate::models::ArticleLink;
use crate::utils::HttpClient;

/// Errors raised while resolving a listing
#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    /// The listing page could not be retrieved
    #[error("Failed to fetch listing {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The listing has no section heading
    #[error("Listing {url} has no section matching '{heading}'")]
    Structure { url: String, heading: String },

    /// Base origin or a discovered link is not a valid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Retrieves raw documents by URL
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ListingError>;
}

#[async_trait]
impl DocumentFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<String, ListingError> {
        self.get_text(url).await.map_err(|e| ListingError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Resolves a listing page into article links
pub struct ListingResolver<F> {
    fetcher: F,
    base: Url,
    heading_selector: String,
    link_selector: String,
}

impl<F: DocumentFetcher> ListingResolver<F> {
    pub fn new(
        fetcher: F,
        site: &SiteConfig,
        selectors: &SelectorConfig,
    ) -> Result<Self, ListingError> {
        let base = Url::parse(&site.base_url)
            .map_err(|e| ListingError::InvalidUrl(format!("{}: {}", site.base_url, e)))?;

        Ok(Self {
            fetcher,
            base,
            heading_selector: selectors.section_heading.clone(),
            link_selector: selectors.section_link.clone(),
        })
    }

    /// Fetch `listing_url` and return the absolute links of its section.
    ///
    /// A section with no entries yields an empty list.
    pub async fn resolve(&self, listing_url: &str) -> Result<Vec<ArticleLink>, ListingError> {
        tracing::debug!(url = listing_url, "Fetching listing");
        let html = self.fetcher.fetch(listing_url).await?;

        let links = self.links_from_html(listing_url, &html)?;
        tracing::info!(url = listing_url, count = links.len(), "Resolved article links");
        Ok(links)
    }

    /// Extract the section links from an already fetched listing.
    pub fn links_from_html(
        &self,
        listing_url: &str,
        html: &str,
    ) -> Result<Vec<ArticleLink>, ListingError> {
        let document = HtmlDocument::parse(html);
        let hrefs = document
            .find_section(&self.heading_selector, &self.link_selector)?
            .ok_or_else(|| ListingError::Structure {
                url: listing_url.to_string(),
                heading: self.heading_selector.clone(),
            })?;

        hrefs
            .iter()
            .map(|href| {
                self.base
                    .join(href)
                    .map(ArticleLink::from)
                    .map_err(|e| ListingError::InvalidUrl(format!("{}: {}", href, e)))
            })
            .collect()
    }
}
