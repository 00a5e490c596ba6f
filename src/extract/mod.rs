//! Per-article extraction over a rendered session.
//!
//! [`ArticleExtractor::extract`] drives one fresh session through the article
//! page: read the abstract, reveal the author rows, open the citation export
//! panel, select the requested style and wait for the citation text to
//! update. The session is closed on every exit path.
//!
//! The two interactive clicks are best effort. A control can report itself
//! clickable before its handler is attached, so the click may silently miss;
//! a missed click surfaces later as [`ExtractError::MissingAuthors`] or
//! [`ExtractError::CitationTimeout`].

use std::sync::Arc;
use tokio::time::{sleep, Instant};

use crate::config::{ExtractionConfig, SelectorConfig};
use crate::document::{DocumentQuery, HtmlDocument, QueryError};
use crate::models::{ArticleLink, ArticleRecord, CitationStyle};
use crate::session::{Locator, RenderedSession, SessionError, SessionFactory};
use crate::utils::{with_retry, RetryConfig, RetryError};

/// Errors raised by a single extraction attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// The article page could not be loaded
    #[error("Failed to load {link}: {reason}")]
    Navigation { link: String, reason: String },

    #[error("No abstract found on {link}")]
    MissingAbstract { link: String },

    /// No author row carried an affiliation
    #[error("No author affiliations found on {link}")]
    MissingAuthors { link: String },

    /// The citation panel never showed the selected style
    #[error("Citation on {link} did not update: {reason}")]
    CitationTimeout { link: String, reason: String },

    /// The extraction task died before reporting an outcome
    #[error("Extraction of {link} aborted: {reason}")]
    Aborted { link: String, reason: String },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Extracts [`ArticleRecord`]s from article pages
#[derive(Debug, Clone)]
pub struct ArticleExtractor {
    factory: Arc<dyn SessionFactory>,
    config: ExtractionConfig,
    selectors: SelectorConfig,
}

impl ArticleExtractor {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        config: ExtractionConfig,
        selectors: SelectorConfig,
    ) -> Self {
        Self {
            factory,
            config,
            selectors,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run one extraction attempt in a fresh session.
    pub async fn extract(
        &self,
        link: &ArticleLink,
        style: CitationStyle,
    ) -> Result<ArticleRecord, ExtractError> {
        let mut session = self.factory.open().await?;
        let result = self.extract_in(session.as_mut(), link, style).await;

        if let Err(e) = session.close().await {
            tracing::debug!(link = %link, "Failed to close session: {}", e);
        }
        result
    }

    /// Retry [`extract`](Self::extract) from scratch until it succeeds or
    /// `retry` gives up.
    pub async fn extract_with_retry(
        &self,
        link: &ArticleLink,
        style: CitationStyle,
        retry: &RetryConfig,
    ) -> Result<ArticleRecord, RetryError<ExtractError>> {
        with_retry(retry, |attempt| async move {
            self.extract(link, style).await.inspect_err(|e| {
                tracing::warn!(link = %link, attempt, "Extraction attempt failed: {}", e);
            })
        })
        .await
    }

    async fn extract_in(
        &self,
        session: &mut dyn RenderedSession,
        link: &ArticleLink,
        style: CitationStyle,
    ) -> Result<ArticleRecord, ExtractError> {
        session
            .navigate(link.as_str(), self.config.navigation_timeout())
            .await
            .map_err(|e| ExtractError::Navigation {
                link: link.to_string(),
                reason: e.to_string(),
            })?;

        let source = session.page_source().await?;
        let abstract_text = read_abstract(&source, &self.selectors.abstract_container)?
            .ok_or_else(|| ExtractError::MissingAbstract {
                link: link.to_string(),
            })?;

        let reveal = Locator::link_text(&self.selectors.reveal_authors_link_text);
        self.click_best_effort(session, &reveal).await;

        let source = session.page_source().await?;
        let affiliations = read_affiliations(
            &source,
            &self.selectors.author_row,
            &self.selectors.affiliation_separator,
        )?;
        let missing_authors = || ExtractError::MissingAuthors {
            link: link.to_string(),
        };
        if affiliations.is_empty() {
            return Err(missing_authors());
        }

        let citation = self.read_citation(session, link, style).await?;

        ArticleRecord::new(citation, abstract_text, &affiliations).ok_or_else(missing_authors)
    }

    /// Open the export panel, select `style` and wait for the citation
    /// region to change from its initial text.
    async fn read_citation(
        &self,
        session: &mut dyn RenderedSession,
        link: &ArticleLink,
        style: CitationStyle,
    ) -> Result<String, ExtractError> {
        let timeout_error = |reason: String| ExtractError::CitationTimeout {
            link: link.to_string(),
            reason,
        };

        let export = Locator::class_name(&self.selectors.export_citation_class);
        self.click_best_effort(session, &export).await;

        let select = session
            .wait_for_visible(
                &Locator::id(&self.selectors.style_select_id),
                self.config.wait_timeout(),
            )
            .await
            .map_err(|e| timeout_error(e.to_string()))?;
        let region = session
            .find_element(&Locator::id(&self.selectors.citation_text_id))
            .await?;
        let initial = session.text(&region).await?;

        session.select_by_value(&select, style.token()).await?;

        let deadline = Instant::now() + self.config.wait_timeout();
        loop {
            let current = session.text(&region).await?;
            if current != initial {
                return Ok(current);
            }
            if Instant::now() >= deadline {
                return Err(timeout_error(format!(
                    "{} style still shows its initial text",
                    style
                )));
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    /// Locate, settle and click `locator`, up to `click_attempts` times.
    ///
    /// Returns whether a click was delivered. Exhausting the attempts is not
    /// an error.
    async fn click_best_effort(
        &self,
        session: &mut dyn RenderedSession,
        locator: &Locator,
    ) -> bool {
        for attempt in 1..=self.config.click_attempts {
            let element = match session
                .wait_for_clickable(locator, self.config.wait_timeout())
                .await
            {
                Ok(element) => element,
                Err(e) => {
                    tracing::debug!(%locator, attempt, "Control not clickable: {}", e);
                    continue;
                }
            };

            sleep(self.config.settle_delay()).await;

            match session.click(&element).await {
                Ok(()) => return true,
                Err(SessionError::StaleElement(_)) => {
                    tracing::debug!(%locator, attempt, "Element went stale, locating again");
                }
                Err(e) => {
                    tracing::debug!(%locator, attempt, "Click failed: {}", e);
                }
            }
        }

        tracing::debug!(%locator, "Giving up on click");
        false
    }
}

fn read_abstract(source: &str, selector: &str) -> Result<Option<String>, QueryError> {
    let document = HtmlDocument::parse(source);
    Ok(document.find_first(selector)?.filter(|text| !text.is_empty()))
}

/// Affiliations of the author rows, in page order.
///
/// A row contributes the text after the first `separator`; rows without it
/// are skipped.
fn read_affiliations(
    source: &str,
    row_selector: &str,
    separator: &str,
) -> Result<Vec<String>, QueryError> {
    let document = HtmlDocument::parse(source);
    let rows = document.find_all(row_selector)?;

    Ok(rows
        .iter()
        .filter_map(|row| match row.split_once(separator) {
            Some((_, affiliation)) => Some(affiliation.trim().to_string()),
            None => {
                tracing::debug!(row = %row, "Author row without affiliation");
                None
            }
        })
        .filter(|affiliation| !affiliation.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockPage, MockSessionFactory};

    const URL: &str = "https://www.cambridge.org/core/article/one";

    fn fast_config() -> ExtractionConfig {
        ExtractionConfig {
            settle_delay_ms: 0,
            poll_interval_ms: 1,
            wait_timeout_secs: 0,
            ..ExtractionConfig::default()
        }
    }

    fn extractor(factory: Arc<MockSessionFactory>) -> ArticleExtractor {
        ArticleExtractor::new(factory, fast_config(), SelectorConfig::default())
    }

    fn link() -> ArticleLink {
        ArticleLink::new(URL)
    }

    #[tokio::test]
    async fn test_extract_full_record() {
        let page = MockPage::article("A1", &["Univ X", "Univ Y", "Univ Z"], "Smith, J. (2020).");
        let factory = Arc::new(MockSessionFactory::new().with_page(URL, page));

        let record = extractor(factory.clone())
            .extract(&link(), CitationStyle::Chicago)
            .await
            .unwrap();

        assert_eq!(record.citation(), "Smith, J. (2020).");
        assert_eq!(record.abstract_text(), "A1");
        assert_eq!(record.first_author_institution(), "Univ X");
        assert_eq!(record.other_author_institutions(), "Univ Y / Univ Z");
        assert_eq!(factory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_extract_keeps_inline_markup_text() {
        let page = MockPage::article(
            "Emissions of CO<sub>2</sub> in <i>Nature</i>, revisited.",
            &["Dept. of <i>Economics</i>, MIT", "Univ<b>ersity</b> Y"],
            "Cite",
        );
        let factory = Arc::new(MockSessionFactory::new().with_page(URL, page));

        let record = extractor(factory)
            .extract(&link(), CitationStyle::Chicago)
            .await
            .unwrap();
        assert_eq!(record.abstract_text(), "Emissions of CO2 in Nature, revisited.");
        assert_eq!(record.first_author_institution(), "Dept. of Economics, MIT");
        assert_eq!(record.other_author_institutions(), "University Y");
    }

    #[tokio::test]
    async fn test_extract_single_author() {
        let page = MockPage::article("A1", &["Univ X"], "Cite");
        let factory = Arc::new(MockSessionFactory::new().with_page(URL, page));

        let record = extractor(factory)
            .extract(&link(), CitationStyle::Chicago)
            .await
            .unwrap();
        assert_eq!(record.first_author_institution(), "Univ X");
        assert_eq!(record.other_author_institutions(), "");
    }

    #[tokio::test]
    async fn test_extract_uses_style_token() {
        let page =
            MockPage::article("A1", &["Univ X"], "Chicago cite").citation_for("apa", "APA cite");
        let factory = Arc::new(MockSessionFactory::new().with_page(URL, page));

        let record = extractor(factory)
            .extract(&link(), CitationStyle::Apa)
            .await
            .unwrap();
        assert_eq!(record.citation(), "APA cite");
    }

    #[tokio::test]
    async fn test_missing_abstract_closes_session() {
        let page = MockPage::article("A1", &["Univ X"], "Cite").without_abstract();
        let factory = Arc::new(MockSessionFactory::new().with_page(URL, page));

        let err = extractor(factory.clone())
            .extract(&link(), CitationStyle::Chicago)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingAbstract { .. }));
        assert_eq!(factory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_navigation_failure() {
        let factory = Arc::new(MockSessionFactory::new());

        let err = extractor(factory.clone())
            .extract(&link(), CitationStyle::Chicago)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Navigation { .. }));
        assert_eq!(factory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_missing_authors_when_no_rows() {
        let page = MockPage::article("A1", &[], "Cite");
        let factory = Arc::new(MockSessionFactory::new().with_page(URL, page));

        let err = extractor(factory)
            .extract(&link(), CitationStyle::Chicago)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingAuthors { .. }));
    }

    #[tokio::test]
    async fn test_frozen_citation_times_out() {
        let page = MockPage::article("A1", &["Univ X"], "Cite")
            .initial_citation("Loading")
            .frozen_citation();
        let factory = Arc::new(MockSessionFactory::new().with_page(URL, page));

        let err = extractor(factory.clone())
            .extract(&link(), CitationStyle::Chicago)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::CitationTimeout { .. }));
        assert_eq!(factory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_stale_clicks_are_retried() {
        // one stale click on each of the two controls
        let page = MockPage::article("A1", &["Univ X"], "Cite").stale_clicks(2);
        let factory = Arc::new(MockSessionFactory::new().with_page(URL, page));

        let record = extractor(factory)
            .extract(&link(), CitationStyle::Chicago)
            .await
            .unwrap();
        assert_eq!(record.citation(), "Cite");
    }

    #[tokio::test]
    async fn test_exhausted_clicks_proceed_and_fail_downstream() {
        let page = MockPage::article("A1", &["Univ X"], "Cite").stale_clicks(3);
        let factory = Arc::new(MockSessionFactory::new().with_page(URL, page));

        // every reveal click goes stale, so no author rows appear
        let err = extractor(factory)
            .extract(&link(), CitationStyle::Chicago)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingAuthors { .. }));
    }

    #[tokio::test]
    async fn test_silently_missed_click_fails_downstream() {
        // the reveal click reports success but the author rows never appear
        let page = MockPage::article("A1", &["Univ X"], "Cite").ignored_clicks(1);
        let factory = Arc::new(MockSessionFactory::new().with_page(URL, page));

        let err = extractor(factory.clone())
            .extract(&link(), CitationStyle::Chicago)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingAuthors { .. }));
        assert_eq!(factory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_extract_with_retry_recovers() {
        let page = MockPage::article("A1", &["Univ X"], "Cite");
        let factory = Arc::new(
            MockSessionFactory::new()
                .with_page(URL, page)
                .fail_navigation(URL, 2),
        );

        let record = extractor(factory.clone())
            .extract_with_retry(&link(), CitationStyle::Chicago, &RetryConfig::immediate(5))
            .await
            .unwrap();
        assert_eq!(record.abstract_text(), "A1");
        assert_eq!(factory.navigations(URL), 3);
        assert_eq!(factory.sessions_opened(), 3);
        assert_eq!(factory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_extract_with_retry_exhausts() {
        let page = MockPage::article("A1", &["Univ X"], "Cite");
        let factory = Arc::new(
            MockSessionFactory::new()
                .with_page(URL, page)
                .fail_navigation(URL, 10),
        );

        let err = extractor(factory.clone())
            .extract_with_retry(&link(), CitationStyle::Chicago, &RetryConfig::immediate(3))
            .await
            .unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert!(matches!(err.last_error(), ExtractError::Navigation { .. }));
        assert_eq!(factory.navigations(URL), 3);
    }

    #[test]
    fn test_read_affiliations_skips_rows_without_separator() {
        let html = r#"
            <div class="row author"><span>Jane Roe</span>
                Affiliation:   Univ   X</div>
            <div class="row author">Editor note</div>
            <div class="row author">John Doe Affiliation: Univ Y Affiliation: Dept Z</div>
        "#;
        let affiliations = read_affiliations(html, "div.row.author", " Affiliation: ").unwrap();
        assert_eq!(affiliations, vec!["Univ X", "Univ Y Affiliation: Dept Z"]);
    }
}
