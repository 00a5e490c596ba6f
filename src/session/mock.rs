//! Mock sessions for testing purposes.
//!
//! [`MockPage`] scripts one article page laid out like the live site: an
//! abstract, author rows revealed by a "Show author details" link, and a
//! citation export panel whose text changes when a style is selected.
//! [`MockSessionFactory`] serves those pages by URL and keeps count of how
//! many sessions are open at once.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ElementHandle, Locator, RenderedSession, SessionError, SessionFactory};

/// A scripted article page
#[derive(Debug, Clone)]
pub struct MockPage {
    abstract_text: Option<String>,
    affiliations: Vec<String>,
    initial_citation: String,
    citations: HashMap<String, String>,
    citation_frozen: bool,
    stale_clicks: usize,
    ignored_clicks: usize,
    reveal_locator: Locator,
    export_locator: Locator,
    select_locator: Locator,
    citation_locator: Locator,
}

impl MockPage {
    /// An article whose Chicago citation becomes `citation` once selected.
    pub fn article(abstract_text: &str, affiliations: &[&str], citation: &str) -> Self {
        let mut citations = HashMap::new();
        citations.insert("chicagob".to_string(), citation.to_string());

        Self {
            abstract_text: Some(abstract_text.to_string()),
            affiliations: affiliations.iter().map(|s| s.to_string()).collect(),
            initial_citation: String::new(),
            citations,
            citation_frozen: false,
            stale_clicks: 0,
            ignored_clicks: 0,
            reveal_locator: Locator::link_text("Show author details"),
            export_locator: Locator::class_name("export-citation-product"),
            select_locator: Locator::id("selectCitationStyle"),
            citation_locator: Locator::id("citationText"),
        }
    }

    /// Drop the abstract container from the page.
    pub fn without_abstract(mut self) -> Self {
        self.abstract_text = None;
        self
    }

    /// Text shown in the citation region before any style is selected.
    pub fn initial_citation(mut self, text: &str) -> Self {
        self.initial_citation = text.to_string();
        self
    }

    /// Citation text shown after selecting the option `token`.
    pub fn citation_for(mut self, token: &str, text: &str) -> Self {
        self.citations.insert(token.to_string(), text.to_string());
        self
    }

    /// Selecting a style never updates the citation region.
    pub fn frozen_citation(mut self) -> Self {
        self.citation_frozen = true;
        self
    }

    /// The first `n` clicks fail with a stale element.
    pub fn stale_clicks(mut self, n: usize) -> Self {
        self.stale_clicks = n;
        self
    }

    /// The first `n` clicks report success but have no effect.
    pub fn ignored_clicks(mut self, n: usize) -> Self {
        self.ignored_clicks = n;
        self
    }

    fn render(&self, revealed: bool) -> String {
        let mut html = String::from("<html><body><h1>Article</h1>");
        if let Some(text) = &self.abstract_text {
            html.push_str(&format!("<div class=\"abstract\"><p>{}</p></div>", text));
        }
        html.push_str("<a href=\"#authors\">Show author details</a>");
        if revealed {
            for (i, affiliation) in self.affiliations.iter().enumerate() {
                html.push_str(&format!(
                    "<div class=\"row author\"><span>Author {}</span> Affiliation: {}</div>",
                    i + 1,
                    affiliation
                ));
            }
        }
        html.push_str("</body></html>");
        html
    }
}

#[derive(Debug, Default)]
struct Counters {
    open: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
    navigation_failures: Mutex<HashMap<String, usize>>,
    navigations: Mutex<HashMap<String, usize>>,
}

impl Counters {
    fn release(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serves [`MockPage`]s by URL and tracks open sessions
#[derive(Debug, Default)]
pub struct MockSessionFactory {
    pages: HashMap<String, MockPage>,
    navigation_delay: Duration,
    counters: Arc<Counters>,
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `page` at `url`.
    pub fn with_page(mut self, url: &str, page: MockPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Fail the next `times` navigations to `url`.
    pub fn fail_navigation(self, url: &str, times: usize) -> Self {
        self.counters
            .navigation_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), times);
        self
    }

    /// Make every navigation take `delay`.
    pub fn navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }

    /// Sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Highest number of sessions open at the same time
    pub fn peak_open_sessions(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Sessions opened so far
    pub fn sessions_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Navigations attempted to `url`
    pub fn navigations(&self, url: &str) -> usize {
        self.counters
            .navigations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn open(&self) -> Result<Box<dyn RenderedSession>, SessionError> {
        let now_open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now_open, Ordering::SeqCst);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockSession {
            pages: self.pages.clone(),
            navigation_delay: self.navigation_delay,
            counters: Arc::clone(&self.counters),
            page: None,
            revealed: false,
            panel_open: false,
            citation: String::new(),
            elements: HashMap::new(),
            next_id: 0,
            closed: false,
        }))
    }
}

struct MockSession {
    pages: HashMap<String, MockPage>,
    navigation_delay: Duration,
    counters: Arc<Counters>,
    page: Option<MockPage>,
    revealed: bool,
    panel_open: bool,
    citation: String,
    elements: HashMap<u64, Locator>,
    next_id: u64,
    closed: bool,
}

impl MockSession {
    fn page(&self) -> Result<&MockPage, SessionError> {
        self.page
            .as_ref()
            .ok_or_else(|| SessionError::Driver("no page loaded".to_string()))
    }

    fn handle(&mut self, locator: &Locator) -> ElementHandle {
        self.next_id += 1;
        self.elements.insert(self.next_id, locator.clone());
        ElementHandle::new(self.next_id, locator.clone())
    }

    fn resolve(&self, handle: &ElementHandle) -> Result<Locator, SessionError> {
        self.elements
            .get(&handle.id())
            .cloned()
            .ok_or_else(|| SessionError::StaleElement(handle.locator().to_string()))
    }

    fn is_clickable(&self, locator: &Locator) -> Result<bool, SessionError> {
        let page = self.page()?;
        Ok(*locator == page.reveal_locator || *locator == page.export_locator)
    }

    fn is_visible(&self, locator: &Locator) -> Result<bool, SessionError> {
        let page = self.page()?;
        if *locator == page.select_locator || *locator == page.citation_locator {
            return Ok(self.panel_open);
        }
        self.is_clickable(locator)
    }
}

#[async_trait]
impl RenderedSession for MockSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), SessionError> {
        if !self.navigation_delay.is_zero() {
            tokio::time::sleep(self.navigation_delay).await;
        }

        *self
            .counters
            .navigations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.to_string())
            .or_default() += 1;

        {
            let mut failures = self
                .counters
                .navigation_failures
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(remaining) = failures.get_mut(url).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(SessionError::Navigation(format!("{}: injected failure", url)));
            }
        }

        let page = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| SessionError::Navigation(format!("{}: 404", url)))?;

        self.citation = page.initial_citation.clone();
        self.page = Some(page);
        self.revealed = false;
        self.panel_open = false;
        self.elements.clear();
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        Ok(self.page()?.render(self.revealed))
    }

    async fn wait_for_clickable(
        &mut self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<ElementHandle, SessionError> {
        if self.is_clickable(locator)? {
            Ok(self.handle(locator))
        } else {
            Err(SessionError::Timeout(locator.to_string()))
        }
    }

    async fn wait_for_visible(
        &mut self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<ElementHandle, SessionError> {
        if self.is_visible(locator)? {
            Ok(self.handle(locator))
        } else {
            Err(SessionError::Timeout(locator.to_string()))
        }
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle, SessionError> {
        let page = self.page()?;
        let known = *locator == page.citation_locator
            || *locator == page.select_locator
            || self.is_clickable(locator)?;
        if known {
            Ok(self.handle(locator))
        } else {
            Err(SessionError::NotFound(locator.to_string()))
        }
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        let locator = self.resolve(element)?;
        let page = self
            .page
            .as_mut()
            .ok_or_else(|| SessionError::Driver("no page loaded".to_string()))?;

        if page.stale_clicks > 0 {
            page.stale_clicks -= 1;
            self.elements.remove(&element.id());
            return Err(SessionError::StaleElement(locator.to_string()));
        }
        if page.ignored_clicks > 0 {
            page.ignored_clicks -= 1;
            return Ok(());
        }

        if locator == page.reveal_locator {
            self.revealed = true;
        } else if locator == page.export_locator {
            self.panel_open = true;
        }
        Ok(())
    }

    async fn select_by_value(
        &mut self,
        element: &ElementHandle,
        value: &str,
    ) -> Result<(), SessionError> {
        self.resolve(element)?;
        let page = self.page()?;
        let text = page
            .citations
            .get(value)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("option '{}'", value)))?;
        if !page.citation_frozen {
            self.citation = text;
        }
        Ok(())
    }

    async fn text(&mut self, element: &ElementHandle) -> Result<String, SessionError> {
        let locator = self.resolve(element)?;
        if locator == self.page()?.citation_locator {
            Ok(self.citation.clone())
        } else {
            Ok(String::new())
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if !self.closed {
            self.closed = true;
            self.counters.release();
        }
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.release();
        }
    }
}
