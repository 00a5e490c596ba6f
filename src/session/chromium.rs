//! Headless Chrome sessions over the DevTools protocol.
//!
//! One browser process serves a whole run; every session is a fresh tab that
//! is closed when the session is closed or dropped.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{ElementHandle, Locator, RenderedSession, SessionError, SessionFactory};
use crate::config::BrowserSettings;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const IS_VISIBLE_JS: &str = r#"function() {
    const style = window.getComputedStyle(this);
    const rect = this.getBoundingClientRect();
    return style.display !== 'none' && style.visibility !== 'hidden'
        && rect.width > 0 && rect.height > 0;
}"#;

const IS_CLICKABLE_JS: &str = r#"function() {
    const style = window.getComputedStyle(this);
    const rect = this.getBoundingClientRect();
    return style.display !== 'none' && style.visibility !== 'hidden'
        && rect.width > 0 && rect.height > 0 && !this.disabled;
}"#;

/// Launches Chrome once and hands out one tab per session
pub struct ChromiumSessionFactory {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
}

impl ChromiumSessionFactory {
    /// Start a browser process with the given settings.
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, SessionError> {
        let mut builder = BrowserConfig::builder()
            .window_size(settings.window_width, settings.window_height)
            .request_timeout(Duration::from_secs(settings.request_timeout_secs));

        if !settings.headless {
            builder = builder.with_head();
        }
        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }

        let config = builder.build().map_err(SessionError::Launch)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        // The handler drives the CDP connection and must be polled for the
        // lifetime of the browser.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler event error: {}", e);
                }
            }
        });

        tracing::info!(headless = settings.headless, "Browser launched");

        Ok(Self {
            browser: Arc::new(browser),
            handler,
        })
    }

    /// Close the browser process. Sessions must already be closed.
    pub async fn shutdown(self) {
        match Arc::try_unwrap(self.browser) {
            Ok(mut browser) => {
                if let Err(e) = browser.close().await {
                    tracing::warn!("Failed to close browser: {}", e);
                }
                if let Err(e) = browser.wait().await {
                    tracing::warn!("Failed to wait for browser exit: {}", e);
                }
            }
            Err(_) => tracing::warn!("Browser still shared at shutdown; leaving it to drop"),
        }
        self.handler.abort();
    }
}

impl fmt::Debug for ChromiumSessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromiumSessionFactory").finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn open(&self) -> Result<Box<dyn RenderedSession>, SessionError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        Ok(Box::new(ChromiumSession::new(page)))
    }
}

/// One browser tab
pub struct ChromiumSession {
    page: Option<Page>,
    elements: HashMap<u64, Element>,
    next_id: u64,
    url: String,
    runtime_handle: tokio::runtime::Handle,
}

impl ChromiumSession {
    fn new(page: Page) -> Self {
        Self {
            page: Some(page),
            elements: HashMap::new(),
            next_id: 0,
            url: String::new(),
            runtime_handle: tokio::runtime::Handle::current(),
        }
    }

    fn page(&self) -> Result<&Page, SessionError> {
        self.page
            .as_ref()
            .ok_or_else(|| SessionError::Driver("session already closed".to_string()))
    }

    fn element(&self, handle: &ElementHandle) -> Result<&Element, SessionError> {
        self.elements
            .get(&handle.id())
            .ok_or_else(|| SessionError::StaleElement(handle.locator().to_string()))
    }

    fn register(&mut self, element: Element, locator: &Locator) -> ElementHandle {
        self.next_id += 1;
        self.elements.insert(self.next_id, element);
        ElementHandle::new(self.next_id, locator.clone())
    }

    async fn locate(&self, locator: &Locator) -> Result<Element, SessionError> {
        let page = self.page()?;
        let found = match locator {
            Locator::Id(id) => page.find_element(format!("[id={}]", css_string(id))).await,
            Locator::ClassName(class) => {
                page.find_element(format!("[class~={}]", css_string(class)))
                    .await
            }
            Locator::Css(css) => page.find_element(css.as_str()).await,
            Locator::LinkText(text) => page.find_xpath(link_text_xpath(text)).await,
        };
        found.map_err(|e| classify(e, locator))
    }

    async fn check(&self, element: &Element, predicate: &str) -> Result<bool, SessionError> {
        let returns = element
            .call_js_fn(predicate, false)
            .await
            .map_err(classify_element)?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// Poll until an element matching `locator` satisfies `predicate`.
    async fn wait_until(
        &mut self,
        locator: &Locator,
        predicate: &str,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError> {
        self.page()?;
        let deadline = Instant::now() + timeout;
        loop {
            // Lookup failures are expected while the page is still rendering;
            // only the deadline ends the wait.
            let last = match self.locate(locator).await {
                Ok(element) => match self.check(&element, predicate).await {
                    Ok(true) => return Ok(self.register(element, locator)),
                    Ok(false) => "not ready".to_string(),
                    Err(e) => e.to_string(),
                },
                Err(e) => e.to_string(),
            };

            if Instant::now() >= deadline {
                tracing::trace!(%locator, %last, "Wait expired");
                return Err(SessionError::Timeout(locator.to_string()));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl RenderedSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError> {
        let page = self.page()?;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(SessionError::Navigation(format!("{}: {}", url, e))),
            Err(_) => {
                return Err(SessionError::Navigation(format!(
                    "{}: no load within {:?}",
                    url, timeout
                )))
            }
        }
        self.url = url.to_string();
        self.elements.clear();
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        self.page()?
            .content()
            .await
            .map_err(|e| SessionError::Driver(e.to_string()))
    }

    async fn wait_for_clickable(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError> {
        self.wait_until(locator, IS_CLICKABLE_JS, timeout).await
    }

    async fn wait_for_visible(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError> {
        self.wait_until(locator, IS_VISIBLE_JS, timeout).await
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle, SessionError> {
        let element = self.locate(locator).await?;
        Ok(self.register(element, locator))
    }

    async fn click(&mut self, handle: &ElementHandle) -> Result<(), SessionError> {
        self.element(handle)?
            .click()
            .await
            .map(|_| ())
            .map_err(classify_element)
    }

    async fn select_by_value(
        &mut self,
        handle: &ElementHandle,
        value: &str,
    ) -> Result<(), SessionError> {
        let value_literal =
            serde_json::to_string(value).map_err(|e| SessionError::Driver(e.to_string()))?;
        let script = format!(
            r#"function() {{
                const wanted = {value_literal};
                const option = Array.from(this.options || []).find(o => o.value === wanted);
                if (!option) {{ return false; }}
                this.value = wanted;
                this.dispatchEvent(new Event('input', {{ bubbles: true }}));
                this.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }}"#
        );

        let returns = self
            .element(handle)?
            .call_js_fn(script, false)
            .await
            .map_err(classify_element)?;

        match returns.result.value.and_then(|v| v.as_bool()) {
            Some(true) => Ok(()),
            _ => Err(SessionError::NotFound(format!(
                "option '{}' in {}",
                value,
                handle.locator()
            ))),
        }
    }

    async fn text(&mut self, handle: &ElementHandle) -> Result<String, SessionError> {
        let text = self
            .element(handle)?
            .inner_text()
            .await
            .map_err(classify_element)?;
        Ok(text.unwrap_or_default().trim().to_string())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.elements.clear();
        if let Some(page) = self.page.take() {
            page.close()
                .await
                .map_err(|e| SessionError::Driver(e.to_string()))?;
            tracing::trace!(url = %self.url, "Session closed");
        }
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            let url = std::mem::take(&mut self.url);
            self.runtime_handle.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::warn!("Session drop cleanup failed for {}: {}", url, e);
                }
            });
        }
    }
}

/// Quote a string as a CSS string literal.
fn css_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn link_text_xpath(text: &str) -> String {
    let literal = if !text.contains('\'') {
        format!("'{}'", text)
    } else if !text.contains('"') {
        format!("\"{}\"", text)
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    };
    format!("//a[normalize-space(.)={}]", literal)
}

fn is_stale(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("could not find node")
        || message.contains("no node with given id")
        || message.contains("node is detached")
        || message.contains("cannot find context with specified id")
}

fn classify(err: CdpError, locator: &Locator) -> SessionError {
    let message = err.to_string();
    if is_stale(&message) {
        SessionError::StaleElement(locator.to_string())
    } else if message.to_lowercase().contains("not found") {
        SessionError::NotFound(locator.to_string())
    } else {
        SessionError::Driver(message)
    }
}

fn classify_element(err: CdpError) -> SessionError {
    let message = err.to_string();
    if is_stale(&message) {
        SessionError::StaleElement(message)
    } else {
        SessionError::Driver(message)
    }
}
