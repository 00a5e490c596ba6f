//! Rendered-page sessions.
//!
//! A [`RenderedSession`] is an interactive handle on one fully scripted page:
//! navigate, wait for elements, click, pick a `<select>` option and read text
//! back. Sessions come from a [`SessionFactory`]; each extraction attempt opens
//! its own session and closes it before returning.
//!
//! Two factories ship with the crate:
//!
//! - [`ChromiumSessionFactory`]: headless Chrome driven over CDP
//! - [`MockSessionFactory`]: scripted pages for tests

mod chromium;
pub mod mock;

pub use chromium::ChromiumSessionFactory;
pub use mock::{MockPage, MockSessionFactory};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// How to find an element on a rendered page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Element `id` attribute
    Id(String),
    /// Single CSS class name
    ClassName(String),
    /// Anchor whose visible text equals the given string
    LinkText(String),
    /// Arbitrary CSS selector
    Css(String),
}

impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }

    pub fn class_name(class: impl Into<String>) -> Self {
        Locator::ClassName(class.into())
    }

    pub fn link_text(text: impl Into<String>) -> Self {
        Locator::LinkText(text.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{}", id),
            Locator::ClassName(class) => write!(f, ".{}", class),
            Locator::LinkText(text) => write!(f, "link '{}'", text),
            Locator::Css(css) => write!(f, "{}", css),
        }
    }
}

/// Opaque reference to an element located in a session
///
/// Only valid for the session that produced it. The element may go stale if
/// the page re-renders; operations then fail with
/// [`SessionError::StaleElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    id: u64,
    locator: Locator,
}

impl ElementHandle {
    pub fn new(id: u64, locator: Locator) -> Self {
        Self { id, locator }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }
}

/// Errors raised by a rendered session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The browser or a new page could not be started
    #[error("Failed to open session: {0}")]
    Launch(String),

    /// The target page could not be loaded
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// A bounded wait elapsed before its condition held
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// The element was detached between locate and use
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// No element matches the locator
    #[error("Element not found: {0}")]
    NotFound(String),

    /// Any other driver/protocol failure
    #[error("Driver error: {0}")]
    Driver(String),
}

/// Interactive handle on one rendered page
#[async_trait]
pub trait RenderedSession: Send {
    /// Load `url` and wait (at most `timeout`) for it to finish rendering.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError>;

    /// Serialized DOM of the page as currently rendered.
    async fn page_source(&mut self) -> Result<String, SessionError>;

    /// Wait until an element matching `locator` is displayed and enabled.
    async fn wait_for_clickable(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError>;

    /// Wait until an element matching `locator` is displayed.
    async fn wait_for_visible(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError>;

    /// Locate an element without waiting.
    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle, SessionError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError>;

    /// Choose the `<option>` with the given value and fire `change`.
    async fn select_by_value(
        &mut self,
        element: &ElementHandle,
        value: &str,
    ) -> Result<(), SessionError>;

    /// Rendered text of the element.
    async fn text(&mut self, element: &ElementHandle) -> Result<String, SessionError>;

    /// Release the session. Calling it twice is a no-op.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Source of fresh rendered sessions
#[async_trait]
pub trait SessionFactory: Send + Sync + fmt::Debug {
    async fn open(&self) -> Result<Box<dyn RenderedSession>, SessionError>;
}
