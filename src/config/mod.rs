//! Configuration management.
//!
//! Every section has serde defaults, so an empty file (or no file at all)
//! yields a working configuration for the Cambridge Core article listings.

mod file_config;

pub use file_config::{
    config_search_paths, find_config_file, load_config, load_env_config, save_config, ConfigError,
    CONFIG_FILE_NAME,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::export::ExportFormat;
use crate::models::CitationStyle;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Target site settings
    #[serde(default)]
    pub site: SiteConfig,

    /// Selectors and control names on listing and article pages
    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Per-article extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Retry policy for failed extractions
    #[serde(default)]
    pub retry: RetrySettings,

    /// Worker pool settings
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Export settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Headless browser settings
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target site configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Origin that relative article links are resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP request timeout for listing pages (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.cambridge.org".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Where things live on the listing and article pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Heading that opens the article-type section of a listing
    pub section_heading: String,
    /// Link inside each section entry
    pub section_link: String,
    /// Abstract container on an article page
    pub abstract_container: String,
    /// One row per author once details are revealed
    pub author_row: String,
    /// Text preceding the affiliation inside an author row
    pub affiliation_separator: String,
    /// Visible text of the "reveal author details" link
    pub reveal_authors_link_text: String,
    /// Class of the control that opens the citation export panel
    pub export_citation_class: String,
    /// Id of the citation style `<select>`
    pub style_select_id: String,
    /// Id of the element displaying the formatted citation
    pub citation_text_id: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            section_heading: "h4.journal-article-listing-type".to_string(),
            section_link: "a[href]".to_string(),
            abstract_container: "div.abstract".to_string(),
            author_row: "div.row.author".to_string(),
            affiliation_separator: " Affiliation: ".to_string(),
            reveal_authors_link_text: "Show author details".to_string(),
            export_citation_class: "export-citation-product".to_string(),
            style_select_id: "selectCitationStyle".to_string(),
            citation_text_id: "citationText".to_string(),
        }
    }
}

/// Per-article extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Citation style requested from the export panel
    pub style: CitationStyle,
    /// Bound on loading an article page (seconds)
    pub navigation_timeout_secs: u64,
    /// Bound on every element/condition wait (seconds)
    pub wait_timeout_secs: u64,
    /// Locate-and-click attempts for interactive controls
    pub click_attempts: u32,
    /// Pause before each click, letting the control become interactive (ms)
    pub settle_delay_ms: u64,
    /// Poll interval while waiting for the citation text to change (ms)
    pub poll_interval_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            style: CitationStyle::default(),
            navigation_timeout_secs: 30,
            wait_timeout_secs: 5,
            click_attempts: 3,
            settle_delay_ms: 500,
            poll_interval_ms: 100,
        }
    }
}

impl ExtractionConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Retry policy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicyKind {
    /// Give up after `max_attempts`
    Bounded,
    /// Retry until success
    Unbounded,
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub policy: RetryPolicyKind,
    /// Total attempts, first one included (bounded policy only)
    pub max_attempts: u32,
    /// Delay after the first failure (ms); fixed delay for the unbounded policy
    pub initial_delay_ms: u64,
    /// Backoff cap (ms)
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            policy: RetryPolicyKind::Bounded,
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Simultaneously active extractions
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    5
}

/// Export configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output path without extension
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    #[serde(default = "default_formats")]
    pub formats: Vec<ExportFormat>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            formats: default_formats(),
        }
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("output")
}

fn default_formats() -> Vec<ExportFormat> {
    vec![ExportFormat::Xlsx]
}

/// Headless browser configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Pass `--no-sandbox` (needed in most containers)
    pub no_sandbox: bool,
    /// Chrome/Chromium binary; auto-detected when unset
    pub executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    /// CDP request timeout (seconds)
    pub request_timeout_secs: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            no_sandbox: true,
            executable: None,
            window_width: 1280,
            window_height: 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` (default) or `json`
    #[serde(default)]
    pub format: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }
}

/// Get the default configuration
pub fn get_config() -> Config {
    Config::default()
}
