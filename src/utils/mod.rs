//! Utility modules supporting harvest operations.
//!
//! - [`HttpClient`]: shared reqwest client used to fetch listing pages
//! - [`ProgressReporter`]: progress bar and outcome counters for a run
//! - [`RetryConfig`]: retry policy with exponential backoff
//! - [`with_retry`]: execute an operation until it succeeds or the policy gives up
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use citation_harvester::utils::{with_retry, RetryConfig};
//!
//! # async fn fetch_data() -> Result<String, std::io::Error> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetryConfig::default().max_attempts(3);
//! let result = with_retry(&config, |_attempt| fetch_data()).await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod progress;
mod retry;

pub use http::HttpClient;
pub use progress::ProgressReporter;
pub use retry::{with_retry, RetryConfig, RetryError, RetryPolicy, RetryState};
