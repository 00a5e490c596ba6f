//! Bounded-concurrency fan-out of article extractions.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::extract::{ArticleExtractor, ExtractError};
use crate::models::{ArticleLink, ArticleRecord, CitationStyle, ResultSet};
use crate::utils::{ProgressReporter, RetryConfig, RetryError};

/// Final result of the retry-wrapped extraction of one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Completed(ArticleRecord),
    /// The retry policy gave up
    Failed { attempts: u32, error: ExtractError },
}

impl From<Result<ArticleRecord, RetryError<ExtractError>>> for ExtractionOutcome {
    fn from(result: Result<ArticleRecord, RetryError<ExtractError>>) -> Self {
        match result {
            Ok(record) => ExtractionOutcome::Completed(record),
            Err(RetryError::Exhausted { attempts, last }) => ExtractionOutcome::Failed {
                attempts,
                error: last,
            },
        }
    }
}

/// A link that permanently failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLink {
    pub link: ArticleLink,
    /// Attempts made; 0 when the worker died before reporting
    pub attempts: u32,
    pub error: ExtractError,
}

/// Records in completion order plus the links that were given up on
#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    pub results: ResultSet,
    pub failures: Vec<FailedLink>,
}

/// Runs retry-wrapped extractions over a bounded worker pool
///
/// At most `concurrency` extractions are in flight, so at most that many
/// rendered sessions are open at once. Workers hand their outcome to a single
/// collector over a channel; only the collector touches the [`ResultSet`].
///
/// Dropping a running `run*` future aborts every in-flight worker, which
/// closes their sessions.
#[derive(Debug, Clone)]
pub struct ExtractionCoordinator {
    extractor: Arc<ArticleExtractor>,
    retry: RetryConfig,
}

impl ExtractionCoordinator {
    pub fn new(extractor: ArticleExtractor, retry: RetryConfig) -> Self {
        Self {
            extractor: Arc::new(extractor),
            retry,
        }
    }

    /// Extract every link and return the successful records.
    pub async fn run(
        &self,
        links: Vec<ArticleLink>,
        style: CitationStyle,
        concurrency: usize,
    ) -> ResultSet {
        self.run_with_report(links, style, concurrency).await.results
    }

    /// Like [`run`](Self::run), also reporting the permanent failures.
    pub async fn run_with_report(
        &self,
        links: Vec<ArticleLink>,
        style: CitationStyle,
        concurrency: usize,
    ) -> HarvestReport {
        let progress = ProgressReporter::quiet("Extracting articles", links.len());
        self.run_with_progress(links, style, concurrency, progress).await
    }

    pub async fn run_with_progress(
        &self,
        links: Vec<ArticleLink>,
        style: CitationStyle,
        concurrency: usize,
        progress: ProgressReporter,
    ) -> HarvestReport {
        let concurrency = concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (sender, receiver) = mpsc::channel(concurrency);

        tracing::info!(
            links = links.len(),
            concurrency,
            style = %style,
            "Starting extraction"
        );

        let collector = tokio::spawn(collect(receiver, progress.clone()));

        let mut workers = JoinSet::new();
        let mut in_flight = HashMap::new();
        for link in links {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!("Worker pool closed: {}", e);
                    break;
                }
            };
            let extractor = Arc::clone(&self.extractor);
            let retry = self.retry;
            let sender = sender.clone();
            let task_link = link.clone();

            let handle = workers.spawn(async move {
                // permit is released when this task ends
                let _permit = permit;
                let result = extractor.extract_with_retry(&task_link, style, &retry).await;
                let outcome = ExtractionOutcome::from(result);
                if sender.send((task_link, outcome)).await.is_err() {
                    tracing::error!("Collector stopped before all outcomes arrived");
                }
            });
            in_flight.insert(handle.id(), link);
        }
        drop(sender);

        let mut aborted = Vec::new();
        while let Some(joined) = workers.join_next_with_id().await {
            match joined {
                Ok((id, ())) => {
                    in_flight.remove(&id);
                }
                Err(e) => match in_flight.remove(&e.id()) {
                    Some(link) => {
                        tracing::error!(link = %link, "Extraction worker aborted: {}", e);
                        aborted.push(FailedLink {
                            error: ExtractError::Aborted {
                                link: link.to_string(),
                                reason: e.to_string(),
                            },
                            link,
                            attempts: 0,
                        });
                    }
                    None => tracing::error!("Extraction worker aborted: {}", e),
                },
            }
        }

        let mut report = match collector.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Result collector aborted: {}", e);
                HarvestReport::default()
            }
        };
        for failed in aborted {
            progress.failed();
            report.failures.push(failed);
        }
        progress.finish();

        tracing::info!(
            records = report.results.len(),
            failures = report.failures.len(),
            "Extraction finished"
        );
        report
    }
}

/// Single writer of the result set: appends outcomes in arrival order.
async fn collect(
    mut receiver: mpsc::Receiver<(ArticleLink, ExtractionOutcome)>,
    progress: ProgressReporter,
) -> HarvestReport {
    let mut report = HarvestReport::default();

    while let Some((link, outcome)) = receiver.recv().await {
        match outcome {
            ExtractionOutcome::Completed(record) => {
                tracing::info!(link = %link, "Extracted article");
                progress.succeeded();
                report.results.push(record);
            }
            ExtractionOutcome::Failed { attempts, error } => {
                tracing::error!(link = %link, attempts, "Giving up on article: {}", error);
                progress.println(format!("failed: {} ({})", link, error));
                progress.failed();
                report.failures.push(FailedLink { link, attempts, error });
            }
        }
    }

    report
}
