//! End-to-end harvest: listing → extraction → export.

mod coordinator;

pub use coordinator::{ExtractionCoordinator, ExtractionOutcome, FailedLink, HarvestReport};

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, OutputConfig};
use crate::export::{ExportError, ExportSink};
use crate::extract::ArticleExtractor;
use crate::listing::{DocumentFetcher, ListingError, ListingResolver};
use crate::models::CitationStyle;
use crate::session::SessionFactory;
use crate::utils::{ProgressReporter, RetryConfig};

/// Errors that abort a whole harvest
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    Listing(#[from] ListingError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// What a finished harvest produced
#[derive(Debug, Clone)]
pub struct HarvestSummary {
    /// Links discovered on the listing
    pub links: usize,
    /// Records written
    pub records: usize,
    pub failures: Vec<FailedLink>,
    pub files: Vec<PathBuf>,
}

/// Wires the listing resolver, the coordinator and the export sink
pub struct Harvester<F> {
    resolver: ListingResolver<F>,
    coordinator: ExtractionCoordinator,
    sink: ExportSink,
    style: CitationStyle,
    workers: usize,
    output: OutputConfig,
    show_progress: bool,
}

impl<F: DocumentFetcher> Harvester<F> {
    pub fn new(
        config: &Config,
        fetcher: F,
        sessions: Arc<dyn SessionFactory>,
    ) -> Result<Self, HarvestError> {
        let resolver = ListingResolver::new(fetcher, &config.site, &config.selectors)?;
        let extractor = ArticleExtractor::new(
            sessions,
            config.extraction.clone(),
            config.selectors.clone(),
        );
        let coordinator = ExtractionCoordinator::new(extractor, RetryConfig::from(&config.retry));

        Ok(Self {
            resolver,
            coordinator,
            sink: ExportSink::new(),
            style: config.extraction.style,
            workers: config.concurrency.workers,
            output: config.output.clone(),
            show_progress: false,
        })
    }

    /// Draw a progress bar while extracting
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn resolver(&self) -> &ListingResolver<F> {
        &self.resolver
    }

    /// Harvest every article of `listing_url` and write the exports.
    ///
    /// Nothing is written when the listing cannot be resolved.
    pub async fn run(&self, listing_url: &str) -> Result<HarvestSummary, HarvestError> {
        let links = self.resolver.resolve(listing_url).await?;
        let total = links.len();
        if links.is_empty() {
            tracing::warn!(url = listing_url, "Listing section has no articles");
        }

        let progress = if self.show_progress {
            ProgressReporter::new("Extracting articles", total)
        } else {
            ProgressReporter::quiet("Extracting articles", total)
        };
        let report = self
            .coordinator
            .run_with_progress(links, self.style, self.workers, progress)
            .await;

        let files = self
            .sink
            .write(&report.results, &self.output.base_path, &self.output.formats)?;

        Ok(HarvestSummary {
            links: total,
            records: report.results.len(),
            failures: report.failures,
            files,
        })
    }
}
