//! Orchestrates a search run: search pages, per-candidate processing, accumulation, dedupe.

use crate::classifier::{Blocklist, Classifier};
use crate::config::{Config, Credentials, get_random_sleep_duration};
use crate::dedupe::dedupe;
use crate::error::Result;
use crate::extractor::FieldExtractor;
use crate::fetcher::{HttpFetcher, PageFetcher};
use crate::models::{ContactRecord, FilterMode, ReportSet};
use crate::processor::{CandidateOutcome, process_candidate};
use crate::search::{GoogleCustomSearch, SearchProvider, SearchQuery};
use crate::translate::{GoogleTranslator, NoopTranslator, Translator};
use futures::StreamExt;
use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;

/// Counters for the end-of-run summary.
#[derive(Debug, Default, Clone, Copy)]
struct RunStats {
    search_pages: u32,
    candidates: usize,
    accepted: usize,
    rejected: usize,
    fetch_failures: usize,
}

/// Shared, immutable collaborators of a run.
#[derive(Clone)]
pub(crate) struct Pipeline {
    pub(crate) config: Arc<Config>,
    pub(crate) search: Arc<dyn SearchProvider>,
    pub(crate) fetcher: Arc<dyn PageFetcher>,
    pub(crate) translator: Arc<dyn Translator>,
    pub(crate) classifier: Arc<Classifier>,
    pub(crate) extractor: Arc<FieldExtractor>,
}

impl Pipeline {
    /// Builds the production pipeline: Google search, HTTP fetcher, and the
    /// configured translator (a no-op when disabled or unavailable).
    pub(crate) fn new(config: Config, credentials: Credentials) -> Result<Self> {
        let search = Arc::new(GoogleCustomSearch::new(&config, credentials)?);
        let fetcher = Arc::new(HttpFetcher::new(&config)?);

        let translator: Arc<dyn Translator> = if config.translation_enabled {
            match GoogleTranslator::new(&config) {
                Ok(t) => Arc::new(t),
                Err(e) => {
                    tracing::warn!(target: "pipeline_task",
                        "Translation backend unavailable, continuing without it: {}", e
                    );
                    Arc::new(NoopTranslator)
                }
            }
        } else {
            Arc::new(NoopTranslator)
        };

        Ok(Self::with_components(config, search, fetcher, translator))
    }

    pub(crate) fn with_components(
        config: Config,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        let blocklist = Blocklist::with_defaults(&config.extra_blocked_domains);
        tracing::debug!(target: "pipeline_task", "Blocklist holds {} domains", blocklist.len());
        Self {
            classifier: Arc::new(Classifier::new(blocklist)),
            extractor: Arc::new(FieldExtractor::new(&config)),
            config: Arc::new(config),
            search,
            fetcher,
            translator,
        }
    }

    /// Runs a search without progress output.
    pub(crate) async fn run(
        &self,
        keyword: &str,
        location: &str,
        max_results: usize,
        mode: FilterMode,
    ) -> ReportSet {
        self.run_with_progress(keyword, location, max_results, mode, &ProgressBar::hidden())
            .await
    }

    /// Requests search pages lazily and processes their candidates in rank order
    /// until `max_results` distinct domains are accepted or candidates run out.
    /// Individual candidate failures never end the run; a search API error ends
    /// pagination but keeps everything gathered so far.
    ///
    /// # Arguments
    /// * `keyword` - What to search for.
    /// * `location` - Where to search; may be empty.
    /// * `max_results` - Number of distinct accepted domains after which the run stops.
    /// * `mode` - Filtering policy for every candidate.
    /// * `progress` - Advanced once per processed candidate.
    ///
    /// # Returns
    /// A `ReportSet` in search rank order with at most one record per domain.
    pub(crate) async fn run_with_progress(
        &self,
        keyword: &str,
        location: &str,
        max_results: usize,
        mode: FilterMode,
        progress: &ProgressBar,
    ) -> ReportSet {
        let start_time = Instant::now();
        let query = SearchQuery::new(keyword, location);
        let mut stats = RunStats::default();
        let mut accepted: Vec<ContactRecord> = Vec::new();
        // Drives the stop condition only; the report itself comes from `dedupe` over `accepted`.
        let mut unique = ReportSet::new();
        let mut page_token: Option<String> = None;

        tracing::info!(target: "pipeline_task",
            "Starting run for '{}' (max {} results, {} mode, concurrency {})",
            query.text(), max_results, mode, self.config.concurrency
        );

        while max_results > 0 && stats.search_pages < self.config.max_search_pages {
            if stats.search_pages > 0 {
                sleep(get_random_sleep_duration(&self.config)).await;
            }

            let page = match self
                .search
                .search(&query, page_token.as_deref(), self.config.search_page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(target: "pipeline_task",
                        "Search request failed, stopping pagination: {}", e
                    );
                    break;
                }
            };
            stats.search_pages += 1;

            if page.candidates.is_empty() {
                tracing::debug!(target: "pipeline_task", "Search page {} was empty", stats.search_pages);
                break;
            }

            progress.inc_length(page.candidates.len() as u64);
            let base_rank = stats.candidates;
            stats.candidates += page.candidates.len();

            // `buffered` yields in input order, so rank order survives concurrent fetching.
            let mut outcomes = futures::stream::iter(page.candidates.into_iter().enumerate())
                .map(|(offset, candidate)| {
                    process_candidate(self, base_rank + offset, candidate, mode)
                })
                .buffered(self.config.concurrency.max(1));

            while let Some(outcome) = outcomes.next().await {
                progress.inc(1);
                match outcome {
                    CandidateOutcome::Accepted(record) => {
                        stats.accepted += 1;
                        unique.insert(record.clone());
                        accepted.push(record);
                    }
                    CandidateOutcome::Rejected { url, reason } => {
                        stats.rejected += 1;
                        tracing::debug!(target: "pipeline_task", "Discarded {}: {}", url, reason);
                    }
                    CandidateOutcome::FetchFailed { url, error } => {
                        stats.fetch_failures += 1;
                        tracing::debug!(target: "pipeline_task", "No record for {}: {}", url, error);
                    }
                }
                if unique.len() >= max_results {
                    break;
                }
            }

            if unique.len() >= max_results {
                tracing::info!(target: "pipeline_task", "Reached {} unique results", max_results);
                break;
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if stats.candidates == 0 {
            tracing::info!(target: "pipeline_task", "No candidates found for '{}'", query.text());
        }

        let report = dedupe(accepted);
        tracing::info!(target: "pipeline_task",
            "Run finished in {:.2?}: {} search pages, {} candidates, {} accepted, {} rejected, {} fetch failures, {} unique",
            start_time.elapsed(),
            stats.search_pages,
            stats.candidates,
            stats.accepted,
            stats.rejected,
            stats.fetch_failures,
            report.len()
        );
        report
    }
}
