//! Listing crawl across every configured target.
//!
//! Each target's queries are discovered one after another on fresh pages;
//! identifiers already seen for the target are skipped, and the rest go
//! through the batch scheduler into the per-target and combined files.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::batch::BatchScheduler;
use crate::config::{AppConfig, TargetConfig};
use crate::detail::{DetailFetcher, ItemContext};
use crate::diagnostics::Diagnostics;
use crate::discovery::{Discoverer, QueryContext};
use crate::driver::{BrowserSession, PageDriver};
use crate::logger::RunLogger;
use crate::result_sink::{CsvSink, ListingWriter, COMBINED_HEADER, LISTING_HEADER};

#[derive(Debug, Clone, Default)]
pub struct TargetSummary {
    pub name: String,
    pub output: PathBuf,
    pub discovered: usize,
    pub fetched: usize,
    pub succeeded: usize,
    pub persisted: usize,
    pub failed_queries: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ListingRunSummary {
    pub targets: Vec<TargetSummary>,
    pub combined_output: PathBuf,
}

impl ListingRunSummary {
    pub fn persisted(&self) -> usize {
        self.targets.iter().map(|t| t.persisted).sum()
    }
}

/// `{base}_{target}_{timestamp}.csv`
pub fn target_file_name(base: &str, target: &str, timestamp: &str) -> String {
    format!("{}_{}_{}.csv", base, target, timestamp)
}

/// `{base}_all_locations_{timestamp}.csv`
pub fn combined_file_name(base: &str, timestamp: &str) -> String {
    format!("{}_all_locations_{}.csv", base, timestamp)
}

pub fn run_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M").to_string()
}

pub struct ListingPipeline<'a> {
    config: &'a AppConfig,
    driver: Arc<dyn PageDriver>,
    logger: &'a RunLogger,
    diagnostics: Diagnostics,
    timestamp: String,
}

impl<'a> ListingPipeline<'a> {
    pub fn new(config: &'a AppConfig, driver: Arc<dyn PageDriver>, logger: &'a RunLogger) -> Self {
        Self {
            config,
            driver,
            logger,
            diagnostics: Diagnostics::new(&config.listings.diagnostics_dir),
            timestamp: run_timestamp(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub async fn run(&self) -> Result<ListingRunSummary> {
        let listings = &self.config.listings;
        std::fs::create_dir_all(&listings.output_dir)
            .with_context(|| format!("Failed to create output directory: {}", listings.output_dir.display()))?;
        if let Err(e) = std::fs::create_dir_all(&listings.diagnostics_dir) {
            warn!("Could not create diagnostics directory {}: {}", listings.diagnostics_dir.display(), e);
        }

        let combined_path = listings
            .output_dir
            .join(combined_file_name(&listings.base_name, &self.timestamp));
        let mut combined = CsvSink::create(&combined_path, &COMBINED_HEADER)?;
        self.logger.log_output_file(&combined_path);

        let session = self.driver.new_session().await.context("Failed to start browser session")?;
        self.logger.start_progress(0).await;

        let mut summary = ListingRunSummary {
            combined_output: combined_path,
            ..Default::default()
        };

        let total = self.config.targets.len();
        let mut outcome = Ok(());
        for (index, target) in self.config.targets.iter().enumerate() {
            match self.run_target(session.as_ref(), index, target, &mut combined).await {
                Ok(target_summary) => summary.targets.push(target_summary),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
            self.logger.record(|m| m.targets_processed += 1);

            if index + 1 < total {
                listings.target_delay_ms.pause("before next target").await;
            }
        }

        if let Err(e) = session.close().await {
            debug!("Error closing browser session: {}", e);
        }
        outcome?;

        self.logger
            .finish_progress(&format!(
                "Crawl finished: {} listings saved across {} targets",
                summary.persisted(),
                summary.targets.len()
            ))
            .await;
        Ok(summary)
    }

    async fn run_target(
        &self,
        session: &dyn BrowserSession,
        target_index: usize,
        target: &TargetConfig,
        combined: &mut CsvSink,
    ) -> Result<TargetSummary> {
        let listings = &self.config.listings;
        let output = listings
            .output_dir
            .join(target_file_name(&listings.base_name, &target.name, &self.timestamp));
        let mut per_target = CsvSink::create(&output, &LISTING_HEADER)?;
        self.logger.log_output_file(&output);
        self.logger.log_target_start(&target.name, target.queries.len());

        let discoverer = Discoverer::new(Arc::new(self.config.discovery.clone()), self.diagnostics.clone());
        let fetcher = DetailFetcher::new(Arc::new(self.config.detail.clone()), self.diagnostics.clone());
        let scheduler = BatchScheduler::new(listings.batch_size, listings.content_gate, listings.batch_delay_ms);

        let mut summary = TargetSummary {
            name: target.name.clone(),
            output,
            ..Default::default()
        };
        let mut seen: HashSet<String> = HashSet::new();
        let cap = listings.max_items_per_target;

        for (query_index, query) in target.queries.iter().enumerate() {
            if cap > 0 && summary.discovered >= cap {
                self.logger
                    .info(&format!("Reached the limit of {} listings for '{}'", cap, target.name));
                break;
            }

            let ctx = QueryContext {
                target: target.name.clone(),
                query: query_index,
            };
            let identifiers = match self.discover_query(&discoverer, session, query, &ctx).await {
                Ok(ids) => ids,
                Err(e) => {
                    summary.failed_queries += 1;
                    warn!("Query {} for '{}' failed: {:#}", query_index, target.name, e);
                    self.logger.log_query_failed(&target.name, query_index, &format!("{:#}", e));
                    self.pause_between_queries(query_index, target.queries.len()).await;
                    continue;
                }
            };

            let found = identifiers.len();
            let mut fresh: Vec<String> = identifiers.into_iter().filter(|id| seen.insert(id.clone())).collect();
            if cap > 0 {
                fresh.truncate(cap - summary.discovered);
            }
            summary.discovered += fresh.len();
            self.logger.log_discovery(&target.name, query_index, found, fresh.len());

            if !fresh.is_empty() {
                self.logger.extend_progress(fresh.len() as u64).await;
                self.logger
                    .update_progress(&format!("{} q{}", target.name, query_index))
                    .await;

                let total = fresh.len();
                let target_tag = target_index.to_string();
                let fetcher = &fetcher;
                let mut writer = ListingWriter::new(&target.name, &mut per_target, Some(&mut *combined));
                let result = scheduler
                    .run(
                        &fresh,
                        |position, identifier| {
                            let item = ItemContext {
                                target: target_tag.clone(),
                                query: query_index,
                                index: position,
                                total,
                            };
                            async move { fetcher.fetch(session, identifier, &item).await }
                        },
                        &mut writer,
                        self.logger,
                    )
                    .await;

                summary.fetched += result.fetched;
                summary.succeeded += result.succeeded;
                summary.persisted += result.persisted;
                self.logger.record(|m| {
                    m.items_fetched += result.fetched;
                    m.items_succeeded += result.succeeded;
                    m.rows_persisted += result.persisted;
                });
            }

            self.pause_between_queries(query_index, target.queries.len()).await;
        }

        self.logger.info(&format!(
            "Target '{}' done: {} discovered, {}/{} fetched successfully, {} saved",
            target.name, summary.discovered, summary.succeeded, summary.fetched, summary.persisted
        ));
        Ok(summary)
    }

    /// Fresh page with cleared cookies, discovery, page closed again.
    async fn discover_query(
        &self,
        discoverer: &Discoverer,
        session: &dyn BrowserSession,
        query: &str,
        ctx: &QueryContext,
    ) -> Result<Vec<String>> {
        let page = session.new_page().await.context("Failed to open a page")?;
        if let Err(e) = page.clear_cookies().await {
            debug!("Could not clear cookies: {}", e);
        }

        let result = discoverer.discover(page.as_ref(), query, ctx).await;

        if let Err(e) = page.close().await {
            debug!("Error closing search page: {}", e);
        }
        Ok(result?.identifiers)
    }

    async fn pause_between_queries(&self, query_index: usize, total: usize) {
        if query_index + 1 < total {
            self.config.listings.query_delay_ms.pause("before next query").await;
        }
    }
}
