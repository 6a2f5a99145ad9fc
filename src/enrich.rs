//! Email enrichment run: input CSV in, CSV with an `Emails` column out.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::cache::DomainCache;
use crate::config::EmailConfig;
use crate::coordinator::Coordinator;
use crate::driver::PageDriver;
use crate::email::{SiteResolver, NONE_FOUND};
use crate::export::{enrich_table, write_enriched};
use crate::input::{effective_limit, read_table};
use crate::logger::RunLogger;

#[derive(Debug, Clone, Default)]
pub struct EnrichmentSummary {
    pub input_rows: usize,
    pub processed_rows: usize,
    pub distinct_sites: usize,
    pub sites_with_emails: usize,
    pub dispatched: usize,
    pub cache_hits: usize,
    pub missing: usize,
    pub rows_written: usize,
    pub output: PathBuf,
}

pub struct EmailRun<'a> {
    config: &'a EmailConfig,
    driver: Arc<dyn PageDriver>,
    resolver: Arc<dyn SiteResolver>,
    logger: &'a RunLogger,
}

impl<'a> EmailRun<'a> {
    pub fn new(
        config: &'a EmailConfig,
        driver: Arc<dyn PageDriver>,
        resolver: Arc<dyn SiteResolver>,
        logger: &'a RunLogger,
    ) -> Self {
        Self {
            config,
            driver,
            resolver,
            logger,
        }
    }

    /// Look up the first `limit` rows (0 = all) and write the enriched table.
    pub async fn run(&self, input: &Path, output: &Path, limit: usize) -> Result<EnrichmentSummary> {
        let table = read_table(input)?;
        let processed = effective_limit(limit, table.rows.len());
        if processed < table.rows.len() {
            self.logger.info(&format!(
                "Processing {} websites (limited from {})...",
                processed,
                table.rows.len()
            ));
        } else {
            self.logger.info(&format!("Processing {} websites...", processed));
        }
        if table.website_column.is_none() {
            self.logger
                .warn("No website column found in input; every row will resolve to NA");
        }

        let websites = table.websites(limit);
        let workers = self.config.worker_count();
        if self.config.use_workers {
            self.logger.info(&format!(
                "Found {} websites to scrape, using up to {} workers",
                websites.len(),
                workers
            ));
        } else {
            self.logger
                .info(&format!("Found {} websites to scrape, resolving sequentially", websites.len()));
        }

        self.logger.start_progress(0).await;
        let coordinator = Coordinator::new(self.driver.clone(), self.resolver.clone(), workers)
            .sequential(!self.config.use_workers)
            .cache_results(self.config.cache_results);
        let mut cache = DomainCache::new();
        let report = coordinator.resolve_all(&websites, &mut cache, self.logger).await;

        let distinct: HashSet<&str> = websites.iter().map(String::as_str).collect();
        let sites_with_emails = distinct
            .iter()
            .filter(|w| report.result_for(w) != NONE_FOUND)
            .count();

        let enriched = enrich_table(&table, &report, limit, self.config.row_gate);
        if enriched.dropped > 0 {
            self.logger
                .info(&format!("Removed {} rows without valid emails", enriched.dropped));
        }
        let rows_written = write_enriched(output, &enriched)?;

        self.logger.record(|m| {
            m.sites_resolved += distinct.len();
            m.sites_with_emails += sites_with_emails;
            m.cache_hits += report.cache_hits;
            m.rows_persisted += rows_written;
            m.output_files.push(output.display().to_string());
        });
        self.logger
            .finish_progress(&format!("Results saved to: {}", output.display()))
            .await;

        Ok(EnrichmentSummary {
            input_rows: table.rows.len(),
            processed_rows: processed,
            distinct_sites: distinct.len(),
            sites_with_emails,
            dispatched: report.dispatched,
            cache_hits: report.cache_hits,
            missing: report.missing.len(),
            rows_written,
            output: output.to_path_buf(),
        })
    }
}
