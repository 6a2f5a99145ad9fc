//! Infinite-scroll result list discovery.
//!
//! Drives a scrollable results container until it stops growing, an
//! end-of-list marker shows up, or the iteration cap is hit, then collects
//! every rendered item link. A page without a recognisable container is not
//! an error: whatever links are already rendered are returned.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::diagnostics::Diagnostics;
use crate::driver::{DriverError, Locator, Page};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to load results page: {0}")]
    Navigation(#[source] DriverError),

    #[error("results page never became ready: {0}")]
    NotReady(#[source] DriverError),

    #[error("failed to collect item links: {0}")]
    Collect(#[source] DriverError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The extent stopped growing for `stagnation_limit` iterations in a row.
    Stagnated,
    EndMarker,
    IterationCap,
    /// No scrollable container; the loop never ran.
    NoContainer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Item URLs in first-seen order, without duplicates.
    pub identifiers: Vec<String>,
    pub iterations: u32,
    pub stop: StopReason,
}

/// Which target and query a discovery belongs to.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub target: String,
    pub query: usize,
}

struct ScrollStep {
    grew: bool,
    end_marker: bool,
}

pub struct Discoverer {
    config: Arc<DiscoveryConfig>,
    diagnostics: Diagnostics,
}

impl Discoverer {
    pub fn new(config: Arc<DiscoveryConfig>, diagnostics: Diagnostics) -> Self {
        Self { config, diagnostics }
    }

    pub async fn discover(
        &self,
        page: &dyn Page,
        query_url: &str,
        ctx: &QueryContext,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        page.goto(query_url, self.config.navigation_timeout())
            .await
            .map_err(DiscoveryError::Navigation)?;

        self.dismiss_consent(page).await;

        if let Err(e) = page.wait_for_any(&self.config.ready, self.config.ready_timeout()).await {
            let path = self.diagnostics.readiness_failure(&ctx.target, ctx.query);
            self.diagnostics.capture(page, path).await;
            return Err(DiscoveryError::NotReady(e));
        }

        if self.config.settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;
        }

        let (iterations, stop) = match self.locate_container(page).await {
            Some(container) => self.scroll_to_exhaustion(page, &container).await,
            None => {
                warn!("No scrollable results container for {} q{}; using visible results", ctx.target, ctx.query);
                let path = self.diagnostics.missing_container(&ctx.target, ctx.query);
                self.diagnostics.capture(page, path).await;
                (0, StopReason::NoContainer)
            }
        };

        let identifiers = match self.collect_identifiers(page).await {
            Ok(identifiers) => identifiers,
            Err(e) => {
                warn!("Failed to collect result links for {} q{}: {}", ctx.target, ctx.query, e);
                let path = self.diagnostics.collection_failure(&ctx.target, ctx.query);
                self.diagnostics.capture(page, path).await;
                return Err(DiscoveryError::Collect(e));
            }
        };
        info!(
            "Discovered {} items for {} q{} after {} scrolls ({:?})",
            identifiers.len(),
            ctx.target,
            ctx.query,
            iterations,
            stop
        );

        Ok(DiscoveryReport {
            identifiers,
            iterations,
            stop,
        })
    }

    async fn dismiss_consent(&self, page: &dyn Page) {
        for locator in &self.config.consent {
            match page.click(locator).await {
                Ok(true) => {
                    debug!("Dismissed consent dialog via {}", locator);
                    tokio::time::sleep(Duration::from_millis(1000)).await;
                    return;
                }
                Ok(false) => {}
                Err(e) => debug!("Consent locator {} failed: {}", locator, e),
            }
        }
    }

    /// Structural locators first, then the overflow heuristic.
    async fn locate_container(&self, page: &dyn Page) -> Option<Locator> {
        for locator in &self.config.containers {
            if let Ok(Some(_)) = page.scroll_extent(locator).await {
                debug!("Found scrollable container: {}", locator);
                return Some(locator.clone());
            }
        }

        let candidates = self.config.overflow_candidates.as_ref()?;
        match page.find_overflowing(candidates).await {
            Ok(Some(found)) => {
                debug!("Found scrollable container by overflow scan of {}", candidates);
                Some(found)
            }
            Ok(None) => None,
            Err(e) => {
                debug!("Overflow scan failed: {}", e);
                None
            }
        }
    }

    /// Returns the number of iterations run and why the loop stopped.
    pub async fn scroll_to_exhaustion(&self, page: &dyn Page, container: &Locator) -> (u32, StopReason) {
        let cfg = &self.config;
        let mut iterations: u32 = 0;
        let mut stagnation: u32 = 0;

        while iterations < cfg.max_scrolls {
            if stagnation >= cfg.stagnation_limit {
                return (iterations, StopReason::Stagnated);
            }

            let step = self.scroll_once(page, container, iterations).await;
            iterations += 1;

            match step {
                Ok(step) => {
                    if step.grew {
                        stagnation = 0;
                    } else {
                        stagnation += 1;
                        debug!("No new content after scroll {}, stagnation {}/{}", iterations, stagnation, cfg.stagnation_limit);
                    }
                    if step.end_marker {
                        return (iterations, StopReason::EndMarker);
                    }
                }
                Err(e) => {
                    stagnation += 1;
                    debug!("Scroll {} failed: {}", iterations, e);
                }
            }

            if iterations % 10 == 0 {
                debug!("Scrolled {} times, still loading results", iterations);
            }
        }

        if stagnation >= cfg.stagnation_limit {
            (iterations, StopReason::Stagnated)
        } else {
            (iterations, StopReason::IterationCap)
        }
    }

    async fn scroll_once(&self, page: &dyn Page, container: &Locator, count: u32) -> Result<ScrollStep, DriverError> {
        let cfg = &self.config;
        let before = self.extent(page, container).await?;

        let delta = if count % cfg.large_scroll_every == 0 {
            cfg.large_scroll_px
        } else {
            cfg.small_scroll_px
        };
        page.scroll_by(container, delta as f64).await?;
        cfg.scroll_delay_ms.pause("between scrolls").await;

        if count % cfg.load_more_every == cfg.load_more_offset {
            self.try_load_more(page).await;
        }

        let after = self.extent(page, container).await?;
        let end_marker = self.end_marker_visible(page).await;

        Ok(ScrollStep {
            grew: after > before,
            end_marker,
        })
    }

    async fn extent(&self, page: &dyn Page, container: &Locator) -> Result<f64, DriverError> {
        page.scroll_extent(container)
            .await?
            .ok_or_else(|| DriverError::Script(format!("scroll container vanished: {}", container)))
    }

    async fn try_load_more(&self, page: &dyn Page) {
        for locator in &self.config.load_more {
            if let Ok(true) = page.click(locator).await {
                debug!("Clicked load-more control {}", locator);
                if self.config.load_more_settle_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.config.load_more_settle_ms)).await;
                }
                return;
            }
        }
    }

    async fn end_marker_visible(&self, page: &dyn Page) -> bool {
        if self.config.end_markers.is_empty() {
            return false;
        }
        match page.inner_text().await {
            Ok(text) => self.config.end_markers.iter().any(|m| text.contains(m.as_str())),
            Err(_) => false,
        }
    }

    async fn collect_identifiers(&self, page: &dyn Page) -> Result<Vec<String>, DriverError> {
        let anchors = page.anchors().await?;
        let mut seen = HashSet::new();
        Ok(anchors
            .into_iter()
            .map(|a| a.href)
            .filter(|href| href.starts_with(&self.config.item_url_prefix))
            .filter(|href| seen.insert(href.clone()))
            .collect())
    }
}
