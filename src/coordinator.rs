//! Fan-out email resolution over a pool of independent workers.
//!
//! The coordinator resolves what it can from the [`DomainCache`], collapses
//! the remaining URLs to one representative per host, deals the
//! representatives out round-robin and drains the workers' messages. It is
//! the only writer of the cache; workers just report results.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::DomainCache;
use crate::domain_utils::host_key;
use crate::driver::PageDriver;
use crate::email::{SiteResolver, NONE_FOUND};
use crate::logger::RunLogger;

/// What a worker reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    Progress { worker: usize, url: String, result: String },
    Done { worker: usize },
    /// The worker could not start; none of its URLs were resolved.
    Failed { worker: usize, error: String },
}

#[derive(Debug, Default)]
pub struct ResolutionReport {
    /// Result string per input URL.
    pub results: HashMap<String, String>,
    /// Representatives handed to a resolver.
    pub dispatched: usize,
    pub cache_hits: usize,
    pub unparsable: usize,
    /// URLs whose worker died before reporting them.
    pub missing: Vec<String>,
}

impl ResolutionReport {
    pub fn result_for(&self, url: &str) -> &str {
        self.results.get(url).map(String::as_str).unwrap_or(NONE_FOUND)
    }
}

/// Deal `items` round-robin over at most `workers` partitions.
pub fn partition<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    let count = workers.min(items.len());
    if count == 0 {
        return Vec::new();
    }
    (0..count)
        .map(|w| items.iter().skip(w).step_by(count).cloned().collect())
        .collect()
}

/// URLs that share one dispatch.
struct WorkGroup {
    host: String,
    urls: Vec<String>,
}

pub struct Coordinator {
    driver: Arc<dyn PageDriver>,
    resolver: Arc<dyn SiteResolver>,
    workers: usize,
    use_workers: bool,
    cache_results: bool,
}

impl Coordinator {
    pub fn new(driver: Arc<dyn PageDriver>, resolver: Arc<dyn SiteResolver>, workers: usize) -> Self {
        Self {
            driver,
            resolver,
            workers: workers.max(1),
            use_workers: true,
            cache_results: true,
        }
    }

    /// Resolve inline with a single session instead of spawning workers.
    pub fn sequential(mut self, sequential: bool) -> Self {
        self.use_workers = !sequential;
        self
    }

    /// Without caching every distinct URL is dispatched on its own.
    pub fn cache_results(mut self, enabled: bool) -> Self {
        self.cache_results = enabled;
        self
    }

    pub async fn resolve_all(&self, urls: &[String], cache: &mut DomainCache, logger: &RunLogger) -> ResolutionReport {
        let mut report = ResolutionReport::default();
        let mut groups: Vec<WorkGroup> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();
        let mut queued: HashSet<&str> = HashSet::new();

        for url in urls {
            if report.results.contains_key(url) || !queued.insert(url.as_str()) {
                continue;
            }

            let Some(host) = host_key(url) else {
                report.unparsable += 1;
                report.results.insert(url.clone(), NONE_FOUND.to_string());
                continue;
            };

            if self.cache_results {
                if let Some(hit) = cache.get(&host) {
                    debug!("Cache hit for {}: {}", host, hit);
                    report.cache_hits += 1;
                    report.results.insert(url.clone(), hit.to_string());
                    continue;
                }
            }

            let key = if self.cache_results { host.clone() } else { url.clone() };
            match group_index.get(&key) {
                Some(&i) => groups[i].urls.push(url.clone()),
                None => {
                    group_index.insert(key, groups.len());
                    groups.push(WorkGroup {
                        host,
                        urls: vec![url.clone()],
                    });
                }
            }
        }

        let representatives: Vec<String> = groups.iter().map(|g| g.urls[0].clone()).collect();
        report.dispatched = representatives.len();
        if representatives.is_empty() {
            return report;
        }
        logger.extend_progress(representatives.len() as u64).await;

        let by_representative: HashMap<&str, &WorkGroup> =
            groups.iter().map(|g| (g.urls[0].as_str(), g)).collect();
        let mut resolved: HashSet<String> = HashSet::new();

        let mut apply = |url: String, result: String, report: &mut ResolutionReport, cache: &mut DomainCache| {
            let Some(group) = by_representative.get(url.as_str()) else {
                warn!("Result for unknown URL {}", url);
                return;
            };
            if self.cache_results {
                cache.insert(&group.host, &result);
            }
            for u in &group.urls {
                report.results.insert(u.clone(), result.clone());
            }
            resolved.insert(url);
        };

        if self.use_workers {
            let partitions = partition(&representatives, self.workers);
            info!(
                "Resolving {} sites with {} workers ({} cached, {} unparsable)",
                representatives.len(),
                partitions.len(),
                report.cache_hits,
                report.unparsable
            );

            let (tx, mut rx) = mpsc::unbounded_channel::<WorkerMessage>();
            let mut handles = Vec::with_capacity(partitions.len());
            for (worker, urls) in partitions.into_iter().enumerate() {
                handles.push(tokio::spawn(run_worker(
                    worker,
                    self.driver.clone(),
                    self.resolver.clone(),
                    urls,
                    tx.clone(),
                )));
            }
            drop(tx);

            while let Some(message) = rx.recv().await {
                match message {
                    WorkerMessage::Progress { worker, url, result } => {
                        debug!("Worker {}: processed {} ({})", worker, url, result);
                        logger.advance_progress(1).await;
                        apply(url, result, &mut report, cache);
                    }
                    WorkerMessage::Done { worker } => debug!("Worker {} finished", worker),
                    WorkerMessage::Failed { worker, error } => {
                        warn!("Email worker {} failed: {}", worker, error);
                        logger.warn(&format!("Email worker {} failed: {}", worker, error));
                    }
                }
            }

            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("Email worker task ended abnormally: {}", e);
                }
            }
        } else {
            info!("Resolving {} sites sequentially", representatives.len());
            match self.driver.new_session().await {
                Ok(session) => {
                    for url in &representatives {
                        let result = self.resolver.resolve(session.as_ref(), url).await;
                        logger.advance_progress(1).await;
                        apply(url.clone(), result, &mut report, cache);
                    }
                    if let Err(e) = session.close().await {
                        debug!("Error closing browser session: {}", e);
                    }
                }
                Err(e) => {
                    warn!("Could not open browser session: {}", e);
                    logger.warn(&format!("Could not open browser session: {}", e));
                }
            }
        }

        for group in &groups {
            if !resolved.contains(&group.urls[0]) {
                report.missing.extend(group.urls.iter().cloned());
            }
        }
        if !report.missing.is_empty() {
            warn!("{} URLs were never resolved", report.missing.len());
        }

        report
    }
}

async fn run_worker(
    worker: usize,
    driver: Arc<dyn PageDriver>,
    resolver: Arc<dyn SiteResolver>,
    urls: Vec<String>,
    tx: mpsc::UnboundedSender<WorkerMessage>,
) {
    let session = match driver.new_session().await {
        Ok(session) => session,
        Err(e) => {
            let _ = tx.send(WorkerMessage::Failed {
                worker,
                error: e.to_string(),
            });
            return;
        }
    };

    for url in urls {
        let result = resolver.resolve(session.as_ref(), &url).await;
        if tx.send(WorkerMessage::Progress { worker, url, result }).is_err() {
            break;
        }
    }

    if let Err(e) = session.close().await {
        debug!("Worker {}: error closing browser session: {}", worker, e);
    }
    let _ = tx.send(WorkerMessage::Done { worker });
}
