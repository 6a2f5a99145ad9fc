//! Batched concurrent detail fetching with incremental persistence.
//!
//! Identifiers are split into consecutive fixed-size batches in discovery
//! order. Every fetch of a batch runs concurrently; the batch settles fully,
//! its admissible records are written out, and only then (after a jittered
//! pause) does the next batch start. Batch size is the only back-pressure.

use std::future::Future;

use serde::Deserialize;
use tracing::{debug, info};

use crate::detail::{DetailRecord, FetchOutcome};
use crate::logger::RunLogger;
use crate::pacing::DelayRange;
use crate::result_sink::RecordSink;

/// Minimum-content rule deciding which fetched records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentGate {
    /// Name or address must be present
    #[default]
    NameOrAddress,
    /// Name must be present
    Name,
    /// Persist everything, including exhausted (empty) records
    Any,
}

impl ContentGate {
    pub fn admits(&self, record: &DetailRecord) -> bool {
        match self {
            ContentGate::NameOrAddress => !record.name.is_empty() || !record.address.is_empty(),
            ContentGate::Name => !record.name.is_empty(),
            ContentGate::Any => true,
        }
    }
}

/// Outcome of one concurrent batch
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Zero-based batch number
    pub index: usize,
    /// Outcomes in the batch's identifier order
    pub outcomes: Vec<FetchOutcome>,
    /// Records accepted by the sink
    pub persisted: usize,
}

/// Totals for one scheduler run
#[derive(Debug, Clone, Default)]
pub struct BatchRunSummary {
    pub batches: Vec<BatchResult>,
    pub fetched: usize,
    pub succeeded: usize,
    pub exhausted: usize,
    pub persisted: usize,
}

pub struct BatchScheduler {
    batch_size: usize,
    gate: ContentGate,
    delay: DelayRange,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, gate: ContentGate, delay: DelayRange) -> Self {
        Self {
            batch_size: batch_size.max(1),
            gate,
            delay,
        }
    }

    pub fn batch_count(&self, items: usize) -> usize {
        items.div_ceil(self.batch_size)
    }

    /// Fetch every identifier, persisting admissible records batch by batch.
    ///
    /// `fetch` receives the 1-based position of the identifier in the whole
    /// list along with the identifier itself.
    pub async fn run<'a, F, Fut>(
        &self,
        identifiers: &'a [String],
        mut fetch: F,
        sink: &mut dyn RecordSink,
        logger: &RunLogger,
    ) -> BatchRunSummary
    where
        F: FnMut(usize, &'a str) -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        let mut summary = BatchRunSummary::default();
        let total_batches = self.batch_count(identifiers.len());

        for (index, chunk) in identifiers.chunks(self.batch_size).enumerate() {
            let offset = index * self.batch_size;
            debug!("Starting batch {}/{} ({} items)", index + 1, total_batches, chunk.len());

            let pending: Vec<Fut> = chunk
                .iter()
                .enumerate()
                .map(|(i, id)| fetch(offset + i + 1, id.as_str()))
                .collect();
            let outcomes = futures::future::join_all(pending).await;

            let mut persisted = 0;
            for outcome in &outcomes {
                if self.gate.admits(&outcome.record) && sink.append(&outcome.record) {
                    persisted += 1;
                }
            }

            let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
            summary.fetched += outcomes.len();
            summary.succeeded += succeeded;
            summary.exhausted += outcomes.len() - succeeded;
            summary.persisted += persisted;

            logger.advance_progress(chunk.len() as u64).await;
            info!(
                "Batch {}/{} done: {}/{} succeeded, {} persisted ({}/{} items overall)",
                index + 1,
                total_batches,
                succeeded,
                outcomes.len(),
                persisted,
                summary.fetched,
                identifiers.len()
            );

            summary.batches.push(BatchResult {
                index,
                outcomes,
                persisted,
            });

            if index + 1 < total_batches {
                self.delay.pause("before next batch").await;
            }
        }

        summary
    }
}
