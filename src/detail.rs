//! Per-item detail fetching with retry.
//!
//! One fetch walks `Navigating → WaitingReady → Extracting` on a fresh page.
//! An attempt succeeds only when the mandatory name field is non-empty;
//! anything else is retried under the configured [`RetryPolicy`]. When the
//! budget runs out the caller still gets a record carrying the identifier.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::DetailConfig;
use crate::diagnostics::Diagnostics;
use crate::driver::{BrowserSession, DriverError, Page};
use crate::extract::extract_field;
use crate::result_sink::sanitize_field;
use crate::retry::{Attempt, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailField {
    Name,
    Category,
    Address,
    Website,
    Phone,
}

impl DetailField {
    pub const ALL: [DetailField; 5] = [
        DetailField::Name,
        DetailField::Category,
        DetailField::Address,
        DetailField::Website,
        DetailField::Phone,
    ];

    /// The field whose presence makes a record valid.
    pub const MANDATORY: DetailField = DetailField::Name;
}

/// One listing. Fields are empty strings when nothing was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailRecord {
    pub url: String,
    pub name: String,
    pub category: String,
    pub address: String,
    pub website: String,
    pub phone: String,
}

impl DetailRecord {
    /// Record with only the identifier populated.
    pub fn empty(identifier: &str) -> Self {
        Self {
            url: identifier.to_string(),
            ..Default::default()
        }
    }

    pub fn field(&self, field: DetailField) -> &str {
        match field {
            DetailField::Name => &self.name,
            DetailField::Category => &self.category,
            DetailField::Address => &self.address,
            DetailField::Website => &self.website,
            DetailField::Phone => &self.phone,
        }
    }

    fn field_mut(&mut self, field: DetailField) -> &mut String {
        match field {
            DetailField::Name => &mut self.name,
            DetailField::Category => &mut self.category,
            DetailField::Address => &mut self.address,
            DetailField::Website => &mut self.website,
            DetailField::Phone => &mut self.phone,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.field(DetailField::MANDATORY).is_empty()
    }

    /// Cells in output column order: Name, Category, Address, Website, Phone, Url.
    pub fn row(&self) -> [&str; 6] {
        [
            &self.name,
            &self.category,
            &self.address,
            &self.website,
            &self.phone,
            &self.url,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Navigating,
    WaitingReady,
    Extracting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Success { attempts: u32 },
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub identifier: String,
    pub record: DetailRecord,
    pub status: FetchStatus,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, FetchStatus::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self.status {
            FetchStatus::Success { attempts } | FetchStatus::Exhausted { attempts } => attempts,
        }
    }
}

/// Why an attempt was judged retryable.
#[derive(Error, Debug)]
#[error("{state:?}: {reason}")]
pub struct AttemptError {
    pub state: FetchState,
    pub reason: String,
}

impl AttemptError {
    fn driver(state: FetchState, e: DriverError) -> Self {
        Self {
            state,
            reason: e.to_string(),
        }
    }
}

/// Where an item sits in the run, for snapshot naming and log lines.
#[derive(Debug, Clone)]
pub struct ItemContext {
    pub target: String,
    pub query: usize,
    pub index: usize,
    pub total: usize,
}

pub struct DetailFetcher {
    config: Arc<DetailConfig>,
    retry: RetryPolicy,
    diagnostics: Diagnostics,
}

impl DetailFetcher {
    pub fn new(config: Arc<DetailConfig>, diagnostics: Diagnostics) -> Self {
        let retry = config.retry.clone();
        Self {
            config,
            retry,
            diagnostics,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn fetch(&self, session: &dyn BrowserSession, identifier: &str, item: &ItemContext) -> FetchOutcome {
        debug!("Fetching item {}/{}: {}", item.index, item.total, identifier);

        let result = self
            .retry
            .run(|attempt| self.attempt(session, identifier, item, attempt))
            .await;

        match result {
            Ok(done) => FetchOutcome {
                identifier: identifier.to_string(),
                record: done.value,
                status: FetchStatus::Success { attempts: done.attempts },
            },
            Err(failed) => {
                warn!(
                    "Giving up on item {}/{} after {} attempts ({}): {}",
                    item.index, item.total, failed.attempts, failed.value, identifier
                );
                FetchOutcome {
                    identifier: identifier.to_string(),
                    record: DetailRecord::empty(identifier),
                    status: FetchStatus::Exhausted { attempts: failed.attempts },
                }
            }
        }
    }

    async fn attempt(
        &self,
        session: &dyn BrowserSession,
        identifier: &str,
        item: &ItemContext,
        attempt: Attempt,
    ) -> Result<DetailRecord, AttemptError> {
        let page = session
            .new_page()
            .await
            .map_err(|e| AttemptError::driver(FetchState::Navigating, e))?;

        let result = self.load_and_extract(page.as_ref(), identifier).await;

        if let Err(e) = &result {
            debug!("Attempt {} for {} failed in {:?}: {}", attempt.number, identifier, e.state, e.reason);
            if attempt.is_last {
                let path = self.diagnostics.item_failure(&item.target, item.query, item.index);
                self.diagnostics.capture(page.as_ref(), path).await;
            }
        }

        if let Err(e) = page.close().await {
            debug!("Error closing page for {}: {}", identifier, e);
        }

        result
    }

    async fn load_and_extract(&self, page: &dyn Page, identifier: &str) -> Result<DetailRecord, AttemptError> {
        page.goto(identifier, self.config.navigation_timeout())
            .await
            .map_err(|e| AttemptError::driver(FetchState::Navigating, e))?;

        page.wait_for_any(&self.config.ready, self.config.ready_timeout())
            .await
            .map_err(|e| AttemptError::driver(FetchState::WaitingReady, e))?;

        if self.config.settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;
        }

        let mut record = DetailRecord::empty(identifier);
        for field in DetailField::ALL {
            let value = extract_field(page, self.candidates(field)).await;
            *record.field_mut(field) = sanitize_field(&value);
        }

        if record.is_valid() {
            Ok(record)
        } else {
            Err(AttemptError {
                state: FetchState::Extracting,
                reason: "mandatory name field is empty".to_string(),
            })
        }
    }

    fn candidates(&self, field: DetailField) -> &crate::extract::FieldCandidates {
        let fields = &self.config.fields;
        match field {
            DetailField::Name => &fields.name,
            DetailField::Category => &fields.category,
            DetailField::Address => &fields.address,
            DetailField::Website => &fields.website,
            DetailField::Phone => &fields.phone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record_keeps_identifier() {
        let r = DetailRecord::empty("https://maps.example/place/1");
        assert_eq!(r.url, "https://maps.example/place/1");
        assert!(!r.is_valid());
        assert_eq!(r.row(), ["", "", "", "", "", "https://maps.example/place/1"]);
    }

    #[test]
    fn test_validity_requires_name_only() {
        let mut r = DetailRecord::empty("u");
        r.address = "somewhere".into();
        assert!(!r.is_valid());
        r.name = "Shop".into();
        assert!(r.is_valid());
    }
}
