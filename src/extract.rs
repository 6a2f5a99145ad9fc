//! Multi-selector field extraction.
//!
//! A logical field is described by an ordered list of candidate locators.
//! The first candidate yielding a non-empty value wins; a candidate that
//! matches nothing, or whose lookup errors, simply falls through to the next.

use serde::Deserialize;
use tracing::trace;

use crate::driver::{Locator, Page};

/// Ordered locators for one logical field, plus the attribute to read
/// (text content when `None`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FieldCandidates {
    #[serde(default)]
    pub attribute: Option<String>,
    pub candidates: Vec<Locator>,
}

impl FieldCandidates {
    pub fn text<I, L>(candidates: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Locator>,
    {
        Self {
            attribute: None,
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn attribute<I, L>(name: &str, candidates: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Locator>,
    {
        Self {
            attribute: Some(name.to_string()),
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

/// First non-empty value across `candidates`, or an empty string.
pub async fn extract(page: &dyn Page, candidates: &[Locator], attribute: Option<&str>) -> String {
    for locator in candidates {
        let value = match attribute {
            Some(name) => page.attribute(locator, name).await,
            None => page.text(locator).await,
        };
        match value {
            Ok(Some(v)) if !v.trim().is_empty() => return v.trim().to_string(),
            Ok(_) => trace!("No value for {}", locator),
            Err(e) => trace!("Candidate {} failed: {}", locator, e),
        }
    }
    String::new()
}

pub async fn extract_field(page: &dyn Page, field: &FieldCandidates) -> String {
    extract(page, &field.candidates, field.attribute.as_deref()).await
}
