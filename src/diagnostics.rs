//! Diagnostic page snapshots.
//!
//! Snapshot names carry the target, query index and item index so an image
//! can be matched to the log line that reported the failure.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::driver::Page;

#[derive(Debug, Clone)]
pub struct Diagnostics {
    dir: Option<PathBuf>,
}

impl Diagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()) }
    }

    /// Snapshots are skipped entirely.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn readiness_failure(&self, target: &str, query: usize) -> Option<PathBuf> {
        self.path(format!("debug_screenshot_{}_q{}.png", target, query))
    }

    pub fn missing_container(&self, target: &str, query: usize) -> Option<PathBuf> {
        self.path(format!("scrollable_debug_{}_q{}.png", target, query))
    }

    pub fn collection_failure(&self, target: &str, query: usize) -> Option<PathBuf> {
        self.path(format!("urls_debug_{}_q{}.png", target, query))
    }

    pub fn item_failure(&self, target: &str, query: usize, item: usize) -> Option<PathBuf> {
        self.path(format!("error_business_{}_{}_{}.png", target, query, item))
    }

    fn path(&self, file_name: String) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(file_name))
    }

    /// Best-effort screenshot; failures are logged only.
    pub async fn capture(&self, page: &dyn Page, path: Option<PathBuf>) {
        let Some(path) = path else { return };
        match page.screenshot(&path).await {
            Ok(()) => info!("Saved diagnostic snapshot to {}", path.display()),
            Err(e) => warn!("Failed to save diagnostic snapshot {}: {}", path.display(), e),
        }
    }
}
