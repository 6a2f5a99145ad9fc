//! Configuration management for leadscout
//!
//! All configuration is loaded from `./config/leadscout.toml` (or the path
//! given with `--config`). The embedded template is the single source of
//! defaults; `--init` writes it out.

use serde::Deserialize;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::batch::ContentGate;
use crate::driver::Locator;
use crate::export::RowGate;
use crate::extract::FieldCandidates;
use crate::pacing::DelayRange;
use crate::retry::RetryPolicy;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/leadscout.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/leadscout.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    pub listings: ListingsConfig,
    pub discovery: DiscoveryConfig,
    pub detail: DetailConfig,
    pub emails: EmailConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Headless browser launch and tab settings
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub headless: bool,
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default)]
    pub block_images: bool,
    #[serde(default)]
    pub stealth: bool,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,
}

fn default_true() -> bool {
    true
}

fn default_accept_language() -> String {
    "en-US".to_string()
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_max_instances() -> usize {
    4
}

/// Listing crawl run settings
#[derive(Debug, Clone, Deserialize)]
pub struct ListingsConfig {
    pub base_name: String,
    pub output_dir: PathBuf,
    pub diagnostics_dir: PathBuf,
    pub batch_size: usize,
    /// Cap on new identifiers processed per target (0 = no limit)
    #[serde(default)]
    pub max_items_per_target: usize,
    #[serde(default)]
    pub content_gate: ContentGate,
    pub batch_delay_ms: DelayRange,
    pub query_delay_ms: DelayRange,
    pub target_delay_ms: DelayRange,
}

/// Infinite-scroll discovery settings
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    pub navigation_timeout_secs: u64,
    pub ready_timeout_secs: u64,
    pub settle_ms: u64,
    pub item_url_prefix: String,
    pub max_scrolls: u32,
    pub stagnation_limit: u32,
    pub large_scroll_px: u32,
    pub small_scroll_px: u32,
    pub large_scroll_every: u32,
    pub scroll_delay_ms: DelayRange,
    pub load_more_every: u32,
    pub load_more_offset: u32,
    #[serde(default)]
    pub load_more_settle_ms: u64,
    #[serde(default)]
    pub consent: Vec<Locator>,
    pub ready: Vec<Locator>,
    #[serde(default)]
    pub containers: Vec<Locator>,
    #[serde(default)]
    pub overflow_candidates: Option<Locator>,
    #[serde(default)]
    pub load_more: Vec<Locator>,
    #[serde(default)]
    pub end_markers: Vec<String>,
}

impl DiscoveryConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

/// Per-item detail fetch settings
#[derive(Debug, Clone, Deserialize)]
pub struct DetailConfig {
    pub navigation_timeout_secs: u64,
    pub ready_timeout_secs: u64,
    pub settle_ms: u64,
    pub ready: Vec<Locator>,
    #[serde(default)]
    pub retry: RetryPolicy,
    pub fields: FieldsConfig,
}

impl DetailConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

/// Candidate locators for every extracted field
#[derive(Debug, Clone, Deserialize)]
pub struct FieldsConfig {
    pub name: FieldCandidates,
    pub category: FieldCandidates,
    pub address: FieldCandidates,
    pub website: FieldCandidates,
    pub phone: FieldCandidates,
}

/// Email discovery settings
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub navigation_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Maximum emails kept per site (0 = unlimited)
    pub max_per_site: usize,
    /// Worker count (0 = derive from available parallelism)
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_true")]
    pub use_workers: bool,
    #[serde(default = "default_true")]
    pub cache_results: bool,
    #[serde(default)]
    pub row_gate: RowGate,
    #[serde(default = "default_min_primary_yield")]
    pub min_primary_yield: usize,
    pub contact_keywords: Vec<String>,
    pub contact_paths: Vec<String>,
    #[serde(default)]
    pub blocklist: Vec<String>,
    #[serde(default)]
    pub role_words: Vec<String>,
}

fn default_probe_timeout_secs() -> u64 {
    2
}

fn default_min_primary_yield() -> usize {
    2
}

impl EmailConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Effective worker count: configured value, or available parallelism
    /// minus one clamped to 1..=8.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        default_worker_count(cpus)
    }
}

pub fn default_worker_count(cpus: usize) -> usize {
    cpus.saturating_sub(1).clamp(1, 8)
}

/// One crawl target (a location) and the search queries that feed it
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub queries: Vec<String>,
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(!self.browser.user_agent.trim().is_empty(), "browser.user_agent")?;
        positive(self.browser.max_instances as u64, "browser.max_instances")?;

        require(!self.listings.base_name.trim().is_empty(), "listings.base_name")?;
        positive(self.listings.batch_size as u64, "listings.batch_size")?;

        positive(self.discovery.navigation_timeout_secs, "discovery.navigation_timeout_secs")?;
        positive(self.discovery.ready_timeout_secs, "discovery.ready_timeout_secs")?;
        positive(self.discovery.stagnation_limit as u64, "discovery.stagnation_limit")?;
        positive(self.discovery.large_scroll_every as u64, "discovery.large_scroll_every")?;
        positive(self.discovery.load_more_every as u64, "discovery.load_more_every")?;
        require(!self.discovery.item_url_prefix.is_empty(), "discovery.item_url_prefix")?;
        require(!self.discovery.ready.is_empty(), "discovery.ready")?;

        positive(self.detail.navigation_timeout_secs, "detail.navigation_timeout_secs")?;
        positive(self.detail.ready_timeout_secs, "detail.ready_timeout_secs")?;
        require(!self.detail.ready.is_empty(), "detail.ready")?;
        require(!self.detail.fields.name.candidates.is_empty(), "detail.fields.name.candidates")?;

        positive(self.emails.navigation_timeout_secs, "emails.navigation_timeout_secs")?;
        positive(self.emails.probe_timeout_secs, "emails.probe_timeout_secs")?;

        for (i, target) in self.targets.iter().enumerate() {
            require(!target.name.trim().is_empty(), &format!("targets[{}].name", i))?;
            require(!target.queries.is_empty(), &format!("targets[{}].queries", i))?;
            for (j, query) in target.queries.iter().enumerate() {
                if url::Url::parse(query).is_err() {
                    return Err(ConfigError::InvalidValue {
                        field: format!("targets[{}].queries[{}]", i, j),
                        reason: format!("'{}' is not an absolute URL", query),
                    });
                }
            }
        }

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        Self::create_default_config_at(Path::new(CONFIG_PATH))
    }

    pub fn create_default_config_at(path: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal()
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config_at(path)?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

fn require(ok: bool, field: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::EmptyRequired {
            field: field.to_string(),
        })
    }
}

fn positive(value: u64, field: &str) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "must be greater than zero".to_string(),
        })
    }
}
