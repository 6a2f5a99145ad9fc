use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::config::{AppConfig, EmailConfig};
use crate::export::RowGate;

#[derive(Parser, Debug)]
#[command(name = "leadscout")]
#[command(about = "Collects business listings from map search results and discovers contact emails for them")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Create default configuration file at ./config/leadscout.toml
    #[arg(long, global = true)]
    pub init: bool,

    /// Verbose logging (use -v for INFO, -vv for DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export all log messages to this file when the run ends
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Configuration file (defaults to ./config/leadscout.toml)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl every configured target and save its listings
    Listings(ListingsArgs),

    /// Find contact emails for the websites in a CSV file
    Emails(EmailArgs),
}

#[derive(Args, Debug, Default)]
pub struct ListingsArgs {
    /// Maximum new listings per target (0 = no limit)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Listings fetched concurrently per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Directory for the output CSV files
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Base name of the output CSV files
    #[arg(long)]
    pub name: Option<String>,
}

impl ListingsArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == Some(0) {
            return Err("Batch size must be greater than 0".to_string());
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err("Output name cannot be empty".to_string());
            }
        }
        Ok(())
    }

    /// Override configuration values with the flags that were given.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(limit) = self.limit {
            config.listings.max_items_per_target = limit;
        }
        if let Some(batch_size) = self.batch_size {
            config.listings.batch_size = batch_size;
        }
        if let Some(dir) = &self.output_dir {
            config.listings.output_dir = dir.clone();
        }
        if let Some(name) = &self.name {
            config.listings.base_name = name.clone();
        }
    }
}

#[derive(Args, Debug)]
pub struct EmailArgs {
    /// Input CSV with a website column
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output CSV (defaults to <input>_emails.csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only look up the first N rows; the rest are copied through (0 = all)
    #[arg(long, default_value = "0")]
    pub limit: usize,

    /// Maximum emails kept per site
    #[arg(long, conflicts_with = "no_limit")]
    pub max_emails: Option<usize>,

    /// Keep every email found for a site
    #[arg(long)]
    pub no_limit: bool,

    /// Number of parallel workers
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Keep rows for which no email was found
    #[arg(long)]
    pub keep_empty: bool,

    /// Resolve sites one after another in a single browser session
    #[arg(long)]
    pub no_workers: bool,

    /// Look up every URL even when its host was already resolved
    #[arg(long)]
    pub no_cache: bool,
}

impl EmailArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.parallel == Some(0) {
            return Err("Parallel workers must be greater than 0".to_string());
        }
        if self.output.as_deref() == Some(self.input.as_path()) {
            return Err("Output file must differ from the input file".to_string());
        }
        Ok(())
    }

    pub fn apply(&self, config: &mut EmailConfig) {
        if self.no_limit {
            config.max_per_site = 0;
        } else if let Some(max) = self.max_emails {
            config.max_per_site = max;
        }
        if let Some(parallel) = self.parallel {
            config.workers = parallel;
        }
        if self.keep_empty {
            config.row_gate = RowGate::KeepAll;
        }
        if self.no_workers {
            config.use_workers = false;
        }
        if self.no_cache {
            config.cache_results = false;
        }
    }

    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => default_output_path(&self.input),
        }
    }
}

/// `dir/name.csv` → `dir/name_emails.csv`
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string());
    input.with_file_name(format!("{}_emails.csv", stem))
}
