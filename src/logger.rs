use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,   // Only progress bar and final summary
    Summary = 1,  // Per-target and per-batch progress (default)
    Detailed = 2, // Per-item results and warnings
    Debug = 3,    // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }

    /// Default `tracing` filter directive for this verbosity.
    pub fn tracing_directive(&self) -> &'static str {
        match self {
            VerbosityLevel::Silent => "leadscout=error",
            VerbosityLevel::Summary => "leadscout=warn",
            VerbosityLevel::Detailed => "leadscout=info",
            VerbosityLevel::Debug => "leadscout=debug",
        }
    }
}

/// Which engine a run used; selects the summary layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunKind {
    Listings,
    Emails,
}

#[derive(Clone)]
pub struct RunLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    run_metadata: Arc<Mutex<RunMetadata>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<PathBuf>,
}

#[derive(Default, Clone, Debug)]
pub struct RunMetadata {
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
    pub targets_processed: usize,
    pub queries_failed: usize,
    pub identifiers_discovered: usize,
    pub items_fetched: usize,
    pub items_succeeded: usize,
    pub rows_persisted: usize,
    pub sites_resolved: usize,
    pub sites_with_emails: usize,
    pub cache_hits: usize,
    pub output_files: Vec<String>,
}

impl RunLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            run_metadata: Arc::new(Mutex::new(RunMetadata::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: impl Into<PathBuf>) -> Self {
        Self {
            log_file_path: Some(log_file_path.into()),
            ..Self::new(verbosity)
        }
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    pub fn error(&self, message: &str) {
        // Errors are shown at every verbosity
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", timestamp(), level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // Route through the progress bar so its line stays pinned
        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    pub async fn start_progress(&self, total_steps: u64) {
        let pb = ProgressBar::new(total_steps);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Starting...");

        *self.progress_bar.write().await = Some(pb);
        self.record(|m| m.start_time = Some(SystemTime::now()));
    }

    /// Grow the bar's length once more work is known.
    pub async fn extend_progress(&self, steps: u64) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc_length(steps);
        }
    }

    pub async fn update_progress(&self, message: &str) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.set_message(message.to_string());
        }
    }

    pub async fn advance_progress(&self, steps: u64) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc(steps);
        }
    }

    pub async fn finish_progress(&self, final_message: &str) {
        if let Some(pb) = self.progress_bar.write().await.take() {
            pb.finish_and_clear();
        }
        self.record(|m| m.end_time = Some(SystemTime::now()));
        self.info(final_message);
    }

    /// Update run metadata. A poisoned lock is tolerated.
    pub fn record<F: FnOnce(&mut RunMetadata)>(&self, update: F) {
        let mut metadata = self.run_metadata.lock().unwrap_or_else(|e| e.into_inner());
        update(&mut metadata);
    }

    pub fn metadata(&self) -> RunMetadata {
        self.run_metadata.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn print_final_summary(&self, kind: RunKind) {
        let metadata = self.metadata();

        print!("\x1b[2K\r");
        let _ = io::stdout().flush();

        println!("\n=== RUN SUMMARY ===");
        if let (Some(start), Some(end)) = (metadata.start_time, metadata.end_time) {
            let duration = end.duration_since(start).unwrap_or_default();
            println!("Run Duration: {:.2}s", duration.as_secs_f64());
        }

        match kind {
            RunKind::Listings => {
                println!("Targets Processed: {}", metadata.targets_processed);
                println!("Failed Queries: {}", metadata.queries_failed);
                println!("Listings Discovered: {}", metadata.identifiers_discovered);
                println!("Listings Fetched: {}", metadata.items_fetched);
                println!("Fetched Successfully: {}", metadata.items_succeeded);
                println!("Rows Written: {}", metadata.rows_persisted);
            }
            RunKind::Emails => {
                println!("Sites Resolved: {}", metadata.sites_resolved);
                println!("Sites With Emails: {}", metadata.sites_with_emails);
                println!("Cache Hits: {}", metadata.cache_hits);
                println!("Rows Written: {}", metadata.rows_persisted);
            }
        }

        for file in &metadata.output_files {
            println!("Results Exported: {}", file);
        }
        println!("===================\n");

        match kind {
            RunKind::Listings if metadata.rows_persisted > 0 => {
                println!("✅ Crawl completed successfully! Saved {} listings.", metadata.rows_persisted)
            }
            RunKind::Listings => println!("✅ Crawl completed. No listings were saved."),
            RunKind::Emails => println!(
                "✅ Email discovery completed. Found emails for {} of {} sites.",
                metadata.sites_with_emails, metadata.sites_resolved
            ),
        }
    }

    pub fn log_target_start(&self, target: &str, queries: usize) {
        self.info(&format!("Processing target '{}' ({} queries)", target, queries));
    }

    pub fn log_query_failed(&self, target: &str, query: usize, error: &str) {
        self.record(|m| m.queries_failed += 1);
        self.warn(&format!("Query {} for '{}' failed: {}", query, target, error));
    }

    pub fn log_discovery(&self, target: &str, query: usize, found: usize, new: usize) {
        self.record(|m| m.identifiers_discovered += new);
        self.info(&format!(
            "Query {} for '{}': {} listings found, {} new",
            query, target, found, new
        ));
    }

    pub fn log_output_file(&self, path: &Path) {
        let path = path.display().to_string();
        self.debug(&format!("Writing results to {}", path));
        self.record(|m| m.output_files.push(path));
    }

    /// Write the buffered log lines to the configured file.
    pub fn export_logs(&self) -> io::Result<()> {
        let Some(ref log_file_path) = self.log_file_path else {
            return Ok(());
        };

        if let Some(parent) = log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_file_path)?;

        let buffer = self.log_buffer.lock().unwrap_or_else(|e| e.into_inner());
        for log_entry in buffer.iter() {
            writeln!(file, "{}", log_entry)?;
        }
        file.flush()
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}
