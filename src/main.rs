use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadscout::cli::{Cli, Commands, EmailArgs, ListingsArgs};
use leadscout::config::{self, AppConfig};
use leadscout::driver::chrome::ChromeDriver;
use leadscout::driver::PageDriver;
use leadscout::email::{EmailResolver, HttpProbe};
use leadscout::enrich::EmailRun;
use leadscout::logger::{RunKind, RunLogger, VerbosityLevel};
use leadscout::pipeline::ListingPipeline;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| verbosity.tracing_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::CONFIG_PATH));

    // Handle --init first (before any other processing)
    if cli.init {
        match AppConfig::create_default_config_at(&config_path) {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize targets and settings, then run leadscout again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let Some(command) = cli.command else {
        eprintln!("❌ No command given. Use `leadscout listings` or `leadscout emails --input <FILE>`.");
        std::process::exit(2);
    };

    // Config is loaded (and any prompt answered) before the progress bar starts
    let mut app_config = load_config(&config_path);

    let logger = match &cli.log_file {
        Some(path) => RunLogger::with_log_file(verbosity, path),
        None => RunLogger::new(verbosity),
    };

    let driver: Arc<dyn PageDriver> = Arc::new(ChromeDriver::new(app_config.browser.clone()));

    let (kind, outcome) = match command {
        Commands::Listings(args) => (RunKind::Listings, run_listings(&args, &mut app_config, driver, &logger).await),
        Commands::Emails(args) => (RunKind::Emails, run_emails(&args, &mut app_config, driver, &logger).await),
    };

    if let Err(e) = outcome {
        logger.error(&format!("{:#}", e));
        export_logs(&logger, cli.log_file.as_deref());
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }

    logger.print_final_summary(kind);
    export_logs(&logger, cli.log_file.as_deref());
    Ok(())
}

fn load_config(path: &Path) -> AppConfig {
    match AppConfig::load_from_path(path) {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => match AppConfig::prompt_create_config(&path) {
            Ok(Some(created_path)) => {
                println!("✅ Created default configuration file at: {}", created_path.display());
                println!("   Edit this file to customize targets and settings, then run leadscout again.");
                std::process::exit(0);
            }
            Ok(None) => {
                eprintln!("❌ Configuration file not found at: {}", path.display());
                eprintln!("   Run with --init to create a default configuration file.");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_listings(
    args: &ListingsArgs,
    app_config: &mut AppConfig,
    driver: Arc<dyn PageDriver>,
    logger: &RunLogger,
) -> Result<()> {
    args.validate().map_err(anyhow::Error::msg)?;
    args.apply(app_config);
    app_config.validate()?;

    if app_config.targets.is_empty() {
        anyhow::bail!("No targets configured; add [[targets]] entries to the configuration file");
    }

    logger.info(&format!(
        "Starting crawl of {} targets (batch size {})",
        app_config.targets.len(),
        app_config.listings.batch_size
    ));
    let summary = ListingPipeline::new(app_config, driver, logger).run().await?;
    logger.info(&format!("Combined results: {}", summary.combined_output.display()));
    Ok(())
}

async fn run_emails(
    args: &EmailArgs,
    app_config: &mut AppConfig,
    driver: Arc<dyn PageDriver>,
    logger: &RunLogger,
) -> Result<()> {
    args.validate().map_err(anyhow::Error::msg)?;
    args.apply(&mut app_config.emails);

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let probe = Arc::new(HttpProbe::new(&app_config.browser.user_agent)?);
    let resolver = Arc::new(EmailResolver::from_config(&app_config.emails, probe));
    let output = args.output_path();

    let summary = EmailRun::new(&app_config.emails, driver, resolver, logger)
        .run(&args.input, &output, args.limit)
        .await?;

    if summary.missing > 0 {
        logger.warn(&format!("{} websites could not be resolved", summary.missing));
    }
    Ok(())
}

fn export_logs(logger: &RunLogger, log_file: Option<&Path>) {
    if !logger.is_log_export_enabled() {
        return;
    }
    match logger.export_logs() {
        Ok(()) => {
            if let Some(path) = log_file {
                println!("📄 Execution logs exported to: {}", path.display());
                println!("   Total log entries: {}", logger.get_log_count());
            }
        }
        Err(e) => eprintln!("⚠️ Warning: Failed to export logs: {}", e),
    }
}
