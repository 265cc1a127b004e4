//! content-sync CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use content_sync::{
    config::{RunPaths, load_config},
    error::Result,
    models::Config,
    pipeline::SyncOrchestrator,
    plugins::abort_pair,
    utils::Logger,
};

/// content-sync - staged content and media synchronization
#[derive(Parser, Debug)]
#[command(
    name = "content-sync",
    version,
    about = "Sync structured content and media from remote sources"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "content-sync.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every configured source once
    Sync {
        /// Re-download every asset, ignoring local copies
        #[arg(long)]
        ignore_cache: bool,

        /// Fail a source on its first media failure
        #[arg(long)]
        abort_on_error: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Show resolved paths and configured sources
    Info,
}

/// Initialize logging based on verbosity flag and config level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // The log level comes from the config file
    let config = match &cli.command {
        Command::Validate => Config::load(&cli.config)?,
        _ => load_config(&cli.config)?,
    };
    init_logging(cli.verbose, &config.logging.level);

    match cli.command {
        Command::Sync {
            ignore_cache,
            abort_on_error,
        } => {
            let mut config = config;
            config.downloader.ignore_cache |= ignore_cache;
            config.downloader.abort_on_error |= abort_on_error;

            let (handle, signal) = abort_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received, finishing the current source");
                    handle.abort();
                }
            });

            let report = SyncOrchestrator::from_config(config, Logger::default())?
                .with_abort_signal(signal)
                .run()
                .await?;

            if !report.is_success() {
                for failed in report.failed_sources() {
                    log::error!(
                        "{}: {}",
                        failed.source_id,
                        failed.error.as_deref().unwrap_or("unknown error")
                    );
                }
                return Ok(ExitCode::FAILURE);
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} source(s), {} transform(s))",
                config.sources.len(),
                config.transforms.len()
            );
        }

        Command::Info => {
            let paths = RunPaths::resolve(&config.paths, chrono::Utc::now())?;
            log::info!("Download path: {}", paths.download.display());
            log::info!("Temp path: {}", paths.temp.display());
            log::info!("Backup path: {}", paths.backup.display());
            log::info!("Backup and restore: {}", config.backup_and_restore);
            for source in &config.sources {
                log::info!("Source '{}': {}", source.id, source.url);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
