//! Product date checker CLI
//!
//! Intended to run once a day from cron.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use datewatch::{
    error::Result,
    models::{Config, MailSettings},
    notify::{Notifier, SmtpNotifier},
    pipeline::{Pipeline, run_check},
    services::{DateExtractor, HttpPageClient},
    storage::LocalHistoryStore,
};

/// datewatch - product page date stamp monitor
#[derive(Parser, Debug)]
#[command(
    name = "datewatch",
    version,
    about = "Checks product pages for date stamp changes and emails a report"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check all pages, update history and send the report (default)
    Run {
        /// Write the report but do not send it
        #[arg(long)]
        skip_email: bool,
    },

    /// Fetch and extract only; nothing is stored or sent
    Check,

    /// Show stored snapshots
    History,

    /// Validate configuration and mail settings
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
///
/// Only configuration errors end with a failure status; anything else is
/// logged and the run still counts as completed.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_fatal() => {
            log::error!("✗ {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("✗ {}", e);
            ExitCode::SUCCESS
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = if cli.config.exists() {
        let config = Config::load(&cli.config)?;
        log::info!("Loaded configuration from {}", cli.config.display());
        config
    } else {
        log::debug!("No config at {}, using defaults", cli.config.display());
        Config::default()
    };
    config.validate()?;

    let store = LocalHistoryStore::new(&config.history.file);

    match cli.command.unwrap_or(Command::Run { skip_email: false }) {
        Command::Run { skip_email } => {
            let notifier = if skip_email {
                None
            } else {
                let settings = MailSettings::from_env_file(&config.mail.env_file)?;
                log::info!("Mail settings loaded from {}", config.mail.env_file.display());
                Some(
                    SmtpNotifier::new(settings, &config.report.sender_name)
                        .with_timeout(Duration::from_secs(config.mail.timeout_secs)),
                )
            };

            let client = HttpPageClient::new(&config.checker)?;
            let pipeline = Pipeline {
                config: &config,
                client: &client,
                store: &store,
                notifier: notifier.as_ref().map(|n| n as &dyn Notifier),
            };
            pipeline.run(Local::now().naive_local()).await?;
        }

        Command::Check => {
            let client = HttpPageClient::new(&config.checker)?;
            let extractor = DateExtractor::new(&config.checker.heading_tag)?;
            let outcome = run_check(&config.checker, &client, &extractor).await;

            for (url, obs) in &outcome.observations {
                println!("{}\t{}\t{}", obs.date, obs.raw, url);
            }
            for (url, error) in &outcome.errors {
                println!("ERROR\t{}\t{}", error, url);
            }
        }

        Command::History => {
            log::info!("History file: {}", store.path().display());
            let Some(file) = store.load_file().await? else {
                log::info!("No history found yet.");
                return Ok(());
            };

            log::info!("Last updated: {}", file.last_updated);
            for (date, snapshot) in file.history.iter() {
                log::info!(
                    "{}: {} date(s), {} error(s), checked at {}",
                    date,
                    snapshot.data.len(),
                    snapshot.errors.len(),
                    snapshot.timestamp
                );
                for (url, obs) in &snapshot.data {
                    log::info!("    {} {}", obs.date, url);
                }
                for (url, error) in &snapshot.errors {
                    log::info!("    ERROR {} ({})", url, error);
                }
            }

            let today = Local::now().date_naive();
            match file.history.most_recent_prior(today) {
                Some((date, _)) => log::info!("Next run compares against {}", date),
                None => log::info!("Next run will be a first run"),
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            log::info!("✓ Config OK ({} URLs)", config.checker.urls.len());

            let settings = MailSettings::from_env_file(&config.mail.env_file)?;
            log::info!(
                "✓ Mail settings OK ({} recipient(s) via {}:{})",
                settings.recipients.len(),
                settings.hostname,
                settings.port
            );

            log::info!("All validations passed!");
        }
    }

    Ok(())
}
