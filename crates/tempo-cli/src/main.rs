use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tempo_cli::commands::{classify, export, prune, report, status, track};
use tempo_cli::{Cli, Commands, Config};
use tempo_db::EntryStore;

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(EntryStore, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let store = EntryStore::open(&config.database_path).context("failed to open database")?;
    Ok((store, config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let mut stdout = io::stdout().lock();
    match &cli.command {
        Some(Commands::Track) => {
            let config =
                Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
            tracing::debug!(?config, "loaded configuration");
            track::run(&config).await?;
        }
        Some(Commands::Report {
            day,
            last_week,
            json,
        }) => {
            let (store, _config) = open_database(cli.config.as_deref())?;
            let period = if *day {
                report::Period::Day
            } else if *last_week {
                report::Period::LastWeek
            } else {
                report::Period::Week
            };
            report::run(&mut stdout, &store, period, *json)?;
        }
        Some(Commands::Export {
            format,
            start,
            end,
            project,
        }) => {
            let (store, _config) = open_database(cli.config.as_deref())?;
            export::run(&mut stdout, &store, *format, *start, *end, project.as_deref())?;
        }
        Some(Commands::Status) => {
            let (store, config) = open_database(cli.config.as_deref())?;
            status::run(&mut stdout, &store, &config)?;
        }
        Some(Commands::Classify { limit }) => {
            let (mut store, config) = open_database(cli.config.as_deref())?;
            classify::run(&mut stdout, &mut store, &config, *limit).await?;
        }
        Some(Commands::Prune { days }) => {
            let (mut store, config) = open_database(cli.config.as_deref())?;
            prune::run(&mut stdout, &mut store, *days, config.retention_days)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
