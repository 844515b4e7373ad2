//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

/// Passive activity time tracker.
///
/// Samples the active window on a schedule, captures screenshots, and
/// uses an AI classifier to attribute time to projects and categories.
#[derive(Debug, Parser)]
#[command(name = "tempo", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the capture loop until interrupted.
    Track,

    /// Show a time report.
    Report {
        /// Report on today instead of the current week.
        #[arg(long, conflicts_with_all = ["last_week"])]
        day: bool,

        /// Report on the previous calendar week.
        #[arg(long)]
        last_week: bool,

        /// Emit JSON instead of the human-readable report.
        #[arg(long)]
        json: bool,
    },

    /// Export entries to CSV or JSON.
    Export {
        /// Output format.
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// First day to include (YYYY-MM-DD). Defaults to the beginning.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Only include entries whose effective project matches.
        #[arg(long)]
        project: Option<String>,
    },

    /// Show database location and tracking status.
    Status,

    /// Classify entries that never received an analysis.
    Classify {
        /// Maximum number of entries to classify in one run.
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Delete entries older than the retention horizon.
    Prune {
        /// Delete entries older than this many days. Defaults to the
        /// configured retention_days.
        #[arg(long)]
        days: Option<u32>,
    },
}

/// Export output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}
