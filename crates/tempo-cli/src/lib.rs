//! Command-line interface for the tempo activity tracker.

pub mod cli;
pub mod commands;
pub mod config;
pub mod probes;

pub use cli::{Cli, Commands, ExportFormat};
pub use config::{ClassifierConfig, Config, ProjectConfig, Provider};
