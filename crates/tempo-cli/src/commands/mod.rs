//! Subcommand implementations.

pub mod classify;
pub mod export;
pub mod prune;
pub mod report;
pub mod status;
pub mod track;
