//! Retention sweep deleting entries older than a horizon.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::Utc;

use tempo_db::EntryStore;

/// Deletes entries older than the horizon. `days` falls back to the
/// configured `retention_days` when not given on the command line.
pub fn run<W: Write>(
    writer: &mut W,
    store: &mut EntryStore,
    days: Option<u32>,
    retention_days: Option<u32>,
) -> Result<()> {
    let Some(days) = days.or(retention_days) else {
        bail!("no retention horizon: pass --days or set retention_days in the config");
    };
    let horizon = Utc::now() - chrono::Duration::days(i64::from(days));
    let deleted = store.prune_older_than(horizon)?;
    tracing::info!(deleted, days, "retention sweep finished");
    writeln!(
        writer,
        "Deleted {deleted} entries older than {days} days ({} remain)",
        store.entry_count()?
    )?;
    Ok(())
}
