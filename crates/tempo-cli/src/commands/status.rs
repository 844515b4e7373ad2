//! Status command showing database location and tracking state.

use std::io::Write;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};

use tempo_core::format_duration;
use tempo_db::EntryStore;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, store: &EntryStore, config: &Config) -> Result<()> {
    writeln!(writer, "Tempo status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    writeln!(writer, "Entries: {}", store.entry_count()?)?;

    let Some(latest) = store.latest_entry()? else {
        writeln!(writer, "No activity recorded.")?;
        return Ok(());
    };

    writeln!(
        writer,
        "Last capture: {} ({})",
        latest.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        latest.app_name
    )?;
    match latest.duration_seconds {
        None => {
            let open_for = Utc::now().signed_duration_since(latest.timestamp).num_seconds();
            writeln!(writer, "Open entry: {} (open {})", latest.id, format_duration(open_for))?;
        }
        Some(seconds) => {
            writeln!(
                writer,
                "Open entry: none (last entry duration {})",
                format_duration(seconds)
            )?;
        }
    }
    Ok(())
}
