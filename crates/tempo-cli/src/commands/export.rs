//! Export command dumping entries as CSV or JSON.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;

use tempo_core::Entry;
use tempo_db::EntryStore;

use crate::cli::ExportFormat;

const CSV_HEADER: &str =
    "id,timestamp,app_name,window_title,project,category,task_description,duration_seconds,duration_formatted,is_idle";

/// One exported entry row.
#[derive(Debug, Serialize)]
struct ExportRow {
    id: i64,
    timestamp: String,
    app_name: String,
    window_title: String,
    project: String,
    category: Option<String>,
    task_description: Option<String>,
    duration_seconds: Option<i64>,
    duration_formatted: String,
    is_idle: bool,
}

impl From<&Entry> for ExportRow {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id,
            timestamp: entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            app_name: entry.app_name.clone(),
            window_title: entry.window_title.clone(),
            project: entry.effective_project().to_string(),
            category: entry.category.map(|c| c.as_str().to_string()),
            task_description: entry.task_description.clone(),
            duration_seconds: entry.duration_seconds,
            duration_formatted: entry.duration_formatted(),
            is_idle: entry.is_idle,
        }
    }
}

/// Resolved export range: `[start of start-day, start of day after end-day)`.
fn export_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(DateTime::<Utc>::MIN_UTC, |dt| dt.and_utc());
    let end = end
        .and_then(|d| d.succ_opt())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or_else(Utc::now, |dt| dt.and_utc());
    (start, end)
}

pub fn run<W: Write>(
    writer: &mut W,
    store: &EntryStore,
    format: ExportFormat,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    project: Option<&str>,
) -> Result<()> {
    let (start, end) = export_range(start, end);
    let entries = store.entries_in_range(start, end, project)?;
    let rows: Vec<ExportRow> = entries.iter().map(ExportRow::from).collect();

    match format {
        ExportFormat::Csv => write_csv(writer, &rows)?,
        ExportFormat::Json => writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?,
    }
    tracing::debug!(count = rows.len(), "exported entries");
    Ok(())
}

fn write_csv<W: Write>(writer: &mut W, rows: &[ExportRow]) -> Result<()> {
    writeln!(writer, "{CSV_HEADER}")?;
    for row in rows {
        let fields = [
            row.id.to_string(),
            row.timestamp.clone(),
            row.app_name.clone(),
            row.window_title.clone(),
            row.project.clone(),
            row.category.clone().unwrap_or_default(),
            row.task_description.clone().unwrap_or_default(),
            row.duration_seconds.map(|d| d.to_string()).unwrap_or_default(),
            row.duration_formatted.clone(),
            row.is_idle.to_string(),
        ];
        let line = fields
            .iter()
            .map(|field| csv_escape(field))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

/// Quotes a CSV field when it contains a comma, quote, or newline;
/// embedded quotes are doubled.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Splits one CSV line produced by [`csv_escape`] back into fields.
#[cfg(test)]
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}
