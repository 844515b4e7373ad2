//! Report command rendering daily and weekly rollups.
//!
//! Period boundaries are computed in local time and converted to UTC
//! before querying the store, so "today" means the user's today.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use tempo_core::{
    BucketTotal, DailySummary, WeekDelta, WeeklyReport, daily_summary, format_duration,
    week_over_week, week_start, weekly_report,
};
use tempo_db::EntryStore;

/// Report period type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    LastWeek,
}

/// Computed report data, shaped for JSON output.
#[derive(Debug, Serialize)]
#[serde(tag = "period", rename_all = "lowercase")]
pub enum ReportData {
    Daily(DailySummary),
    Weekly {
        #[serde(flatten)]
        report: WeeklyReport,
        week_over_week: WeekDelta,
    },
}

/// Converts a local date at midnight to UTC.
/// Handles DST ambiguity by picking the earlier time.
fn local_midnight_to_utc(local_date: NaiveDate) -> DateTime<Utc> {
    let midnight = local_date.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight) {
        // Single or ambiguous (DST fall-back): use the earlier time
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => {
            // DST spring-forward gap at midnight: 1am local always exists
            let one_am = local_date.and_time(NaiveTime::from_hms_opt(1, 0, 0).unwrap_or_default());
            match Local.from_local_datetime(&one_am) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
                LocalResult::None => Utc.from_utc_datetime(&one_am),
            }
        }
    }
}

/// Loads one day's entries and rolls them up.
fn load_day(store: &EntryStore, date: NaiveDate) -> Result<DailySummary> {
    let start = local_midnight_to_utc(date);
    let end = local_midnight_to_utc(date + chrono::Duration::days(1));
    let entries = store.entries_in_range(start, end, None)?;
    Ok(daily_summary(date, &entries))
}

/// Loads the Monday-aligned week containing `date`.
fn load_week(store: &EntryStore, date: NaiveDate) -> Result<WeeklyReport> {
    let monday = week_start(date);
    let days = (0..7)
        .map(|offset| load_day(store, monday + chrono::Duration::days(offset)))
        .collect::<Result<Vec<_>>>()?;
    Ok(weekly_report(monday, days))
}

/// Computes the report for a period, using `today` as the reference day.
pub fn report_data(store: &EntryStore, period: Period, today: NaiveDate) -> Result<ReportData> {
    match period {
        Period::Day => Ok(ReportData::Daily(load_day(store, today)?)),
        Period::Week | Period::LastWeek => {
            let reference = if period == Period::LastWeek {
                week_start(today) - chrono::Duration::days(7)
            } else {
                today
            };
            let report = load_week(store, reference)?;
            let previous = load_week(store, week_start(reference) - chrono::Duration::days(7))?;
            Ok(ReportData::Weekly {
                week_over_week: week_over_week(&report, &previous),
                report,
            })
        }
    }
}

pub fn run<W: Write>(writer: &mut W, store: &EntryStore, period: Period, json: bool) -> Result<()> {
    let data = report_data(store, period, Local::now().date_naive())?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&data)?)?;
        return Ok(());
    }
    match &data {
        ReportData::Daily(day) => render_day(writer, day)?,
        ReportData::Weekly {
            report,
            week_over_week,
        } => render_week(writer, report, week_over_week)?,
    }
    Ok(())
}

fn render_day<W: Write>(writer: &mut W, day: &DailySummary) -> Result<()> {
    writeln!(writer, "{}", day.date.format("%A, %B %-d %Y"))?;
    writeln!(
        writer,
        "  active {}  idle {}",
        format_duration(day.active_seconds),
        format_duration(day.idle_seconds)
    )?;
    render_buckets(writer, "Projects", &day.projects)?;
    render_buckets(writer, "Categories", &day.categories)?;
    render_buckets(writer, "Top apps", &day.top_apps)?;
    Ok(())
}

fn render_week<W: Write>(
    writer: &mut W,
    report: &WeeklyReport,
    delta: &WeekDelta,
) -> Result<()> {
    writeln!(
        writer,
        "Week of {} - {}",
        report.week_start.format("%B %-d"),
        report.week_end.format("%B %-d %Y")
    )?;
    writeln!(writer, "Total: {:.1}h active", report.total_hours)?;
    writeln!(
        writer,
        "vs last week: {:+.1}h ({:+.0}%)",
        delta.hours_change, delta.hours_change_percent
    )?;

    render_buckets(writer, "Projects", &report.projects)?;
    render_buckets(writer, "Categories", &report.categories)?;

    writeln!(writer)?;
    writeln!(writer, "Days:")?;
    for day in &report.days {
        writeln!(
            writer,
            "  {}  {}",
            day.date.format("%a %m-%d"),
            format_duration(day.active_seconds)
        )?;
    }
    Ok(())
}

fn render_buckets<W: Write>(writer: &mut W, label: &str, buckets: &[BucketTotal]) -> Result<()> {
    if buckets.is_empty() {
        return Ok(());
    }
    writeln!(writer)?;
    writeln!(writer, "{label}:")?;
    let max = buckets.iter().map(|b| b.seconds).max().unwrap_or(0);
    for bucket in buckets {
        writeln!(
            writer,
            "  {:<24} {:>8}  {}",
            bucket.key,
            format_duration(bucket.seconds),
            progress_bar(bucket.seconds, max)
        )?;
    }
    Ok(())
}

/// Generates a 10-character progress bar.
/// Values below 5% of max still get a single block for visibility.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "bar resolution is 10 cells, precision is irrelevant"
)]
fn progress_bar(value: i64, max: i64) -> String {
    if max <= 0 {
        return "░".repeat(10);
    }
    let ratio = value as f64 / max as f64;
    let filled = if ratio < 0.05 && value > 0 {
        1
    } else {
        (ratio * 10.0).round().min(10.0) as usize
    };
    format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_db::NewEntry;

    fn seeded_store(today: NaiveDate) -> EntryStore {
        let mut store = EntryStore::open_in_memory().unwrap();
        let midnight = local_midnight_to_utc(today);
        for (hour, app, duration, is_idle) in [
            (9_i64, "Zed", 3600, false),
            (10, "Slack", 1800, false),
            (11, "Idle", 900, true),
        ] {
            store
                .append(&NewEntry {
                    timestamp: midnight + chrono::Duration::hours(hour),
                    app_name: app.to_string(),
                    window_title: format!("{app} window"),
                    screenshot_ref: None,
                    is_idle,
                })
                .unwrap();
            store
                .close_open_duration(
                    midnight + chrono::Duration::hours(hour) + chrono::Duration::seconds(duration),
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn daily_report_covers_only_the_day() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 29).unwrap();
        let store = seeded_store(today);

        let data = report_data(&store, Period::Day, today).unwrap();
        let ReportData::Daily(day) = data else {
            panic!("expected daily data");
        };
        assert_eq!(day.active_seconds, 5400);
        assert_eq!(day.idle_seconds, 900);

        // A different day sees nothing.
        let other = report_data(&store, Period::Day, today + chrono::Duration::days(7)).unwrap();
        let ReportData::Daily(day) = other else {
            panic!("expected daily data");
        };
        assert_eq!(day.total_tracked_seconds, 0);
    }

    #[test]
    fn weekly_report_includes_delta() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 29).unwrap();
        let store = seeded_store(today);

        let data = report_data(&store, Period::Week, today).unwrap();
        let ReportData::Weekly {
            report,
            week_over_week,
        } = data
        else {
            panic!("expected weekly data");
        };
        assert_eq!(report.week_start, NaiveDate::from_ymd_opt(2025, 1, 27).unwrap());
        assert!((report.total_hours - 1.5).abs() < 1e-9);
        // Previous week is empty, so percent change is defined as 0.
        assert!((week_over_week.hours_change - 1.5).abs() < 1e-9);
        assert!(week_over_week.hours_change_percent.abs() < f64::EPSILON);
    }

    #[test]
    fn last_week_report_uses_previous_monday() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 29).unwrap();
        let store = seeded_store(today);

        let data = report_data(&store, Period::LastWeek, today).unwrap();
        let ReportData::Weekly { report, .. } = data else {
            panic!("expected weekly data");
        };
        assert_eq!(report.week_start, NaiveDate::from_ymd_opt(2025, 1, 20).unwrap());
        assert!(report.total_hours.abs() < f64::EPSILON);
    }

    #[test]
    fn rendered_report_mentions_apps_and_durations() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 29).unwrap();
        let store = seeded_store(today);

        let data = report_data(&store, Period::Day, today).unwrap();
        let ReportData::Daily(day) = data else {
            panic!("expected daily data");
        };
        let mut output = Vec::new();
        render_day(&mut output, &day).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("active 1h 30m"));
        assert!(output.contains("idle 15m"));
        assert!(output.contains("Zed"));
        assert!(output.contains("Slack"));
    }

    #[test]
    fn progress_bar_shape() {
        assert_eq!(progress_bar(0, 0), "░░░░░░░░░░");
        assert_eq!(progress_bar(100, 100), "██████████");
        assert_eq!(progress_bar(50, 100), "█████░░░░░");
        // Tiny but non-zero values stay visible.
        assert_eq!(progress_bar(1, 1000), "█░░░░░░░░░");
    }
}
