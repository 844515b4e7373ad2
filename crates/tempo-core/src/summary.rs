//! Daily and weekly rollups over the entry timeline.
//!
//! These are pure functions: callers load the relevant entry ranges
//! from the store and hand them in. An entry contributes its
//! `duration_seconds` (0 while still open) to the day containing its
//! timestamp; idle entries count toward idle time only, active entries
//! are additionally bucketed by project, app, and category.

use std::collections::HashMap;

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

use crate::entry::Entry;

/// Number of app buckets reported per day.
const TOP_APPS: usize = 10;

/// Seconds attributed to one bucket key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketTotal {
    pub key: String,
    pub seconds: i64,
    pub entry_count: usize,
}

/// Rollup of one day's entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_tracked_seconds: i64,
    pub active_seconds: i64,
    pub idle_seconds: i64,
    pub projects: Vec<BucketTotal>,
    pub categories: Vec<BucketTotal>,
    pub top_apps: Vec<BucketTotal>,
}

/// Rollup of one Monday-aligned week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyReport {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub total_hours: f64,
    pub days: Vec<DailySummary>,
    pub projects: Vec<BucketTotal>,
    pub categories: Vec<BucketTotal>,
}

/// Change between two weekly reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekDelta {
    pub hours_change: f64,
    pub hours_change_percent: f64,
    pub projects: Vec<ProjectChange>,
}

/// Per-project hour change between two weeks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectChange {
    pub key: String,
    pub hours_change: f64,
}

/// Returns the Monday of the calendar week containing `date`.
///
/// Every day Monday through Sunday of the same week maps to the same
/// Monday.
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Builds the rollup for one day from the entries of that day.
///
/// Entries are expected to fall within `[date 00:00, date+1 00:00)`;
/// the function does not re-filter.
#[must_use]
pub fn daily_summary(date: NaiveDate, entries: &[Entry]) -> DailySummary {
    let mut total_tracked_seconds = 0_i64;
    let mut active_seconds = 0_i64;
    let mut idle_seconds = 0_i64;
    let mut projects: HashMap<String, BucketTotal> = HashMap::new();
    let mut categories: HashMap<String, BucketTotal> = HashMap::new();
    let mut apps: HashMap<String, BucketTotal> = HashMap::new();

    for entry in entries {
        // Open entries contribute no time yet; clamp anomalies so a bad
        // row cannot push an aggregate negative.
        let seconds = entry.duration_seconds.unwrap_or(0).max(0);
        total_tracked_seconds += seconds;

        if entry.is_idle {
            idle_seconds += seconds;
            continue;
        }

        active_seconds += seconds;
        bucket(&mut projects, entry.effective_project(), seconds);
        bucket(&mut apps, &entry.app_name, seconds);
        // Entries without a stored classification contribute no
        // category bucket entry.
        if let Some(category) = entry.category {
            bucket(&mut categories, category.as_str(), seconds);
        }
    }

    let mut top_apps = sorted_buckets(apps);
    top_apps.truncate(TOP_APPS);

    DailySummary {
        date,
        total_tracked_seconds,
        active_seconds,
        idle_seconds,
        projects: sorted_buckets(projects),
        categories: sorted_buckets(categories),
        top_apps,
    }
}

/// Assembles a weekly report from seven daily summaries.
///
/// `start` is normalized to the Monday of its week; `days` must hold
/// the summaries for that Monday through Sunday in order.
#[must_use]
pub fn weekly_report(start: NaiveDate, days: Vec<DailySummary>) -> WeeklyReport {
    let start = week_start(start);
    let end = start + Days::new(6);

    let total_seconds: i64 = days.iter().map(|d| d.active_seconds).sum();
    #[expect(clippy::cast_precision_loss, reason = "hour totals fit in f64")]
    let total_hours = total_seconds as f64 / 3600.0;

    let projects = merge_buckets(days.iter().flat_map(|d| &d.projects));
    let categories = merge_buckets(days.iter().flat_map(|d| &d.categories));

    WeeklyReport {
        week_start: start,
        week_end: end,
        total_hours,
        days,
        projects,
        categories,
    }
}

/// Computes the week-over-week delta between two reports.
///
/// `hours_change_percent` is 0 when the previous week has no hours.
/// A project absent from either week contributes 0 for that side.
#[must_use]
pub fn week_over_week(current: &WeeklyReport, previous: &WeeklyReport) -> WeekDelta {
    let hours_change = current.total_hours - previous.total_hours;
    let hours_change_percent = if previous.total_hours == 0.0 {
        0.0
    } else {
        hours_change / previous.total_hours * 100.0
    };

    let current_hours = project_hours(current);
    let previous_hours = project_hours(previous);

    let mut keys: Vec<&String> = current_hours.keys().chain(previous_hours.keys()).collect();
    keys.sort_unstable();
    keys.dedup();

    let mut projects: Vec<ProjectChange> = keys
        .into_iter()
        .map(|key| ProjectChange {
            key: key.clone(),
            hours_change: current_hours.get(key).copied().unwrap_or(0.0)
                - previous_hours.get(key).copied().unwrap_or(0.0),
        })
        .collect();
    projects.sort_by(|a, b| {
        b.hours_change
            .partial_cmp(&a.hours_change)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });

    WeekDelta {
        hours_change,
        hours_change_percent,
        projects,
    }
}

fn project_hours(report: &WeeklyReport) -> HashMap<String, f64> {
    report
        .projects
        .iter()
        .map(|b| {
            #[expect(clippy::cast_precision_loss, reason = "hour totals fit in f64")]
            let hours = b.seconds as f64 / 3600.0;
            (b.key.clone(), hours)
        })
        .collect()
}

fn bucket(buckets: &mut HashMap<String, BucketTotal>, key: &str, seconds: i64) {
    let total = buckets
        .entry(key.to_string())
        .or_insert_with(|| BucketTotal {
            key: key.to_string(),
            seconds: 0,
            entry_count: 0,
        });
    total.seconds += seconds;
    total.entry_count += 1;
}

fn merge_buckets<'a>(buckets: impl Iterator<Item = &'a BucketTotal>) -> Vec<BucketTotal> {
    let mut merged: HashMap<String, BucketTotal> = HashMap::new();
    for b in buckets {
        let total = merged
            .entry(b.key.clone())
            .or_insert_with(|| BucketTotal {
                key: b.key.clone(),
                seconds: 0,
                entry_count: 0,
            });
        total.seconds += b.seconds;
        total.entry_count += b.entry_count;
    }
    sorted_buckets(merged)
}

/// Buckets sorted descending by seconds, ties broken by key for
/// deterministic output.
fn sorted_buckets(buckets: HashMap<String, BucketTotal>) -> Vec<BucketTotal> {
    let mut sorted: Vec<BucketTotal> = buckets.into_values().collect();
    sorted.sort_by(|a, b| b.seconds.cmp(&a.seconds).then_with(|| a.key.cmp(&b.key)));
    sorted
}
