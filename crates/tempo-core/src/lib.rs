//! Core domain logic for the tempo activity tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Entries: point-in-time activity samples and their lifecycle
//! - Categories: the closed activity category set and app heuristics
//! - Idle detection: the two-state hysteresis machine
//! - Aggregation: daily and weekly rollups over entry timelines

pub mod category;
pub mod entry;
pub mod idle;
pub mod probes;
pub mod summary;
pub mod types;

pub use category::{AppCategory, Category, UnknownCategory};
pub use entry::{Entry, UNASSIGNED_PROJECT, format_duration};
pub use idle::{IdleState, IdleTracker, poll_period};
pub use probes::{IdleProbe, ScreenshotProbe, WindowInfo, WindowProbe};
pub use summary::{
    BucketTotal, DailySummary, ProjectChange, WeekDelta, WeeklyReport, daily_summary,
    week_over_week, week_start, weekly_report,
};
pub use types::{Confidence, ValidationError};
