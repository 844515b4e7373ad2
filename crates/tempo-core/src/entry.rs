//! Activity entries: one sample of observed activity.
//!
//! Entries are append-only with two exceptions: `duration_seconds` is
//! back-filled once when the next sample arrives, and the
//! classification fields are patched once the classifier responds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::Category;

/// Effective project id for entries with no assignment.
pub const UNASSIGNED_PROJECT: &str = "unassigned";

/// One sample of observed activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Store-assigned identifier, monotonically increasing.
    pub id: i64,
    /// Instant the sample was taken. Entries are ordered by this field,
    /// ties broken by id.
    pub timestamp: DateTime<Utc>,
    pub app_name: String,
    pub window_title: String,
    /// Opaque reference to a stored screenshot, if capture succeeded.
    pub screenshot_ref: Option<String>,
    /// Classifier output, absent until classification completes.
    pub task_description: Option<String>,
    pub project_id: Option<String>,
    /// User-set override; always takes precedence over `project_id`.
    pub manual_project_id: Option<String>,
    pub category: Option<Category>,
    pub classifier_notes: Option<String>,
    /// Raw classifier payload as returned by the gateway.
    pub analysis: Option<String>,
    /// Elapsed seconds until the next sample. Null while this is the
    /// most recent entry.
    pub duration_seconds: Option<i64>,
    pub is_idle: bool,
}

impl Entry {
    /// Effective project: manual override, then classifier suggestion,
    /// then "unassigned".
    #[must_use]
    pub fn effective_project(&self) -> &str {
        self.manual_project_id
            .as_deref()
            .or(self.project_id.as_deref())
            .unwrap_or(UNASSIGNED_PROJECT)
    }

    /// Duration rendered for exports, or "-" while the entry is open.
    #[must_use]
    pub fn duration_formatted(&self) -> String {
        self.duration_seconds
            .map_or_else(|| "-".to_string(), format_duration)
    }
}

/// Formats seconds as a duration string.
///
/// Returns "Xh Ym" if >= 1 hour, "Xm" if < 1 hour.
/// Negative durations are treated as 0m.
#[must_use]
pub fn format_duration(seconds: i64) -> String {
    if seconds < 0 {
        return "0m".to_string();
    }
    let total_minutes = seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
