//! Storage layer for the tempo activity tracker.
//!
//! Provides persistence for activity entries using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`EntryStore`] type wraps a `rusqlite::Connection`, which is `Send` but
//! not `Sync`. A store instance can be moved between threads but cannot be
//! shared across threads without external synchronization; the tracker wraps
//! it in a `Mutex`. The database uses WAL journaling so a reader opening its
//! own connection is never blocked by an in-flight classification write.
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in ISO 8601 format with millisecond
//! precision (e.g., `2024-01-15T10:30:00.000Z`). This ensures:
//! - Lexicographic ordering matches chronological ordering
//! - Human-readable values in the database
//! - Timezone-aware (always UTC)
//!
//! The store is the source of truth for which entry is "open": the open
//! entry is the one with the latest timestamp and a NULL
//! `duration_seconds`. Closing it is an explicit store operation rather
//! than in-process state, so correctness holds across restarts.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use tempo_core::{Category, Entry};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse an entry timestamp.
    #[error("invalid timestamp for entry {entry_id}: {timestamp}")]
    TimestampParse {
        entry_id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Fields captured by the sampler for a new entry.
///
/// Classification fields and the duration are absent by design: they are
/// filled in later by [`EntryStore::patch_classification`] and
/// [`EntryStore::close_open_duration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub timestamp: DateTime<Utc>,
    pub app_name: String,
    pub window_title: String,
    pub screenshot_ref: Option<String>,
    pub is_idle: bool,
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct EntryStore {
    conn: Connection,
}

impl EntryStore {
    /// Opens a store at the given path, creating it if necessary.
    ///
    /// The schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Opens an in-memory store.
    ///
    /// Useful for testing. The store is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Initializes the schema. Idempotent.
    fn init(&self) -> Result<(), StoreError> {
        // WAL lets aggregation reads proceed while a classification
        // write is in flight. No-op on in-memory connections.
        let _: String = self
            .conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                app_name TEXT NOT NULL,
                window_title TEXT NOT NULL,
                screenshot_ref TEXT,
                task_description TEXT,
                project_id TEXT,
                manual_project_id TEXT,
                category TEXT,
                classifier_notes TEXT,
                analysis TEXT,
                duration_seconds INTEGER,
                is_idle INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_entries_timestamp ON entries(timestamp);
            CREATE INDEX IF NOT EXISTS idx_entries_project ON entries(project_id);
            ",
        )?;
        Ok(())
    }

    /// Inserts a new entry and returns its assigned id.
    ///
    /// Succeeds on an empty store; no prior entry is required.
    pub fn append(&mut self, entry: &NewEntry) -> Result<i64, StoreError> {
        self.conn.execute(
            "
            INSERT INTO entries (timestamp, app_name, window_title, screenshot_ref, is_idle)
            VALUES (?, ?, ?, ?, ?)
            ",
            params![
                format_timestamp(entry.timestamp),
                entry.app_name,
                entry.window_title,
                entry.screenshot_ref,
                entry.is_idle,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Back-fills the duration of the most recent entry.
    ///
    /// Finds the entry with the latest timestamp (ties broken by id),
    /// sets `duration_seconds = floor(now - timestamp)` and returns the
    /// entry id and the stored duration. No-op on an empty store.
    ///
    /// The write is an idempotent overwrite: calling this twice before
    /// the next append recomputes the same entry's duration rather than
    /// corrupting state. A negative delta (clock skew, out-of-order
    /// insert) is clamped to 0 and logged.
    pub fn close_open_duration(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<(i64, i64)>, StoreError> {
        let latest: Option<(i64, String)> = self
            .conn
            .query_row(
                "
                SELECT id, timestamp FROM entries
                ORDER BY timestamp DESC, id DESC
                LIMIT 1
                ",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, timestamp)) = latest else {
            return Ok(None);
        };

        let opened_at = parse_timestamp(&timestamp, id)?;
        let mut seconds = now.signed_duration_since(opened_at).num_seconds();
        if seconds < 0 {
            tracing::warn!(entry_id = id, seconds, "negative duration clamped to 0");
            seconds = 0;
        }

        self.conn.execute(
            "UPDATE entries SET duration_seconds = ? WHERE id = ?",
            params![seconds, id],
        )?;
        Ok(Some((id, seconds)))
    }

    /// Lists entries within a time range, optionally filtered by
    /// effective project id.
    ///
    /// The range is inclusive of `start` and exclusive of `end`. Entries
    /// are returned ascending by timestamp, ties broken by id.
    pub fn entries_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        project: Option<&str>,
    ) -> Result<Vec<Entry>, StoreError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let start = format_timestamp(start);
        let end = format_timestamp(end);

        let sql = format!(
            "
            SELECT {ENTRY_COLUMNS}
            FROM entries
            WHERE timestamp >= ? AND timestamp < ?
              {project_filter}
            ORDER BY timestamp ASC, id ASC
            ",
            project_filter = if project.is_some() {
                "AND COALESCE(manual_project_id, project_id, 'unassigned') = ?"
            } else {
                ""
            },
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let mut entries = Vec::new();
        let mut collect = |rows: &mut rusqlite::Rows<'_>| -> Result<(), StoreError> {
            while let Some(row) = rows.next()? {
                entries.push(entry_from_row(row)?);
            }
            Ok(())
        };
        match project {
            Some(project) => collect(&mut stmt.query(params![start, end, project])?)?,
            None => collect(&mut stmt.query(params![start, end])?)?,
        }
        Ok(entries)
    }

    /// Writes classifier output onto an existing entry.
    ///
    /// Updates only the classification fields, in a single statement so
    /// a concurrent range read never observes a torn row. Fails silently
    /// (returns `false`) if the id does not exist.
    pub fn patch_classification(
        &mut self,
        id: i64,
        task_description: &str,
        project_id: Option<&str>,
        category: Category,
        notes: Option<&str>,
        raw_analysis: &str,
    ) -> Result<bool, StoreError> {
        let updated = self.conn.execute(
            "
            UPDATE entries
            SET task_description = ?, project_id = ?, category = ?, classifier_notes = ?, analysis = ?
            WHERE id = ?
            ",
            params![
                task_description,
                project_id,
                category.as_str(),
                notes,
                raw_analysis,
                id,
            ],
        )?;
        if updated == 0 {
            tracing::debug!(entry_id = id, "classification patch for unknown entry");
        }
        Ok(updated > 0)
    }

    /// Sets or clears the user's manual project override.
    pub fn set_manual_project(
        &mut self,
        id: i64,
        project: Option<&str>,
    ) -> Result<bool, StoreError> {
        let updated = self.conn.execute(
            "UPDATE entries SET manual_project_id = ? WHERE id = ?",
            params![project, id],
        )?;
        Ok(updated > 0)
    }

    /// Deletes entries older than the horizon. Returns the number of
    /// entries removed.
    pub fn prune_older_than(&mut self, horizon: DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM entries WHERE timestamp < ?",
            params![format_timestamp(horizon)],
        )?;
        Ok(deleted)
    }

    /// Total number of stored entries.
    pub fn entry_count(&self) -> Result<i64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Non-idle entries that never received a classification, oldest
    /// first, capped at `limit`.
    ///
    /// Idle entries are excluded: they are never classified.
    pub fn unclassified_entries(&self, limit: usize) -> Result<Vec<Entry>, StoreError> {
        let sql = format!(
            "
            SELECT {ENTRY_COLUMNS}
            FROM entries
            WHERE task_description IS NULL AND is_idle = 0
            ORDER BY timestamp ASC, id ASC
            LIMIT ?
            ",
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = stmt.query(params![limit])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(entry_from_row(row)?);
        }
        Ok(entries)
    }

    /// The most recent entry, if any.
    pub fn latest_entry(&self) -> Result<Option<Entry>, StoreError> {
        let sql = format!(
            "
            SELECT {ENTRY_COLUMNS}
            FROM entries
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            ",
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(entry_from_row(row)?)),
            None => Ok(None),
        }
    }
}

const ENTRY_COLUMNS: &str = "id, timestamp, app_name, window_title, screenshot_ref, \
     task_description, project_id, manual_project_id, category, classifier_notes, \
     analysis, duration_seconds, is_idle";

fn entry_from_row(row: &rusqlite::Row<'_>) -> Result<Entry, StoreError> {
    let id: i64 = row.get(0)?;
    let timestamp: String = row.get(1)?;
    let category: Option<String> = row.get(8)?;
    Ok(Entry {
        id,
        timestamp: parse_timestamp(&timestamp, id)?,
        app_name: row.get(2)?,
        window_title: row.get(3)?,
        screenshot_ref: row.get(4)?,
        task_description: row.get(5)?,
        project_id: row.get(6)?,
        manual_project_id: row.get(7)?,
        // Tolerate rows written before a category existed or with a
        // value outside the closed set: they contribute no category.
        category: category.and_then(|c| c.parse().ok()),
        classifier_notes: row.get(9)?,
        analysis: row.get(10)?,
        duration_seconds: row.get(11)?,
        is_idle: row.get(12)?,
    })
}

fn parse_timestamp(timestamp: &str, entry_id: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| StoreError::TimestampParse {
            entry_id,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempo_core::daily_summary;

    fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 29, hour, minute, 0).unwrap()
    }

    fn new_entry(timestamp: DateTime<Utc>, app: &str, is_idle: bool) -> NewEntry {
        NewEntry {
            timestamp,
            app_name: app.to_string(),
            window_title: format!("{app} window"),
            screenshot_ref: None,
            is_idle,
        }
    }

    #[test]
    fn open_in_memory_store() {
        assert!(EntryStore::open_in_memory().is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let store = EntryStore::open_in_memory().expect("open in-memory store");
        let mut stmt = store
            .conn
            .prepare("PRAGMA table_info(entries)")
            .expect("prepare table_info");
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info")
            .map(|row| row.expect("table_info row"))
            .collect();
        assert_eq!(
            columns,
            vec![
                "id",
                "timestamp",
                "app_name",
                "window_title",
                "screenshot_ref",
                "task_description",
                "project_id",
                "manual_project_id",
                "category",
                "classifier_notes",
                "analysis",
                "duration_seconds",
                "is_idle",
            ]
        );
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let first = store.append(&new_entry(ts(9, 0), "Zed", false)).unwrap();
        let second = store.append(&new_entry(ts(9, 30), "Slack", false)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn close_open_duration_on_empty_store_is_noop() {
        let mut store = EntryStore::open_in_memory().unwrap();
        assert_eq!(store.close_open_duration(ts(10, 0)).unwrap(), None);
    }

    #[test]
    fn durations_backfill_in_order() {
        // For strictly increasing timestamps t1 < ... < tN, after each
        // append closes the previous entry, entry_i has the delta to
        // entry_{i+1} and the last entry stays open.
        let mut store = EntryStore::open_in_memory().unwrap();
        let times = [ts(9, 0), ts(9, 5), ts(9, 17), ts(10, 0)];
        for (i, &t) in times.iter().enumerate() {
            if i > 0 {
                store.close_open_duration(t).unwrap();
            }
            store.append(&new_entry(t, "Zed", false)).unwrap();
        }

        let entries = store
            .entries_in_range(ts(0, 0), ts(23, 59), None)
            .unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].duration_seconds, Some(300));
        assert_eq!(entries[1].duration_seconds, Some(720));
        assert_eq!(entries[2].duration_seconds, Some(2580));
        assert_eq!(entries[3].duration_seconds, None);
    }

    #[test]
    fn close_open_duration_overwrites_idempotently() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let id = store.append(&new_entry(ts(9, 0), "Zed", false)).unwrap();

        assert_eq!(
            store.close_open_duration(ts(9, 30)).unwrap(),
            Some((id, 1800))
        );
        // Calling again recomputes rather than corrupting.
        assert_eq!(
            store.close_open_duration(ts(10, 0)).unwrap(),
            Some((id, 3600))
        );
    }

    #[test]
    fn negative_delta_is_clamped_to_zero() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let id = store.append(&new_entry(ts(10, 0), "Zed", false)).unwrap();
        // Clock skew: "now" is before the open entry's timestamp.
        assert_eq!(store.close_open_duration(ts(9, 0)).unwrap(), Some((id, 0)));
    }

    #[test]
    fn range_is_inclusive_start_exclusive_end() {
        let mut store = EntryStore::open_in_memory().unwrap();
        store.append(&new_entry(ts(9, 0), "a", false)).unwrap();
        store.append(&new_entry(ts(10, 0), "b", false)).unwrap();
        store.append(&new_entry(ts(11, 0), "c", false)).unwrap();

        let entries = store.entries_in_range(ts(9, 0), ts(11, 0), None).unwrap();
        let apps: Vec<&str> = entries.iter().map(|e| e.app_name.as_str()).collect();
        assert_eq!(apps, vec!["a", "b"]);

        // Inverted range returns nothing.
        assert!(store.entries_in_range(ts(11, 0), ts(9, 0), None).unwrap().is_empty());
    }

    #[test]
    fn range_filters_by_effective_project() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let suggested = store.append(&new_entry(ts(9, 0), "a", false)).unwrap();
        let overridden = store.append(&new_entry(ts(10, 0), "b", false)).unwrap();
        store.append(&new_entry(ts(11, 0), "c", false)).unwrap();

        store
            .patch_classification(suggested, "work", Some("alpha"), Category::Coding, None, "{}")
            .unwrap();
        store
            .patch_classification(overridden, "work", Some("alpha"), Category::Coding, None, "{}")
            .unwrap();
        store.set_manual_project(overridden, Some("beta")).unwrap();

        let alpha = store
            .entries_in_range(ts(0, 0), ts(23, 59), Some("alpha"))
            .unwrap();
        assert_eq!(alpha.len(), 1);
        assert_eq!(alpha[0].id, suggested);

        // The manual override wins over the classifier suggestion.
        let beta = store
            .entries_in_range(ts(0, 0), ts(23, 59), Some("beta"))
            .unwrap();
        assert_eq!(beta.len(), 1);
        assert_eq!(beta[0].id, overridden);

        let unassigned = store
            .entries_in_range(ts(0, 0), ts(23, 59), Some("unassigned"))
            .unwrap();
        assert_eq!(unassigned.len(), 1);
        assert_eq!(unassigned[0].app_name, "c");
    }

    #[test]
    fn patch_classification_unknown_id_is_silent() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let patched = store
            .patch_classification(42, "work", None, Category::Other, None, "{}")
            .unwrap();
        assert!(!patched);
    }

    #[test]
    fn patch_classification_sets_fields() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let id = store.append(&new_entry(ts(9, 0), "Zed", false)).unwrap();
        store
            .patch_classification(
                id,
                "Editing the parser",
                Some("tempo"),
                Category::Coding,
                Some("high confidence"),
                r#"{"category":"coding"}"#,
            )
            .unwrap();

        let entry = store.latest_entry().unwrap().unwrap();
        assert_eq!(entry.task_description.as_deref(), Some("Editing the parser"));
        assert_eq!(entry.project_id.as_deref(), Some("tempo"));
        assert_eq!(entry.category, Some(Category::Coding));
        assert_eq!(entry.classifier_notes.as_deref(), Some("high confidence"));
        assert_eq!(entry.analysis.as_deref(), Some(r#"{"category":"coding"}"#));
        // Immutable capture fields untouched.
        assert_eq!(entry.app_name, "Zed");
        assert!(!entry.is_idle);
    }

    #[test]
    fn unclassified_entries_skip_idle_and_classified() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let classified = store.append(&new_entry(ts(9, 0), "a", false)).unwrap();
        store.append(&new_entry(ts(10, 0), "idle", true)).unwrap();
        let pending_old = store.append(&new_entry(ts(11, 0), "b", false)).unwrap();
        let pending_new = store.append(&new_entry(ts(12, 0), "c", false)).unwrap();

        store
            .patch_classification(classified, "work", None, Category::Coding, None, "{}")
            .unwrap();

        let pending = store.unclassified_entries(10).unwrap();
        let ids: Vec<i64> = pending.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![pending_old, pending_new]);

        // Oldest first, so the limit drops the newest.
        let limited = store.unclassified_entries(1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, pending_old);
    }

    #[test]
    fn prune_deletes_old_entries_only() {
        let mut store = EntryStore::open_in_memory().unwrap();
        store.append(&new_entry(ts(9, 0), "old", false)).unwrap();
        store.append(&new_entry(ts(12, 0), "new", false)).unwrap();

        let deleted = store.prune_older_than(ts(10, 0)).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.entry_count().unwrap(), 1);
        assert_eq!(store.latest_entry().unwrap().unwrap().app_name, "new");
    }

    #[test]
    fn persists_across_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("tempo.db");
        {
            let mut store = EntryStore::open(&path).unwrap();
            store.append(&new_entry(ts(9, 0), "Zed", false)).unwrap();
        }
        // The open entry survives a restart; the store, not process
        // memory, decides which entry is open.
        let mut store = EntryStore::open(&path).unwrap();
        let closed = store.close_open_duration(ts(9, 30)).unwrap();
        assert_eq!(closed.map(|(_, secs)| secs), Some(1800));
    }

    #[test]
    fn capture_timeline_end_to_end() {
        // Entries at 09:00 and 09:30, then a final close at 10:00:
        // both end up with 1800s and the day reports 3600s active.
        let mut store = EntryStore::open_in_memory().unwrap();

        store.append(&new_entry(ts(9, 0), "App A", false)).unwrap();
        store.close_open_duration(ts(9, 30)).unwrap();
        store.append(&new_entry(ts(9, 30), "App B", false)).unwrap();
        store.close_open_duration(ts(10, 0)).unwrap();

        let entries = store.entries_in_range(ts(0, 0), ts(23, 59), None).unwrap();
        assert_eq!(entries[0].duration_seconds, Some(1800));
        assert_eq!(entries[1].duration_seconds, Some(1800));

        let summary = daily_summary(ts(9, 0).date_naive(), &entries);
        assert_eq!(summary.active_seconds, 3600);
        assert_eq!(summary.idle_seconds, 0);
    }
}
