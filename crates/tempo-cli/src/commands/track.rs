//! The capture loop: sampler and idle monitor on shared timers.
//!
//! The sampler owns the capture cycle (gates, duration back-fill,
//! screenshot, insert, classification dispatch). The idle monitor runs
//! on its own faster timer and records idle periods as entries of
//! their own, so the day's idle time is accounted for.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use tempo_core::{
    AppCategory, IdleProbe, IdleState, IdleTracker, ScreenshotProbe, WindowInfo, WindowProbe,
    poll_period,
};
use tempo_db::{EntryStore, NewEntry, StoreError};
use tempo_llm::{Classifier, ClassifyContext, ProjectRef, TaskAnalysis, fallback_analysis};

use crate::Config;
use crate::probes::SystemProbes;

/// Store handle shared between the loop and classification tasks.
pub type SharedStore = Arc<Mutex<EntryStore>>;

/// App name recorded for idle-period entries.
const IDLE_APP_NAME: &str = "Idle";

/// Capture behavior extracted from the config.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub capture_interval: Duration,
    pub idle_threshold_seconds: u64,
    /// Lowercased substrings; a matching app name skips the cycle.
    pub excluded_apps: Vec<String>,
    pub screenshots_dir: PathBuf,
    pub attach_screenshots: bool,
    pub projects: Vec<ProjectRef>,
}

impl TrackerSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            capture_interval: Duration::from_secs(config.capture_interval_minutes * 60),
            idle_threshold_seconds: config.idle_threshold_seconds,
            excluded_apps: config
                .excluded_apps
                .iter()
                .map(|app| app.to_lowercase())
                .collect(),
            screenshots_dir: config.screenshots_dir.clone(),
            attach_screenshots: config.classifier.attach_screenshots,
            projects: config.project_refs(),
        }
    }
}

/// Outcome of one capture cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// An entry was inserted with this id.
    Captured(i64),
    /// The user is idle; nothing was captured or back-filled.
    SkippedIdle,
    /// No active window was available.
    SkippedNoWindow,
    /// The active app matched the exclusion list.
    SkippedExcluded,
}

/// One capture cycle driver over a set of probes.
pub struct Sampler<W, I, S> {
    store: SharedStore,
    classifier: Option<Classifier>,
    settings: TrackerSettings,
    window: W,
    idle: I,
    screenshot: S,
}

impl<W, I, S> Sampler<W, I, S>
where
    W: WindowProbe,
    I: IdleProbe,
    S: ScreenshotProbe,
{
    pub fn new(
        store: SharedStore,
        classifier: Option<Classifier>,
        settings: TrackerSettings,
        window: W,
        idle: I,
        screenshot: S,
    ) -> Self {
        Self {
            store,
            classifier,
            settings,
            window,
            idle,
            screenshot,
        }
    }

    /// Runs one capture cycle at the current time.
    pub async fn cycle(&self) -> Result<CycleOutcome, StoreError> {
        self.cycle_at(Utc::now()).await
    }

    /// Runs one capture cycle at an explicit timestamp.
    ///
    /// Gates short-circuit in order: idle state, window presence,
    /// exclusion list. A skipped cycle touches nothing, including the
    /// open entry's duration.
    pub async fn cycle_at(&self, now: DateTime<Utc>) -> Result<CycleOutcome, StoreError> {
        let idle_seconds = self.idle.idle_seconds();
        if idle_seconds >= self.settings.idle_threshold_seconds {
            tracing::debug!(idle_seconds, "user idle, skipping capture");
            return Ok(CycleOutcome::SkippedIdle);
        }

        let Some(window) = self.window.active_window() else {
            tracing::debug!("no active window, skipping capture");
            return Ok(CycleOutcome::SkippedNoWindow);
        };

        if self.is_excluded(&window.app_name) {
            tracing::debug!(app = %window.app_name, "app excluded, skipping capture");
            return Ok(CycleOutcome::SkippedExcluded);
        }

        {
            let mut store = self.store.lock().await;
            store.close_open_duration(now)?;
        }

        let screenshot_ref = self.capture_screenshot();

        let id = {
            let mut store = self.store.lock().await;
            store.append(&NewEntry {
                timestamp: now,
                app_name: window.app_name.clone(),
                window_title: window.title.clone(),
                screenshot_ref: screenshot_ref.clone(),
                is_idle: false,
            })?
        };
        tracing::info!(entry_id = id, app = %window.app_name, "captured activity sample");

        self.dispatch_classification(id, &window, screenshot_ref);
        Ok(CycleOutcome::Captured(id))
    }

    fn is_excluded(&self, app_name: &str) -> bool {
        let app = app_name.to_lowercase();
        self.settings
            .excluded_apps
            .iter()
            .any(|excluded| app.contains(excluded))
    }

    /// Captures a screenshot into the screenshots directory, returning
    /// the stored path. Any failure degrades to `None`; a capture
    /// without a screenshot is better than no capture.
    fn capture_screenshot(&self) -> Option<String> {
        if let Err(err) = std::fs::create_dir_all(&self.settings.screenshots_dir) {
            tracing::warn!(error = %err, "cannot create screenshots directory");
            return None;
        }
        let dest = self
            .settings
            .screenshots_dir
            .join(format!("{}.png", uuid::Uuid::new_v4()));
        match self.screenshot.capture(&dest) {
            Ok(()) => Some(dest.display().to_string()),
            Err(err) => {
                tracing::warn!(error = %err, "screenshot capture failed");
                None
            }
        }
    }

    /// Kicks off classification for a fresh entry. Fire-and-forget:
    /// the result is patched onto the entry whenever it arrives, and
    /// the next cycle is never delayed by it.
    fn dispatch_classification(&self, id: i64, window: &WindowInfo, screenshot_ref: Option<String>) {
        let ctx = ClassifyContext {
            app_name: window.app_name.clone(),
            window_title: window.title.clone(),
            app_category: AppCategory::guess(&window.app_name),
            projects: self.settings.projects.clone(),
            screenshot_path: if self.settings.attach_screenshots {
                screenshot_ref.map(PathBuf::from)
            } else {
                None
            },
        };

        let store = Arc::clone(&self.store);
        let classifier = self.classifier.clone();
        tokio::spawn(async move {
            let analysis = match classifier {
                Some(classifier) => classifier.classify(&ctx).await,
                None => fallback_analysis(&ctx),
            };
            apply_analysis(&store, id, &analysis).await;
        });
    }
}

/// Writes a classification result back onto its entry.
async fn apply_analysis(store: &SharedStore, id: i64, analysis: &TaskAnalysis) {
    let raw = match serde_json::to_string(analysis) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(entry_id = id, error = %err, "cannot serialize analysis");
            return;
        }
    };
    let mut store = store.lock().await;
    match store.patch_classification(
        id,
        &analysis.task_description,
        analysis.suggested_project_id.as_deref(),
        analysis.category,
        analysis.notes.as_deref(),
        &raw,
    ) {
        Ok(true) => tracing::debug!(entry_id = id, category = %analysis.category, "entry classified"),
        Ok(false) => {}
        Err(err) => tracing::warn!(entry_id = id, error = %err, "classification patch failed"),
    }
}

/// Idle monitor: polls the idle probe on its own timer and fires a
/// callback once per state transition.
#[derive(Default)]
pub struct IdleMonitor {
    handle: Option<JoinHandle<()>>,
}

impl IdleMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the monitor loop. No-op when already running.
    ///
    /// The first check happens immediately; after that the probe is
    /// polled every `poll_period(threshold_seconds)`.
    pub fn start<I, F>(&mut self, probe: I, threshold_seconds: u64, mut on_transition: F)
    where
        I: IdleProbe + Send + 'static,
        F: FnMut(IdleState, u64) + Send + 'static,
    {
        if self.handle.is_some() {
            return;
        }
        let period = poll_period(threshold_seconds).max(Duration::from_secs(1));
        self.handle = Some(tokio::spawn(async move {
            let mut tracker = IdleTracker::new();
            let mut ticks = tokio::time::interval(period);
            loop {
                ticks.tick().await;
                let idle_seconds = probe.idle_seconds();
                if let Some(state) = tracker.observe(idle_seconds, threshold_seconds) {
                    tracing::info!(?state, idle_seconds, "idle state changed");
                    on_transition(state, idle_seconds);
                }
            }
        }));
    }

    /// Stops the monitor loop. No-op when not running.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Records an idle transition in the store: the open entry is closed
/// either way, and the start of an idle period gets an entry of its
/// own so idle time shows up in the day's accounting.
async fn record_idle_transition(store: &SharedStore, state: IdleState, now: DateTime<Utc>) {
    let mut store = store.lock().await;
    if let Err(err) = store.close_open_duration(now) {
        tracing::warn!(error = %err, "duration back-fill on idle transition failed");
        return;
    }
    if state.is_idle() {
        let idle_entry = NewEntry {
            timestamp: now,
            app_name: IDLE_APP_NAME.to_string(),
            window_title: String::new(),
            screenshot_ref: None,
            is_idle: true,
        };
        if let Err(err) = store.append(&idle_entry) {
            tracing::warn!(error = %err, "cannot record idle entry");
        }
    }
}

/// Runs the capture loop until Ctrl-C.
pub async fn run(config: &Config) -> Result<()> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    let store: SharedStore = Arc::new(Mutex::new(
        EntryStore::open(&config.database_path).context("failed to open database")?,
    ));
    let classifier = config.classifier().context("failed to build classifier")?;

    let settings = TrackerSettings::from_config(config);
    let sampler = Sampler::new(
        Arc::clone(&store),
        classifier,
        settings.clone(),
        SystemProbes::new(),
        SystemProbes::new(),
        SystemProbes::new(),
    );

    let mut monitor = IdleMonitor::new();
    {
        let store = Arc::clone(&store);
        monitor.start(
            SystemProbes::new(),
            settings.idle_threshold_seconds,
            move |state, _idle_seconds| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    record_idle_transition(&store, state, Utc::now()).await;
                });
            },
        );
    }

    tracing::info!(
        interval_minutes = settings.capture_interval.as_secs() / 60,
        database = %config.database_path.display(),
        "tracking started, press Ctrl-C to stop"
    );

    let mut ticks = tokio::time::interval(settings.capture_interval.max(Duration::from_secs(1)));
    loop {
        tokio::select! {
            _ = ticks.tick() => {
                // A failed cycle must not kill the scheduler.
                match sampler.cycle().await {
                    Ok(outcome) => tracing::debug!(?outcome, "capture cycle finished"),
                    Err(err) => tracing::error!(error = %err, "capture cycle failed"),
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for shutdown signal")?;
                break;
            }
        }
    }

    // Stop the timers before releasing the store; in-flight
    // classification tasks are abandoned on shutdown.
    monitor.stop();
    tracing::info!("tracking stopped");
    Ok(())
}
