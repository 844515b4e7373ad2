//! Backfill classification for entries that never got an analysis.
//!
//! The tracking loop abandons in-flight classification on shutdown, so
//! a crash or Ctrl-C can leave captured entries without an analysis.
//! This command sweeps them through the classifier in batches.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

use tempo_core::AppCategory;
use tempo_db::EntryStore;
use tempo_llm::{ClassifyContext, TaskAnalysis, fallback_analysis};

use crate::Config;

pub async fn run<W: Write>(
    writer: &mut W,
    store: &mut EntryStore,
    config: &Config,
    limit: usize,
) -> Result<()> {
    let pending = store.unclassified_entries(limit)?;
    if pending.is_empty() {
        writeln!(writer, "No unclassified entries.")?;
        return Ok(());
    }
    tracing::info!(count = pending.len(), "backfilling classifications");

    let projects = config.project_refs();
    let contexts: Vec<(i64, ClassifyContext)> = pending
        .iter()
        .map(|entry| {
            let ctx = ClassifyContext {
                app_name: entry.app_name.clone(),
                window_title: entry.window_title.clone(),
                app_category: AppCategory::guess(&entry.app_name),
                projects: projects.clone(),
                screenshot_path: if config.classifier.attach_screenshots {
                    entry.screenshot_ref.clone().map(PathBuf::from)
                } else {
                    None
                },
            };
            (entry.id, ctx)
        })
        .collect();

    let classifier = config.classifier().context("failed to build classifier")?;
    let results: HashMap<i64, TaskAnalysis> = match classifier {
        Some(classifier) => classifier.classify_batch(contexts).await,
        None => contexts
            .iter()
            .map(|(id, ctx)| (*id, fallback_analysis(ctx)))
            .collect(),
    };

    let mut patched = 0_usize;
    for (id, analysis) in &results {
        let raw = serde_json::to_string(analysis).context("failed to serialize analysis")?;
        let applied = store.patch_classification(
            *id,
            &analysis.task_description,
            analysis.suggested_project_id.as_deref(),
            analysis.category,
            analysis.notes.as_deref(),
            &raw,
        )?;
        if applied {
            patched += 1;
        }
    }

    writeln!(writer, "Classified {patched} of {} entries", pending.len())?;
    Ok(())
}
