//! Persisted run state and its statistics display.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::fs_abstraction::FileSystem;
use crate::pipeline::{CategoryCounts, RunSummary, SourceReport};
use crate::utils::{format_count, format_count_with_separator, truncate};

/// Persistent state of the last run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RunState {
    pub last_run: Option<DateTime<Utc>>,
    pub sources: Vec<SourceReport>,
    pub categories: CategoryCounts,
    pub files_changed: usize,
    pub files_uploaded: usize,
}

impl RunState {
    /// Load state from file. A missing file yields the empty state.
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        if !fs.exists(path) {
            return Ok(Self::default());
        }
        let content = fs
            .read_to_string(path)
            .with_context(|| format!("Failed to read state file: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {:?}", path))
    }

    /// Save state to file atomically
    pub fn save(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs.create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs.write_atomic(path, content.as_bytes())
            .with_context(|| format!("Failed to write state file: {:?}", path))?;
        Ok(())
    }

    /// Snapshot a finished run
    pub fn from_summary(summary: &RunSummary, at: DateTime<Utc>) -> Self {
        Self {
            last_run: Some(at),
            sources: summary.sources.clone(),
            categories: summary.categories.counts(),
            files_changed: summary.changed_files().count(),
            files_uploaded: summary
                .uploads
                .map_or(0, |u| u.created + u.updated),
        }
    }

    pub fn total_descriptors(&self) -> usize {
        self.sources.iter().map(|s| s.descriptors).sum()
    }
}

/// Render the state as the `stats` report
pub fn render_stats(state: &RunState, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let rule = "══════════════════════════════════════════════════════════════════";

    out.push('\n');
    out.push_str(rule);
    out.push_str("\n VPNSIEVE RUN STATISTICS\n");
    out.push_str(rule);
    out.push_str("\n\n");

    if !state.sources.is_empty() {
        out.push_str(" SOURCE                                   KIND      DESCRIPTORS\n");
        out.push_str(" ──────────────────────────────────────── ───────── ───────────\n");
        for source in &state.sources {
            let count = match &source.error {
                Some(_) => "failed".to_string(),
                None => format_count(source.descriptors),
            };
            out.push_str(&format!(
                " {:<40} {:<9} {:>11}\n",
                truncate(&source.url, 40),
                source.kind.to_string(),
                count,
            ));
        }
        out.push_str(" ──────────────────────────────────────── ───────── ───────────\n");
        out.push_str(&format!(
            " {:<40} {:<9} {:>11}\n\n",
            "TOTAL",
            "",
            format_count(state.total_descriptors())
        ));
    }

    let c = &state.categories;
    out.push_str(" CATEGORIES\n");
    out.push_str(" ────────────────────────────────────────────────────────────────\n");
    out.push_str(&format!(
        " default:          {} ({} secure)\n",
        format_count_with_separator(c.default),
        format_count_with_separator(c.default_secure)
    ));
    out.push_str(&format!(
        " bypass:           {}\n",
        format_count_with_separator(c.bypass)
    ));
    out.push_str(&format!(
        " bypass-unsecure:  {}\n",
        format_count_with_separator(c.bypass_insecure)
    ));
    for (scheme, count) in &c.protocols {
        out.push_str(&format!(
            " {:<17} {} ({} secure)\n",
            format!("{}:", scheme),
            format_count_with_separator(count.all),
            format_count_with_separator(count.secure)
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        " Files changed: {}, uploaded: {}\n",
        state.files_changed, state.files_uploaded
    ));

    match state.last_run {
        Some(last_run) => {
            let local: DateTime<Local> = last_run.into();
            out.push_str(&format!(
                " Last run: {} ({})\n",
                local.format("%Y-%m-%d %H:%M:%S"),
                format_duration_ago(last_run, now)
            ));
        }
        None => out.push_str(" Last run: never\n"),
    }

    out.push_str(rule);
    out.push('\n');
    out
}

/// Load and print the persisted state
pub fn display_stats(fs: &dyn FileSystem, state_file: &Path) -> Result<()> {
    let state = RunState::load(fs, state_file)?;
    println!("{}", render_stats(&state, Utc::now()));
    Ok(())
}

/// Format duration since a timestamp
fn format_duration_ago(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(dt).num_seconds();
    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86400)
    }
}
