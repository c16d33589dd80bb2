//! Run-scoped log buffer.
//!
//! Messages are forwarded to `tracing` as they arrive and also kept, grouped
//! by a key (a source locator, an artifact path, or [`GENERAL`]), so the run
//! can print an ordered report once every worker has finished.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::utils::{truncate, MAX_ERROR_LEN};

/// Group for messages not tied to a source or file. Always rendered last.
pub const GENERAL: &str = "general";

/// Grouped, lock-protected message buffer plus the set of updated remote files.
#[derive(Debug, Default)]
pub struct RunLog {
    groups: Mutex<BTreeMap<String, Vec<String>>>,
    updated: Mutex<BTreeSet<String>>,
}

/// The buffer is append-only, so a poisoned lock still holds usable data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an informational message under `group`.
    pub fn info(&self, group: &str, message: impl Into<String>) {
        let message = message.into();
        info!("[{}] {}", group, message);
        self.push(group, message);
    }

    /// Record a warning under `group`. Long messages are truncated.
    pub fn warn(&self, group: &str, message: impl AsRef<str>) {
        let message = truncate(message.as_ref(), MAX_ERROR_LEN);
        warn!("[{}] {}", group, message);
        self.push(group, message);
    }

    fn push(&self, group: &str, message: String) {
        lock(&self.groups)
            .entry(group.to_string())
            .or_default()
            .push(message);
    }

    /// Remember that a remote file was created or updated during this run.
    pub fn mark_updated(&self, remote_path: &str) {
        lock(&self.updated).insert(remote_path.to_string());
    }

    /// Remote files created or updated so far, sorted.
    pub fn updated_files(&self) -> Vec<String> {
        lock(&self.updated).iter().cloned().collect()
    }

    /// Number of messages recorded under `group`.
    pub fn count(&self, group: &str) -> usize {
        lock(&self.groups).get(group).map_or(0, Vec::len)
    }

    /// Render every group as a block, keyed groups in order and [`GENERAL`] last.
    ///
    /// The buffer is drained, so a second flush only shows new messages.
    pub fn flush(&self) -> String {
        let mut groups = std::mem::take(&mut *lock(&self.groups));
        let general = groups.remove(GENERAL);

        let mut out = String::new();
        let blocks = groups
            .into_iter()
            .chain(general.map(|messages| (GENERAL.to_string(), messages)));
        for (group, messages) in blocks {
            out.push_str(&format!("----- {} -----\n", group));
            for message in messages {
                out.push_str(&message);
                out.push('\n');
            }
        }
        out
    }
}
