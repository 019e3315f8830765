// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use anyhow::Context;
use notify::event::{EventKind, ModifyKind};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Change to the watched target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEvent {
    Modified,
    Deleted,
}

/// Keeps the `notify` subscription alive; dropping it unsubscribes.
pub struct TargetWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl TargetWatcher {
    /// Watch the parent directory of `target` and forward events for the
    /// target itself onto `tx`.
    ///
    /// Sends never block the notifier thread. A full channel already holds
    /// a wake-up, and the consumer re-checks the target after every wake.
    pub fn start(target: &Path, tx: mpsc::Sender<FileEvent>) -> anyhow::Result<Self> {
        let target = std::fs::canonicalize(target)
            .with_context(|| format!("resolving {}", target.display()))?;
        let parent = target.parent().unwrap_or(&target).to_owned();

        let filter = target.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if let Some(file_event) = classify(&event, &filter) {
                        let _ = tx.try_send(file_event);
                    }
                }
                Err(e) => tracing::debug!("notify error: {e}"),
            }
        })
        .context("creating file watcher")?;
        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("watching {}", parent.display()))?;

        tracing::debug!(path = %target.display(), "watching target file");
        Ok(Self { _watcher: watcher })
    }
}

/// Translate a raw notification into a [`FileEvent`] for `target`.
///
/// Events for other entries in the directory, and access events, are ignored.
pub fn classify(event: &notify::Event, target: &Path) -> Option<FileEvent> {
    if !event.paths.iter().any(|p| p == target) {
        return None;
    }
    match event.kind {
        EventKind::Remove(_) => Some(FileEvent::Deleted),
        // Renamed away (log rotation) or renamed into place.
        EventKind::Modify(ModifyKind::Name(_)) => {
            Some(if target.exists() { FileEvent::Modified } else { FileEvent::Deleted })
        }
        EventKind::Modify(_) | EventKind::Create(_) => Some(FileEvent::Modified),
        _ => None,
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
