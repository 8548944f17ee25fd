pub mod event;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

use crate::config::{CONFIG_FILE, Settings};
use crate::source::{ChangeEvent, ChangeKind, SourceFile};
use crate::walker::TemplateFilter;

use event::WatchEvent;

/// Debounce window for filesystem events.
const DEBOUNCE: Duration = Duration::from_millis(75);

/// Handle to a running watcher. Keeps the debouncer alive (dropping stops watching).
pub struct WatcherHandle {
    /// Keep alive: dropping the debouncer stops the OS watcher.
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    /// The bridge task forwarding events from std channel to tokio channel.
    _bridge_task: JoinHandle<()>,
}

/// Which paths the watcher reports, and how.
pub struct WatchScope {
    roots: Vec<(PathBuf, Gitignore)>,
    destination: PathBuf,
    config_file: PathBuf,
    filter: TemplateFilter,
}

impl WatchScope {
    pub fn new(settings: &Settings, filter: TemplateFilter) -> Self {
        Self {
            roots: settings
                .source_dirs
                .iter()
                .map(|root| (root.clone(), build_gitignore_matcher(root)))
                .collect(),
            destination: settings.destination_dir.clone(),
            config_file: settings.project_root.join(CONFIG_FILE),
            filter,
        }
    }

    /// Classify a filesystem event path into a WatchEvent, or None if it should be ignored.
    ///
    /// Filtering order:
    /// 1. The configuration file → ConfigChanged
    /// 2. Generated sources and paths outside every source root are dropped
    /// 3. .gitignore rules of the owning source root (same rules as the walker)
    /// 4. Directories → rescan (a moved-in directory is reported without its contents)
    /// 5. Include/exclude globs; a vanished non-template path asks for a rescan
    /// 6. File existence check (Modified vs Removed)
    pub fn classify(&self, path: &Path) -> Option<WatchEvent> {
        if path == self.config_file {
            return Some(WatchEvent::ConfigChanged);
        }
        if path.starts_with(&self.destination) {
            return None;
        }
        let (root, gitignore) = self.roots.iter().find(|(root, _)| path.starts_with(root))?;

        let is_dir = path.is_dir();
        if gitignore.matched_path_or_any_parents(path, is_dir).is_ignore() {
            return None;
        }

        if is_dir {
            return Some(WatchEvent::Rescan);
        }
        let file = SourceFile::from_path(root, path).ok()?;

        let exists = path.exists();
        if !self.filter.matches(file.relative_path()) {
            return (!exists).then_some(WatchEvent::Rescan);
        }

        // notify-debouncer-mini doesn't distinguish creation from modification; both compile.
        let kind = if exists {
            ChangeKind::Modified
        } else {
            ChangeKind::Removed
        };
        Some(WatchEvent::Changed(ChangeEvent::new(file, kind)))
    }
}

/// Build a Gitignore matcher from a source root's .gitignore file.
/// If no .gitignore exists, returns an empty matcher that matches nothing.
fn build_gitignore_matcher(root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    let gitignore_path = root.join(".gitignore");
    if gitignore_path.exists()
        && let Some(err) = builder.add(&gitignore_path)
    {
        tracing::warn!(path = %gitignore_path.display(), error = %err, "failed to parse .gitignore");
    }
    builder.build().unwrap_or_else(|_| Gitignore::empty())
}

/// Start a debounced watcher on every existing source root and on the project root's
/// configuration file.
///
/// Returns a `WatcherHandle` (must be kept alive) and a tokio mpsc receiver yielding one
/// `Vec<WatchEvent>` per debounced batch. Must be called from within a tokio runtime.
pub fn start_watcher(
    scope: WatchScope,
) -> anyhow::Result<(WatcherHandle, tokio_mpsc::Receiver<Vec<WatchEvent>>)> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<DebounceEventResult>();

    let mut debouncer = new_debouncer(DEBOUNCE, move |res| {
        let _ = std_tx.send(res);
    })?;
    for (root, _) in &scope.roots {
        if root.is_dir() {
            debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
        } else {
            tracing::warn!(root = %root.display(), "source directory does not exist, not watching it");
        }
    }
    if let Some(project_root) = scope.config_file.parent() {
        debouncer.watcher().watch(project_root, RecursiveMode::NonRecursive)?;
    }

    let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<Vec<WatchEvent>>(64);

    // Bridge: spawn_blocking to receive from std channel, classify, forward to tokio
    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            match result {
                Ok(events) => {
                    let batch: Vec<WatchEvent> = events
                        .into_iter()
                        .filter_map(|debounced| scope.classify(&debounced.path))
                        .collect();
                    if batch.is_empty() {
                        continue;
                    }
                    if tokio_tx.blocking_send(batch).is_err() {
                        return; // receiver dropped, shutdown
                    }
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "watcher error");
                }
            }
        }
    });

    Ok((
        WatcherHandle {
            _debouncer: debouncer,
            _bridge_task: bridge_task,
        },
        tokio_rx,
    ))
}
