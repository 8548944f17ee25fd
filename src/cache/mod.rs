//! Change detection between two invocations of the driver.
//!
//! Host build systems normally report which templates changed. When run on its own the
//! driver compares the templates on disk with the snapshot written by the previous run.

pub mod envelope;

use std::collections::BTreeMap;

use envelope::{FileMeta, SnapshotEnvelope};

use crate::dispatch::{BatchReport, UnitStatus};
use crate::source::{ChangeEvent, ChangeKind, SourceFile};

/// Events for one build plus the metadata observed while computing them.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub events: Vec<ChangeEvent>,
    pub current: BTreeMap<SourceFile, FileMeta>,
}

/// Compare the templates found on disk with the previous snapshot.
///
/// With no usable snapshot, a changed settings key, or `full`, every present template is
/// reported (`Added` if the snapshot never saw it, `Modified` otherwise). Templates the
/// snapshot knows about that are gone are always reported `Removed`.
pub fn diff(
    previous: Option<&SnapshotEnvelope>,
    settings_key: &str,
    templates: &[SourceFile],
    full: bool,
) -> ChangeSet {
    let empty = BTreeMap::new();
    let known = previous.map(|p| &p.files).unwrap_or(&empty);
    let rebuild_all = full || previous.is_none_or(|p| p.settings_key != settings_key);

    let mut changes = ChangeSet::default();
    for file in templates {
        let Some(meta) = FileMeta::read(&file.path()) else {
            // Vanished between the walk and now; the next build sees it as removed.
            continue;
        };
        let kind = match known.get(file) {
            None => Some(ChangeKind::Added),
            Some(_) if rebuild_all => Some(ChangeKind::Modified),
            Some(old) if *old != meta => Some(ChangeKind::Modified),
            Some(_) => None,
        };
        if let Some(kind) = kind {
            changes.events.push(ChangeEvent::new(file.clone(), kind));
        }
        changes.current.insert(file.clone(), meta);
    }

    for file in known.keys() {
        if !changes.current.contains_key(file) {
            changes.events.push(ChangeEvent::new(file.clone(), ChangeKind::Removed));
        }
    }
    changes
}

/// Snapshot to store after running `changes` through a batch.
///
/// Templates that failed are recorded with [`FileMeta::failed`]: the next build retries
/// them, and if they are deleted first their old output is still removed. Skipped units
/// keep whatever the previous snapshot said about them.
pub fn record(
    previous: Option<&SnapshotEnvelope>,
    settings_key: String,
    changes: &ChangeSet,
    report: &BatchReport,
) -> SnapshotEnvelope {
    let changed: std::collections::HashSet<&SourceFile> =
        changes.events.iter().map(|e| &e.file).collect();

    let mut files: BTreeMap<SourceFile, FileMeta> = changes
        .current
        .iter()
        .filter(|(file, _)| !changed.contains(file))
        .map(|(file, meta)| (file.clone(), meta.clone()))
        .collect();

    for result in &report.results {
        match &result.status {
            UnitStatus::Done(_) if !result.removal => {
                if let Some(meta) = changes.current.get(&result.source) {
                    files.insert(result.source.clone(), meta.clone());
                }
            }
            UnitStatus::Skipped => {
                if let Some(meta) = previous.and_then(|p| p.files.get(&result.source)) {
                    files.insert(result.source.clone(), meta.clone());
                }
            }
            UnitStatus::Failed(_) => {
                files.insert(result.source.clone(), FileMeta::failed());
            }
            UnitStatus::Done(_) => {}
        }
    }

    SnapshotEnvelope::new(settings_key, files)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::action::UnitOutcome;
    use crate::dispatch::UnitResult;
    use crate::error::UnitError;

    fn template(root: &Path, relative: &str, content: &str) -> SourceFile {
        let file = SourceFile::new(root, relative).unwrap();
        fs::create_dir_all(file.path().parent().unwrap()).unwrap();
        fs::write(file.path(), content).unwrap();
        file
    }

    fn kinds(changes: &ChangeSet) -> Vec<(String, ChangeKind)> {
        let mut kinds: Vec<_> = changes
            .events
            .iter()
            .map(|e| (e.file.relative_path().to_owned(), e.kind))
            .collect();
        kinds.sort_by(|a, b| a.0.cmp(&b.0));
        kinds
    }

    fn done(file: &SourceFile) -> UnitResult {
        UnitResult {
            source: file.clone(),
            removal: false,
            status: UnitStatus::Done(UnitOutcome::Compiled(file.path())),
        }
    }

    fn failed(file: &SourceFile) -> UnitResult {
        UnitResult {
            source: file.clone(),
            removal: false,
            status: UnitStatus::Failed(UnitError::Panicked {
                file: file.path(),
                message: "x".into(),
            }),
        }
    }

    #[test]
    fn first_build_adds_everything() {
        let dir = tempfile::tempdir().unwrap();
        let a = template(dir.path(), "a.scala.html", "a");
        let changes = diff(None, "k", &[a], false);
        assert_eq!(kinds(&changes), vec![("a.scala.html".to_owned(), ChangeKind::Added)]);
    }

    #[test]
    fn detects_added_modified_removed_and_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let same = template(dir.path(), "same.scala.html", "same");
        let edited = template(dir.path(), "edited.scala.html", "v1");
        let gone = template(dir.path(), "gone.scala.html", "bye");

        let first = diff(None, "k", &[same.clone(), edited.clone(), gone.clone()], false);
        let previous = SnapshotEnvelope::new("k".into(), first.current.clone());

        fs::write(edited.path(), "version two").unwrap();
        fs::remove_file(gone.path()).unwrap();
        let fresh = template(dir.path(), "fresh.scala.html", "new");

        let changes = diff(Some(&previous), "k", &[same, edited, fresh], false);
        assert_eq!(
            kinds(&changes),
            vec![
                ("edited.scala.html".to_owned(), ChangeKind::Modified),
                ("fresh.scala.html".to_owned(), ChangeKind::Added),
                ("gone.scala.html".to_owned(), ChangeKind::Removed),
            ]
        );
    }

    #[test]
    fn settings_change_rebuilds_everything() {
        let dir = tempfile::tempdir().unwrap();
        let a = template(dir.path(), "a.scala.html", "a");
        let first = diff(None, "old", &[a.clone()], false);
        let previous = SnapshotEnvelope::new("old".into(), first.current);

        assert!(diff(Some(&previous), "old", &[a.clone()], false).events.is_empty());
        assert_eq!(
            kinds(&diff(Some(&previous), "new", &[a.clone()], false)),
            vec![("a.scala.html".to_owned(), ChangeKind::Modified)]
        );
        assert_eq!(diff(Some(&previous), "old", &[a], true).events.len(), 1);
    }

    #[test]
    fn failed_units_are_retried_next_time() {
        let dir = tempfile::tempdir().unwrap();
        let ok = template(dir.path(), "ok.scala.html", "ok");
        let bad = template(dir.path(), "bad.scala.html", "@broken");
        let changes = diff(None, "k", &[ok.clone(), bad.clone()], false);

        let report = BatchReport {
            results: vec![done(&ok), failed(&bad)],
            elapsed: Duration::ZERO,
        };
        let snapshot = record(None, "k".into(), &changes, &report);
        assert!(snapshot.files.contains_key(&ok));
        assert_eq!(snapshot.files.get(&bad), Some(&FileMeta::failed()));

        let next = diff(Some(&snapshot), "k", &[ok, bad], false);
        assert_eq!(kinds(&next), vec![("bad.scala.html".to_owned(), ChangeKind::Modified)]);
    }

    #[test]
    fn failed_template_deleted_later_is_still_removed() {
        let dir = tempfile::tempdir().unwrap();
        let page = template(dir.path(), "a/c.scala.html", "good");
        let first = diff(None, "k", &[page.clone()], false);
        let previous = SnapshotEnvelope::new("k".into(), first.current);

        fs::write(page.path(), "@broken(").unwrap();
        let changes = diff(Some(&previous), "k", &[page.clone()], false);
        let report = BatchReport {
            results: vec![failed(&page)],
            elapsed: Duration::ZERO,
        };
        let snapshot = record(Some(&previous), "k".into(), &changes, &report);

        fs::remove_file(page.path()).unwrap();
        let next = diff(Some(&snapshot), "k", &[], false);
        assert_eq!(kinds(&next), vec![("a/c.scala.html".to_owned(), ChangeKind::Removed)]);
    }

    #[test]
    fn failed_removal_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let gone = template(dir.path(), "gone.scala.html", "g");
        let first = diff(None, "k", &[gone.clone()], false);
        let previous = SnapshotEnvelope::new("k".into(), first.current);

        fs::remove_file(gone.path()).unwrap();
        let changes = diff(Some(&previous), "k", &[], false);
        let mut failure = failed(&gone);
        failure.removal = true;
        let report = BatchReport {
            results: vec![failure],
            elapsed: Duration::ZERO,
        };
        let snapshot = record(Some(&previous), "k".into(), &changes, &report);

        let next = diff(Some(&snapshot), "k", &[], false);
        assert_eq!(kinds(&next), vec![("gone.scala.html".to_owned(), ChangeKind::Removed)]);
    }

    #[test]
    fn removals_and_skips_update_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let kept = template(dir.path(), "kept.scala.html", "k");
        let gone = template(dir.path(), "gone.scala.html", "g");
        let first = diff(None, "k", &[kept.clone(), gone.clone()], false);
        let previous = SnapshotEnvelope::new("k".into(), first.current);

        fs::remove_file(gone.path()).unwrap();
        fs::write(kept.path(), "changed content").unwrap();
        let changes = diff(Some(&previous), "k", &[kept.clone()], false);

        let report = BatchReport {
            results: vec![
                UnitResult {
                    source: gone.clone(),
                    removal: true,
                    status: UnitStatus::Done(UnitOutcome::Deleted(gone.path())),
                },
                UnitResult {
                    source: kept.clone(),
                    removal: false,
                    status: UnitStatus::Skipped,
                },
            ],
            elapsed: Duration::ZERO,
        };
        let snapshot = record(Some(&previous), "k".into(), &changes, &report);
        assert!(!snapshot.files.contains_key(&gone));
        // Skipped: still the old metadata, so the change is picked up again.
        assert_eq!(snapshot.files.get(&kept), previous.files.get(&kept));
    }
}
