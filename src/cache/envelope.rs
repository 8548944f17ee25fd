use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::source::SourceFile;

/// Current snapshot format version. Bump when the envelope layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Cache directory name (created in project root).
pub const CACHE_DIR: &str = ".twirl-build";
/// Snapshot file name within CACHE_DIR.
pub const SNAPSHOT_FILE: &str = "snapshot.bin";

/// Metadata for a template as of the last successful build: mtime + file size.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileMeta {
    pub mtime_secs: u64,
    pub mtime_nanos: u32,
    pub size: u64,
}

impl FileMeta {
    /// Marker for a template whose last unit failed. No file on disk ever has this
    /// metadata (`mtime_nanos` is out of range), so the template is rebuilt next time while
    /// still being known to the snapshot.
    pub fn failed() -> Self {
        Self {
            mtime_secs: 0,
            mtime_nanos: u32::MAX,
            size: 0,
        }
    }

    /// Read metadata from disk. `None` if the file is gone.
    pub fn read(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        let since_epoch = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .unwrap_or_default();
        Some(Self {
            mtime_secs: since_epoch.as_secs(),
            mtime_nanos: since_epoch.subsec_nanos(),
            size: metadata.len(),
        })
    }
}

/// What the previous build saw, plus the settings it ran with.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SnapshotEnvelope {
    pub version: u32,
    /// [`crate::config::Settings::cache_key`] of the build that wrote this snapshot.
    pub settings_key: String,
    pub files: BTreeMap<SourceFile, FileMeta>,
}

impl SnapshotEnvelope {
    pub fn new(settings_key: String, files: BTreeMap<SourceFile, FileMeta>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            settings_key,
            files,
        }
    }
}

/// Build the snapshot path for a project: `<project_root>/.twirl-build/snapshot.bin`
pub fn snapshot_path(project_root: &Path) -> PathBuf {
    project_root.join(CACHE_DIR).join(SNAPSHOT_FILE)
}

/// Save the snapshot atomically using bincode serialization.
///
/// Writes to a temp file first, then renames to the final path.
/// Creates the `.twirl-build/` directory if it doesn't exist.
pub fn save_snapshot(project_root: &Path, snapshot: &SnapshotEnvelope) -> anyhow::Result<()> {
    let cache_dir = project_root.join(CACHE_DIR);
    std::fs::create_dir_all(&cache_dir)?;

    let target = snapshot_path(project_root);
    let mut tmp = tempfile::NamedTempFile::new_in(&cache_dir)?;
    bincode::serde::encode_into_std_write(snapshot, &mut tmp, bincode::config::standard())?;
    tmp.as_file().flush()?;
    tmp.persist(&target)?;

    Ok(())
}

/// Load the snapshot from disk. Returns None if:
/// - Snapshot file doesn't exist
/// - Snapshot version doesn't match SNAPSHOT_VERSION
/// - Deserialization fails (corrupt file)
pub fn load_snapshot(project_root: &Path) -> Option<SnapshotEnvelope> {
    let target = snapshot_path(project_root);
    let bytes = std::fs::read(&target).ok()?;
    let result = bincode::serde::decode_from_slice::<SnapshotEnvelope, _>(
        &bytes,
        bincode::config::standard(),
    );
    match result {
        Ok((envelope, _)) if envelope.version == SNAPSHOT_VERSION => Some(envelope),
        _ => None, // version mismatch or corrupt: caller rebuilds everything
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_snapshot() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let template = tmp_dir.path().join("index.scala.html");
        std::fs::write(&template, "@()").unwrap();

        let file = SourceFile::new(tmp_dir.path(), "index.scala.html").unwrap();
        let meta = FileMeta::read(&template).expect("file exists");
        assert_eq!(meta.size, 3);

        let snapshot = SnapshotEnvelope::new("key".into(), BTreeMap::from([(file.clone(), meta)]));
        save_snapshot(tmp_dir.path(), &snapshot).unwrap();

        let loaded = load_snapshot(tmp_dir.path()).expect("snapshot should load");
        assert_eq!(loaded, snapshot);
        assert!(loaded.files.contains_key(&file));
    }

    #[test]
    fn test_load_missing_snapshot_returns_none() {
        let tmp_dir = tempfile::tempdir().unwrap();
        assert!(load_snapshot(tmp_dir.path()).is_none());
    }

    #[test]
    fn test_corrupt_snapshot_returns_none() {
        let tmp_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp_dir.path().join(CACHE_DIR)).unwrap();
        std::fs::write(snapshot_path(tmp_dir.path()), b"not bincode").unwrap();
        assert!(load_snapshot(tmp_dir.path()).is_none());
    }
}
