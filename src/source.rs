use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Identity of a template: the source root it lives under plus its path relative to that root.
///
/// The identity never depends on the file existing, so a `SourceFile` for a deleted template
/// is as usable as one for a live template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceFile {
    root: PathBuf,
    /// Normalized, `/`-separated, no `.`/`..` components.
    relative: String,
}

impl SourceFile {
    /// Build a source file identity, normalizing `relative`.
    pub fn new(root: impl Into<PathBuf>, relative: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            root: root.into(),
            relative: normalize_relative(relative)?,
        })
    }

    /// Build an identity from an absolute (or root-prefixed) path under `root`.
    pub fn from_path(root: &Path, path: &Path) -> Result<Self, ConfigError> {
        let relative = path.strip_prefix(root).map_err(|_| ConfigError::InvalidPath {
            path: path.display().to_string(),
            reason: format!("not under source root {}", root.display()),
        })?;
        Self::new(root, &relative.to_string_lossy())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn relative_path(&self) -> &str {
        &self.relative
    }

    /// Location of the template on disk (may not exist).
    pub fn path(&self) -> PathBuf {
        self.relative
            .split('/')
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    pub fn file_name(&self) -> &str {
        self.relative
            .rsplit('/')
            .next()
            .unwrap_or(self.relative.as_str())
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative)
    }
}

/// Normalize a template path relative to its source root.
///
/// Backslashes become `/`, empty and `.` components are dropped. Absolute paths and `..`
/// components are rejected: they would let an event address files outside the root.
pub fn normalize_relative(path: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPath {
        path: path.to_owned(),
        reason: reason.to_owned(),
    };

    let unified = path.replace('\\', "/");
    if unified.starts_with('/') || unified.split('/').next().is_some_and(|c| c.ends_with(':')) {
        return Err(invalid("path must be relative to a source root"));
    }

    let mut parts = Vec::new();
    for component in unified.split('/') {
        match component {
            "" | "." => {}
            ".." => return Err(invalid("parent directory components are not allowed")),
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(invalid("path is empty"));
    }
    Ok(parts.join("/"))
}

/// What happened to a file since the previous build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    #[serde(alias = "ADDED")]
    Added,
    #[serde(alias = "MODIFIED")]
    Modified,
    #[serde(alias = "REMOVED")]
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        })
    }
}

/// One observed change, consumed exactly once by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub file: SourceFile,
    pub kind: ChangeKind,
    /// Directory events carry no template and are dropped during classification.
    pub is_directory: bool,
}

impl ChangeEvent {
    pub fn new(file: SourceFile, kind: ChangeKind) -> Self {
        Self {
            file,
            kind,
            is_directory: false,
        }
    }

    pub fn directory(file: SourceFile, kind: ChangeKind) -> Self {
        Self {
            file,
            kind,
            is_directory: true,
        }
    }

    pub fn normalized_relative_path(&self) -> &str {
        self.file.relative_path()
    }
}

/// Change event as supplied by a host build system (JSON).
#[derive(Debug, Clone, Deserialize)]
pub struct HostEvent {
    pub path: String,
    pub kind: ChangeKind,
    /// Source root the path is relative to. Defaults to the first configured source directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub directory: bool,
}

impl HostEvent {
    /// Resolve against the configured source roots (already absolute).
    ///
    /// A relative `root` is interpreted against `project_root`.
    pub fn resolve(self, project_root: &Path, roots: &[PathBuf]) -> Result<ChangeEvent, ConfigError> {
        let root = match self.root {
            Some(root) => {
                let root = if root.is_absolute() { root } else { project_root.join(root) };
                roots
                    .iter()
                    .find(|candidate| **candidate == root)
                    .cloned()
                    .ok_or(ConfigError::UnknownSourceRoot(root))?
            }
            None => roots.first().cloned().ok_or_else(|| ConfigError::InvalidPath {
                path: self.path.clone(),
                reason: "no source directories configured".to_owned(),
            })?,
        };
        let file = SourceFile::new(root, &self.path)?;
        Ok(if self.directory {
            ChangeEvent::directory(file, self.kind)
        } else {
            ChangeEvent::new(file, self.kind)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators_and_dots() {
        assert_eq!(normalize_relative("a\\b\\c.scala.html").unwrap(), "a/b/c.scala.html");
        assert_eq!(normalize_relative("./a//b/./c.scala.html").unwrap(), "a/b/c.scala.html");
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(normalize_relative("../c.scala.html").is_err());
        assert!(normalize_relative("/abs/c.scala.html").is_err());
        assert!(normalize_relative("C:/abs/c.scala.html").is_err());
        assert!(normalize_relative("./").is_err());
    }

    #[test]
    fn source_file_path_joins_components() {
        let file = SourceFile::new("/proj/src/main/twirl", "a/b/c.scala.html").unwrap();
        assert_eq!(file.path(), PathBuf::from("/proj/src/main/twirl/a/b/c.scala.html"));
        assert_eq!(file.file_name(), "c.scala.html");
    }

    #[test]
    fn from_path_strips_root() {
        let root = Path::new("/proj/twirl");
        let file = SourceFile::from_path(root, Path::new("/proj/twirl/x/y.scala.txt")).unwrap();
        assert_eq!(file.relative_path(), "x/y.scala.txt");
        assert!(SourceFile::from_path(root, Path::new("/elsewhere/y.scala.txt")).is_err());
    }

    #[test]
    fn host_event_parses_both_kind_spellings() {
        let events: Vec<HostEvent> = serde_json::from_str(
            r#"[{"path": "a.scala.html", "kind": "added"},
                {"path": "b.scala.html", "kind": "REMOVED", "directory": false}]"#,
        )
        .unwrap();
        assert_eq!(events[0].kind, ChangeKind::Added);
        assert_eq!(events[1].kind, ChangeKind::Removed);
    }

    #[test]
    fn host_event_resolves_default_and_named_roots() {
        let project = Path::new("/proj");
        let roots = vec![PathBuf::from("/proj/src/main/twirl"), PathBuf::from("/proj/src/test/twirl")];

        let default = HostEvent {
            path: "a.scala.html".into(),
            kind: ChangeKind::Modified,
            root: None,
            directory: false,
        };
        assert_eq!(default.resolve(project, &roots).unwrap().file.root(), roots[0]);

        let named = HostEvent {
            path: "a.scala.html".into(),
            kind: ChangeKind::Modified,
            root: Some(PathBuf::from("src/test/twirl")),
            directory: false,
        };
        assert_eq!(named.resolve(project, &roots).unwrap().file.root(), roots[1]);

        let unknown = HostEvent {
            path: "a.scala.html".into(),
            kind: ChangeKind::Modified,
            root: Some(PathBuf::from("other")),
            directory: false,
        };
        assert!(matches!(
            unknown.resolve(project, &roots),
            Err(ConfigError::UnknownSourceRoot(_))
        ));
    }
}
