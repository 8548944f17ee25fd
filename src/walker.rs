use std::path::Path;

use anyhow::Context;
use glob::{MatchOptions, Pattern};

use crate::config::Settings;
use crate::source::SourceFile;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Include/exclude globs, matched against paths relative to a source root.
#[derive(Debug, Clone)]
pub struct TemplateFilter {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl TemplateFilter {
    pub fn new(includes: &[String], excludes: &[String]) -> anyhow::Result<Self> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| Pattern::new(p).with_context(|| format!("invalid glob pattern '{p}'")))
                .collect::<anyhow::Result<Vec<_>>>()
        };
        Ok(Self {
            includes: compile(includes)?,
            excludes: compile(excludes)?,
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(&settings.includes, &settings.excludes)
    }

    /// `relative` is `/`-separated.
    pub fn matches(&self, relative: &str) -> bool {
        self.includes.iter().any(|p| p.matches_with(relative, MATCH_OPTIONS))
            && !self.excludes.iter().any(|p| p.matches_with(relative, MATCH_OPTIONS))
    }
}

/// Walk every source root and collect the templates selected by `filter`.
///
/// Respects `.gitignore` rules. Source roots that do not exist are skipped. The generated
/// sources directory is never walked, even when it lies inside a source root. The result
/// is sorted.
pub fn walk_templates(
    settings: &Settings,
    filter: &TemplateFilter,
    verbose: bool,
) -> anyhow::Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for root in &settings.source_dirs {
        if !root.is_dir() {
            tracing::debug!(root = %root.display(), "source directory does not exist, skipping");
            continue;
        }
        collect_templates(root, &settings.destination_dir, filter, verbose, &mut files)?;
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn collect_templates(
    root: &Path,
    destination: &Path,
    filter: &TemplateFilter,
    verbose: bool,
    out: &mut Vec<SourceFile>,
) -> anyhow::Result<()> {
    let destination = destination.to_path_buf();
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(true)
        // Read .gitignore files even when the directory is not inside a git repository.
        .require_git(false)
        .filter_entry(move |entry| !entry.path().starts_with(&destination))
        .build();

    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("{err}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let file = SourceFile::from_path(root, entry.path())
            .with_context(|| format!("failed to resolve {}", entry.path().display()))?;
        if !filter.matches(file.relative_path()) {
            continue;
        }

        if verbose {
            eprintln!("{}", entry.path().display());
        }
        out.push(file);
    }
    Ok(())
}
