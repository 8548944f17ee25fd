use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use encoding_rs::Encoding;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::format::TemplateFormats;

/// Configuration file name, looked up in the project root.
pub const CONFIG_FILE: &str = "twirl-build.toml";

pub const DEFAULT_SOURCE_DIR: &str = "src/main/twirl";
pub const DEFAULT_DESTINATION_DIR: &str = "build/generated/twirl";
pub const DEFAULT_ENCODING: &str = "UTF-8";
pub const DEFAULT_INCLUDE: &str = "**/*.scala.*";

/// Placeholder in template imports replaced by the template's format extension.
pub const FORMAT_PLACEHOLDER: &str = "%format%";

/// Configuration loaded from `twirl-build.toml` at the project root.
///
/// Every field is optional; unset fields fall back to the Twirl defaults when resolved.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TwirlBuildConfig {
    /// Template source roots, relative to the project root.
    pub source_dirs: Option<Vec<PathBuf>>,
    /// Root of the generated sources.
    pub destination_dir: Option<PathBuf>,
    /// Encoding of templates and of generated files.
    pub source_encoding: Option<String>,
    /// Glob patterns (relative to a source root) selecting templates.
    pub includes: Option<Vec<String>>,
    pub excludes: Option<Vec<String>>,
    /// Extension → formatter type. Replaces the defaults when present.
    pub template_formats: Option<BTreeMap<String, String>>,
    /// Imports added to every generated file, before the compiler's defaults.
    pub template_imports: Option<Vec<String>>,
    /// Annotations added to constructors of injectable templates.
    pub constructor_annotations: Option<Vec<String>>,
    /// Passed through to the compiler (Twirl's `inclusiveDot`).
    pub strict: Option<bool>,
    /// Worker threads; 0 or unset lets the pool decide.
    pub jobs: Option<usize>,
    pub compiler: Option<CompilerConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    /// Program and arguments of the external template compiler.
    pub command: Vec<String>,
}

impl TwirlBuildConfig {
    /// Load configuration from `twirl-build.toml` in the given root directory.
    ///
    /// Returns a default configuration if the file does not exist. A file that exists but
    /// cannot be read or parsed is an error.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", config_path.display()))
    }

    /// Resolve into immutable build settings.
    ///
    /// `default_imports` comes from the compiler collaborator and is merged after the
    /// configured imports, de-duplicated, order preserved.
    pub fn resolve(&self, project_root: &Path, default_imports: &[String]) -> Result<Settings, ConfigError> {
        let absolute = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                project_root.join(p)
            }
        };

        let source_dirs = match &self.source_dirs {
            Some(dirs) => dirs.iter().map(|d| absolute(d.as_path())).collect(),
            None => vec![project_root.join(DEFAULT_SOURCE_DIR)],
        };
        let destination_dir = absolute(
            self.destination_dir
                .as_deref()
                .unwrap_or_else(|| Path::new(DEFAULT_DESTINATION_DIR)),
        );

        let label = self.source_encoding.as_deref().unwrap_or(DEFAULT_ENCODING);
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| ConfigError::UnknownEncoding(label.to_owned()))?;

        let formats = match &self.template_formats {
            Some(map) => TemplateFormats::new(map.iter().map(|(k, v)| (k.as_str(), v.clone()))),
            None => TemplateFormats::default(),
        };

        let mut imports: Vec<String> = Vec::new();
        for import in self
            .template_imports
            .iter()
            .flatten()
            .chain(default_imports.iter())
        {
            if !imports.contains(import) {
                imports.push(import.clone());
            }
        }

        Ok(Settings {
            project_root: project_root.to_path_buf(),
            source_dirs,
            destination_dir,
            encoding,
            formats,
            imports,
            constructor_annotations: self.constructor_annotations.clone().unwrap_or_default(),
            includes: self
                .includes
                .clone()
                .filter(|i| !i.is_empty())
                .unwrap_or_else(|| vec![DEFAULT_INCLUDE.to_owned()]),
            excludes: self.excludes.clone().unwrap_or_default(),
            strict: self.strict.unwrap_or(false),
            jobs: self.jobs.unwrap_or(0),
        })
    }

    /// Configured compiler argv, if any.
    pub fn compiler_command(&self) -> Option<&[String]> {
        self.compiler
            .as_ref()
            .map(|c| c.command.as_slice())
            .filter(|c| !c.is_empty())
    }
}

/// Build settings, resolved once per invocation and shared read-only by every unit.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_root: PathBuf,
    pub source_dirs: Vec<PathBuf>,
    pub destination_dir: PathBuf,
    pub encoding: &'static Encoding,
    pub formats: TemplateFormats,
    /// Ordered, de-duplicated; may contain [`FORMAT_PLACEHOLDER`].
    pub imports: Vec<String>,
    pub constructor_annotations: Vec<String>,
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub strict: bool,
    pub jobs: usize,
}

impl Settings {
    /// Imports for a template of the given format, placeholder substituted.
    pub fn imports_for(&self, extension: &str) -> Vec<String> {
        self.imports
            .iter()
            .map(|import| import.replace(FORMAT_PLACEHOLDER, extension))
            .collect()
    }

    /// Stable key over every setting that influences generated output.
    ///
    /// Stored next to the change snapshot; a different key forces a full rebuild.
    pub fn cache_key(&self) -> String {
        serde_json::json!({
            "destination": self.destination_dir,
            "encoding": self.encoding.name(),
            "formats": self.formats.iter().collect::<BTreeMap<_, _>>(),
            "imports": self.imports,
            "annotations": self.constructor_annotations,
            "strict": self.strict,
        })
        .to_string()
    }
}
