//! Output placement for compiled templates.
//!
//! Both the compile and the delete path go through [`derive_output`], so a template's
//! generated file can be located from its relative path alone, after the template itself
//! is gone. Nothing here touches the filesystem.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use encoding_rs::Encoding;
use regex::Regex;

use crate::error::DeriveError;

/// Suffix of every generated file.
pub const GENERATED_SUFFIX: &str = ".template.scala";

/// Directory name after which the format extension is spliced into the package.
const TOP_DIRECTORY: &str = "views";

static TEMPLATE_NAME: OnceLock<Regex> = OnceLock::new();

fn template_name_pattern() -> &'static Regex {
    TEMPLATE_NAME.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_]+)\.scala\.([A-Za-z]+)$").expect("invalid template name pattern")
    })
}

/// Qualified name of the code generated for one template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateName {
    /// Package segments, outermost first (`["a", "b", "html"]`).
    pub package: Vec<String>,
    /// Generated type name (`c` for `c.scala.html`).
    pub type_name: String,
    /// Lower-cased format extension (`html`).
    pub extension: String,
}

impl TemplateName {
    /// Parse a normalized, `/`-separated relative template path.
    pub fn from_relative(relative: &str) -> Result<Self, DeriveError> {
        let mut components: Vec<&str> = relative.split('/').filter(|c| !c.is_empty()).collect();
        let file_name = components
            .pop()
            .ok_or_else(|| DeriveError::EmptyPath(relative.to_owned()))?;

        let captures = template_name_pattern()
            .captures(file_name)
            .ok_or_else(|| DeriveError::InvalidTemplateName {
                name: file_name.to_owned(),
            })?;
        let type_name = captures[1].to_owned();
        let extension = captures[2].to_lowercase();

        // Walk from the file towards the source root. Every `views` directory gets the
        // format extension right after it; without one, the extension goes last.
        let mut reversed: Vec<String> = Vec::with_capacity(components.len() + 1);
        let mut spliced = false;
        for dir in components.iter().rev() {
            if *dir == TOP_DIRECTORY {
                reversed.push(extension.clone());
                spliced = true;
            }
            reversed.push((*dir).to_owned());
        }
        reversed.reverse();
        if !spliced {
            reversed.push(extension.clone());
        }

        Ok(Self {
            package: reversed,
            type_name,
            extension,
        })
    }

    pub fn package_name(&self) -> String {
        self.package.join(".")
    }

    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}.{}", self.package_name(), self.type_name)
        }
    }

    /// Generated file path relative to the destination root.
    pub fn relative_output(&self) -> PathBuf {
        let mut path: PathBuf = self.package.iter().collect();
        path.push(format!("{}{}", self.type_name, GENERATED_SUFFIX));
        path
    }
}

/// Where a template's generated source lives, and what it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedOutput {
    pub path: PathBuf,
    pub name: TemplateName,
    pub encoding: &'static Encoding,
}

impl GeneratedOutput {
    pub fn qualified_name(&self) -> String {
        self.name.qualified_name()
    }
}

/// Derive the generated file for `relative` (normalized, relative to its source root).
///
/// The result depends only on the arguments: never on file content or on whether the
/// template exists.
pub fn derive_output(
    relative: &str,
    encoding: &'static Encoding,
    destination: &Path,
) -> Result<GeneratedOutput, DeriveError> {
    let name = TemplateName::from_relative(relative)?;
    Ok(GeneratedOutput {
        path: destination.join(name.relative_output()),
        name,
        encoding,
    })
}
