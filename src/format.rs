use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Formats every Twirl project understands unless configured otherwise.
pub const DEFAULT_TEMPLATE_FORMATS: &[(&str, &str)] = &[
    ("html", "play.twirl.api.HtmlFormat"),
    ("txt", "play.twirl.api.TxtFormat"),
    ("xml", "play.twirl.api.XmlFormat"),
    ("js", "play.twirl.api.JavaScriptFormat"),
];

/// A resolved format: the extension that selected it and the formatter type generated code uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFormat {
    pub extension: String,
    pub formatter_type: String,
}

/// Extension → formatter type mapping. Keys are stored lower-cased; lookups ignore case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFormats {
    formats: BTreeMap<String, String>,
}

impl TemplateFormats {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let formats = entries
            .into_iter()
            .map(|(ext, ty)| (ext.as_ref().trim_start_matches('.').to_lowercase(), ty.into()))
            .collect();
        Self { formats }
    }

    /// Recognized extensions, sorted.
    pub fn extensions(&self) -> Vec<String> {
        self.formats.keys().cloned().collect()
    }

    /// `(extension, formatter type)` pairs, sorted by extension.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.formats.iter().map(|(ext, ty)| (ext.as_str(), ty.as_str()))
    }

    /// Format for a template file name, matched on its last extension.
    pub fn lookup(&self, file_name: &str) -> Result<TemplateFormat, ConfigError> {
        let unknown = || ConfigError::UnknownFormat {
            file: file_name.to_owned(),
            extensions: self.extensions(),
        };
        let (_, ext) = file_name.rsplit_once('.').ok_or_else(unknown)?;
        let extension = ext.to_lowercase();
        let formatter_type = self.formats.get(&extension).ok_or_else(unknown)?;
        Ok(TemplateFormat {
            extension,
            formatter_type: formatter_type.clone(),
        })
    }
}

impl Default for TemplateFormats {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_FORMATS.iter().copied())
    }
}
