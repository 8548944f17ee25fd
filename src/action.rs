use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;

use crate::compiler::{TemplateCompiler, TemplateInput};
use crate::derive::{GeneratedOutput, derive_output};
use crate::error::UnitError;
use crate::format::TemplateFormat;
use crate::source::SourceFile;

/// Compile one added or modified template.
#[derive(Debug, Clone)]
pub struct CompileUnit {
    pub source: SourceFile,
    pub destination_dir: PathBuf,
    pub format: TemplateFormat,
    /// Ordered, unique, `%format%` already substituted.
    pub imports: Vec<String>,
    pub constructor_annotations: Vec<String>,
    pub encoding: &'static Encoding,
    pub strict: bool,
}

/// Remove the generated output of one deleted template.
///
/// No format is needed: placement does not depend on it.
#[derive(Debug, Clone)]
pub struct DeleteUnit {
    pub source: SourceFile,
    pub destination_dir: PathBuf,
    pub encoding: &'static Encoding,
}

/// One independently schedulable piece of work, scoped to exactly one template.
#[derive(Debug, Clone)]
pub enum WorkUnit {
    Compile(CompileUnit),
    Delete(DeleteUnit),
}

/// What a successful unit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The generated file was written or replaced.
    Compiled(PathBuf),
    /// The generated file already had the expected bytes.
    Unchanged(PathBuf),
    Deleted(PathBuf),
    /// Nothing to delete.
    AlreadyAbsent(PathBuf),
    /// The removed file is not named like a template, so it never had an output.
    NoOutput,
}

impl WorkUnit {
    pub fn source(&self) -> &SourceFile {
        match self {
            WorkUnit::Compile(unit) => &unit.source,
            WorkUnit::Delete(unit) => &unit.source,
        }
    }

    pub fn run(&self, compiler: &dyn TemplateCompiler) -> Result<UnitOutcome, UnitError> {
        match self {
            WorkUnit::Compile(unit) => {
                let output = unit.output()?;
                Ok(match compile(unit, compiler)? {
                    Some(written) => UnitOutcome::Compiled(written.path),
                    None => UnitOutcome::Unchanged(output.path),
                })
            }
            WorkUnit::Delete(unit) => delete(unit),
        }
    }
}

impl CompileUnit {
    pub fn source_directory(&self) -> &Path {
        self.source.root()
    }

    fn output(&self) -> Result<GeneratedOutput, UnitError> {
        derive_output(self.source.relative_path(), self.encoding, &self.destination_dir).map_err(
            |source| UnitError::Derive {
                file: self.source.path(),
                source,
            },
        )
    }
}

impl DeleteUnit {
    pub fn source_directory(&self) -> &Path {
        self.source.root()
    }
}

/// Compile one template into its generated file.
///
/// Returns `None` when the generated file already holds exactly the bytes the compiler
/// produced; nothing is written in that case. The output is written to a temporary file
/// next to its final location and renamed into place, so readers never see a partial file.
pub fn compile(
    unit: &CompileUnit,
    compiler: &dyn TemplateCompiler,
) -> Result<Option<GeneratedOutput>, UnitError> {
    let source_path = unit.source.path();
    let output = unit.output()?;

    tracing::info!(
        format = %unit.format.formatter_type,
        encoding = unit.encoding.name(),
        source = %unit.source,
        from = %unit.source_directory().display(),
        into = %unit.destination_dir.display(),
        "compile twirl template"
    );

    let bytes = fs::read(&source_path).map_err(|source| UnitError::Io {
        file: source_path.clone(),
        op: "read",
        target: source_path.clone(),
        source,
    })?;
    let (content, malformed) = unit.encoding.decode_with_bom_removal(&bytes);
    if malformed {
        return Err(UnitError::Encoding {
            file: source_path,
            encoding: unit.encoding.name().to_owned(),
        });
    }

    let generated = compiler
        .generate(&TemplateInput {
            source: &unit.source,
            output: &output,
            content: &content,
            formatter_type: &unit.format.formatter_type,
            format_extension: &unit.format.extension,
            imports: &unit.imports,
            constructor_annotations: &unit.constructor_annotations,
            strict: unit.strict,
        })
        .map_err(|source| UnitError::Compile {
            file: source_path.clone(),
            source,
        })?;

    let (encoded, _, unmappable) = unit.encoding.encode(&generated);
    if unmappable {
        return Err(UnitError::Encoding {
            file: source_path,
            encoding: unit.encoding.name().to_owned(),
        });
    }

    if let Ok(existing) = fs::read(&output.path)
        && existing == encoded.as_ref()
    {
        tracing::debug!(output = %output.path.display(), "generated source is up to date");
        return Ok(None);
    }

    write_atomically(&output.path, &encoded).map_err(|source| UnitError::Io {
        file: source_path,
        op: "write",
        target: output.path.clone(),
        source,
    })?;
    Ok(Some(output))
}

/// Delete the generated file of a template that no longer exists.
///
/// The location is derived from the template's relative path only, exactly as [`compile`]
/// derives it. A generated file that is already gone is not an error.
pub fn delete(unit: &DeleteUnit) -> Result<UnitOutcome, UnitError> {
    let output = match derive_output(unit.source.relative_path(), unit.encoding, &unit.destination_dir) {
        Ok(output) => output,
        Err(err) => {
            tracing::debug!(source = %unit.source, error = %err, "removed file has no generated source");
            return Ok(UnitOutcome::NoOutput);
        }
    };
    tracing::debug!(
        source = %unit.source,
        from = %unit.source_directory().display(),
        "delete generated source"
    );

    match fs::remove_file(&output.path) {
        Ok(()) => {
            tracing::info!(output = %output.path.display(), "delete twirl template");
            Ok(UnitOutcome::Deleted(output.path))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(output = %output.path.display(), "generated source already absent");
            Ok(UnitOutcome::AlreadyAbsent(output.path))
        }
        Err(source) => Err(UnitError::Io {
            file: unit.source.path(),
            op: "delete",
            target: output.path,
            source,
        }),
    }
}

/// Write `bytes` to `path` via a temp file in the same directory plus rename.
///
/// Creates missing parent directories; concurrent creation of the same directory is fine.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "output path has no parent"))?;
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".twirl-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
