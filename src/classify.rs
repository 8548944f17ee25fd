use std::collections::HashMap;
use std::path::PathBuf;

use crate::action::{CompileUnit, DeleteUnit, WorkUnit};
use crate::config::Settings;
use crate::derive::derive_output;
use crate::error::ConfigError;
use crate::source::{ChangeEvent, ChangeKind, SourceFile};

/// Route every change event to a unit of work.
///
/// Removed templates become [`DeleteUnit`]s, added and modified ones [`CompileUnit`]s,
/// directory events are dropped. Units come out in event order; they are independent, so
/// the order carries no meaning.
///
/// Fails on the first template whose extension has no configured format, and when two
/// compiled templates would write the same file. Nothing has run at that point, so no
/// output is written.
pub fn classify<I>(events: I, settings: &Settings) -> Result<Vec<WorkUnit>, ConfigError>
where
    I: IntoIterator<Item = ChangeEvent>,
{
    let mut units = Vec::new();
    for event in events {
        if event.is_directory {
            tracing::trace!(path = %event.file, "skip directory event");
            continue;
        }
        let unit = match event.kind {
            ChangeKind::Removed => WorkUnit::Delete(DeleteUnit {
                source: event.file,
                destination_dir: settings.destination_dir.clone(),
                encoding: settings.encoding,
            }),
            ChangeKind::Added | ChangeKind::Modified => {
                let format = settings.formats.lookup(event.file.file_name())?;
                WorkUnit::Compile(CompileUnit {
                    imports: settings.imports_for(&format.extension),
                    source: event.file,
                    destination_dir: settings.destination_dir.clone(),
                    format,
                    constructor_annotations: settings.constructor_annotations.clone(),
                    encoding: settings.encoding,
                    strict: settings.strict,
                })
            }
        };
        units.push(unit);
    }
    check_outputs(
        units.iter().filter_map(|unit| match unit {
            WorkUnit::Compile(unit) => Some(&unit.source),
            WorkUnit::Delete(_) => None,
        }),
        settings,
    )?;
    tracing::debug!(units = units.len(), "classified change events");
    Ok(units)
}

/// Fail if two distinct templates derive the same generated file.
///
/// The format extension is lower-cased when deriving, so `c.scala.html` and `c.scala.HTML`
/// in one directory collide. Names that do not derive at all are left for the compile
/// unit to report.
pub fn check_outputs<'a, I>(files: I, settings: &Settings) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = &'a SourceFile>,
{
    let mut seen: HashMap<PathBuf, &SourceFile> = HashMap::new();
    for file in files {
        let Ok(output) = derive_output(file.relative_path(), settings.encoding, &settings.destination_dir)
        else {
            continue;
        };
        if let Some(first) = seen.insert(output.path.clone(), file)
            && first != file
        {
            return Err(ConfigError::OutputCollision {
                first: first.path(),
                second: file.path(),
                output: output.path,
            });
        }
    }
    Ok(())
}
