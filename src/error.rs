use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal configuration problems. Raised before any unit runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A template's extension has no entry in the format map.
    #[error("Unknown template format of '{file}'. Possible extensions: [{}]", extensions.join(", "))]
    UnknownFormat {
        file: String,
        extensions: Vec<String>,
    },

    #[error("Unknown source encoding '{0}'")]
    UnknownEncoding(String),

    /// A change event named a path that cannot be a template location.
    #[error("Invalid template path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Source root '{}' is not one of the configured source directories", .0.display())]
    UnknownSourceRoot(PathBuf),

    /// Two templates derive the same generated file (`c.scala.html` and `c.scala.HTML`, or
    /// the same relative path under two source roots).
    #[error(
        "Templates '{}' and '{}' would both generate '{}'",
        first.display(),
        second.display(),
        output.display()
    )]
    OutputCollision {
        first: PathBuf,
        second: PathBuf,
        output: PathBuf,
    },

    #[error("No compiler command configured (set [compiler] command in twirl-build.toml)")]
    MissingCompiler,
}

/// The file name does not follow `<name>.scala.<ext>`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeriveError {
    #[error("Invalid template name '{name}' (expected <name>.scala.<format>)")]
    InvalidTemplateName { name: String },

    #[error("Template path '{0}' has no file name")]
    EmptyPath(String),
}

/// Failures reported by the external template compiler.
#[derive(Debug, Error)]
pub enum CompilerError {
    /// The compiler ran and rejected the template (syntax error and similar).
    #[error("{message}")]
    Rejected { message: String },

    #[error("failed to launch compiler `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compiler protocol error: {0}")]
    Protocol(String),
}

/// Failure of one unit of work. Always names the source file it belongs to.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("{}: {source}", file.display())]
    Compile {
        file: PathBuf,
        #[source]
        source: CompilerError,
    },

    #[error("{}: cannot {op} {}: {source}", file.display(), target.display())]
    Io {
        file: PathBuf,
        op: &'static str,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: content is not valid {encoding}", file.display())]
    Encoding { file: PathBuf, encoding: String },

    #[error("{}: {source}", file.display())]
    Derive {
        file: PathBuf,
        #[source]
        source: DeriveError,
    },

    #[error("{}: worker panicked: {message}", file.display())]
    Panicked { file: PathBuf, message: String },
}

impl UnitError {
    /// The source file the failed unit was working on.
    pub fn file(&self) -> &PathBuf {
        match self {
            UnitError::Compile { file, .. }
            | UnitError::Io { file, .. }
            | UnitError::Encoding { file, .. }
            | UnitError::Derive { file, .. }
            | UnitError::Panicked { file, .. } => file,
        }
    }
}

/// Aggregated result of a batch in which at least one unit failed.
#[derive(Debug)]
pub struct BatchError {
    pub failures: Vec<UnitError>,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.failures.len() == 1 { "template" } else { "templates" };
        write!(f, "{} {} failed to build", self.failures.len(), noun)?;
        for failure in &self.failures {
            write!(f, "\n  - {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_format_lists_extensions() {
        let err = ConfigError::UnknownFormat {
            file: "x.unknown".into(),
            extensions: vec!["html".into(), "txt".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown template format of 'x.unknown'. Possible extensions: [html, txt]"
        );
    }

    #[test]
    fn batch_error_lists_every_failure() {
        let err = BatchError {
            failures: vec![
                UnitError::Encoding {
                    file: PathBuf::from("a.scala.html"),
                    encoding: "UTF-8".into(),
                },
                UnitError::Panicked {
                    file: PathBuf::from("b.scala.txt"),
                    message: "boom".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("2 templates failed to build"));
        assert!(text.contains("a.scala.html: content is not valid UTF-8"));
        assert!(text.contains("b.scala.txt: worker panicked: boom"));
    }
}
