use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Incremental build driver for Twirl templates.
///
/// twirl-build turns `*.scala.<format>` templates into generated Scala sources, compiling
/// only what changed since the previous run and deleting the output of removed templates.
#[derive(Parser, Debug)]
#[command(
    name = "twirl-build",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Number of parallel workers (defaults to `jobs` in twirl-build.toml, 0 = all cores).
    #[arg(short = 'j', long, global = true)]
    pub jobs: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile changed templates and delete the output of removed ones.
    ///
    /// Changes are detected against the snapshot in `.twirl-build/` written by the previous
    /// build. Exits non-zero if any template failed.
    Build {
        /// Path to the project root containing twirl-build.toml.
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Ignore the snapshot and recompile every template.
        #[arg(long)]
        full: bool,

        /// Output the batch summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run a batch of change events supplied by a host build system.
    ///
    /// Events are a JSON array of `{"path", "kind", "root"?, "directory"?}` objects where
    /// `kind` is one of added, modified, removed and `path` is relative to the source root.
    Apply {
        /// Path to the project root containing twirl-build.toml.
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// File holding the events; `-` or absent reads standard input.
        #[arg(long)]
        events: Option<PathBuf>,

        /// Output the batch summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the generated source path and qualified name for a template.
    Derive {
        /// Template path relative to its source root (e.g. "a/b/c.scala.html").
        path: String,

        /// Path to the project root containing twirl-build.toml.
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Build, then keep rebuilding as templates change. Stop with Ctrl-C.
    Watch {
        /// Path to the project root containing twirl-build.toml.
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Output batch summaries as JSON.
        #[arg(long)]
        json: bool,
    },
}
