mod cli;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use twirl_build::compiler::DEFAULT_IMPORTS;
use twirl_build::config::TwirlBuildConfig;
use twirl_build::derive::derive_output;
use twirl_build::dispatch::BatchReport;
use twirl_build::driver::{self, Driver};
use twirl_build::output::{print_derived, print_summary};
use twirl_build::source::{HostEvent, normalize_relative};

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "twirl_build=info",
        _ => "twirl_build=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn project_root(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path)
        .with_context(|| format!("project directory {} does not exist", path.display()))
}

fn read_events(source: Option<&Path>) -> Result<Vec<HostEvent>> {
    let raw = match source {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read events from {}", path.display()))?,
        _ => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read events from stdin")?;
            raw
        }
    };
    serde_json::from_str(&raw).context("events must be a JSON array of change events")
}

/// Print the summary, then turn unit failures into the process exit status.
fn finish(report: BatchReport, json: bool) -> Result<()> {
    print_summary(&report, json);
    report.into_result()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            project,
            full,
            json,
        } => {
            let root = project_root(&project)?;
            let driver = Driver::open(&root, cli.jobs)?;
            let report = driver.build(full, cli.verbose > 0)?;
            finish(report, json)?;
        }

        Commands::Apply {
            project,
            events,
            json,
        } => {
            let root = project_root(&project)?;
            let driver = Driver::open(&root, cli.jobs)?;
            let events = driver.resolve_host_events(read_events(events.as_deref())?)?;
            let report = driver.apply(events)?;
            finish(report, json)?;
        }

        Commands::Derive {
            path,
            project,
            json,
        } => {
            // Needs neither the compiler nor a worker pool.
            let root = project_root(&project)?;
            let imports: Vec<String> = DEFAULT_IMPORTS.iter().map(|s| s.to_string()).collect();
            let settings = TwirlBuildConfig::load(&root)?.resolve(&root, &imports)?;
            let relative = normalize_relative(&path)?;
            let output = derive_output(&relative, settings.encoding, &settings.destination_dir)?;
            print_derived(&relative, &output, json);
        }

        Commands::Watch { project, json } => {
            let root = project_root(&project)?;
            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            runtime.block_on(driver::watch(root, cli.jobs, json))?;
        }
    }

    Ok(())
}
