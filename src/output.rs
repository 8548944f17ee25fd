use serde::Serialize;

use crate::derive::GeneratedOutput;
use crate::dispatch::{BatchReport, BatchStats};

/// Machine-readable summary of a batch.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    #[serde(flatten)]
    pub stats: BatchStats,
    /// Failure messages, one per failed template.
    pub failures: Vec<String>,
    /// Wall-clock time for the batch in seconds.
    pub elapsed_secs: f64,
}

impl BatchSummary {
    pub fn from_report(report: &BatchReport) -> Self {
        Self {
            stats: report.stats(),
            failures: report.failures().map(|e| e.to_string()).collect(),
            elapsed_secs: report.elapsed.as_secs_f64(),
        }
    }
}

/// Print a summary of a batch.
///
/// - `json = true`: emit a pretty-printed JSON object to stdout.
/// - `json = false`: emit a cargo-style human-readable summary to stdout.
///
/// Failures are not printed here: the caller reports them through the returned batch error
/// so stdout stays clean for JSON consumers.
pub fn print_summary(report: &BatchReport, json: bool) {
    let summary = BatchSummary::from_report(report);
    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("error serialising summary: {}", e),
        }
        return;
    }

    let stats = &summary.stats;
    if report.results.is_empty() {
        println!("Twirl templates are up to date");
        return;
    }
    println!(
        "Processed {} template(s) in {:.2}s",
        report.results.len(),
        summary.elapsed_secs
    );
    println!(
        "  {} compiled, {} unchanged, {} deleted",
        stats.compiled,
        stats.unchanged,
        stats.deleted + stats.already_absent,
    );
    if stats.skipped > 0 {
        println!("  {} skipped (cancelled)", stats.skipped);
    }
    if stats.failed > 0 {
        println!("  {} failed", stats.failed);
    }
}

/// Print where a template's generated source goes.
pub fn print_derived(relative: &str, output: &GeneratedOutput, json: bool) {
    if json {
        let value = serde_json::json!({
            "template": relative,
            "output": output.path,
            "package": output.name.package_name(),
            "type": output.name.type_name,
            "qualified_name": output.qualified_name(),
        });
        match serde_json::to_string_pretty(&value) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("error serialising output: {}", e),
        }
        return;
    }
    println!("{}", output.path.display());
    println!("{}", output.qualified_name());
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::action::UnitOutcome;
    use crate::dispatch::{UnitResult, UnitStatus};
    use crate::error::UnitError;
    use crate::source::SourceFile;

    #[test]
    fn summary_serializes_flat_counts_and_failures() {
        let ok = SourceFile::new("/src", "ok.scala.html").unwrap();
        let bad = SourceFile::new("/src", "bad.scala.html").unwrap();
        let report = BatchReport {
            results: vec![
                UnitResult {
                    source: ok,
                    removal: false,
                    status: UnitStatus::Done(UnitOutcome::Compiled(PathBuf::from("/out/html/ok.template.scala"))),
                },
                UnitResult {
                    source: bad.clone(),
                    removal: false,
                    status: UnitStatus::Failed(UnitError::Encoding {
                        file: bad.path(),
                        encoding: "UTF-8".into(),
                    }),
                },
            ],
            elapsed: Duration::from_millis(1500),
        };

        let value = serde_json::to_value(BatchSummary::from_report(&report)).unwrap();
        assert_eq!(value["compiled"], 1);
        assert_eq!(value["failed"], 1);
        assert_eq!(value["elapsed_secs"], 1.5);
        assert_eq!(value["failures"][0], "/src/bad.scala.html: content is not valid UTF-8");
    }
}
