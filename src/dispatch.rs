use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::action::{UnitOutcome, WorkUnit};
use crate::classify::classify;
use crate::compiler::TemplateCompiler;
use crate::config::Settings;
use crate::error::{BatchError, ConfigError, UnitError};
use crate::source::{ChangeEvent, SourceFile};

/// How one unit ended.
#[derive(Debug)]
pub enum UnitStatus {
    Done(UnitOutcome),
    Failed(UnitError),
    /// Not started because the batch was cancelled.
    Skipped,
}

#[derive(Debug)]
pub struct UnitResult {
    pub source: SourceFile,
    pub removal: bool,
    pub status: UnitStatus,
}

/// Everything that happened in one batch, failures included.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<UnitResult>,
    pub elapsed: Duration,
}

/// Counts for the summary line / JSON output.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub compiled: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub already_absent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &UnitError> {
        self.results.iter().filter_map(|r| match &r.status {
            UnitStatus::Failed(err) => Some(err),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn stats(&self) -> BatchStats {
        let mut stats = BatchStats::default();
        for result in &self.results {
            match &result.status {
                UnitStatus::Done(UnitOutcome::Compiled(_)) => stats.compiled += 1,
                UnitStatus::Done(UnitOutcome::Unchanged(_)) => stats.unchanged += 1,
                UnitStatus::Done(UnitOutcome::Deleted(_)) => stats.deleted += 1,
                UnitStatus::Done(UnitOutcome::AlreadyAbsent(_) | UnitOutcome::NoOutput) => {
                    stats.already_absent += 1
                }
                UnitStatus::Skipped => stats.skipped += 1,
                UnitStatus::Failed(_) => stats.failed += 1,
            }
        }
        stats
    }

    /// Collapse into a single error listing every failed unit, if any failed.
    pub fn into_result(self) -> Result<BatchStats, BatchError> {
        let stats = self.stats();
        let failures: Vec<UnitError> = self
            .results
            .into_iter()
            .filter_map(|r| match r.status {
                UnitStatus::Failed(err) => Some(err),
                _ => None,
            })
            .collect();
        if failures.is_empty() {
            Ok(stats)
        } else {
            Err(BatchError { failures })
        }
    }
}

/// Runs units of work on a dedicated worker pool.
///
/// Every unit runs to completion regardless of how its siblings fare: errors and panics are
/// captured per unit and reported together once the whole batch is done.
pub struct Dispatcher {
    pool: rayon::ThreadPool,
    cancelled: Arc<AtomicBool>,
}

impl Dispatcher {
    /// `jobs == 0` sizes the pool to the available parallelism.
    pub fn new(jobs: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("twirl-worker-{i}"))
            .build()?;
        Ok(Self {
            pool,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Shared flag; once set, units that have not started are skipped.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Classify `events` and run the resulting units.
    ///
    /// A configuration error aborts before any unit is scheduled.
    pub fn process<I>(
        &self,
        events: I,
        settings: &Settings,
        compiler: &dyn TemplateCompiler,
    ) -> Result<BatchReport, ConfigError>
    where
        I: IntoIterator<Item = ChangeEvent>,
    {
        let units = classify(events, settings)?;
        Ok(self.run(units, compiler))
    }

    /// Run every unit and wait for all of them.
    pub fn run(&self, units: Vec<WorkUnit>, compiler: &dyn TemplateCompiler) -> BatchReport {
        let started = Instant::now();
        let results: Vec<UnitResult> = self.pool.install(|| {
            units
                .into_par_iter()
                .map(|unit| self.run_one(unit, compiler))
                .collect()
        });
        let report = BatchReport {
            results,
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            units = report.results.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch finished"
        );
        report
    }

    fn run_one(&self, unit: WorkUnit, compiler: &dyn TemplateCompiler) -> UnitResult {
        let removal = matches!(unit, WorkUnit::Delete(_));
        if self.cancelled.load(Ordering::Relaxed) {
            return UnitResult {
                source: unit.source().clone(),
                removal,
                status: UnitStatus::Skipped,
            };
        }

        let status = match panic::catch_unwind(AssertUnwindSafe(|| unit.run(compiler))) {
            Ok(Ok(outcome)) => UnitStatus::Done(outcome),
            Ok(Err(err)) => {
                tracing::error!(error = %err, "twirl template failed");
                UnitStatus::Failed(err)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(source = %unit.source(), %message, "twirl worker panicked");
                UnitStatus::Failed(UnitError::Panicked {
                    file: unit.source().path(),
                    message,
                })
            }
        };
        UnitResult {
            source: unit.source().clone(),
            removal,
            status,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
