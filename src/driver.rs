//! Host-integration adapters around the classifier and dispatcher.
//!
//! `build` computes change events itself from the snapshot, `apply` takes them from a host
//! build system, `watch` from the filesystem watcher. All three end up in
//! [`Dispatcher::process`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};

use crate::cache::envelope::{load_snapshot, save_snapshot};
use crate::cache::{diff, record};
use crate::classify::check_outputs;
use crate::compiler::{CommandCompiler, TemplateCompiler};
use crate::config::{Settings, TwirlBuildConfig};
use crate::dispatch::{BatchReport, Dispatcher};
use crate::error::ConfigError;
use crate::output::print_summary;
use crate::source::{ChangeEvent, HostEvent};
use crate::walker::{TemplateFilter, walk_templates};
use crate::watcher::event::WatchEvent;
use crate::watcher::{WatchScope, start_watcher};

/// Settings, compiler and worker pool for one project, resolved once.
pub struct Driver {
    settings: Settings,
    filter: TemplateFilter,
    compiler: Arc<dyn TemplateCompiler>,
    dispatcher: Dispatcher,
}

impl Driver {
    /// Load `twirl-build.toml` from `project_root` and use the configured compiler command.
    pub fn open(project_root: &Path, jobs: Option<usize>) -> Result<Self> {
        let config = TwirlBuildConfig::load(project_root)?;
        let command = config.compiler_command().ok_or(ConfigError::MissingCompiler)?;
        let compiler = CommandCompiler::new(command)?.with_working_dir(project_root);
        Self::with_compiler(project_root, &config, Arc::new(compiler), jobs)
    }

    pub fn with_compiler(
        project_root: &Path,
        config: &TwirlBuildConfig,
        compiler: Arc<dyn TemplateCompiler>,
        jobs: Option<usize>,
    ) -> Result<Self> {
        let settings = config.resolve(project_root, &compiler.default_imports())?;
        let filter = TemplateFilter::from_settings(&settings)?;
        let dispatcher = Dispatcher::new(jobs.unwrap_or(settings.jobs))
            .context("failed to start worker pool")?;
        tracing::debug!(
            sources = ?settings.source_dirs,
            destination = %settings.destination_dir.display(),
            encoding = settings.encoding.name(),
            formats = ?settings.formats.extensions(),
            imports = ?settings.imports,
            workers = dispatcher.workers(),
            "resolved twirl settings"
        );
        Ok(Self {
            settings,
            filter,
            compiler,
            dispatcher,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Stop scheduling units of the running batch.
    pub fn cancel(&self) {
        self.dispatcher.cancel_flag().store(true, Ordering::SeqCst);
    }

    /// Incremental build against the snapshot of the previous run.
    ///
    /// The snapshot is only rewritten when every event could be classified.
    pub fn build(&self, full: bool, verbose: bool) -> Result<BatchReport> {
        let project_root = &self.settings.project_root;
        let templates = walk_templates(&self.settings, &self.filter, verbose)?;
        check_outputs(&templates, &self.settings)?;
        let previous = load_snapshot(project_root);
        let settings_key = self.settings.cache_key();

        let changes = diff(previous.as_ref(), &settings_key, &templates, full);
        tracing::info!(
            templates = templates.len(),
            changes = changes.events.len(),
            "scanned twirl sources"
        );

        let report = self.dispatcher.process(
            changes.events.iter().cloned(),
            &self.settings,
            self.compiler.as_ref(),
        )?;

        let snapshot = record(previous.as_ref(), settings_key, &changes, &report);
        save_snapshot(project_root, &snapshot).context("failed to save change snapshot")?;
        Ok(report)
    }

    /// Run a batch of externally supplied change events.
    pub fn apply(&self, events: Vec<ChangeEvent>) -> Result<BatchReport> {
        Ok(self
            .dispatcher
            .process(events, &self.settings, self.compiler.as_ref())?)
    }

    /// Resolve host events against the configured source roots.
    pub fn resolve_host_events(&self, events: Vec<HostEvent>) -> Result<Vec<ChangeEvent>, ConfigError> {
        events
            .into_iter()
            .map(|e| e.resolve(&self.settings.project_root, &self.settings.source_dirs))
            .collect()
    }

    fn watch_scope(&self) -> WatchScope {
        WatchScope::new(&self.settings, self.filter.clone())
    }
}

/// What a debounced batch of watch events asks for.
enum WatchJob {
    Reload,
    Rescan,
    Apply(Vec<ChangeEvent>),
}

fn plan(batch: Vec<WatchEvent>) -> WatchJob {
    if batch.iter().any(|e| matches!(e, WatchEvent::ConfigChanged)) {
        return WatchJob::Reload;
    }
    if batch.iter().any(|e| matches!(e, WatchEvent::Rescan)) {
        return WatchJob::Rescan;
    }
    WatchJob::Apply(
        batch
            .into_iter()
            .filter_map(|e| match e {
                WatchEvent::Changed(event) => Some(event),
                _ => None,
            })
            .collect(),
    )
}

fn report_watch_batch(report: &BatchReport, json: bool) {
    print_summary(report, json);
    for failure in report.failures() {
        eprintln!("error: {failure}");
    }
}

/// Build once, then rebuild on every change until Ctrl-C.
pub async fn watch(project_root: PathBuf, jobs: Option<usize>, json: bool) -> Result<()> {
    let mut driver = Arc::new(Driver::open(&project_root, jobs)?);
    let mut job = WatchJob::Rescan;

    loop {
        let (_handle, mut rx) = start_watcher(driver.watch_scope())?;
        if !json {
            eprintln!(
                "Watching {} source director{} (Ctrl-C to stop)",
                driver.settings.source_dirs.len(),
                if driver.settings.source_dirs.len() == 1 { "y" } else { "ies" }
            );
        }

        loop {
            let full = matches!(job, WatchJob::Reload);
            let mut task = {
                let driver = Arc::clone(&driver);
                let job = std::mem::replace(&mut job, WatchJob::Apply(Vec::new()));
                tokio::task::spawn_blocking(move || match job {
                    WatchJob::Apply(events) if events.is_empty() => Ok(None),
                    WatchJob::Apply(events) => driver.apply(events).map(Some),
                    WatchJob::Rescan | WatchJob::Reload => driver.build(full, false).map(Some),
                })
            };

            let finished = tokio::select! {
                res = &mut task => Some(res.context("watch batch panicked")?),
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(outcome) = finished else {
                driver.cancel();
                // Units already running finish; their outputs stay consistent.
                let _ = task.await;
                return Ok(());
            };
            match outcome {
                Ok(Some(report)) => report_watch_batch(&report, json),
                Ok(None) => {}
                // Configuration errors (unknown format...) do not end the session; the
                // next change may fix them.
                Err(err) => eprintln!("error: {err:#}"),
            }

            let batch = tokio::select! {
                batch = rx.recv() => batch,
                _ = tokio::signal::ctrl_c() => return Ok(()),
            };
            let Some(batch) = batch else {
                return Ok(());
            };
            job = plan(batch);

            if matches!(job, WatchJob::Reload) {
                match Driver::open(&project_root, jobs) {
                    Ok(reloaded) => {
                        tracing::info!("configuration changed, rebuilding everything");
                        driver = Arc::new(reloaded);
                        // Source roots may have moved: restart the watcher.
                        break;
                    }
                    Err(err) => {
                        eprintln!("error: {err:#}");
                        job = WatchJob::Apply(Vec::new());
                    }
                }
            }
        }
    }
}
