//! Profile batches: reset outputs, scan sources, fan out per file and per size

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, warn};

use crate::config::{Config, OutputSlot, Profile, SizeSpec};
use crate::error::{DerivativeError, Result, TaskFailure};
use crate::processing::naming::{self, FilenameParts, NamingRule};
use crate::processing::{outputs, scan, ProcessingEngine, RenderOutcome, RenderParams, RenderTask, ResizeBackend};

pub mod progress;

pub use progress::*;

/// Lifecycle of one profile batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    ResettingOutputs,
    Scanning,
    Rendering,
    Done,
    Failed,
}

/// Summary of a batch in which every output was written
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub profile: String,
    pub source_directory: PathBuf,
    pub files: Vec<String>,
    /// Entries deleted while resetting the output directories
    pub entries_removed: usize,
    /// Written outputs, sorted by path
    pub outputs: Vec<RenderOutcome>,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn total_output_size(&self) -> u64 {
        self.outputs.iter().map(|o| o.file_size).sum()
    }
}

type TaskResult = std::result::Result<RenderOutcome, TaskFailure>;

/// Runs any [`Profile`] against a shared, immutable [`Config`]
pub struct BatchRunner {
    config: Arc<Config>,
    engine: ProcessingEngine,
    gate: Option<Arc<Semaphore>>,
    progress: Arc<ProgressTracker>,
}

impl BatchRunner {
    /// Runner rendering with the `image` crate backend
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_engine(config, ProcessingEngine::new())
    }

    pub fn with_backend(config: Arc<Config>, backend: Arc<dyn ResizeBackend>) -> Self {
        Self::with_engine(config, ProcessingEngine::with_backend(backend))
    }

    fn with_engine(config: Arc<Config>, engine: ProcessingEngine) -> Self {
        Self {
            config,
            engine,
            gate: None,
            progress: Arc::new(ProgressTracker::new()),
        }
    }

    /// Allow at most `limit` renders in flight. Unbounded by default.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        info!("Limiting concurrent renders to {}", limit);
        self.gate = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    /// Run one profile batch to completion.
    ///
    /// Every file and every size is attempted even when siblings fail; the
    /// outcome is decided once all of them have finished.
    pub async fn run(&self, profile: &Profile) -> Result<BatchReport> {
        let start_time = Instant::now();
        let mut state = BatchState::Idle;

        let result = self.execute(profile, &mut state, start_time).await;
        let snapshot = self.progress.finish();
        debug!(
            "{}: {} of {} planned output(s) finished",
            profile,
            snapshot.finished(),
            snapshot.planned
        );

        match result {
            Ok(report) => {
                transition(profile, &mut state, BatchState::Done);
                info!(
                    "{}: {} output(s) for {} file(s) in {:.2}s",
                    profile,
                    report.outputs.len(),
                    report.files.len(),
                    start_time.elapsed().as_secs_f64()
                );
                Ok(report)
            }
            Err(e) => {
                let from = state;
                transition(profile, &mut state, BatchState::Failed);
                let path = e.file_path().cloned();
                if e.is_batch_fatal() {
                    error!(path = ?path, "{} aborted during {:?}: {}", profile, from, e);
                } else {
                    error!(path = ?path, "{} failed during {:?}: {}", profile, from, e);
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        profile: &Profile,
        state: &mut BatchState,
        start_time: Instant,
    ) -> Result<BatchReport> {
        if let Profile::Resize(request) = profile {
            request.validate()?;
        }

        let tables = &self.config.profiles;
        let paths = &self.config.paths;
        let slots = profile.slots(tables, paths);

        transition(profile, state, BatchState::ResettingOutputs);
        let entries_removed = self.reset_outputs(profile.reset_dirs(tables, paths)).await?;

        transition(profile, state, BatchState::Scanning);
        let batch = scan::resolve(&paths.source_root, profile.src()).await?;
        if matches!(profile, Profile::Resize(_)) && batch.directory == paths.source_root.join(profile.src()) {
            return Err(DerivativeError::invalid_parameters(format!(
                "resize needs a single file, {:?} is a directory",
                profile.src()
            )));
        }
        if batch.files.is_empty() {
            warn!("{}: nothing to do in {:?}", profile, batch.directory);
        }

        transition(profile, state, BatchState::Rendering);
        self.progress.start(profile.name(), batch.files.len() * slots.len());

        let per_file = batch
            .files
            .iter()
            .map(|file| self.render_file(profile, &batch.directory, file, &slots));
        let results = join_all(per_file).await;

        let mut rendered = Vec::new();
        let mut failures = Vec::new();
        for result in results.into_iter().flatten() {
            match result {
                Ok(outcome) => rendered.push(outcome),
                Err(failure) => failures.push(failure),
            }
        }

        if !failures.is_empty() {
            return Err(DerivativeError::BatchFailed {
                profile: profile.name().to_string(),
                rendered: rendered.len(),
                failures,
            });
        }

        rendered.sort_by(|a, b| a.output_path.cmp(&b.output_path));
        Ok(BatchReport {
            profile: profile.name().to_string(),
            source_directory: batch.directory,
            files: batch.files,
            entries_removed,
            outputs: rendered,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    /// Reset every directory concurrently; the first failure is returned
    /// after all resets have finished
    async fn reset_outputs(&self, directories: Vec<PathBuf>) -> Result<usize> {
        let results = join_all(directories.iter().map(|dir| outputs::reset(dir))).await;

        let mut removed = 0;
        let mut first_error = None;
        for (dir, result) in directories.iter().zip(results) {
            match result {
                Ok(count) => removed += count,
                Err(e) => {
                    error!("Cannot reset {:?}: {}", dir, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Everything one input file contributes to the batch
    async fn render_file(
        &self,
        profile: &Profile,
        directory: &Path,
        file: &str,
        slots: &[OutputSlot],
    ) -> Vec<TaskResult> {
        let tasks = match self.plan_file(profile, directory, file, slots).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("{}: {}", file, e);
                self.progress.output_failed(file, None, e.to_string(), slots.len());
                return vec![Err(TaskFailure {
                    input: file.to_string(),
                    output: None,
                    message: e.to_string(),
                })];
            }
        };

        join_all(tasks.into_iter().map(|task| self.render_task(profile, file, task))).await
    }

    /// Load and decode the source once and build one task per slot
    async fn plan_file(
        &self,
        profile: &Profile,
        directory: &Path,
        file: &str,
        slots: &[OutputSlot],
    ) -> Result<Vec<RenderTask>> {
        let parts = naming::split(file)?;
        let path = directory.join(file);
        let data = self.engine.load_source(directory, file).await?;

        let source_width = if slots.iter().any(|slot| slot.size.needs_source_width()) {
            Some(self.engine.query_width(&data, &path).await?)
        } else {
            None
        };
        let source = self.engine.decode(&data, &path).await?;

        slots
            .iter()
            .map(|slot| -> Result<RenderTask> {
                let width = slot.size.target_width(source_width)?;
                Ok(RenderTask {
                    source: Arc::clone(&source),
                    params: render_params(profile, width),
                    output_directory: slot.directory.clone(),
                    output_filename: output_filename(profile, &parts, &slot.size),
                })
            })
            .collect()
    }

    async fn render_task(&self, profile: &Profile, input: &str, task: RenderTask) -> TaskResult {
        let output_path = task.output_path();

        match self.execute_task(profile, task).await {
            Ok(outcome) => {
                debug!("{} -> {:?} in {:?}", input, outcome.output_path, outcome.processing_time);
                self.progress.output_rendered(outcome.output_path.clone());
                Ok(outcome)
            }
            Err(e) => {
                warn!("{} -> {:?}: {}", input, output_path, e);
                self.progress
                    .output_failed(input, Some(output_path.clone()), e.to_string(), 1);
                Err(TaskFailure {
                    input: input.to_string(),
                    output: Some(output_path),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn execute_task(&self, profile: &Profile, task: RenderTask) -> Result<RenderOutcome> {
        let _permit = self.acquire().await?;

        if matches!(profile, Profile::Resize(_)) {
            outputs::remove_stale(task.output_path()).await?;
        }

        self.engine.render(task).await
    }

    async fn acquire(&self) -> Result<Option<SemaphorePermit<'_>>> {
        match &self.gate {
            Some(gate) => gate
                .acquire()
                .await
                .map(Some)
                .map_err(|e| DerivativeError::system(format!("Concurrency gate closed: {}", e))),
            None => Ok(None),
        }
    }
}

fn transition(profile: &Profile, state: &mut BatchState, next: BatchState) {
    debug!("{}: {:?} -> {:?}", profile, state, next);
    info!("{}: {:?}", profile, next);
    *state = next;
}

fn render_params(profile: &Profile, width: u32) -> RenderParams {
    match profile {
        Profile::Resize(request) => RenderParams {
            width,
            height: request.height,
            position: request.position,
        },
        _ => RenderParams::width(width),
    }
}

fn output_filename(profile: &Profile, parts: &FilenameParts, size: &SizeSpec) -> String {
    if let Profile::Resize(request) = profile {
        if let Some(filename) = &request.filename {
            return filename.clone();
        }
    }

    match (profile.naming_rule(), size) {
        (NamingRule::Ratio, SizeSpec::Ratio(ratio)) => {
            naming::build_ratio_name(&parts.basename, &parts.extension, *ratio)
        }
        (NamingRule::Labeled, SizeSpec::Breakpoint(bp)) => {
            naming::build_labeled_name(&parts.basename, &parts.extension, &bp.label)
        }
        _ => naming::build_plain_name(&parts.basename, &parts.extension),
    }
}
