//! Parallel ingestion of a run directory.
//!
//! One task per engine tag is queued on a bounded worker pool. A task owns
//! its tag's whole file set: it resolves the decoder for the run's chip,
//! parses the files in slice order, derives the task_time table for
//! scheduler logs and writes everything through its own store connection.
//! Tasks share nothing mutable; the store serializes their commits.

use std::collections::BTreeMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;

use log::{debug, info, warn};
use workerpool::thunk::{Thunk, ThunkWorker};
use workerpool::Pool;

use crate::chip::ChipDispatcher;
use crate::config::{IngestConfig, RunContext};
use crate::decode::{Decoder, EngineTag, TimedRecord};
use crate::error::{ConfigurationDefect, FileDecodeError, StorageError, TaskError};
use crate::parser::{parse, FileSet};
use crate::sqlite::{StorageBatch, StorageSink, Table};
use crate::task_time::TaskTimeBuilder;

/// Run-wide cancellation flag. Cancelling stops new tasks from starting;
/// tasks already running finish and commit.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Succeeded,
    Failed(String),
    Skipped(String),
}

/// Outcome of one engine tag's task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub tag: EngineTag,
    pub status: TaskStatus,
    pub files: usize,
    pub records: usize,
    pub trailing_fragment_bytes: usize,
    pub warnings: usize,
    pub unmatched_tasks: usize,
    pub rows: BTreeMap<Table, usize>,
}

impl TaskReport {
    fn new(tag: EngineTag) -> Self {
        Self {
            tag,
            status: TaskStatus::Succeeded,
            files: 0,
            records: 0,
            trailing_fragment_bytes: 0,
            warnings: 0,
            unmatched_tasks: 0,
            rows: BTreeMap::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tasks: BTreeMap<EngineTag, TaskReport>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn failed(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .values()
            .filter(|r| matches!(r.status, TaskStatus::Failed(_)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .values()
            .filter(|r| matches!(r.status, TaskStatus::Skipped(_)))
    }

    pub fn total_rows(&self) -> usize {
        self.tasks.values().flat_map(|r| r.rows.values()).sum()
    }
}

pub struct Orchestrator {
    ctx: Arc<RunContext>,
    config: IngestConfig,
    dispatcher: Arc<ChipDispatcher>,
    cancel: CancelToken,
}

impl Orchestrator {
    /// Validates the decoder tables before anything is read.
    pub fn new(ctx: RunContext, config: IngestConfig) -> Result<Self, ConfigurationDefect> {
        let dispatcher = ChipDispatcher::new()?;
        Ok(Self {
            ctx: Arc::new(ctx),
            config,
            dispatcher: Arc::new(dispatcher),
            cancel: CancelToken::new(),
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Ingest every file set and wait for all tasks.
    ///
    /// Fails only if the store cannot be opened for the run metadata; task
    /// failures are reported per tag in the summary.
    ///
    /// With an error budget, each failed task is counted before its report
    /// is returned, so a task queued after the budget is exceeded is
    /// skipped rather than started.
    pub fn run(
        &self,
        file_sets: BTreeMap<EngineTag, FileSet>,
    ) -> Result<RunSummary, StorageError> {
        let mut sink = StorageSink::open(&self.ctx.store_path, &self.config.store)?;
        sink.write_metadata(&self.ctx)?;
        drop(sink);

        let jobs = file_sets.len();
        let pool = Pool::<ThunkWorker<TaskReport>>::new(self.config.workers.max(1));
        let (tx, rx) = channel();
        let failures = Arc::new(AtomicUsize::new(0));

        for (tag, files) in file_sets {
            let ctx = self.ctx.clone();
            let dispatcher = self.dispatcher.clone();
            let cancel = self.cancel.clone();
            let config = self.config.clone();
            let failures = failures.clone();
            pool.execute_to(
                tx.clone(),
                Thunk::of(move || {
                    let job = Job {
                        tag,
                        files,
                        ctx: &ctx,
                        dispatcher: &dispatcher,
                        config: &config,
                        cancel: &cancel,
                    };
                    let report = match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
                        Ok(report) => report,
                        Err(payload) => {
                            let err = TaskError::Panicked(panic_message(payload.as_ref()));
                            let mut report = TaskReport::new(tag);
                            report.status = TaskStatus::Failed(err.to_string());
                            report
                        }
                    };
                    if matches!(report.status, TaskStatus::Failed(_)) {
                        charge_budget(&failures, config.error_budget, &cancel);
                    }
                    report
                }),
            );
        }
        drop(tx);

        let mut summary = RunSummary::default();
        for report in rx.iter().take(jobs) {
            match &report.status {
                TaskStatus::Succeeded => info!(
                    "{}: {} records from {} files, {} rows",
                    report.tag,
                    report.records,
                    report.files,
                    report.rows.values().sum::<usize>()
                ),
                TaskStatus::Skipped(reason) => warn!("{}: skipped: {}", report.tag, reason),
                TaskStatus::Failed(reason) => warn!("{}: failed: {}", report.tag, reason),
            }
            summary.tasks.insert(report.tag, report);
        }
        pool.join();

        summary.cancelled = self.cancel.is_cancelled();
        Ok(summary)
    }
}

struct Job<'a> {
    tag: EngineTag,
    files: FileSet,
    ctx: &'a RunContext,
    dispatcher: &'a ChipDispatcher,
    config: &'a IngestConfig,
    cancel: &'a CancelToken,
}

impl Job<'_> {
    fn run(&self) -> TaskReport {
        let mut report = TaskReport::new(self.tag);
        if self.cancel.is_cancelled() {
            report.status = TaskStatus::Skipped("run cancelled".to_string());
            return report;
        }
        let decoder = match self.dispatcher.resolve(self.ctx.chip, self.tag) {
            Ok(decoder) => decoder,
            Err(err) => {
                report.status = TaskStatus::Skipped(err.to_string());
                return report;
            }
        };
        if let Err(err) = self.ingest(decoder, &mut report) {
            report.status = TaskStatus::Failed(err.to_string());
        }
        report
    }

    fn ingest(&self, decoder: Decoder, report: &mut TaskReport) -> Result<(), TaskError> {
        let reconciler = &self.ctx.reconciler;
        let mut records: Vec<TimedRecord> = Vec::new();

        for file in &self.files.files {
            let bytes = fs::read(&file.path).map_err(|source| TaskError::Io {
                path: file.path.clone(),
                source,
            })?;
            let parsed = parse(&bytes, file.device, decoder, reconciler).map_err(|failure| {
                FileDecodeError {
                    path: file.path.clone(),
                    offset: failure.offset,
                    source: failure.error,
                }
            })?;

            debug!(
                "{}: {} records",
                file.path.display(),
                parsed.records.len()
            );
            if parsed.trailing_fragment > 0 {
                warn!(
                    "{}: ignoring {} trailing bytes",
                    file.path.display(),
                    parsed.trailing_fragment
                );
            }
            if !parsed.warnings.is_empty() {
                warn!(
                    "{}: {} timestamps outside the run bounds",
                    file.path.display(),
                    parsed.warnings.len()
                );
            }
            report.files += 1;
            report.records += parsed.records.len();
            report.trailing_fragment_bytes += parsed.trailing_fragment;
            report.warnings += parsed.warnings.len();
            records.extend(parsed.records);
        }

        let mut batch = StorageBatch::new();
        if self.tag == EngineTag::StarsLog {
            let mut builder = TaskTimeBuilder::new();
            builder.extend(&records);
            let mut warnings = Vec::new();
            let task_time = builder.finish(reconciler, &mut warnings);
            if !warnings.is_empty() {
                warn!(
                    "{}: {} task_time spans outside the run bounds",
                    self.tag,
                    warnings.len()
                );
            }
            report.warnings += warnings.len();
            report.unmatched_tasks = task_time.unmatched_starts + task_time.unmatched_ends;
            batch.include(Table::TaskTime);
            batch.extend(task_time.records);
        }
        batch.extend(records);

        if batch.is_empty() {
            return Ok(());
        }
        let mut sink = StorageSink::open(&self.ctx.store_path, &self.config.store)?;
        report.rows = sink.persist_batch(batch)?;
        Ok(())
    }
}

/// Count one failed task and trip `cancel` once the count exceeds `budget`.
fn charge_budget(failures: &AtomicUsize, budget: Option<usize>, cancel: &CancelToken) {
    let failed = failures.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(budget) = budget {
        if failed > budget && !cancel.is_cancelled() {
            warn!(
                "{} tasks failed, over the budget of {}; cancelling",
                failed, budget
            );
            cancel.cancel();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
