//! devtrace - offline ingestion of NPU device trace files.
//!
//! A run directory holds binary trace files written by the device agents,
//! one family per hardware engine, plus a `run_info.json` describing the chip
//! and the clock reference. This library decodes those files with the
//! layout matching the chip generation, converts device cycle counters to
//! host wall-clock time and stores the result in a per-run SQLite database.
//!
//! # Example
//!
//! ```no_run
//! use devtrace::{FileSet, IngestConfig, Orchestrator, RunContext, RunDescriptor};
//! use std::path::Path;
//!
//! let run_dir = Path::new("./run");
//! let config = IngestConfig::default();
//! let descriptor = RunDescriptor::load(run_dir).expect("Failed to load run descriptor");
//! let ctx = RunContext::new(run_dir, &descriptor, &config).expect("Bad clock reference");
//! let orchestrator = Orchestrator::new(ctx, config).expect("Bad decoder tables");
//! let files = FileSet::discover(run_dir).expect("Failed to list run directory");
//! let summary = orchestrator.run(files).expect("Failed to open store");
//! println!("{} rows", summary.total_rows());
//! ```

pub mod chip;
pub mod config;
pub mod decode;
pub mod error;
pub mod layout;
pub mod orchestrator;
pub mod parser;
pub mod sqlite;
pub mod task_time;
pub mod timebase;

pub use chip::{ChipDispatcher, ChipGeneration};
pub use config::{IngestConfig, RunContext, RunDescriptor, StoreOptions};
pub use decode::{Decoder, EngineTag, Record, TimedRecord};
pub use error::{ConfigurationDefect, DecodeError, DispatchError, StorageError, TaskError};
pub use orchestrator::{CancelToken, Orchestrator, RunSummary, TaskReport, TaskStatus};
pub use parser::{parse, FileSet};
pub use timebase::{TimeBaseReconciler, TimeBaseReference};
