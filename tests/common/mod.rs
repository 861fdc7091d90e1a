//! Common helpers for devtrace integration tests.
//!
//! Builds run directories with synthetic little-endian trace slices and a
//! `run_info.json`, and opens the resulting store for assertions.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tempfile::TempDir;

use devtrace::{
    EngineTag, FileSet, IngestConfig, Orchestrator, RunContext, RunDescriptor, RunSummary,
};

pub struct TestRun {
    pub dir: TempDir,
}

impl TestRun {
    /// A run directory whose clock maps `reference_cycle` to
    /// `reference_wall_ns` at `cycles_per_us`.
    pub fn new(
        chip: &str,
        reference_cycle: u64,
        reference_wall_ns: i64,
        cycles_per_us: f64,
    ) -> Self {
        Self::with_descriptor(format!(
            r#"{{
                "chip": "{chip}",
                "reference_cycle_count": {reference_cycle},
                "reference_wall_time_ns": {reference_wall_ns},
                "cycles_per_microsecond": {cycles_per_us}
            }}"#
        ))
    }

    /// Like [`TestRun::simple`], with the run recorded between `start_ns`
    /// and `end_ns`.
    pub fn with_bounds(chip: &str, start_ns: i64, end_ns: i64) -> Self {
        Self::with_descriptor(format!(
            r#"{{
                "chip": "{chip}",
                "reference_cycle_count": 0,
                "reference_wall_time_ns": 0,
                "cycles_per_microsecond": 1.0,
                "run_start_ns": {start_ns},
                "run_end_ns": {end_ns}
            }}"#
        ))
    }

    fn with_descriptor(descriptor: String) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(dir.path().join("run_info.json"), descriptor)
            .expect("Failed to write run_info.json");
        Self { dir }
    }

    /// One cycle per microsecond, cycle 0 at wall time 0.
    pub fn simple(chip: &str) -> Self {
        Self::new(chip, 0, 0, 1.0)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_slice(&self, prefix: &str, slice: u32, bytes: &[u8]) -> PathBuf {
        self.write_device_slice(prefix, 0, slice, bytes)
    }

    pub fn write_device_slice(
        &self,
        prefix: &str,
        device: u32,
        slice: u32,
        bytes: &[u8],
    ) -> PathBuf {
        let path = self.path().join(format!("{prefix}.data.{device}.slice_{slice}"));
        fs::write(&path, bytes).expect("Failed to write slice");
        path
    }

    pub fn ingest(&self) -> RunSummary {
        self.ingest_with(IngestConfig::default())
    }

    pub fn ingest_with(&self, config: IngestConfig) -> RunSummary {
        let files = FileSet::discover(self.path()).expect("Failed to discover files");
        self.ingest_files(config, files)
    }

    /// Ingest an explicit file map, which may name files that do not exist.
    pub fn ingest_files(
        &self,
        config: IngestConfig,
        files: BTreeMap<EngineTag, FileSet>,
    ) -> RunSummary {
        let descriptor = RunDescriptor::load(self.path()).expect("Failed to load descriptor");
        let ctx = RunContext::new(self.path(), &descriptor, &config).expect("Bad descriptor");
        let orchestrator = Orchestrator::new(ctx, config).expect("Bad decoder tables");
        orchestrator.run(files).expect("Failed to open store")
    }

    pub fn store(&self) -> Connection {
        Connection::open(IngestConfig::default().store_path(self.path()))
            .expect("Failed to open store")
    }
}

pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("Failed to count rows")
}

pub fn table_exists(conn: &Connection, table: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .expect("Failed to query sqlite_master")
        > 0
}

/// 24-byte block log record.
pub fn block_log(task_id: u16, start_cycle: u64, duration: u32) -> Vec<u8> {
    let mut raw = Vec::with_capacity(24);
    raw.extend_from_slice(&1u16.to_le_bytes()); // stream_id
    raw.extend_from_slice(&task_id.to_le_bytes());
    raw.extend_from_slice(&0u16.to_le_bytes()); // block_id
    raw.extend_from_slice(&0u16.to_le_bytes()); // context_id
    raw.extend_from_slice(&start_cycle.to_le_bytes());
    raw.extend_from_slice(&duration.to_le_bytes());
    raw.extend_from_slice(&[0, 0, 3, 0]); // task type, core type, core id, reserved
    raw
}

pub const TASK_START: u8 = 0;
pub const TASK_END: u8 = 1;

/// 32-byte gen4 scheduler log record.
pub fn stars_log(func_type: u8, core_id: u16, task_id: u16, sys_cycle: u64) -> Vec<u8> {
    let head = u16::from(func_type & 0x3f) | (core_id << 6);
    let mut raw = Vec::with_capacity(32);
    raw.extend_from_slice(&head.to_le_bytes());
    raw.extend_from_slice(&7u16.to_le_bytes()); // stream_id
    raw.extend_from_slice(&task_id.to_le_bytes());
    raw.extend_from_slice(&[0, 0]); // sqe_type, reserved
    raw.extend_from_slice(&sys_cycle.to_le_bytes());
    raw.extend_from_slice(&1u32.to_le_bytes()); // block_num
    raw.extend_from_slice(&[0; 12]);
    raw
}

/// 64-byte communication record of the op kind, declaring `item_len`.
pub fn hccl_op(item_len: u16, start_cycle: u64, end_cycle: u64) -> Vec<u8> {
    let mut raw = Vec::with_capacity(64);
    raw.extend_from_slice(&0x6868u16.to_le_bytes()); // magic
    raw.extend_from_slice(&item_len.to_le_bytes());
    raw.extend_from_slice(&0u16.to_le_bytes()); // item_type: op
    raw.extend_from_slice(&1u16.to_le_bytes()); // level
    raw.extend_from_slice(&start_cycle.to_le_bytes());
    raw.extend_from_slice(&end_cycle.to_le_bytes());
    raw.extend_from_slice(&42u64.to_le_bytes()); // item_id
    raw.extend_from_slice(&[0; 32]);
    raw
}

/// 32-byte memory usage sample.
pub fn npu_mem(sys_cycle: u64, hbm_used: u64) -> Vec<u8> {
    let mut raw = Vec::with_capacity(32);
    raw.extend_from_slice(&sys_cycle.to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes()); // device_id
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&hbm_used.to_le_bytes());
    raw.extend_from_slice(&0u64.to_le_bytes());
    raw
}

/// 32-byte QoS bandwidth sample.
pub fn qos(sys_cycle: u64) -> Vec<u8> {
    let mut raw = Vec::with_capacity(32);
    raw.extend_from_slice(&sys_cycle.to_le_bytes());
    raw.extend_from_slice(&[1, 5, 0, 0]); // mode, qos_count, reserved
    for bw in [10u32, 20, 30, 40, 50] {
        raw.extend_from_slice(&bw.to_le_bytes());
    }
    raw
}
