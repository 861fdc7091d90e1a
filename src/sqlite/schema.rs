//! SQL schema for the per-run device trace store
//!
//! One table per record kind. Columns are the device the slice file came
//! from, the decoded fields in layout order, then the derived wall-clock
//! columns. Unsigned 64-bit device values
//! are stored bit-for-bit in SQLite's signed INTEGER.

use rusqlite::types::Value;

use crate::decode::{HcclDetail, Record, TimedRecord};

pub const SCHEMA_VERSION: i32 = 1;

/// Connection-level settings applied whenever the store is opened.
pub const STORE_PRAGMAS: &str = r#"
-- Write-ahead logging lets readers run while one worker commits
PRAGMA journal_mode = WAL;

-- Normal synchronous mode is safe with WAL and much faster
PRAGMA synchronous = NORMAL;

-- Keep temp tables in memory
PRAGMA temp_store = MEMORY;
"#;

/// Run-level metadata, a single row.
pub const METADATA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    chip TEXT NOT NULL,
    reference_cycle INTEGER NOT NULL,
    reference_wall_ns INTEGER NOT NULL,
    cycles_per_us REAL NOT NULL,
    run_start_ns INTEGER,
    run_end_ns INTEGER,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

const BLOCK_LOG_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS block_log (
    device_id INTEGER NOT NULL,
    stream_id INTEGER NOT NULL,
    task_id INTEGER NOT NULL,
    block_id INTEGER NOT NULL,
    context_id INTEGER NOT NULL,
    start_cycle INTEGER NOT NULL,
    duration_cycles INTEGER NOT NULL,
    device_task_type INTEGER NOT NULL,
    core_type INTEGER NOT NULL,
    core_id INTEGER NOT NULL,
    start_ns INTEGER,
    end_ns INTEGER
);
"#;

const STARS_LOG_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS stars_log (
    device_id INTEGER NOT NULL,
    func_type INTEGER NOT NULL,
    core_id INTEGER NOT NULL,
    stream_id INTEGER NOT NULL,
    task_id INTEGER NOT NULL,
    sqe_type INTEGER NOT NULL,
    sys_cycle INTEGER NOT NULL,
    block_num INTEGER NOT NULL,
    start_ns INTEGER
);
"#;

const AI_CPU_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ai_cpu (
    device_id INTEGER NOT NULL,
    magic INTEGER NOT NULL,
    stream_id INTEGER NOT NULL,
    task_id INTEGER NOT NULL,
    thread_id INTEGER,
    kernel_type INTEGER,
    cpu_id INTEGER,
    start_cycle INTEGER NOT NULL,
    end_cycle INTEGER NOT NULL,
    dispatch_cycle INTEGER NOT NULL,
    queue_cycle INTEGER,
    total_ops INTEGER,
    start_ns INTEGER,
    end_ns INTEGER
);
"#;

const QOS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS qos (
    device_id INTEGER NOT NULL,
    sys_cycle INTEGER NOT NULL,
    mode INTEGER NOT NULL,
    qos_count INTEGER NOT NULL,
    bandwidth_0 INTEGER NOT NULL,
    bandwidth_1 INTEGER NOT NULL,
    bandwidth_2 INTEGER NOT NULL,
    bandwidth_3 INTEGER NOT NULL,
    bandwidth_4 INTEGER NOT NULL,
    start_ns INTEGER
);
"#;

// Op columns and task columns are mutually exclusive; `payload` is only set
// for item types this crate does not understand.
const HCCL_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS hccl (
    device_id INTEGER NOT NULL,
    magic INTEGER NOT NULL,
    item_type INTEGER NOT NULL,
    level INTEGER NOT NULL,
    start_cycle INTEGER NOT NULL,
    end_cycle INTEGER NOT NULL,
    item_id INTEGER NOT NULL,
    group_id INTEGER,
    count INTEGER,
    data_type INTEGER,
    op_kind INTEGER,
    plane_id INTEGER,
    src_rank INTEGER,
    dst_rank INTEGER,
    transport INTEGER,
    link_type INTEGER,
    size INTEGER,
    payload BLOB,
    start_ns INTEGER,
    end_ns INTEGER
);
"#;

const NPU_MEM_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS npu_mem (
    device_id INTEGER NOT NULL,
    sys_cycle INTEGER NOT NULL,
    reported_device_id INTEGER NOT NULL,
    hbm_used INTEGER NOT NULL,
    ddr_used INTEGER NOT NULL,
    start_ns INTEGER
);
"#;

const TASK_TIME_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS task_time (
    device_id INTEGER NOT NULL,
    stream_id INTEGER NOT NULL,
    task_id INTEGER NOT NULL,
    core_id INTEGER NOT NULL,
    start_cycle INTEGER NOT NULL,
    end_cycle INTEGER NOT NULL,
    start_ns INTEGER,
    end_ns INTEGER,
    duration_ns INTEGER
);
"#;

/// What happens to rows left by an earlier run when a batch is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Keep existing rows and add the batch (log-like tables).
    Append,
    /// Drop existing rows and write the batch (summary tables).
    Replace,
}

/// Destination tables of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    BlockLog,
    StarsLog,
    AiCpu,
    Qos,
    Hccl,
    NpuMem,
    TaskTime,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::BlockLog,
        Table::StarsLog,
        Table::AiCpu,
        Table::Qos,
        Table::Hccl,
        Table::NpuMem,
        Table::TaskTime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::BlockLog => "block_log",
            Table::StarsLog => "stars_log",
            Table::AiCpu => "ai_cpu",
            Table::Qos => "qos",
            Table::Hccl => "hccl",
            Table::NpuMem => "npu_mem",
            Table::TaskTime => "task_time",
        }
    }

    pub fn policy(&self) -> WritePolicy {
        match self {
            Table::TaskTime => WritePolicy::Replace,
            _ => WritePolicy::Append,
        }
    }

    pub fn create_sql(&self) -> &'static str {
        match self {
            Table::BlockLog => BLOCK_LOG_SQL,
            Table::StarsLog => STARS_LOG_SQL,
            Table::AiCpu => AI_CPU_SQL,
            Table::Qos => QOS_SQL,
            Table::Hccl => HCCL_SQL,
            Table::NpuMem => NPU_MEM_SQL,
            Table::TaskTime => TASK_TIME_SQL,
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::BlockLog => &[
                "device_id",
                "stream_id",
                "task_id",
                "block_id",
                "context_id",
                "start_cycle",
                "duration_cycles",
                "device_task_type",
                "core_type",
                "core_id",
                "start_ns",
                "end_ns",
            ],
            Table::StarsLog => &[
                "device_id",
                "func_type",
                "core_id",
                "stream_id",
                "task_id",
                "sqe_type",
                "sys_cycle",
                "block_num",
                "start_ns",
            ],
            Table::AiCpu => &[
                "device_id",
                "magic",
                "stream_id",
                "task_id",
                "thread_id",
                "kernel_type",
                "cpu_id",
                "start_cycle",
                "end_cycle",
                "dispatch_cycle",
                "queue_cycle",
                "total_ops",
                "start_ns",
                "end_ns",
            ],
            Table::Qos => &[
                "device_id",
                "sys_cycle",
                "mode",
                "qos_count",
                "bandwidth_0",
                "bandwidth_1",
                "bandwidth_2",
                "bandwidth_3",
                "bandwidth_4",
                "start_ns",
            ],
            Table::Hccl => &[
                "device_id",
                "magic",
                "item_type",
                "level",
                "start_cycle",
                "end_cycle",
                "item_id",
                "group_id",
                "count",
                "data_type",
                "op_kind",
                "plane_id",
                "src_rank",
                "dst_rank",
                "transport",
                "link_type",
                "size",
                "payload",
                "start_ns",
                "end_ns",
            ],
            Table::NpuMem => &[
                "device_id",
                "sys_cycle",
                "reported_device_id",
                "hbm_used",
                "ddr_used",
                "start_ns",
            ],
            Table::TaskTime => &[
                "device_id",
                "stream_id",
                "task_id",
                "core_id",
                "start_cycle",
                "end_cycle",
                "start_ns",
                "end_ns",
                "duration_ns",
            ],
        }
    }

    pub fn insert_sql(&self) -> String {
        let columns = self.columns();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name(),
            columns.join(", "),
            placeholders.join(", ")
        )
    }
}

fn int(v: impl Into<i64>) -> Value {
    Value::Integer(v.into())
}

// Device counters and hashes are u64; keep the bit pattern.
fn u64_int(v: u64) -> Value {
    Value::Integer(v as i64)
}

fn opt_int(v: Option<impl Into<i64>>) -> Value {
    v.map_or(Value::Null, |v| Value::Integer(v.into()))
}

/// Column values for a record, in [`Table::columns`] order.
pub fn row_values(timed: &TimedRecord) -> Vec<Value> {
    let start_ns = opt_int(timed.start_ns);
    let end_ns = opt_int(timed.end_ns);
    let mut row = vec![int(timed.device)];
    let fields = match &timed.record {
        Record::BlockLog(r) => vec![
            int(r.stream_id),
            int(r.task_id),
            int(r.block_id),
            int(r.context_id),
            u64_int(r.start_cycle),
            int(r.duration_cycles),
            int(r.device_task_type),
            int(r.core_type.code()),
            int(r.core_id),
            start_ns,
            end_ns,
        ],
        Record::StarsLog(r) => vec![
            int(r.func_type.code()),
            int(r.core_id),
            int(r.stream_id),
            int(r.task_id),
            int(r.sqe_type),
            u64_int(r.sys_cycle),
            int(r.block_num),
            start_ns,
        ],
        Record::AiCpu(r) => vec![
            int(r.magic),
            int(r.stream_id),
            int(r.task_id),
            opt_int(r.thread_id),
            opt_int(r.kernel_type.map(|k| k.code())),
            opt_int(r.cpu_id),
            u64_int(r.start_cycle),
            u64_int(r.end_cycle),
            u64_int(r.dispatch_cycle),
            r.queue_cycle.map_or(Value::Null, u64_int),
            opt_int(r.total_ops),
            start_ns,
            end_ns,
        ],
        Record::Qos(r) => {
            let mut cols = vec![u64_int(r.sys_cycle), int(r.mode), int(r.qos_count)];
            cols.extend(r.bandwidth.iter().map(|bw| int(*bw)));
            cols.push(start_ns);
            cols
        }
        Record::Hccl(r) => {
            let mut cols = vec![
                int(r.magic),
                int(r.item_type),
                int(r.level),
                u64_int(r.start_cycle),
                u64_int(r.end_cycle),
                u64_int(r.item_id),
            ];
            match &r.detail {
                HcclDetail::Op {
                    group,
                    count,
                    data_type,
                    op_kind,
                } => {
                    cols.extend([u64_int(*group), u64_int(*count), int(*data_type), int(*op_kind)]);
                    cols.extend(std::iter::repeat(Value::Null).take(7));
                }
                HcclDetail::Task {
                    plane_id,
                    src_rank,
                    dst_rank,
                    transport,
                    link_type,
                    size,
                } => {
                    cols.extend(std::iter::repeat(Value::Null).take(4));
                    cols.extend([
                        int(*plane_id),
                        int(*src_rank),
                        int(*dst_rank),
                        int(*transport),
                        int(*link_type),
                        u64_int(*size),
                        Value::Null,
                    ]);
                }
                HcclDetail::Opaque(payload) => {
                    cols.extend(std::iter::repeat(Value::Null).take(10));
                    cols.push(Value::Blob(payload.clone()));
                }
            }
            cols.push(start_ns);
            cols.push(end_ns);
            cols
        }
        Record::NpuMem(r) => vec![
            u64_int(r.sys_cycle),
            int(r.device_id),
            u64_int(r.hbm_used),
            u64_int(r.ddr_used),
            start_ns,
        ],
        Record::TaskTime(r) => {
            let duration_ns = match (timed.start_ns, timed.end_ns) {
                // Clamped the same way as TaskTimeRecord::duration_cycles.
                (Some(start), Some(end)) => Value::Integer(end.saturating_sub(start).max(0)),
                _ => Value::Null,
            };
            vec![
                int(r.stream_id),
                int(r.task_id),
                int(r.core_id),
                u64_int(r.start_cycle),
                u64_int(r.end_cycle),
                start_ns,
                end_ns,
                duration_ns,
            ]
        }
    };
    row.extend(fields);
    row
}
