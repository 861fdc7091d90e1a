//! Record decoders, one per (engine, layout version).
//!
//! [`Decoder`] is a closed set: every layout the crate understands is a
//! variant, and [`crate::chip`] maps (chip generation, engine) pairs onto
//! these variants. Decoders are pure. They never see partial records and
//! never convert cycle counts to wall time.

pub mod ai_cpu;
pub mod block_log;
pub mod hccl;
pub mod npu_mem;
pub mod qos;
pub mod stars_log;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::layout::RecordLayout;
use crate::sqlite::Table;
use crate::task_time::TaskTimeRecord;

pub use ai_cpu::{AiCpuRecord, KernelType};
pub use block_log::{BlockLogRecord, CoreType};
pub use hccl::{HcclDetail, HcclRecord};
pub use npu_mem::NpuMemRecord;
pub use qos::QosRecord;
pub use stars_log::{FuncType, StarsLogRecord};

/// The engine or category a trace file was produced by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EngineTag {
    TaskTrack,
    StarsLog,
    AiCpu,
    Qos,
    Hccl,
    NpuMem,
}

impl EngineTag {
    pub const ALL: [EngineTag; 6] = [
        EngineTag::TaskTrack,
        EngineTag::StarsLog,
        EngineTag::AiCpu,
        EngineTag::Qos,
        EngineTag::Hccl,
        EngineTag::NpuMem,
    ];

    /// File name prefix the profiling agent uses for this engine.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            EngineTag::TaskTrack => "ts_track",
            EngineTag::StarsLog => "stars_soc",
            EngineTag::AiCpu => "aicpu",
            EngineTag::Qos => "qos",
            EngineTag::Hccl => "hccl",
            EngineTag::NpuMem => "npu_mem",
        }
    }

    pub fn from_file_prefix(prefix: &str) -> Option<Self> {
        EngineTag::ALL
            .into_iter()
            .find(|tag| tag.file_prefix() == prefix)
    }
}

impl fmt::Display for EngineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_prefix())
    }
}

/// Every decoder variant the crate ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decoder {
    BlockLog,
    StarsLogV4,
    AiCpuV1,
    AiCpuV4,
    Qos,
    Hccl,
    NpuMem,
}

impl Decoder {
    pub const ALL: [Decoder; 7] = [
        Decoder::BlockLog,
        Decoder::StarsLogV4,
        Decoder::AiCpuV1,
        Decoder::AiCpuV4,
        Decoder::Qos,
        Decoder::Hccl,
        Decoder::NpuMem,
    ];

    pub fn layout(&self) -> &'static RecordLayout {
        match self {
            Decoder::BlockLog => &block_log::LAYOUT,
            Decoder::StarsLogV4 => &stars_log::LAYOUT,
            Decoder::AiCpuV1 => &ai_cpu::LAYOUT_V1,
            Decoder::AiCpuV4 => &ai_cpu::LAYOUT_V4,
            Decoder::Qos => &qos::LAYOUT,
            Decoder::Hccl => &hccl::LAYOUT,
            Decoder::NpuMem => &npu_mem::LAYOUT,
        }
    }

    pub fn record_size(&self) -> usize {
        self.layout().record_size
    }

    /// The engine whose files this decoder understands.
    pub fn engine(&self) -> EngineTag {
        match self {
            Decoder::BlockLog => EngineTag::TaskTrack,
            Decoder::StarsLogV4 => EngineTag::StarsLog,
            Decoder::AiCpuV1 | Decoder::AiCpuV4 => EngineTag::AiCpu,
            Decoder::Qos => EngineTag::Qos,
            Decoder::Hccl => EngineTag::Hccl,
            Decoder::NpuMem => EngineTag::NpuMem,
        }
    }

    /// Decode exactly one record.
    pub fn decode(&self, raw: &[u8]) -> Result<Record, DecodeError> {
        Ok(match self {
            Decoder::BlockLog => Record::BlockLog(block_log::decode(raw)?),
            Decoder::StarsLogV4 => Record::StarsLog(stars_log::decode(raw)?),
            Decoder::AiCpuV1 => Record::AiCpu(ai_cpu::decode_v1(raw)?),
            Decoder::AiCpuV4 => Record::AiCpu(ai_cpu::decode_v4(raw)?),
            Decoder::Qos => Record::Qos(qos::decode(raw)?),
            Decoder::Hccl => Record::Hccl(hccl::decode(raw)?),
            Decoder::NpuMem => Record::NpuMem(npu_mem::decode(raw)?),
        })
    }
}

impl fmt::Display for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.layout().name)
    }
}

/// One decoded event or sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    BlockLog(BlockLogRecord),
    StarsLog(StarsLogRecord),
    AiCpu(AiCpuRecord),
    Qos(QosRecord),
    Hccl(HcclRecord),
    NpuMem(NpuMemRecord),
    TaskTime(TaskTimeRecord),
}

impl Record {
    /// The table this record is stored in.
    pub fn table(&self) -> Table {
        match self {
            Record::BlockLog(_) => Table::BlockLog,
            Record::StarsLog(_) => Table::StarsLog,
            Record::AiCpu(_) => Table::AiCpu,
            Record::Qos(_) => Table::Qos,
            Record::Hccl(_) => Table::Hccl,
            Record::NpuMem(_) => Table::NpuMem,
            Record::TaskTime(_) => Table::TaskTime,
        }
    }

    /// Device cycle count the record starts at, if it carries one.
    pub fn start_cycle(&self) -> Option<u64> {
        match self {
            Record::BlockLog(r) => Some(r.start_cycle),
            Record::StarsLog(r) => Some(r.sys_cycle),
            Record::AiCpu(r) => Some(r.start_cycle),
            Record::Qos(r) => Some(r.sys_cycle),
            Record::Hccl(r) => Some(r.start_cycle),
            Record::NpuMem(r) => Some(r.sys_cycle),
            Record::TaskTime(r) => Some(r.start_cycle),
        }
    }

    /// Device cycle count the record ends at, for records that span time.
    pub fn end_cycle(&self) -> Option<u64> {
        match self {
            Record::BlockLog(r) => Some(r.end_cycle()),
            Record::AiCpu(r) => Some(r.end_cycle),
            Record::Hccl(r) => Some(r.end_cycle),
            Record::TaskTime(r) => Some(r.end_cycle),
            Record::StarsLog(_) | Record::Qos(_) | Record::NpuMem(_) => None,
        }
    }
}

/// A record with its cycle counts converted to host wall-clock nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedRecord {
    pub record: Record,
    /// Device whose slice file the record was read from.
    pub device: u32,
    pub start_ns: Option<i64>,
    pub end_ns: Option<i64>,
}
