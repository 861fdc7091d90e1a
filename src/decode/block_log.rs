//! Block log records written by the task scheduler on gen1 to gen3 chips.
//!
//! One record per executed block, 24 bytes, little-endian:
//!
//! ```text
//!  0  stream_id        u16
//!  2  task_id          u16
//!  4  block_id         u16
//!  6  context_id       u16
//!  8  start_cycle      u64
//! 16  duration         u32   (cycles)
//! 20  device_task_type u8
//! 21  core_type        u8
//! 22  core_id          u8
//! 23  reserved         u8
//! ```

use crate::error::DecodeError;
use crate::layout::{Endian, Field, RecordLayout};

pub const STREAM_ID: Field = Field::new("stream_id", 0, 2);
pub const TASK_ID: Field = Field::new("task_id", 2, 2);
pub const BLOCK_ID: Field = Field::new("block_id", 4, 2);
pub const CONTEXT_ID: Field = Field::new("context_id", 6, 2);
pub const START_CYCLE: Field = Field::new("start_cycle", 8, 8);
pub const DURATION: Field = Field::new("duration", 16, 4);
pub const DEVICE_TASK_TYPE: Field = Field::new("device_task_type", 20, 1);
pub const CORE_TYPE: Field = Field::new("core_type", 21, 1);
pub const CORE_ID: Field = Field::new("core_id", 22, 1);
pub const RESERVED: Field = Field::new("reserved", 23, 1);

pub const LAYOUT: RecordLayout = RecordLayout {
    name: "block_log",
    record_size: 24,
    endian: Endian::Little,
    fields: &[
        STREAM_ID,
        TASK_ID,
        BLOCK_ID,
        CONTEXT_ID,
        START_CYCLE,
        DURATION,
        DEVICE_TASK_TYPE,
        CORE_TYPE,
        CORE_ID,
        RESERVED,
    ],
};

/// Which kind of core executed the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreType {
    Cube,
    Vector,
    Cpu,
    Unknown(u8),
}

impl CoreType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => CoreType::Cube,
            1 => CoreType::Vector,
            2 => CoreType::Cpu,
            other => CoreType::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            CoreType::Cube => 0,
            CoreType::Vector => 1,
            CoreType::Cpu => 2,
            CoreType::Unknown(code) => *code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLogRecord {
    pub stream_id: u16,
    pub task_id: u16,
    pub block_id: u16,
    pub context_id: u16,
    pub start_cycle: u64,
    pub duration_cycles: u32,
    pub device_task_type: u8,
    pub core_type: CoreType,
    pub core_id: u8,
}

impl BlockLogRecord {
    pub fn end_cycle(&self) -> u64 {
        self.start_cycle.wrapping_add(u64::from(self.duration_cycles))
    }
}

pub fn decode(raw: &[u8]) -> Result<BlockLogRecord, DecodeError> {
    LAYOUT.check_len(raw)?;
    Ok(BlockLogRecord {
        stream_id: LAYOUT.read_u16(raw, &STREAM_ID),
        task_id: LAYOUT.read_u16(raw, &TASK_ID),
        block_id: LAYOUT.read_u16(raw, &BLOCK_ID),
        context_id: LAYOUT.read_u16(raw, &CONTEXT_ID),
        start_cycle: LAYOUT.read_u64(raw, &START_CYCLE),
        duration_cycles: LAYOUT.read_u32(raw, &DURATION),
        device_task_type: LAYOUT.read_u8(raw, &DEVICE_TASK_TYPE),
        core_type: CoreType::from_code(LAYOUT.read_u8(raw, &CORE_TYPE)),
        core_id: LAYOUT.read_u8(raw, &CORE_ID),
    })
}

#[cfg(test)]
pub(crate) fn encode(record: &BlockLogRecord) -> Vec<u8> {
    let mut raw = Vec::with_capacity(LAYOUT.record_size);
    raw.extend_from_slice(&record.stream_id.to_le_bytes());
    raw.extend_from_slice(&record.task_id.to_le_bytes());
    raw.extend_from_slice(&record.block_id.to_le_bytes());
    raw.extend_from_slice(&record.context_id.to_le_bytes());
    raw.extend_from_slice(&record.start_cycle.to_le_bytes());
    raw.extend_from_slice(&record.duration_cycles.to_le_bytes());
    raw.push(record.device_task_type);
    raw.push(record.core_type.code());
    raw.push(record.core_id);
    raw.push(0);
    raw
}
