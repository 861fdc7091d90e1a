//! Hardware task scheduler log records on gen4 chips.
//!
//! Each task produces a start record and an end record, 32 bytes each,
//! little-endian:
//!
//! ```text
//!  0  head       u16   bits 0..=5  func_type (LSB side)
//!                      bits 6..=15 core_id   (MSB side)
//!  2  stream_id  u16
//!  4  task_id    u16
//!  6  sqe_type   u8
//!  7  reserved   u8
//!  8  sys_cycle  u64
//! 16  block_num  u32
//! 20  reserved   [u8; 12]
//! ```

use crate::error::DecodeError;
use crate::layout::{BitField, Endian, Field, RecordLayout};

pub const FUNC_TYPE: BitField = BitField::new("func_type", 5, 0);
pub const HEAD_CORE_ID: BitField = BitField::new("core_id", 15, 6);

pub const HEAD: Field = Field::packed("head", 0, 2, &[FUNC_TYPE, HEAD_CORE_ID]);
pub const STREAM_ID: Field = Field::new("stream_id", 2, 2);
pub const TASK_ID: Field = Field::new("task_id", 4, 2);
pub const SQE_TYPE: Field = Field::new("sqe_type", 6, 1);
pub const RESERVED_0: Field = Field::new("reserved_0", 7, 1);
pub const SYS_CYCLE: Field = Field::new("sys_cycle", 8, 8);
pub const BLOCK_NUM: Field = Field::new("block_num", 16, 4);
pub const RESERVED_1: Field = Field::new("reserved_1", 20, 12);

pub const LAYOUT: RecordLayout = RecordLayout {
    name: "stars_log",
    record_size: 32,
    endian: Endian::Little,
    fields: &[
        HEAD, STREAM_ID, TASK_ID, SQE_TYPE, RESERVED_0, SYS_CYCLE, BLOCK_NUM, RESERVED_1,
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncType {
    TaskStart,
    TaskEnd,
    Unknown(u8),
}

impl FuncType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => FuncType::TaskStart,
            1 => FuncType::TaskEnd,
            other => FuncType::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            FuncType::TaskStart => 0,
            FuncType::TaskEnd => 1,
            FuncType::Unknown(code) => *code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarsLogRecord {
    pub func_type: FuncType,
    pub core_id: u16,
    pub stream_id: u16,
    pub task_id: u16,
    pub sqe_type: u8,
    pub sys_cycle: u64,
    pub block_num: u32,
}

pub fn decode(raw: &[u8]) -> Result<StarsLogRecord, DecodeError> {
    LAYOUT.check_len(raw)?;
    let head = LAYOUT.read(raw, &HEAD);
    Ok(StarsLogRecord {
        func_type: FuncType::from_code(FUNC_TYPE.extract(head) as u8),
        core_id: HEAD_CORE_ID.extract(head) as u16,
        stream_id: LAYOUT.read_u16(raw, &STREAM_ID),
        task_id: LAYOUT.read_u16(raw, &TASK_ID),
        sqe_type: LAYOUT.read_u8(raw, &SQE_TYPE),
        sys_cycle: LAYOUT.read_u64(raw, &SYS_CYCLE),
        block_num: LAYOUT.read_u32(raw, &BLOCK_NUM),
    })
}

#[cfg(test)]
pub(crate) fn encode(record: &StarsLogRecord) -> Vec<u8> {
    let head = (u16::from(record.func_type.code()) & 0x3F) | ((record.core_id & 0x3FF) << 6);
    let mut raw = Vec::with_capacity(LAYOUT.record_size);
    raw.extend_from_slice(&head.to_le_bytes());
    raw.extend_from_slice(&record.stream_id.to_le_bytes());
    raw.extend_from_slice(&record.task_id.to_le_bytes());
    raw.push(record.sqe_type);
    raw.push(0);
    raw.extend_from_slice(&record.sys_cycle.to_le_bytes());
    raw.extend_from_slice(&record.block_num.to_le_bytes());
    raw.extend_from_slice(&[0u8; 12]);
    raw
}
