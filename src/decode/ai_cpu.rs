//! CPU kernel records.
//!
//! Two layouts exist. Gen1 to gen3 firmware writes the 32 byte v1 layout;
//! gen4 firmware grew it to 48 bytes and packed the kernel type and the
//! executing CPU into the word that used to hold the thread id.
//!
//! ```text
//! v1 (32 bytes)                     v4 (48 bytes)
//!  0  magic          u16             0  magic          u16
//!  2  stream_id      u16             2  stream_id      u16
//!  4  task_id        u16             4  task_id        u16
//!  6  thread_id      u16             6  flags          u16  bits 0..=3  kernel_type
//!                                                           bits 4..=15 cpu_id
//!  8  start_cycle    u64             8  start_cycle    u64
//! 16  end_cycle      u64            16  end_cycle      u64
//! 24  dispatch_cycle u64            24  dispatch_cycle u64
//!                                   32  queue_cycle    u64
//!                                   40  total_ops      u32
//!                                   44  reserved       u32
//! ```

use crate::error::DecodeError;
use crate::layout::{BitField, Endian, Field, RecordLayout};

/// Value the firmware writes into `magic` for well-formed records.
pub const AI_CPU_MAGIC: u16 = 0x5A5A;

pub const MAGIC: Field = Field::new("magic", 0, 2);
pub const STREAM_ID: Field = Field::new("stream_id", 2, 2);
pub const TASK_ID: Field = Field::new("task_id", 4, 2);
pub const THREAD_ID: Field = Field::new("thread_id", 6, 2);
pub const START_CYCLE: Field = Field::new("start_cycle", 8, 8);
pub const END_CYCLE: Field = Field::new("end_cycle", 16, 8);
pub const DISPATCH_CYCLE: Field = Field::new("dispatch_cycle", 24, 8);

pub const LAYOUT_V1: RecordLayout = RecordLayout {
    name: "ai_cpu_v1",
    record_size: 32,
    endian: Endian::Little,
    fields: &[
        MAGIC,
        STREAM_ID,
        TASK_ID,
        THREAD_ID,
        START_CYCLE,
        END_CYCLE,
        DISPATCH_CYCLE,
    ],
};

pub const KERNEL_TYPE: BitField = BitField::new("kernel_type", 3, 0);
pub const CPU_ID: BitField = BitField::new("cpu_id", 15, 4);

pub const FLAGS: Field = Field::packed("flags", 6, 2, &[KERNEL_TYPE, CPU_ID]);
pub const QUEUE_CYCLE: Field = Field::new("queue_cycle", 32, 8);
pub const TOTAL_OPS: Field = Field::new("total_ops", 40, 4);
pub const RESERVED: Field = Field::new("reserved", 44, 4);

pub const LAYOUT_V4: RecordLayout = RecordLayout {
    name: "ai_cpu_v4",
    record_size: 48,
    endian: Endian::Little,
    fields: &[
        MAGIC,
        STREAM_ID,
        TASK_ID,
        FLAGS,
        START_CYCLE,
        END_CYCLE,
        DISPATCH_CYCLE,
        QUEUE_CYCLE,
        TOTAL_OPS,
        RESERVED,
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelType {
    Builtin,
    Custom,
    Tf,
    Unknown(u8),
}

impl KernelType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => KernelType::Builtin,
            1 => KernelType::Custom,
            2 => KernelType::Tf,
            other => KernelType::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            KernelType::Builtin => 0,
            KernelType::Custom => 1,
            KernelType::Tf => 2,
            KernelType::Unknown(code) => *code,
        }
    }
}

/// A CPU kernel execution. Fields only present in the v4 layout are `None`
/// for v1 records and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiCpuRecord {
    pub magic: u16,
    pub stream_id: u16,
    pub task_id: u16,
    pub thread_id: Option<u16>,
    pub kernel_type: Option<KernelType>,
    pub cpu_id: Option<u16>,
    pub start_cycle: u64,
    pub end_cycle: u64,
    pub dispatch_cycle: u64,
    pub queue_cycle: Option<u64>,
    pub total_ops: Option<u32>,
}

impl AiCpuRecord {
    pub fn has_valid_magic(&self) -> bool {
        self.magic == AI_CPU_MAGIC
    }
}

pub fn decode_v1(raw: &[u8]) -> Result<AiCpuRecord, DecodeError> {
    let layout = &LAYOUT_V1;
    layout.check_len(raw)?;
    Ok(AiCpuRecord {
        magic: layout.read_u16(raw, &MAGIC),
        stream_id: layout.read_u16(raw, &STREAM_ID),
        task_id: layout.read_u16(raw, &TASK_ID),
        thread_id: Some(layout.read_u16(raw, &THREAD_ID)),
        kernel_type: None,
        cpu_id: None,
        start_cycle: layout.read_u64(raw, &START_CYCLE),
        end_cycle: layout.read_u64(raw, &END_CYCLE),
        dispatch_cycle: layout.read_u64(raw, &DISPATCH_CYCLE),
        queue_cycle: None,
        total_ops: None,
    })
}

pub fn decode_v4(raw: &[u8]) -> Result<AiCpuRecord, DecodeError> {
    let layout = &LAYOUT_V4;
    layout.check_len(raw)?;
    let flags = layout.read(raw, &FLAGS);
    Ok(AiCpuRecord {
        magic: layout.read_u16(raw, &MAGIC),
        stream_id: layout.read_u16(raw, &STREAM_ID),
        task_id: layout.read_u16(raw, &TASK_ID),
        thread_id: None,
        kernel_type: Some(KernelType::from_code(KERNEL_TYPE.extract(flags) as u8)),
        cpu_id: Some(CPU_ID.extract(flags) as u16),
        start_cycle: layout.read_u64(raw, &START_CYCLE),
        end_cycle: layout.read_u64(raw, &END_CYCLE),
        dispatch_cycle: layout.read_u64(raw, &DISPATCH_CYCLE),
        queue_cycle: Some(layout.read_u64(raw, &QUEUE_CYCLE)),
        total_ops: Some(layout.read_u32(raw, &TOTAL_OPS)),
    })
}

#[cfg(test)]
pub(crate) fn encode_v1(stream_id: u16, task_id: u16, start: u64, end: u64) -> Vec<u8> {
    let mut raw = Vec::with_capacity(LAYOUT_V1.record_size);
    raw.extend_from_slice(&AI_CPU_MAGIC.to_le_bytes());
    raw.extend_from_slice(&stream_id.to_le_bytes());
    raw.extend_from_slice(&task_id.to_le_bytes());
    raw.extend_from_slice(&9u16.to_le_bytes());
    raw.extend_from_slice(&start.to_le_bytes());
    raw.extend_from_slice(&end.to_le_bytes());
    raw.extend_from_slice(&start.saturating_sub(10).to_le_bytes());
    raw
}
