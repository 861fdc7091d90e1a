//! Device memory usage samples. Same layout on every chip generation.
//!
//! ```text
//!  0  sys_cycle  u64
//!  8  device_id  u32
//! 12  reserved   u32
//! 16  hbm_used   u64   bytes
//! 24  ddr_used   u64   bytes
//! ```

use crate::error::DecodeError;
use crate::layout::{Endian, Field, RecordLayout};

pub const SYS_CYCLE: Field = Field::new("sys_cycle", 0, 8);
pub const DEVICE_ID: Field = Field::new("device_id", 8, 4);
pub const RESERVED: Field = Field::new("reserved", 12, 4);
pub const HBM_USED: Field = Field::new("hbm_used", 16, 8);
pub const DDR_USED: Field = Field::new("ddr_used", 24, 8);

pub const LAYOUT: RecordLayout = RecordLayout {
    name: "npu_mem",
    record_size: 32,
    endian: Endian::Little,
    fields: &[SYS_CYCLE, DEVICE_ID, RESERVED, HBM_USED, DDR_USED],
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpuMemRecord {
    pub sys_cycle: u64,
    pub device_id: u32,
    pub hbm_used: u64,
    pub ddr_used: u64,
}

pub fn decode(raw: &[u8]) -> Result<NpuMemRecord, DecodeError> {
    LAYOUT.check_len(raw)?;
    Ok(NpuMemRecord {
        sys_cycle: LAYOUT.read_u64(raw, &SYS_CYCLE),
        device_id: LAYOUT.read_u32(raw, &DEVICE_ID),
        hbm_used: LAYOUT.read_u64(raw, &HBM_USED),
        ddr_used: LAYOUT.read_u64(raw, &DDR_USED),
    })
}

#[cfg(test)]
pub(crate) fn encode(record: &NpuMemRecord) -> Vec<u8> {
    let mut raw = Vec::with_capacity(LAYOUT.record_size);
    raw.extend_from_slice(&record.sys_cycle.to_le_bytes());
    raw.extend_from_slice(&record.device_id.to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&record.hbm_used.to_le_bytes());
    raw.extend_from_slice(&record.ddr_used.to_le_bytes());
    raw
}
