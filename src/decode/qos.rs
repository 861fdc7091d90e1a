//! Interconnect QoS bandwidth samples.
//!
//! ```text
//!  0  sys_cycle  u64
//!  8  mode       u8
//!  9  qos_count  u8    number of valid bandwidth slots
//! 10  reserved   u16
//! 12  bandwidth  u32 x 5   (MB/s)
//! ```

use crate::error::DecodeError;
use crate::layout::{Endian, Field, RecordLayout};

pub const BANDWIDTH_SLOTS: usize = 5;

pub const SYS_CYCLE: Field = Field::new("sys_cycle", 0, 8);
pub const MODE: Field = Field::new("mode", 8, 1);
pub const QOS_COUNT: Field = Field::new("qos_count", 9, 1);
pub const RESERVED: Field = Field::new("reserved", 10, 2);
pub const BANDWIDTH: [Field; BANDWIDTH_SLOTS] = [
    Field::new("bandwidth_0", 12, 4),
    Field::new("bandwidth_1", 16, 4),
    Field::new("bandwidth_2", 20, 4),
    Field::new("bandwidth_3", 24, 4),
    Field::new("bandwidth_4", 28, 4),
];

pub const LAYOUT: RecordLayout = RecordLayout {
    name: "qos",
    record_size: 32,
    endian: Endian::Little,
    fields: &[
        SYS_CYCLE,
        MODE,
        QOS_COUNT,
        RESERVED,
        BANDWIDTH[0],
        BANDWIDTH[1],
        BANDWIDTH[2],
        BANDWIDTH[3],
        BANDWIDTH[4],
    ],
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QosRecord {
    pub sys_cycle: u64,
    pub mode: u8,
    pub qos_count: u8,
    pub bandwidth: [u32; BANDWIDTH_SLOTS],
}

impl QosRecord {
    /// Bandwidth slots the sampler actually filled in.
    pub fn active_bandwidth(&self) -> &[u32] {
        let n = usize::from(self.qos_count).min(BANDWIDTH_SLOTS);
        &self.bandwidth[..n]
    }
}

pub fn decode(raw: &[u8]) -> Result<QosRecord, DecodeError> {
    LAYOUT.check_len(raw)?;
    let mut bandwidth = [0u32; BANDWIDTH_SLOTS];
    for (slot, field) in bandwidth.iter_mut().zip(BANDWIDTH.iter()) {
        *slot = LAYOUT.read_u32(raw, field);
    }
    Ok(QosRecord {
        sys_cycle: LAYOUT.read_u64(raw, &SYS_CYCLE),
        mode: LAYOUT.read_u8(raw, &MODE),
        qos_count: LAYOUT.read_u8(raw, &QOS_COUNT),
        bandwidth,
    })
}
