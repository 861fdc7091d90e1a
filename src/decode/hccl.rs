//! Communication library events.
//!
//! Records are self-describing: the header carries the record length and an
//! item type that selects how the 32 byte payload is read.
//!
//! ```text
//!  0  magic        u16
//!  2  item_len     u16   must equal the layout size (64)
//!  4  item_type    u16   0 = op, 1 = task, anything else is opaque
//!  6  level        u16
//!  8  start_cycle  u64
//! 16  end_cycle    u64
//! 24  item_id      u64   hashed op or task name
//! 32  payload      [u8; 32]
//!
//! op payload                    task payload
//! +0  group      u64            +0  plane_id   u32
//! +8  count      u64            +4  src_rank   u32
//! +16 data_type  u8             +8  dst_rank   u32
//! +17 op_kind    u8             +12 transport  u8
//!                               +13 link_type  u8
//!                               +16 size       u64
//! ```

use crate::error::DecodeError;
use crate::layout::{Endian, Field, RecordLayout};

pub const MAGIC: Field = Field::new("magic", 0, 2);
pub const ITEM_LEN: Field = Field::new("item_len", 2, 2);
pub const ITEM_TYPE: Field = Field::new("item_type", 4, 2);
pub const LEVEL: Field = Field::new("level", 6, 2);
pub const START_CYCLE: Field = Field::new("start_cycle", 8, 8);
pub const END_CYCLE: Field = Field::new("end_cycle", 16, 8);
pub const ITEM_ID: Field = Field::new("item_id", 24, 8);
pub const PAYLOAD: Field = Field::new("payload", 32, 32);

pub const LAYOUT: RecordLayout = RecordLayout {
    name: "hccl",
    record_size: 64,
    endian: Endian::Little,
    fields: &[
        MAGIC,
        ITEM_LEN,
        ITEM_TYPE,
        LEVEL,
        START_CYCLE,
        END_CYCLE,
        ITEM_ID,
        PAYLOAD,
    ],
};

// Payload views, offsets relative to the start of the record.
const OP_GROUP: Field = Field::new("group", 32, 8);
const OP_COUNT: Field = Field::new("count", 40, 8);
const OP_DATA_TYPE: Field = Field::new("data_type", 48, 1);
const OP_KIND: Field = Field::new("op_kind", 49, 1);

const TASK_PLANE_ID: Field = Field::new("plane_id", 32, 4);
const TASK_SRC_RANK: Field = Field::new("src_rank", 36, 4);
const TASK_DST_RANK: Field = Field::new("dst_rank", 40, 4);
const TASK_TRANSPORT: Field = Field::new("transport", 44, 1);
const TASK_LINK_TYPE: Field = Field::new("link_type", 45, 1);
const TASK_SIZE: Field = Field::new("size", 48, 8);

pub const ITEM_TYPE_OP: u16 = 0;
pub const ITEM_TYPE_TASK: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HcclDetail {
    Op {
        group: u64,
        count: u64,
        data_type: u8,
        op_kind: u8,
    },
    Task {
        plane_id: u32,
        src_rank: u32,
        dst_rank: u32,
        transport: u8,
        link_type: u8,
        size: u64,
    },
    Opaque(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HcclRecord {
    pub magic: u16,
    pub item_type: u16,
    pub level: u16,
    pub start_cycle: u64,
    pub end_cycle: u64,
    pub item_id: u64,
    pub detail: HcclDetail,
}

pub fn decode(raw: &[u8]) -> Result<HcclRecord, DecodeError> {
    LAYOUT.check_len(raw)?;

    let declared = usize::from(LAYOUT.read_u16(raw, &ITEM_LEN));
    if declared != LAYOUT.record_size {
        return Err(DecodeError::DeclaredLengthMismatch {
            layout: LAYOUT.name,
            declared,
            expected: LAYOUT.record_size,
        });
    }

    let item_type = LAYOUT.read_u16(raw, &ITEM_TYPE);
    let detail = match item_type {
        ITEM_TYPE_OP => HcclDetail::Op {
            group: LAYOUT.read_u64(raw, &OP_GROUP),
            count: LAYOUT.read_u64(raw, &OP_COUNT),
            data_type: LAYOUT.read_u8(raw, &OP_DATA_TYPE),
            op_kind: LAYOUT.read_u8(raw, &OP_KIND),
        },
        ITEM_TYPE_TASK => HcclDetail::Task {
            plane_id: LAYOUT.read_u32(raw, &TASK_PLANE_ID),
            src_rank: LAYOUT.read_u32(raw, &TASK_SRC_RANK),
            dst_rank: LAYOUT.read_u32(raw, &TASK_DST_RANK),
            transport: LAYOUT.read_u8(raw, &TASK_TRANSPORT),
            link_type: LAYOUT.read_u8(raw, &TASK_LINK_TYPE),
            size: LAYOUT.read_u64(raw, &TASK_SIZE),
        },
        _ => HcclDetail::Opaque(LAYOUT.bytes(raw, &PAYLOAD).to_vec()),
    };

    Ok(HcclRecord {
        magic: LAYOUT.read_u16(raw, &MAGIC),
        item_type,
        level: LAYOUT.read_u16(raw, &LEVEL),
        start_cycle: LAYOUT.read_u64(raw, &START_CYCLE),
        end_cycle: LAYOUT.read_u64(raw, &END_CYCLE),
        item_id: LAYOUT.read_u64(raw, &ITEM_ID),
        detail,
    })
}

/// Build a raw record with the given header and payload.
#[cfg(test)]
pub(crate) fn encode(
    item_len: u16,
    item_type: u16,
    start: u64,
    end: u64,
    payload: &[u8],
) -> Vec<u8> {
    let mut raw = Vec::with_capacity(LAYOUT.record_size);
    raw.extend_from_slice(&0x6C6Cu16.to_le_bytes());
    raw.extend_from_slice(&item_len.to_le_bytes());
    raw.extend_from_slice(&item_type.to_le_bytes());
    raw.extend_from_slice(&2u16.to_le_bytes());
    raw.extend_from_slice(&start.to_le_bytes());
    raw.extend_from_slice(&end.to_le_bytes());
    raw.extend_from_slice(&0xABCDu64.to_le_bytes());
    let mut body = [0u8; 32];
    body[..payload.len()].copy_from_slice(payload);
    raw.extend_from_slice(&body);
    raw
}
