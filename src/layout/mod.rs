//! Declarative binary record layouts.
//!
//! Every record family describes its bytes once, as a [`RecordLayout`] made of
//! [`Field`]s. Fields narrower than a byte live inside a parent integer field
//! and are described by [`BitField`]s. Decoders never shift or mask by hand:
//! they go through [`RecordLayout::read`] and [`BitField::extract`], so the
//! packing rules for a layout are written down in exactly one place.

use bitfield::BitRange;

use crate::error::{ConfigurationDefect, DecodeError};

/// Byte order of the integer fields in a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// A sub-byte field packed inside a parent integer field.
///
/// `lsb` and `msb` are inclusive bit positions counted from the least
/// significant bit of the parent value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub name: &'static str,
    pub msb: usize,
    pub lsb: usize,
}

impl BitField {
    pub const fn new(name: &'static str, msb: usize, lsb: usize) -> Self {
        Self { name, msb, lsb }
    }

    pub const fn width(&self) -> usize {
        self.msb - self.lsb + 1
    }

    /// Extract this sub-field from its parent value.
    #[inline]
    pub fn extract(&self, parent: u64) -> u64 {
        <u64 as BitRange<u64>>::bit_range(&parent, self.msb, self.lsb)
    }
}

/// One field of a fixed-size record.
///
/// A field with `width == 0` is not allowed. Fields wider than 8 bytes are
/// only valid as opaque byte ranges (reserved space or payload blobs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub bits: &'static [BitField],
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, width: usize) -> Self {
        Self {
            name,
            offset,
            width,
            bits: &[],
        }
    }

    pub const fn packed(
        name: &'static str,
        offset: usize,
        width: usize,
        bits: &'static [BitField],
    ) -> Self {
        Self {
            name,
            offset,
            width,
            bits,
        }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.width
    }
}

/// The byte schema of one record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub name: &'static str,
    pub record_size: usize,
    pub endian: Endian,
    pub fields: &'static [Field],
}

impl RecordLayout {
    /// Check that the declared fields tile the record exactly.
    ///
    /// Fields must be listed in offset order, must not overlap or leave gaps,
    /// and their widths must sum to `record_size`. Packed sub-fields must fit
    /// inside their parent and must not overlap each other.
    pub fn validate(&self) -> Result<(), ConfigurationDefect> {
        let bad = |reason: String| ConfigurationDefect::BadLayout {
            layout: self.name,
            reason,
        };

        if self.record_size == 0 {
            return Err(bad("record size is zero".to_string()));
        }

        let mut cursor = 0;
        for field in self.fields {
            if field.width == 0 {
                return Err(bad(format!("field {} has zero width", field.name)));
            }
            if field.offset != cursor {
                return Err(bad(format!(
                    "field {} starts at {} but the previous field ends at {}",
                    field.name, field.offset, cursor
                )));
            }
            if !field.bits.is_empty() {
                if field.width > 8 {
                    return Err(bad(format!(
                        "packed field {} is wider than 8 bytes",
                        field.name
                    )));
                }
                let parent_bits = field.width * 8;
                let mut used: u64 = 0;
                for bit in field.bits {
                    if bit.lsb > bit.msb || bit.msb >= parent_bits {
                        return Err(bad(format!(
                            "bit field {}.{} ({}..={}) does not fit in {} bits",
                            field.name, bit.name, bit.lsb, bit.msb, parent_bits
                        )));
                    }
                    let mask = mask_for(bit.width()) << bit.lsb;
                    if used & mask != 0 {
                        return Err(bad(format!(
                            "bit field {}.{} overlaps another sub-field",
                            field.name, bit.name
                        )));
                    }
                    used |= mask;
                }
            }
            cursor = field.end();
        }

        if cursor != self.record_size {
            return Err(bad(format!(
                "fields cover {} bytes but the record is {} bytes",
                cursor, self.record_size
            )));
        }
        Ok(())
    }

    /// Fail unless `raw` is exactly one record long.
    #[inline]
    pub fn check_len(&self, raw: &[u8]) -> Result<(), DecodeError> {
        if raw.len() != self.record_size {
            return Err(DecodeError::WrongLength {
                layout: self.name,
                expected: self.record_size,
                actual: raw.len(),
            });
        }
        Ok(())
    }

    /// Read an integer field (1 to 8 bytes) honouring the layout's byte order.
    ///
    /// Callers must have passed `raw` through [`RecordLayout::check_len`].
    #[inline]
    pub fn read(&self, raw: &[u8], field: &Field) -> u64 {
        let bytes = &raw[field.offset..field.end()];
        match self.endian {
            Endian::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
            Endian::Big => bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
        }
    }

    #[inline]
    pub fn read_u8(&self, raw: &[u8], field: &Field) -> u8 {
        self.read(raw, field) as u8
    }

    #[inline]
    pub fn read_u16(&self, raw: &[u8], field: &Field) -> u16 {
        self.read(raw, field) as u16
    }

    #[inline]
    pub fn read_u32(&self, raw: &[u8], field: &Field) -> u32 {
        self.read(raw, field) as u32
    }

    #[inline]
    pub fn read_u64(&self, raw: &[u8], field: &Field) -> u64 {
        self.read(raw, field)
    }

    /// Borrow the raw bytes of a field (reserved space, opaque payloads).
    #[inline]
    pub fn bytes<'a>(&self, raw: &'a [u8], field: &Field) -> &'a [u8] {
        &raw[field.offset..field.end()]
    }

    /// Read a packed sub-field out of its parent field.
    #[inline]
    pub fn read_bits(&self, raw: &[u8], field: &Field, bit: &BitField) -> u64 {
        bit.extract(self.read(raw, field))
    }
}

const fn mask_for(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}
