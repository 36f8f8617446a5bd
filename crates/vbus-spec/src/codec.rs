//! Raw value codec.
//!
//! Fields are little-endian two's-complement integers at a byte offset.
//! Truncated buffers are tolerated: a field that starts inside the available
//! data is read with missing high-order bytes treated as zero, a field that
//! starts past the end decodes to `None`.

use crate::model::{PacketFieldSpec, RootKind};

/// Widest integer a field can carry.
const MAX_FIELD_SIZE: usize = 8;

/// Decode `field` from `buffer[start..end]`, in its storage type.
///
/// `end` is clamped to the buffer length; callers pass the declared payload
/// length so that trailing bytes are never read.
pub fn read_raw_value(field: &PacketFieldSpec, buffer: &[u8], start: usize, end: usize) -> Option<f64> {
    let end = end.min(buffer.len());
    if start >= end {
        return None;
    }
    let data = &buffer[start..end];
    if field.offset >= data.len() {
        return None;
    }

    let raw = if field.bit_mask != 0 {
        i64::from(data[field.offset] & field.bit_mask != 0)
    } else {
        read_signed_le(data, field.offset, field.size)
    };

    Some(scale_from_integer(raw, field))
}

/// Encode `raw_value` into `buffer` at the field's position.
///
/// Bytes past the end of `buffer` are skipped.
pub fn write_raw_value(field: &PacketFieldSpec, raw_value: f64, buffer: &mut [u8]) {
    let raw = scale_to_integer(raw_value, field);

    if field.bit_mask != 0 {
        if let Some(byte) = buffer.get_mut(field.offset) {
            if raw != 0 {
                *byte |= field.bit_mask;
            } else {
                *byte &= !field.bit_mask;
            }
        }
        return;
    }

    let size = field.size.min(MAX_FIELD_SIZE);
    let bytes = raw.to_le_bytes();
    for (index, value) in bytes.iter().take(size).enumerate() {
        match buffer.get_mut(field.offset + index) {
            Some(slot) => *slot = *value,
            None => break,
        }
    }
}

fn read_signed_le(data: &[u8], offset: usize, size: usize) -> i64 {
    let size = size.min(MAX_FIELD_SIZE);
    if size == 0 {
        return 0;
    }

    let mut value: u64 = 0;
    for index in 0..size {
        let byte = data.get(offset + index).copied().unwrap_or(0);
        value |= u64::from(byte) << (8 * index);
    }

    let bits = 8 * size as u32;
    if bits < 64 {
        let shift = 64 - bits;
        ((value << shift) as i64) >> shift
    } else {
        value as i64
    }
}

fn scale_from_integer(raw: i64, field: &PacketFieldSpec) -> f64 {
    let storage = field.storage_type();
    match storage.root_kind {
        RootKind::Number => raw as f64 / 10f64.powi(storage.precision as i32),
        RootKind::Time | RootKind::Weektime | RootKind::DateTime => raw as f64,
    }
}

fn scale_to_integer(raw_value: f64, field: &PacketFieldSpec) -> i64 {
    let storage = field.storage_type();
    match storage.root_kind {
        RootKind::Number => (raw_value * 10f64.powi(storage.precision as i32)).round() as i64,
        RootKind::Time | RootKind::Weektime | RootKind::DateTime => raw_value.round() as i64,
    }
}
