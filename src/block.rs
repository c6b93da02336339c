//! Block packer/unpacker (C5) — packs an ordered list of items into a
//! single block payload, and unpacks it back into items.
//!
//! Wire format: `num_items:varuint (size[i]:varuint)* (bytes[i])*` — all
//! sizes up front, then the concatenated item bytes in order.

use integer_encoding::VarInt;

use crate::error::{Error, Result};

/// Pack `items` into a single block payload.
pub fn pack(items: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    write_uvarint(&mut out, items.len() as u64);
    for item in items {
        write_uvarint(&mut out, item.len() as u64);
    }
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

/// Unpack a block payload produced by [`pack`].
///
/// Fails with [`Error::CorruptBlock`] if `num_items` exceeds the number of
/// bytes available, if the declared sizes overflow or do not sum to the
/// bytes following the size table, or if any varint is truncated.
pub fn unpack(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut pos = 0usize;
    let num_items = read_uvarint(bytes, &mut pos)?;

    if num_items > bytes.len() as u64 {
        return Err(Error::CorruptBlock(format!(
            "num_items {num_items} exceeds block length {}",
            bytes.len()
        )));
    }
    let num_items = num_items as usize;

    let mut sizes = Vec::with_capacity(num_items);
    let mut total: u64 = 0;
    for _ in 0..num_items {
        let size = read_uvarint(bytes, &mut pos)?;
        total = total.checked_add(size).ok_or_else(|| {
            Error::CorruptBlock("declared item sizes overflow".into())
        })?;
        sizes.push(size);
    }

    let remaining = (bytes.len() - pos) as u64;
    if total != remaining {
        return Err(Error::CorruptBlock(format!(
            "declared sizes sum to {total} but {remaining} bytes remain"
        )));
    }

    let mut items = Vec::with_capacity(num_items);
    for size in sizes {
        let size = size as usize;
        items.push(bytes[pos..pos + size].to_vec());
        pos += size;
    }
    Ok(items)
}

fn write_uvarint(out: &mut Vec<u8>, v: u64) {
    let mut buf = [0u8; 10];
    let n = v.encode_var(&mut buf);
    out.extend_from_slice(&buf[..n]);
}

fn read_uvarint(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let (v, n) = u64::decode_var(&bytes[*pos..])
        .ok_or_else(|| Error::CorruptBlock("truncated varint in block header".into()))?;
    *pos += n;
    Ok(v)
}
