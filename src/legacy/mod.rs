//! Legacy writer/scanner (C10) — the pre-chunked single-item and packed
//! record framings, kept for read compatibility and opt-in writes.
//!
//! Two framings, both sharing the same outer record shape:
//! `magic(8) | length(8, LE) | crc32(length, LE) | bytes(length)`.
//!
//! - Unpacked: `bytes` is a single item's payload, magic `LEGACY_UNPACKED`.
//! - Packed: `bytes` is `crc32(header, LE) | num_items:varuint |
//!   size[i]:varuint | item_bytes[i]`, magic `PACKED`. `header` here means
//!   the `num_items`/`size[i]` table; a second, independent checksum that
//!   lets a reader validate the item boundaries before touching `item_bytes`.

pub mod adapter;

use std::io::{ErrorKind, Read, Write};

use integer_encoding::VarInt;

use crate::chunk::Magic;
use crate::error::{Error, Result};
use crate::io_traits::ByteSource;

/// Legacy read cap: reject any record whose declared length exceeds this,
/// to avoid allocating on a corrupt or adversarial length field.
pub const DEFAULT_MAX_READ_RECORD_SIZE: usize = 1 << 29;

/// A single legacy record as read off the wire, pre-unpack.
#[derive(Debug, Clone)]
pub struct LegacyRecord {
    pub magic: Magic,
    pub bytes: Vec<u8>,
}

fn record_overhead() -> u64 {
    8 + 8 + 4
}

/// Write one legacy record: `magic | length | crc32(payload) | payload`.
pub fn write_record<W: Write>(sink: &mut W, magic: Magic, payload: &[u8]) -> Result<()> {
    let mut out = Vec::with_capacity(record_overhead() as usize + payload.len());
    out.extend_from_slice(&magic.bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    out.extend_from_slice(payload);
    sink.write_all(&out).map_err(Error::from)
}

/// Read one legacy record. Returns `Ok(None)` at a clean EOF before any
/// bytes of the next record were read.
pub fn read_record<R: Read>(source: &mut R, max_read_record_size: usize) -> Result<Option<LegacyRecord>> {
    let mut magic_buf = [0u8; 8];
    match source.read_exact(&mut magic_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::from(e)),
    }
    let magic = Magic::from_bytes(&magic_buf)
        .ok_or_else(|| Error::CorruptBlock(format!("unrecognized legacy magic {magic_buf:02x?}")))?;

    let mut len_buf = [0u8; 8];
    source.read_exact(&mut len_buf)?;
    let length = u64::from_le_bytes(len_buf);
    if length as usize > max_read_record_size {
        return Err(Error::OversizedRecord(format!(
            "legacy record length {length} exceeds cap {max_read_record_size}"
        )));
    }

    let mut crc_buf = [0u8; 4];
    source.read_exact(&mut crc_buf)?;
    let stored_crc = u32::from_le_bytes(crc_buf);

    let mut bytes = vec![0u8; length as usize];
    source.read_exact(&mut bytes)?;
    if crc32fast::hash(&bytes) != stored_crc {
        return Err(Error::CorruptBlock("legacy record crc32 mismatch".into()));
    }

    Ok(Some(LegacyRecord { magic, bytes }))
}

fn write_uvarint(out: &mut Vec<u8>, v: u64) {
    let mut buf = [0u8; 10];
    let n = v.encode_var(&mut buf);
    out.extend_from_slice(&buf[..n]);
}

fn read_uvarint(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let (v, n) = u64::decode_var(&bytes[*pos..])
        .ok_or_else(|| Error::CorruptBlock("truncated varint in legacy packed header".into()))?;
    *pos += n;
    Ok(v)
}

/// Pack `items` into a legacy packed record payload, applying `transform`
/// (if any) to the concatenated item bytes as a single slice.
pub fn pack_legacy(
    items: &[&[u8]],
    transform: Option<&dyn Fn(&[u8]) -> Result<Vec<u8>>>,
) -> Result<Vec<u8>> {
    let mut header_bytes = Vec::new();
    write_uvarint(&mut header_bytes, items.len() as u64);
    for item in items {
        write_uvarint(&mut header_bytes, item.len() as u64);
    }
    let header_crc = crc32fast::hash(&header_bytes);

    let concatenated: Vec<u8> = items.concat();
    let item_bytes = match transform {
        Some(f) => f(&concatenated)?,
        None => concatenated,
    };

    let mut out = Vec::with_capacity(4 + header_bytes.len() + item_bytes.len());
    out.extend_from_slice(&header_crc.to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&item_bytes);
    Ok(out)
}

/// Inverse of [`pack_legacy`]. Fails with [`Error::CorruptBlock`] if the
/// header checksum doesn't match, or if the (possibly un-transformed) item
/// bytes don't sum to the declared sizes.
pub fn unpack_legacy(
    bytes: &[u8],
    inverse: Option<&dyn Fn(&[u8]) -> Result<Vec<u8>>>,
) -> Result<Vec<Vec<u8>>> {
    if bytes.len() < 4 {
        return Err(Error::CorruptBlock("legacy packed payload shorter than its crc field".into()));
    }
    let stored_crc = u32::from_le_bytes(bytes[0..4].try_into().unwrap());

    let mut pos = 4usize;
    let header_start = pos;
    let num_items = read_uvarint(bytes, &mut pos)? as usize;
    let mut sizes = Vec::with_capacity(num_items);
    let mut total = 0usize;
    for _ in 0..num_items {
        let size = read_uvarint(bytes, &mut pos)? as usize;
        total += size;
        sizes.push(size);
    }
    let header_end = pos;

    if crc32fast::hash(&bytes[header_start..header_end]) != stored_crc {
        return Err(Error::CorruptBlock("legacy packed header crc32 mismatch".into()));
    }

    let raw_item_bytes = &bytes[header_end..];
    let item_bytes = match inverse {
        Some(f) => f(raw_item_bytes)?,
        None => raw_item_bytes.to_vec(),
    };

    if item_bytes.len() != total {
        return Err(Error::CorruptBlock(format!(
            "legacy packed items declare {total} bytes but transform produced {}",
            item_bytes.len()
        )));
    }

    let mut items = Vec::with_capacity(num_items);
    let mut p = 0usize;
    for size in sizes {
        items.push(item_bytes[p..p + size].to_vec());
        p += size;
    }
    Ok(items)
}

/// Sequential writer for legacy records.
pub struct LegacyWriter<W: Write> {
    sink: W,
    offset: u64,
}

impl<W: Write> LegacyWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink, offset: 0 }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Write a single-item unpacked record. Returns its file offset.
    pub fn write_unpacked(&mut self, payload: &[u8]) -> Result<u64> {
        let start = self.offset;
        write_record(&mut self.sink, Magic::LegacyUnpacked, payload)?;
        self.offset += record_overhead() + payload.len() as u64;
        Ok(start)
    }

    /// Write a packed record of `items`. Returns its file offset.
    pub fn write_packed(
        &mut self,
        items: &[&[u8]],
        transform: Option<&dyn Fn(&[u8]) -> Result<Vec<u8>>>,
    ) -> Result<u64> {
        let payload = pack_legacy(items, transform)?;
        let start = self.offset;
        write_record(&mut self.sink, Magic::Packed, &payload)?;
        self.offset += record_overhead() + payload.len() as u64;
        Ok(start)
    }
}

/// Sequential, seekable reader over legacy records.
pub struct LegacyScanner<R: ByteSource> {
    source: R,
    max_read_record_size: usize,
    cur_offset: u64,
}

impl<R: ByteSource> LegacyScanner<R> {
    pub fn new(source: R, max_read_record_size: usize) -> Self {
        Self {
            source,
            max_read_record_size,
            cur_offset: 0,
        }
    }

    pub fn tell(&self) -> u64 {
        self.cur_offset
    }

    pub fn seek(&mut self, offset: u64) {
        self.cur_offset = offset;
    }

    /// Read the record starting at the current offset and advance past it.
    /// Returns `Ok(None)` at EOF.
    pub fn next_record(&mut self) -> Result<Option<(u64, LegacyRecord)>> {
        use std::io::{Seek, SeekFrom};
        self.source.seek(SeekFrom::Start(self.cur_offset))?;
        let start = self.cur_offset;
        match read_record(&mut self.source, self.max_read_record_size)? {
            None => Ok(None),
            Some(record) => {
                self.cur_offset = start + record_overhead() + record.bytes.len() as u64;
                Ok(Some((start, record)))
            }
        }
    }
}
