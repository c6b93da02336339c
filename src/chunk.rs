//! Chunk codec (C1) — fixed 32 768-byte storage unit.
//!
//! # On-disk layout (28-byte header, all fields little-endian except magic)
//!
//! ```text
//! Offset  Size  Field
//!    0      8   magic        one of HEADER / PACKED / TRAILER / LEGACY_UNPACKED
//!    8      4   crc32        IEEE CRC over bytes 12..28+payload_len
//!   12      4   flags        reserved, always zero
//!   16      4   payload_size bytes of real payload (<= MAX_PAYLOAD_SIZE)
//!   20      4   total        total chunks in the owning block
//!   24      4   index        this chunk's index in the owning block
//! ```
//!
//! The remainder of the 32 768 bytes is padding: a repeating `DE AD BE EF`
//! pattern, excluded from the CRC. Padding exists only to keep every chunk
//! exactly the same size on disk.

use crate::error::{Error, Result};

pub const CHUNK_SIZE: usize = 32_768;
pub const CHUNK_HEADER_SIZE: usize = 28;
pub const MAX_PAYLOAD_SIZE: usize = CHUNK_SIZE - CHUNK_HEADER_SIZE;

const PADDING_PATTERN: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

/// Discriminates the kind of block a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magic {
    Header,
    Packed,
    Trailer,
    LegacyUnpacked,
    /// Never written to disk; used as a sentinel for "not yet decoded".
    Invalid,
}

impl Magic {
    pub const HEADER: [u8; 8] = [0xD9, 0xE1, 0xD9, 0x5C, 0xC2, 0x16, 0x04, 0xF7];
    pub const PACKED: [u8; 8] = [0x2E, 0x76, 0x47, 0xEB, 0x34, 0x07, 0x3C, 0x2E];
    pub const TRAILER: [u8; 8] = [0xFE, 0xBA, 0x1A, 0xD7, 0xCB, 0xDF, 0x75, 0x3A];
    pub const LEGACY_UNPACKED: [u8; 8] = [0xFC, 0xAE, 0x95, 0x31, 0xF0, 0xD9, 0xBD, 0x20];
    pub const INVALID: [u8; 8] = [0xE4, 0xE7, 0x9A, 0xC1, 0xB3, 0xF6, 0xB7, 0xA2];

    pub fn bytes(self) -> [u8; 8] {
        match self {
            Magic::Header => Self::HEADER,
            Magic::Packed => Self::PACKED,
            Magic::Trailer => Self::TRAILER,
            Magic::LegacyUnpacked => Self::LEGACY_UNPACKED,
            Magic::Invalid => Self::INVALID,
        }
    }

    pub fn from_bytes(bytes: &[u8; 8]) -> Option<Self> {
        match *bytes {
            Self::HEADER => Some(Magic::Header),
            Self::PACKED => Some(Magic::Packed),
            Self::TRAILER => Some(Magic::Trailer),
            Self::LEGACY_UNPACKED => Some(Magic::LegacyUnpacked),
            _ => None,
        }
    }
}

/// A fully decoded chunk: its role, its place in the owning block's
/// sequence, and its real (unpadded) payload bytes.
#[derive(Debug, Clone)]
pub struct DecodedChunk {
    pub magic: Magic,
    pub total: u32,
    pub index: u32,
    pub payload: Vec<u8>,
}

/// Encode one chunk, padding it out to exactly [`CHUNK_SIZE`] bytes.
///
/// `0 <= index < total` and `payload.len() <= MAX_PAYLOAD_SIZE` are the
/// caller's responsibility; the chunk writer enforces both when it splits a
/// block into chunks.
pub fn encode_chunk(magic: Magic, total: u32, index: u32, payload: &[u8]) -> Result<[u8; CHUNK_SIZE]> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::CorruptChunk(format!(
            "payload {} exceeds max chunk payload {MAX_PAYLOAD_SIZE}",
            payload.len()
        )));
    }

    let mut out = [0u8; CHUNK_SIZE];
    out[0..8].copy_from_slice(&magic.bytes());
    // bytes 8..12 (crc32) filled in below, after the rest of the header.
    out[12..16].copy_from_slice(&0u32.to_le_bytes()); // flags, reserved
    out[16..20].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    out[20..24].copy_from_slice(&total.to_le_bytes());
    out[24..28].copy_from_slice(&index.to_le_bytes());
    out[CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + payload.len()].copy_from_slice(payload);

    let mut pad_pos = CHUNK_HEADER_SIZE + payload.len();
    let mut pattern_idx = 0usize;
    while pad_pos < CHUNK_SIZE {
        out[pad_pos] = PADDING_PATTERN[pattern_idx % 4];
        pattern_idx += 1;
        pad_pos += 1;
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&out[12..CHUNK_HEADER_SIZE]);
    hasher.update(payload);
    let crc = hasher.finalize();
    out[8..12].copy_from_slice(&crc.to_le_bytes());

    Ok(out)
}

/// Decode one chunk. Fails with [`Error::CorruptChunk`] on a CRC mismatch or
/// an out-of-range payload size; neither is fatal to the surrounding file —
/// the chunk scanner may resynchronize at the next chunk boundary.
pub fn decode_chunk(bytes: &[u8]) -> Result<DecodedChunk> {
    if bytes.len() != CHUNK_SIZE {
        return Err(Error::CorruptChunk(format!(
            "chunk buffer is {} bytes, expected {CHUNK_SIZE}",
            bytes.len()
        )));
    }

    let magic_bytes: [u8; 8] = bytes[0..8].try_into().unwrap();
    let magic = Magic::from_bytes(&magic_bytes)
        .ok_or_else(|| Error::CorruptChunk(format!("unrecognized magic {magic_bytes:02x?}")))?;

    let stored_crc = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let payload_size = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
    let total = u32::from_le_bytes(bytes[20..24].try_into().unwrap());
    let index = u32::from_le_bytes(bytes[24..28].try_into().unwrap());

    if payload_size > MAX_PAYLOAD_SIZE {
        return Err(Error::CorruptChunk(format!(
            "declared payload size {payload_size} exceeds max {MAX_PAYLOAD_SIZE}"
        )));
    }

    let payload = &bytes[CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + payload_size];

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&bytes[12..CHUNK_HEADER_SIZE]);
    hasher.update(payload);
    if hasher.finalize() != stored_crc {
        return Err(Error::CorruptChunk(format!(
            "crc32 mismatch: stored {stored_crc:#010x}"
        )));
    }

    Ok(DecodedChunk {
        magic,
        total,
        index,
        payload: payload.to_vec(),
    })
}
