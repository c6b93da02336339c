//! Forward-walking recovery scan — reconstructs a best-effort picture of a
//! container without trusting (or even needing) the header block to have
//! parsed, by inspecting each fixed-size chunk's own CRC independently.
//!
//! Item counts here are best-effort: a body block can only be unpacked if
//! its chunks are intact *and* it went through the identity transformer, or
//! no transformer at all — this scanner has no way to know (or trust) the
//! header's `transformer` list, since the header itself may be among the
//! corrupt chunks it's trying to recover from.

use std::io::{self, Read, Seek, SeekFrom};

use crate::block;
use crate::chunk::{decode_chunk, Magic, CHUNK_SIZE};

/// The health verdict for one scanned chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkHealth {
    /// CRC valid, payload size in range.
    Healthy,
    /// CRC mismatch, or a payload size outside the valid range.
    HeaderCorrupt,
    /// Fewer bytes remained in the stream than one full chunk.
    Truncated { available: u64 },
    /// The first 8 bytes aren't any magic this build recognizes.
    UnknownMagic,
}

impl ChunkHealth {
    pub fn is_usable(&self) -> bool {
        matches!(self, ChunkHealth::Healthy)
    }
}

/// Diagnostic record for one scanned chunk position.
#[derive(Debug, Clone)]
pub struct ScannedChunk {
    pub offset: u64,
    pub magic: Option<Magic>,
    pub health: ChunkHealth,
}

/// Overall quality of a recovery scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryQuality {
    /// All chunks healthy.
    Full,
    /// Some chunks corrupt or missing; some items may be lost.
    Partial,
    /// Chunk structure readable but no item data reconstructed.
    HeaderOnly,
    /// Fewer than half the chunks are healthy; results unreliable.
    Catastrophic,
}

/// Complete report produced by [`scan`].
#[derive(Debug)]
pub struct RecoveryReport {
    pub total_scanned: usize,
    pub healthy_chunks: usize,
    pub corrupt_chunks: usize,
    pub truncated_chunks: usize,
    pub unknown_magic_chunks: usize,
    pub bytes_scanned: u64,
    pub chunk_log: Vec<ScannedChunk>,
    /// Offset of the first chunk that wasn't healthy, if any.
    pub first_corruption_offset: Option<u64>,
    /// Items recovered from body blocks whose chunks were all healthy and
    /// that unpacked cleanly without any transform applied.
    pub reconstructed_item_count: u64,
    pub quality: RecoveryQuality,
}

impl RecoveryReport {
    pub fn health_pct(&self) -> f64 {
        if self.total_scanned == 0 {
            return 100.0;
        }
        self.healthy_chunks as f64 / self.total_scanned as f64 * 100.0
    }

    pub fn summary(&self) -> String {
        format!(
            "{:?} recovery: {}/{} chunks healthy ({:.1}%), ~{} item(s) reconstructed",
            self.quality,
            self.healthy_chunks,
            self.total_scanned,
            self.health_pct(),
            self.reconstructed_item_count,
        )
    }
}

pub type ProgressFn<'a> = dyn FnMut(u64 /* scanned */, u64 /* total_estimate */) + 'a;

/// Scan `reader` from the start, chunk by chunk, without relying on the
/// header block ever having parsed. Only genuine I/O errors propagate;
/// corrupt or missing chunks are recorded in the report instead.
pub fn scan<R, F>(
    reader: &mut R,
    file_size_hint: u64,
    mut progress: Option<&mut F>,
) -> io::Result<RecoveryReport>
where
    R: Read + Seek,
    F: FnMut(u64, u64),
{
    reader.seek(SeekFrom::Start(0))?;

    let mut chunk_log = Vec::new();
    let mut total_scanned = 0usize;
    let mut healthy_chunks = 0usize;
    let mut corrupt_chunks = 0usize;
    let mut truncated_chunks = 0usize;
    let mut unknown_magic_chunks = 0usize;
    let mut bytes_scanned = 0u64;
    let mut first_corruption_offset = None;
    let mut reconstructed_item_count = 0u64;

    let mut pending_payload: Vec<u8> = Vec::new();
    let mut pending_magic: Option<Magic> = None;
    let mut pending_total: u32 = 0;
    let mut pending_next_index: u32 = 0;

    loop {
        let offset = reader.stream_position()?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = read_up_to(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        total_scanned += 1;
        bytes_scanned += n as u64;

        if n < CHUNK_SIZE {
            truncated_chunks += 1;
            first_corruption_offset.get_or_insert(offset);
            chunk_log.push(ScannedChunk {
                offset,
                magic: None,
                health: ChunkHealth::Truncated { available: n as u64 },
            });
            break;
        }

        match decode_chunk(&buf) {
            Ok(decoded) => {
                healthy_chunks += 1;
                chunk_log.push(ScannedChunk {
                    offset,
                    magic: Some(decoded.magic),
                    health: ChunkHealth::Healthy,
                });

                if decoded.index == 0 {
                    pending_payload.clear();
                    pending_magic = Some(decoded.magic);
                    pending_total = decoded.total;
                    pending_next_index = 0;
                }

                if pending_magic == Some(decoded.magic) && decoded.index == pending_next_index {
                    pending_payload.extend_from_slice(&decoded.payload);
                    pending_next_index += 1;
                    if pending_next_index == pending_total {
                        if decoded.magic == Magic::Packed {
                            if let Ok(items) = block::unpack(&pending_payload) {
                                reconstructed_item_count += items.len() as u64;
                            }
                        }
                        pending_payload.clear();
                        pending_magic = None;
                    }
                } else {
                    pending_payload.clear();
                    pending_magic = None;
                }
            }
            Err(_) => {
                corrupt_chunks += 1;
                first_corruption_offset.get_or_insert(offset);
                let magic = buf
                    .get(0..8)
                    .and_then(|s| <[u8; 8]>::try_from(s).ok())
                    .and_then(|m| Magic::from_bytes(&m));
                let health = if magic.is_none() {
                    unknown_magic_chunks += 1;
                    ChunkHealth::UnknownMagic
                } else {
                    ChunkHealth::HeaderCorrupt
                };
                chunk_log.push(ScannedChunk { offset, magic, health });
                pending_payload.clear();
                pending_magic = None;
            }
        }

        if let Some(cb) = progress.as_deref_mut() {
            let estimate = if file_size_hint > 0 { file_size_hint } else { bytes_scanned * 2 };
            cb(bytes_scanned, estimate);
        }
    }

    let quality = if reconstructed_item_count == 0 {
        RecoveryQuality::HeaderOnly
    } else {
        let pct = healthy_chunks as f64 / total_scanned.max(1) as f64;
        if pct >= 0.95 {
            RecoveryQuality::Full
        } else if pct >= 0.50 {
            RecoveryQuality::Partial
        } else {
            RecoveryQuality::Catastrophic
        }
    };

    Ok(RecoveryReport {
        total_scanned,
        healthy_chunks,
        corrupt_chunks,
        truncated_chunks,
        unknown_magic_chunks,
        bytes_scanned,
        chunk_log,
        first_corruption_offset,
        reconstructed_item_count,
        quality,
    })
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

/// Convenience: scan a file at `path` and return the report.
pub fn scan_file(path: &std::path::Path) -> io::Result<RecoveryReport> {
    let mut f = std::fs::File::open(path)?;
    let size = f.metadata()?.len();
    scan::<_, fn(u64, u64)>(&mut f, size, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_writer::ChunkWriter;
    use std::io::Cursor;

    fn build(blocks: &[(Magic, Vec<&[u8]>)]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut w = ChunkWriter::new(&mut out);
        for (magic, items) in blocks {
            w.write(*magic, &block::pack(items)).unwrap();
        }
        out
    }

    #[test]
    fn healthy_file_reconstructs_every_item() {
        let data = build(&[
            (Magic::Header, vec![b"hdr"]),
            (Magic::Packed, vec![b"a", b"b"]),
            (Magic::Packed, vec![b"c"]),
        ]);
        let mut cursor = Cursor::new(data);
        let report = scan::<_, fn(u64, u64)>(&mut cursor, 0, None).unwrap();
        assert_eq!(report.total_scanned, 3);
        assert_eq!(report.corrupt_chunks, 0);
        assert_eq!(report.reconstructed_item_count, 3);
        assert!(report.first_corruption_offset.is_none());
        assert_eq!(report.quality, RecoveryQuality::Full);
    }

    #[test]
    fn corrupt_middle_chunk_is_flagged_and_located() {
        let mut data = build(&[
            (Magic::Header, vec![b"hdr"]),
            (Magic::Packed, vec![b"a"]),
            (Magic::Packed, vec![b"b"]),
        ]);
        let corrupt_offset = CHUNK_SIZE as u64; // second chunk
        data[CHUNK_SIZE + 8] ^= 0xFF; // inside its crc32 field
        let mut cursor = Cursor::new(data);
        let report = scan::<_, fn(u64, u64)>(&mut cursor, 0, None).unwrap();
        assert_eq!(report.corrupt_chunks, 1);
        assert_eq!(report.first_corruption_offset, Some(corrupt_offset));
        // the corrupt block's item is lost, the block after it still recovers
        assert_eq!(report.reconstructed_item_count, 1);
    }

    #[test]
    fn truncated_final_chunk_is_reported() {
        let mut data = build(&[(Magic::Header, vec![b"hdr"]), (Magic::Packed, vec![b"a"])]);
        data.truncate(CHUNK_SIZE + 100);
        let mut cursor = Cursor::new(data);
        let report = scan::<_, fn(u64, u64)>(&mut cursor, 0, None).unwrap();
        assert_eq!(report.truncated_chunks, 1);
        assert_eq!(report.first_corruption_offset, Some(CHUNK_SIZE as u64));
    }
}
