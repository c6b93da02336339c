//! Chunk scanner (C3) — reassembles blocks from consecutive chunks, seeks,
//! and splits a file into contiguous block-aligned shards.

use crate::chunk::{decode_chunk, Magic, CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::io_traits::ByteSource;
use crate::pool::ChunkBufferPool;

/// One reassembled block: its magic and the concatenated payload bytes of
/// every chunk that composed it (padding already stripped per-chunk).
#[derive(Debug, Clone)]
pub struct ScannedBlock {
    pub magic: Magic,
    pub bytes: Vec<u8>,
}

pub struct ChunkScanner<R: ByteSource> {
    source: R,
    cur_offset: u64,
    limit: Option<u64>,
    pool: ChunkBufferPool,
    current: Option<ScannedBlock>,
}

impl<R: ByteSource> ChunkScanner<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            cur_offset: 0,
            limit: None,
            pool: ChunkBufferPool::new(),
            current: None,
        }
    }

    /// File offset of the next block to scan.
    pub fn tell(&self) -> u64 {
        self.cur_offset
    }

    /// Set the next-scan offset. Does not validate chunk alignment.
    pub fn seek(&mut self, offset: u64) {
        self.cur_offset = offset;
        self.current = None;
    }

    /// The most recently reassembled block, if `scan` returned `Ok(true)`.
    pub fn block(&self) -> Option<&ScannedBlock> {
        self.current.as_ref()
    }

    fn read_chunk_at(&mut self, offset: u64) -> Result<crate::chunk::DecodedChunk> {
        use std::io::{Read, Seek, SeekFrom};
        self.source.seek(SeekFrom::Start(offset))?;
        let mut buf = self.pool.get();
        let result = self.source.read_exact(buf.as_mut()).map_err(Error::from);
        let decoded = match result {
            Ok(()) => decode_chunk(buf.as_ref()),
            Err(e) => Err(e),
        };
        self.pool.put(buf);
        decoded
    }

    /// Reassemble the next block. Returns `Ok(false)` at EOF or when the
    /// shard limit has been reached before a new block started.
    ///
    /// On `CorruptChunk`, the scanner's cursor is left at the failing
    /// chunk's offset so a caller-initiated re-seek can attempt recovery.
    pub fn scan(&mut self) -> Result<bool> {
        self.current = None;

        if let Some(limit) = self.limit {
            if self.cur_offset >= limit {
                return Ok(false);
            }
        }

        let file_len = self.source.length()?;
        if self.cur_offset >= file_len {
            return Ok(false);
        }

        let block_start = self.cur_offset;
        let first = self.read_chunk_at(block_start)?;
        if first.index != 0 {
            return Err(Error::CorruptBlock(format!(
                "block at offset {block_start} starts mid-sequence at index {}",
                first.index
            )));
        }

        let magic = first.magic;
        let total = first.total;
        let mut payload = first.payload;
        let mut chunks_read = 1u32;
        let mut offset = block_start + CHUNK_SIZE as u64;

        while chunks_read < total {
            if offset >= file_len {
                return Err(Error::CorruptBlock(format!(
                    "block at offset {block_start} truncated: expected {total} chunks, found {chunks_read}"
                )));
            }
            let chunk = self.read_chunk_at(offset)?;
            if chunk.index == 0 {
                return Err(Error::CorruptBlock(format!(
                    "block at offset {block_start} interrupted by a new block before completing {total} chunks"
                )));
            }
            if chunk.magic != magic || chunk.total != total || chunk.index != chunks_read {
                return Err(Error::CorruptBlock(format!(
                    "block at offset {block_start}: chunk sequence mismatch at offset {offset}"
                )));
            }
            payload.extend_from_slice(&chunk.payload);
            chunks_read += 1;
            offset += CHUNK_SIZE as u64;
        }

        self.pool.observe(chunks_read as usize);
        self.cur_offset = offset;
        self.current = Some(ScannedBlock {
            magic,
            bytes: payload,
        });
        Ok(true)
    }

    /// Confine scanning to a contiguous, block-aligned shard.
    ///
    /// `0 <= start < limit <= nshard` and `nshard >= 1`.
    pub fn limit_shard(&mut self, start: u64, limit: u64, nshard: u64) -> Result<()> {
        if nshard == 0 || start >= limit || limit > nshard {
            return Err(Error::BadShard(format!(
                "invalid shard range start={start} limit={limit} nshard={nshard}"
            )));
        }

        let file_len = self.source.length()?;
        let remaining = file_len.saturating_sub(self.cur_offset);
        let total_chunks = remaining / CHUNK_SIZE as u64;
        let chunks_per_shard = (total_chunks / nshard).max(1);

        let base = self.cur_offset;
        let raw_start = base + start * chunks_per_shard * CHUNK_SIZE as u64;
        let raw_limit = base + limit * chunks_per_shard * CHUNK_SIZE as u64;

        self.cur_offset = self.align_forward_to_block_start(raw_start.min(file_len))?;
        self.limit = Some(raw_limit.min(file_len));
        Ok(())
    }

    /// If `offset` lands mid-block (chunk index > 0), advance past the
    /// remainder of that block so scanning starts at the next block's
    /// first chunk — that block belongs to the previous shard.
    fn align_forward_to_block_start(&mut self, offset: u64) -> Result<u64> {
        let file_len = self.source.length()?;
        if offset >= file_len {
            return Ok(offset);
        }
        let chunk = self.read_chunk_at(offset)?;
        if chunk.index == 0 {
            return Ok(offset);
        }
        let remaining_in_block = (chunk.total - chunk.index) as u64;
        Ok(offset + remaining_in_block * CHUNK_SIZE as u64)
    }

    /// Read the last block in the file without disturbing the running scan
    /// cursor. Relies on the trailer (if present) always being last.
    pub fn read_last_block(&mut self) -> Result<ScannedBlock> {
        let file_len = self.source.length()?;
        if file_len < CHUNK_SIZE as u64 {
            return Err(Error::CorruptBlock("file shorter than one chunk".into()));
        }
        let last_chunk_offset = file_len - CHUNK_SIZE as u64;
        let last = self.read_chunk_at(last_chunk_offset)?;
        let block_start = last_chunk_offset - (last.index as u64) * CHUNK_SIZE as u64;

        let saved_cursor = self.cur_offset;
        let saved_limit = self.limit;
        let saved_current = self.current.take();

        self.cur_offset = block_start;
        self.limit = None;
        let scanned = self.scan()?;
        let result = if scanned {
            self.current.clone().ok_or_else(|| {
                Error::CorruptBlock("scan reported success with no block".into())
            })
        } else {
            Err(Error::CorruptBlock("failed to reassemble last block".into()))
        };

        self.cur_offset = saved_cursor;
        self.limit = saved_limit;
        self.current = saved_current;
        result
    }
}
