//! Chunk writer (C2) — splits a block into chunks and streams them to a
//! byte sink, tracking the cumulative file offset.
//!
//! All errors are sticky: once a write fails, every subsequent call
//! returns a clone of that same error without touching the sink again.

use std::sync::Arc;

use crate::chunk::{encode_chunk, Magic, MAX_PAYLOAD_SIZE};
use crate::error::{Error, Result};
use crate::io_traits::ByteSink;

pub struct ChunkWriter<W: ByteSink> {
    sink: W,
    offset: u64,
    sticky: Option<Arc<Error>>,
}

impl<W: ByteSink> ChunkWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            offset: 0,
            sticky: None,
        }
    }

    /// Byte offset of the next chunk this writer will emit.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn err(&self) -> Option<Arc<Error>> {
        self.sticky.clone()
    }

    /// Split `block_bytes` into `ceil(len / MAX_PAYLOAD_SIZE)` chunks
    /// (at least one, even for an empty block) and write them in order.
    /// Returns the file offset of the block's first chunk.
    pub fn write(&mut self, magic: Magic, block_bytes: &[u8]) -> Result<u64> {
        if let Some(err) = &self.sticky {
            return Err((**err).clone());
        }

        let block_offset = self.offset;
        let total = block_bytes.chunks(MAX_PAYLOAD_SIZE).count().max(1) as u32;

        let mut chunks = block_bytes.chunks(MAX_PAYLOAD_SIZE);
        for index in 0..total {
            let payload = chunks.next().unwrap_or(&[]);
            let result = encode_chunk(magic, total, index, payload)
                .and_then(|buf| self.sink.write_all(&buf).map_err(Error::from));
            if let Err(e) = result {
                let sticky = Arc::new(e);
                self.sticky = Some(sticky.clone());
                return Err((*sticky).clone());
            }
            self.offset += crate::chunk::CHUNK_SIZE as u64;
        }

        Ok(block_offset)
    }
}
