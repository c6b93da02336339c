//! Bounded buffer pools for the chunk scanner (§5, §9 design notes).
//!
//! The pool size self-tunes to a running average of chunks-per-block so a
//! scanner over mostly single-chunk blocks doesn't hoard buffers sized for
//! an earlier run of multi-chunk blocks.

use crate::chunk::CHUNK_SIZE;

pub struct ChunkBufferPool {
    buffers: Vec<Box<[u8; CHUNK_SIZE]>>,
    approx: f64,
}

impl ChunkBufferPool {
    pub fn new() -> Self {
        Self {
            buffers: Vec::new(),
            approx: 1.0,
        }
    }

    pub fn get(&mut self) -> Box<[u8; CHUNK_SIZE]> {
        self.buffers
            .pop()
            .unwrap_or_else(|| Box::new([0u8; CHUNK_SIZE]))
    }

    pub fn put(&mut self, buf: Box<[u8; CHUNK_SIZE]>) {
        let cap = (2.0 * self.approx + 1.0) as usize;
        if self.buffers.len() < cap {
            self.buffers.push(buf);
        }
    }

    /// Update the running average after a block of `chunks_in_block` chunks
    /// has been scanned, then trim the pool to the new capacity.
    pub fn observe(&mut self, chunks_in_block: usize) {
        self.approx = 0.9 * self.approx + 0.1 * chunks_in_block as f64;
        let cap = (2.0 * self.approx + 1.0) as usize;
        if self.buffers.len() > cap {
            self.buffers.truncate(cap);
        }
    }
}

impl Default for ChunkBufferPool {
    fn default() -> Self {
        Self::new()
    }
}
