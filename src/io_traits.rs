//! Capability traits the writer and scanner are generic over.
//!
//! These stand in for the source format's dynamic reader/writer
//! interfaces: a plain `Write` is enough to sink chunks, and a seekable
//! `Read` with a length query is enough to scan them back.

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Anything the chunk writer can append bytes to.
pub trait ByteSink: Write {}
impl<T: Write> ByteSink for T {}

/// Anything the chunk scanner can read and seek within.
///
/// `length` has a default implementation in terms of `Seek` so any
/// `Read + Seek` gets it for free (a temporary seek to the end, then back).
pub trait ByteSource: Read + Seek {
    fn length(&mut self) -> io::Result<u64> {
        let cur = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(cur))?;
        Ok(end)
    }
}
impl<T: Read + Seek> ByteSource for T {}
