//! Scanner (C8) — the reading counterpart to [`crate::writer::Writer`].
//!
//! A scanner sniffs the first 8 bytes of the source to decide whether it's
//! looking at a chunked container or a legacy record stream, and from then
//! on presents the same `scan`/`get`/`seek` surface regardless of which.
//! Sniffing failures and unrecognized magics don't fail construction —
//! they produce a scanner that yields no items and reports the problem via
//! [`Scanner::err`], mirroring the writer's sticky-error convention.

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::block;
use crate::chunk::Magic;
use crate::chunk_scanner::ChunkScanner;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::io_traits::ByteSource;
use crate::legacy::adapter::LegacyAdapter;
use crate::legacy::DEFAULT_MAX_READ_RECORD_SIZE;
use crate::location::ItemLocation;
use crate::transform::{self, TransformFn};

/// Which framing a scanner ended up reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// The pre-chunked single-item/packed-record framing.
    V1Legacy,
    /// The fixed-chunk, typed-header container format.
    V2Chunked,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Cap on a legacy record's declared length, checked before allocating.
    pub max_read_record_size: usize,
    /// Transformer descriptor applied when reading a legacy packed record,
    /// if the file was written with one. Irrelevant to chunked files, whose
    /// transformer chain is always read from the header.
    pub legacy_transformer: Option<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_read_record_size: DEFAULT_MAX_READ_RECORD_SIZE,
            legacy_transformer: None,
        }
    }
}

struct ModernScanner<R: ByteSource> {
    chunk_scanner: ChunkScanner<R>,
    header: Header,
    inverse: TransformFn,
    current_items: Vec<Vec<u8>>,
    current_block_offset: u64,
    item_index: usize,
}

impl<R: ByteSource> ModernScanner<R> {
    fn new(source: R) -> Result<Self> {
        let mut chunk_scanner = ChunkScanner::new(source);
        if !chunk_scanner.scan()? {
            return Err(Error::CorruptHeader("file has no header block".into()));
        }
        let block = chunk_scanner.block().unwrap();
        if block.magic != Magic::Header {
            return Err(Error::CorruptHeader(format!(
                "expected the first block to be a header, found {:?}",
                block.magic
            )));
        }
        let header = Header::decode(&block.bytes)?;
        let descriptors = header.transformers();
        let inverse = transform::compose_inverse(&descriptors)?;

        Ok(Self {
            chunk_scanner,
            header,
            inverse,
            current_items: Vec::new(),
            current_block_offset: 0,
            item_index: 0,
        })
    }

    fn untransform_and_unpack(&self, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut scratch = Vec::new();
        let untransformed = (self.inverse)(&mut scratch, &[bytes])?;
        block::unpack(&untransformed)
    }

    fn scan(&mut self) -> Result<bool> {
        if self.item_index < self.current_items.len() {
            self.item_index += 1;
        }
        loop {
            if self.item_index < self.current_items.len() {
                return Ok(true);
            }
            let block_offset = self.chunk_scanner.tell();
            if !self.chunk_scanner.scan()? {
                self.current_items = Vec::new();
                self.item_index = 0;
                return Ok(false);
            }
            let block = self.chunk_scanner.block().unwrap();
            match block.magic {
                Magic::Trailer => {
                    self.current_items = Vec::new();
                    self.item_index = 0;
                    return Ok(false);
                }
                Magic::Header => continue,
                Magic::Packed => {
                    let items = self.untransform_and_unpack(&block.bytes)?;
                    self.current_items = items;
                    self.current_block_offset = block_offset;
                    self.item_index = 0;
                }
                other => {
                    return Err(Error::CorruptBlock(format!(
                        "unexpected block magic {other:?} in body"
                    )))
                }
            }
        }
    }

    fn get(&self) -> Result<&[u8]> {
        self.current_items
            .get(self.item_index)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::BadState("get called before scan returned true".into()))
    }

    fn seek(&mut self, location: ItemLocation) -> Result<()> {
        // Repeated seeks into the same already-decoded block are common
        // (random access within a hot block) and must not re-run the
        // inverse transform chain every time, so the decoded item list is
        // cached across seeks by block offset.
        if location.block_offset == self.current_block_offset && !self.current_items.is_empty() {
            let item_index = location.item_index as usize;
            if item_index >= self.current_items.len() {
                return Err(Error::BadLocation(format!(
                    "item index {item_index} exceeds block item count {}",
                    self.current_items.len()
                )));
            }
            self.item_index = item_index;
            return Ok(());
        }

        self.chunk_scanner.seek(location.block_offset);
        if !self.chunk_scanner.scan()? {
            return Err(Error::BadLocation(format!(
                "no block at offset {}",
                location.block_offset
            )));
        }
        let block = self.chunk_scanner.block().unwrap();
        if block.magic != Magic::Packed {
            return Err(Error::BadLocation(format!(
                "block at offset {} is not a body block",
                location.block_offset
            )));
        }
        let items = self.untransform_and_unpack(&block.bytes)?;
        let item_index = location.item_index as usize;
        if item_index >= items.len() {
            return Err(Error::BadLocation(format!(
                "item index {item_index} exceeds block item count {}",
                items.len()
            )));
        }
        self.current_items = items;
        self.current_block_offset = location.block_offset;
        self.item_index = item_index;
        Ok(())
    }

    fn trailer(&mut self) -> Result<Option<Vec<u8>>> {
        if !self.header.has_trailer() {
            return Ok(None);
        }
        let block = self.chunk_scanner.read_last_block()?;
        if block.magic != Magic::Trailer {
            return Err(Error::CorruptBlock(
                "header declares a trailer but the last block isn't one".into(),
            ));
        }
        let mut items = self.untransform_and_unpack(&block.bytes)?;
        if items.is_empty() {
            return Err(Error::CorruptBlock("trailer block packed zero items".into()));
        }
        Ok(Some(items.remove(0)))
    }
}

enum Inner<R: ByteSource> {
    Modern(ModernScanner<R>),
    Legacy(LegacyAdapter<R>),
    Errored,
}

/// Reads items back out of a container written by [`crate::writer::Writer`],
/// or out of a legacy record stream.
pub struct Scanner<R: ByteSource> {
    inner: Inner<R>,
    sticky: Option<Arc<Error>>,
}

fn sniff<R: ByteSource>(source: &mut R) -> Result<[u8; 8]> {
    let start = source.stream_position()?;
    let mut buf = [0u8; 8];
    let result = source.read_exact(&mut buf);
    source.seek(SeekFrom::Start(start))?;
    result?;
    Ok(buf)
}

impl<R: ByteSource> Scanner<R> {
    /// Sniffs the source and builds the matching scanner. Construction
    /// itself never fails: a sniff I/O error or an unrecognized magic
    /// produces a scanner that reports the problem through [`Scanner::err`]
    /// instead.
    pub fn new(source: R, options: ScanOptions) -> Result<Self> {
        Ok(Self::classify(source, options))
    }

    /// Like [`Scanner::new`], but confines scanning to a contiguous,
    /// block-aligned shard. Legacy files reject sharding with
    /// [`Error::BadShard`] since they carry no block structure to align to.
    pub fn new_sharded(source: R, options: ScanOptions, start: u64, limit: u64, nshard: u64) -> Result<Self> {
        let mut scanner = Self::classify(source, options);
        match &mut scanner.inner {
            Inner::Modern(m) => {
                if let Err(e) = m.chunk_scanner.limit_shard(start, limit, nshard) {
                    scanner.sticky = Some(Arc::new(e));
                    scanner.inner = Inner::Errored;
                }
            }
            Inner::Legacy(_) => {
                scanner.sticky = Some(Arc::new(Error::BadShard(
                    "sharding is not supported on legacy files".into(),
                )));
                scanner.inner = Inner::Errored;
            }
            Inner::Errored => {}
        }
        Ok(scanner)
    }

    fn classify(mut source: R, options: ScanOptions) -> Self {
        match sniff(&mut source) {
            Ok(magic_bytes) => {
                if magic_bytes == Magic::HEADER {
                    match ModernScanner::new(source) {
                        Ok(m) => Self {
                            inner: Inner::Modern(m),
                            sticky: None,
                        },
                        Err(e) => Self::errored(e),
                    }
                } else if magic_bytes == Magic::LEGACY_UNPACKED || magic_bytes == Magic::PACKED {
                    match LegacyAdapter::new(
                        source,
                        options.max_read_record_size,
                        options.legacy_transformer.as_deref(),
                    ) {
                        Ok(l) => Self {
                            inner: Inner::Legacy(l),
                            sticky: None,
                        },
                        Err(e) => Self::errored(e),
                    }
                } else {
                    Self::errored(Error::CorruptHeader(format!(
                        "unrecognized file magic {magic_bytes:02x?}"
                    )))
                }
            }
            Err(e) => Self::errored(e),
        }
    }

    fn errored(e: Error) -> Self {
        Self {
            inner: Inner::Errored,
            sticky: Some(Arc::new(e)),
        }
    }

    /// The first error this scanner hit, if any.
    pub fn err(&self) -> Option<Arc<Error>> {
        self.sticky.clone()
    }

    pub fn version(&self) -> FormatVersion {
        match self.inner {
            Inner::Legacy(_) => FormatVersion::V1Legacy,
            Inner::Modern(_) | Inner::Errored => FormatVersion::V2Chunked,
        }
    }

    /// The decoded header. Empty (no entries) for legacy files.
    pub fn header(&self) -> Header {
        match &self.inner {
            Inner::Modern(m) => m.header.clone(),
            Inner::Legacy(l) => l.header().clone(),
            Inner::Errored => Header::new(),
        }
    }

    /// Advance to the next item. `Ok(false)` at EOF (or at a trailer block,
    /// for chunked files).
    pub fn scan(&mut self) -> Result<bool> {
        if let Some(e) = &self.sticky {
            return Err((**e).clone());
        }
        let result = match &mut self.inner {
            Inner::Modern(m) => m.scan(),
            Inner::Legacy(l) => l.scan(),
            Inner::Errored => Ok(false),
        };
        if let Err(e) = &result {
            self.sticky = Some(Arc::new(e.clone()));
        }
        result
    }

    /// The item `scan` last landed on.
    pub fn get(&self) -> Result<&[u8]> {
        if let Some(e) = &self.sticky {
            return Err((**e).clone());
        }
        match &self.inner {
            Inner::Modern(m) => m.get(),
            Inner::Legacy(l) => l.get(),
            Inner::Errored => Err(Error::BadState("scanner has no source".into())),
        }
    }

    /// Jump directly to a specific item. Not supported on legacy files.
    pub fn seek(&mut self, location: ItemLocation) -> Result<()> {
        if let Some(e) = &self.sticky {
            return Err((**e).clone());
        }
        match &mut self.inner {
            Inner::Modern(m) => m.seek(location),
            Inner::Legacy(_) => Err(Error::BadLocation("seek is not supported on legacy files".into())),
            Inner::Errored => Err(Error::BadState("scanner has no source".into())),
        }
    }

    /// The trailer block's payload, if the header declares one. `None` for
    /// legacy files, which carry no trailer.
    pub fn trailer(&mut self) -> Result<Option<Vec<u8>>> {
        match &mut self.inner {
            Inner::Modern(m) => m.trailer(),
            Inner::Legacy(l) => l.trailer(),
            Inner::Errored => Ok(None),
        }
    }

    /// No background work to drain; returns the sticky error, if any.
    pub fn finish(&self) -> Result<()> {
        match &self.sticky {
            Some(e) => Err((**e).clone()),
            None => Ok(()),
        }
    }
}
