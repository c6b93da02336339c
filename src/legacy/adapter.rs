//! Legacy reader adapter (C9) — presents the modern scan/get surface over
//! the pre-chunked record framing, so callers don't need a separate code
//! path to read old files.
//!
//! A legacy single-item record is modeled as a one-element packed block;
//! that lets the adapter reuse [`unpack_legacy`] for both shapes instead of
//! carrying two parallel unpacking paths.
//!
//! `scan`/`get` follow the same non-advancing-`get` convention as the
//! modern scanner: `scan` moves the cursor to the next item (fetching a
//! fresh record when the current one is exhausted), `get` just reads
//! whatever `scan` last landed on.

use crate::chunk::Magic;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::io_traits::ByteSource;
use crate::legacy::{unpack_legacy, LegacyRecord, LegacyScanner};
use crate::transform::{self, TransformFn};

pub struct LegacyAdapter<R: ByteSource> {
    scanner: LegacyScanner<R>,
    inverse: Option<TransformFn>,
    empty_header: Header,
    current_items: Vec<Vec<u8>>,
    current_block_offset: u64,
    item_index: usize,
}

impl<R: ByteSource> LegacyAdapter<R> {
    pub fn new(source: R, max_read_record_size: usize, legacy_transformer: Option<&str>) -> Result<Self> {
        let inverse = match legacy_transformer {
            Some(descriptor) => Some(transform::global().inverse(descriptor)?),
            None => None,
        };
        Ok(Self {
            scanner: LegacyScanner::new(source, max_read_record_size),
            inverse,
            empty_header: Header::new(),
            current_items: Vec::new(),
            current_block_offset: 0,
            item_index: 0,
        })
    }

    fn unpack_record(&self, record: &LegacyRecord) -> Result<Vec<Vec<u8>>> {
        match record.magic {
            Magic::LegacyUnpacked => {
                let payload = match &self.inverse {
                    Some(f) => {
                        let mut scratch = Vec::new();
                        f(&mut scratch, &[record.bytes.as_slice()])?
                    }
                    None => record.bytes.clone(),
                };
                Ok(vec![payload])
            }
            Magic::Packed => {
                let adapted = self.inverse.as_ref().map(|f| {
                    |bytes: &[u8]| -> Result<Vec<u8>> {
                        let mut scratch = Vec::new();
                        f(&mut scratch, &[bytes])
                    }
                });
                let inverse_ref = adapted.as_ref().map(|f| f as &dyn Fn(&[u8]) -> Result<Vec<u8>>);
                unpack_legacy(&record.bytes, inverse_ref)
            }
            other => Err(Error::CorruptBlock(format!(
                "unexpected legacy record magic {other:?}"
            ))),
        }
    }

    /// Advance to the next item, fetching a fresh record when the current
    /// one is exhausted. `Ok(false)` at EOF.
    pub fn scan(&mut self) -> Result<bool> {
        if self.item_index < self.current_items.len() {
            self.item_index += 1;
        }
        loop {
            if self.item_index < self.current_items.len() {
                return Ok(true);
            }
            match self.scanner.next_record()? {
                None => {
                    self.current_items = Vec::new();
                    self.item_index = 0;
                    return Ok(false);
                }
                Some((offset, record)) => {
                    self.current_items = self.unpack_record(&record)?;
                    self.current_block_offset = offset;
                    self.item_index = 0;
                }
            }
        }
    }

    /// The item `scan` last landed on.
    pub fn get(&self) -> Result<&[u8]> {
        self.current_items
            .get(self.item_index)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::BadState("get called before scan returned true".into()))
    }

    pub fn current_block_offset(&self) -> u64 {
        self.current_block_offset
    }

    /// Legacy files carry no typed header.
    pub fn header(&self) -> &Header {
        &self.empty_header
    }

    /// Legacy files carry no trailer block.
    pub fn trailer(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}
