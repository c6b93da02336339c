//! Writer (C7) — the header/body/trailer life cycle and its ordered
//! parallel flush pipeline.
//!
//! Per-block serialization (pack + transform) runs on `rayon`'s global
//! pool so independent blocks can serialize concurrently; a single drain
//! thread reorders completed blocks by the sequence number assigned at
//! schedule time and writes them to the chunk writer strictly in that
//! order, so on-disk block order always equals append order regardless of
//! how serialization finished.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::block;
use crate::chunk::Magic;
use crate::chunk_writer::ChunkWriter;
use crate::error::{Error, Result};
use crate::header::{Header, MetaValue, KEY_TRAILER, KEY_TRANSFORMER};
use crate::io_traits::ByteSink;
use crate::location::ItemLocation;
use crate::transform::{self, TransformFn};

/// A callback invoked exactly once, after the item's block has been
/// committed to the sink, with the item's final `(block_offset,
/// item_index)` location.
pub type IndexCallback = Box<dyn FnOnce(ItemLocation) + Send>;

#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Body items buffered before an automatic flush is scheduled.
    pub max_items: usize,
    /// Blocks allowed in flight in the serialization pipeline at once.
    pub max_flush_parallelism: usize,
    /// Transformer descriptors applied (in order) to body and trailer
    /// blocks. The header block is never transformed — it must be
    /// readable before the transformer chain is known.
    pub transformers: Vec<String>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            max_items: 16_384,
            max_flush_parallelism: 8,
            transformers: Vec::new(),
        }
    }
}

impl WriterOptions {
    fn normalize(mut self) -> Self {
        self.max_items = self.max_items.clamp(1, 10_485_760);
        self.max_flush_parallelism = self.max_flush_parallelism.clamp(1, 128);
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WriterStats {
    pub blocks_written: u64,
    pub items_written: u64,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WritingBody,
    WritingTrailer,
    Finished,
}

struct CompletedBlock {
    seq: u64,
    magic: Magic,
    item_count: usize,
    bytes: Result<Vec<u8>>,
    callbacks: Vec<IndexCallback>,
}

struct Shared {
    sticky: Mutex<Option<Arc<Error>>>,
    hwm: Mutex<u64>,
    hwm_changed: Condvar,
    stats: Mutex<WriterStats>,
}

impl Shared {
    fn set_sticky(&self, e: Error) {
        let mut s = self.sticky.lock();
        if s.is_none() {
            *s = Some(Arc::new(e));
        }
    }

    fn sticky(&self) -> Option<Arc<Error>> {
        self.sticky.lock().clone()
    }
}

fn drain_loop<W: ByteSink + Send + 'static>(
    mut chunk_writer: ChunkWriter<W>,
    receiver: crossbeam_channel::Receiver<CompletedBlock>,
    token_tx: crossbeam_channel::Sender<()>,
    shared: Arc<Shared>,
) {
    let mut pending: BTreeMap<u64, CompletedBlock> = BTreeMap::new();
    let mut next_expected: u64 = 0;

    for completed in receiver.iter() {
        pending.insert(completed.seq, completed);
        while let Some(block) = pending.remove(&next_expected) {
            next_expected += 1;
            if shared.sticky().is_none() {
                match block.bytes {
                    Err(e) => shared.set_sticky(e),
                    Ok(bytes) => {
                        let file_offset_before = chunk_writer.offset();
                        match chunk_writer.write(block.magic, &bytes) {
                            Ok(_) => {
                                {
                                    let mut stats = shared.stats.lock();
                                    stats.blocks_written += 1;
                                    stats.items_written += block.item_count as u64;
                                    stats.bytes_written += bytes.len() as u64;
                                }
                                for (i, cb) in block.callbacks.into_iter().enumerate() {
                                    cb(ItemLocation::new(file_offset_before, i as u32));
                                }
                            }
                            Err(e) => shared.set_sticky(e),
                        }
                    }
                }
            }
            let _ = token_tx.send(());
            *shared.hwm.lock() = next_expected;
            shared.hwm_changed.notify_all();
        }
    }
}

/// The header/body/trailer container writer.
pub struct Writer {
    state: State,
    header: Header,
    max_items: usize,
    transform_fn: TransformFn,
    header_scheduled: bool,
    next_seq: u64,
    buffer: Vec<Vec<u8>>,
    buffer_callbacks: Vec<IndexCallback>,
    sender: Option<crossbeam_channel::Sender<CompletedBlock>>,
    token_rx: crossbeam_channel::Receiver<()>,
    token_tx: crossbeam_channel::Sender<()>,
    drain_handle: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl Writer {
    pub fn new<W: ByteSink + Send + 'static>(sink: W, options: WriterOptions) -> Result<Self> {
        let options = options.normalize();

        let mut header = Header::new();
        for descriptor in &options.transformers {
            header.push(KEY_TRANSFORMER, MetaValue::Str(descriptor.clone()));
        }
        let refs: Vec<&str> = options.transformers.iter().map(String::as_str).collect();
        let transform_fn = transform::compose_forward(&refs)?;

        let (sender, receiver) = crossbeam_channel::unbounded::<CompletedBlock>();
        let (token_tx, token_rx) = crossbeam_channel::bounded::<()>(options.max_flush_parallelism);
        for _ in 0..options.max_flush_parallelism {
            let _ = token_tx.send(());
        }

        let shared = Arc::new(Shared {
            sticky: Mutex::new(None),
            hwm: Mutex::new(0),
            hwm_changed: Condvar::new(),
            stats: Mutex::new(WriterStats::default()),
        });

        let chunk_writer = ChunkWriter::new(sink);
        let drain_shared = shared.clone();
        let drain_token_tx = token_tx.clone();
        let drain_handle = std::thread::Builder::new()
            .name("recordbox-writer-drain".into())
            .spawn(move || drain_loop(chunk_writer, receiver, drain_token_tx, drain_shared))
            .map_err(Error::from)?;

        Ok(Self {
            state: State::Initial,
            header,
            max_items: options.max_items,
            transform_fn,
            header_scheduled: false,
            next_seq: 0,
            buffer: Vec::new(),
            buffer_callbacks: Vec::new(),
            sender: Some(sender),
            token_rx,
            token_tx,
            drain_handle: Some(drain_handle),
            shared,
        })
    }

    /// The first observed sticky error, if any.
    pub fn err(&self) -> Option<Arc<Error>> {
        self.shared.sticky()
    }

    /// Cheap snapshot of blocks/items/bytes written so far.
    pub fn stats(&self) -> WriterStats {
        *self.shared.stats.lock()
    }

    fn check_sticky(&self) -> Result<()> {
        match self.shared.sticky() {
            Some(e) => Err((*e).clone()),
            None => Ok(()),
        }
    }

    /// Legal only in `Initial`. Adding `transformer` entries explicitly is
    /// unnecessary — the constructor already added one per configured
    /// transformer, in order.
    pub fn add_header(&mut self, key: impl Into<String>, value: MetaValue) -> Result<()> {
        self.check_sticky()?;
        if self.state != State::Initial {
            return Err(Error::BadState("add_header is only legal in the Initial state".into()));
        }
        let key = key.into();
        if key == KEY_TRAILER && self.header.get(&key).is_some() {
            return Err(Error::BadState("duplicate reserved header key 'trailer'".into()));
        }
        self.header.push(key, value);
        Ok(())
    }

    /// Append an item with no index callback.
    pub fn append(&mut self, value: Vec<u8>) -> Result<()> {
        self.append_indexed(value, Box::new(|_| {}))
    }

    /// Append an item; `on_indexed` runs exactly once after the item's
    /// block commits, with the item's final location.
    pub fn append_indexed(&mut self, value: Vec<u8>, on_indexed: IndexCallback) -> Result<()> {
        if let Some(e) = self.shared.sticky() {
            return Err((*e).clone());
        }
        match self.state {
            State::Initial => {
                self.schedule_header()?;
                self.state = State::WritingBody;
                self.buffer.push(value);
                self.buffer_callbacks.push(on_indexed);
            }
            State::WritingBody => {
                self.buffer.push(value);
                self.buffer_callbacks.push(on_indexed);
                if self.buffer.len() >= self.max_items {
                    self.schedule_body_flush()?;
                }
            }
            State::WritingTrailer | State::Finished => {
                return Err(Error::BadState("append called after set_trailer/finish".into()));
            }
        }
        Ok(())
    }

    /// Schedule a flush of the current body block, if non-empty.
    /// Asynchronous: returns once scheduling completes, not once written.
    pub fn flush(&mut self) -> Result<()> {
        self.check_sticky()?;
        match self.state {
            State::WritingBody => self.schedule_body_flush(),
            _ => Err(Error::BadState("flush is only legal in WritingBody".into())),
        }
    }

    /// Block until every block scheduled so far has been written.
    pub fn wait(&mut self) -> Result<()> {
        let target = self.next_seq;
        let mut hwm = self.shared.hwm.lock();
        while *hwm < target {
            self.shared.hwm_changed.wait(&mut hwm);
        }
        drop(hwm);
        self.check_sticky()
    }

    /// Legal once, from `Initial` or `WritingBody`, and only if
    /// `add_header(trailer, true)` was called first.
    pub fn set_trailer(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.check_sticky()?;
        if !self.header.has_trailer() {
            return Err(Error::BadState("set_trailer requires header trailer=true".into()));
        }
        match self.state {
            State::Initial => self.schedule_header()?,
            State::WritingBody => self.schedule_body_flush()?,
            State::WritingTrailer | State::Finished => {
                return Err(Error::BadState("set_trailer called out of sequence".into()));
            }
        }
        self.schedule_block(Magic::Trailer, vec![bytes], true, Vec::new())?;
        self.state = State::WritingTrailer;
        Ok(())
    }

    /// Must be called exactly once. Schedules any outstanding header/body
    /// flush, drains the pipeline, and returns the sticky error if any.
    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            State::Finished => return Err(Error::BadState("finish called more than once".into())),
            State::Initial => self.schedule_header()?,
            State::WritingBody => self.schedule_body_flush()?,
            State::WritingTrailer => {}
        }
        self.state = State::Finished;
        self.sender = None;
        if let Some(handle) = self.drain_handle.take() {
            let _ = handle.join();
        }
        self.check_sticky()
    }

    fn schedule_header(&mut self) -> Result<()> {
        if self.header_scheduled {
            return Ok(());
        }
        self.header_scheduled = true;
        let encoded = self.header.encode();
        self.schedule_block(Magic::Header, vec![encoded], false, Vec::new())
    }

    fn schedule_body_flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let items = std::mem::take(&mut self.buffer);
        let callbacks = std::mem::take(&mut self.buffer_callbacks);
        self.schedule_block(Magic::Packed, items, true, callbacks)
    }

    fn schedule_block(
        &mut self,
        magic: Magic,
        items: Vec<Vec<u8>>,
        transform: bool,
        callbacks: Vec<IndexCallback>,
    ) -> Result<()> {
        self.token_rx
            .recv()
            .map_err(|_| Error::BadState("writer flush pipeline closed unexpectedly".into()))?;

        let seq = self.next_seq;
        self.next_seq += 1;
        let item_count = items.len();
        let transformer = if transform { Some(self.transform_fn.clone()) } else { None };
        let sender = self
            .sender
            .clone()
            .ok_or_else(|| Error::BadState("writer already finished".into()))?;

        rayon::spawn(move || {
            let refs: Vec<&[u8]> = items.iter().map(Vec::as_slice).collect();
            let packed = block::pack(&refs);
            let bytes = match &transformer {
                Some(f) => {
                    let mut scratch = Vec::new();
                    f(&mut scratch, &[packed.as_slice()])
                }
                None => Ok(packed),
            };
            let _ = sender.send(CompletedBlock {
                seq,
                magic,
                item_count,
                bytes,
                callbacks,
            });
        });
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.sender = None;
        if let Some(handle) = self.drain_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::CHUNK_SIZE;
    use crate::scanner::{ScanOptions, Scanner};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// An owned, cloneable `Write` sink backed by a shared buffer — the
    /// pipeline's drain thread needs a `'static` sink, so tests can't hand
    /// it a borrowed `&mut Vec<u8>`.
    #[derive(Clone)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Vec::new())))
        }

        fn snapshot(&self) -> Vec<u8> {
            self.0.lock().clone()
        }
    }

    impl std::io::Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn empty_file_is_a_single_header_chunk() {
        let sink = SharedSink::new();
        let mut w = Writer::new(sink.clone(), WriterOptions::default()).unwrap();
        w.finish().unwrap();
        assert_eq!(sink.snapshot().len(), CHUNK_SIZE);
    }

    #[test]
    fn three_items_with_a_flush_yield_two_body_blocks() {
        let sink = SharedSink::new();
        let mut w = Writer::new(sink.clone(), WriterOptions::default()).unwrap();
        let locations: Arc<Mutex<Vec<ItemLocation>>> = Arc::new(Mutex::new(Vec::new()));
        for item in [b"F0".to_vec(), b"F1".to_vec()] {
            let locations = locations.clone();
            w.append_indexed(item, Box::new(move |loc| locations.lock().push(loc)))
                .unwrap();
        }
        w.flush().unwrap();
        {
            let locations = locations.clone();
            w.append_indexed(b"F2".to_vec(), Box::new(move |loc| locations.lock().push(loc)))
                .unwrap();
        }
        w.finish().unwrap();
        assert_eq!(locations.lock().len(), 3);

        let mut scanner = Scanner::new(Cursor::new(sink.snapshot()), ScanOptions::default()).unwrap();
        let mut items = Vec::new();
        while scanner.scan().unwrap() {
            items.push(scanner.get().unwrap().to_vec());
        }
        assert_eq!(items, vec![b"F0".to_vec(), b"F1".to_vec(), b"F2".to_vec()]);
    }

    #[test]
    fn transformer_composition_round_trips() {
        let sink = SharedSink::new();
        let mut options = WriterOptions::default();
        options.transformers = vec!["testplus 3".into(), "testxor 111".into()];
        let mut w = Writer::new(sink.clone(), options).unwrap();
        w.add_header(KEY_TRAILER, MetaValue::Bool(true)).unwrap();
        for item in [b"F0".to_vec(), b"F1".to_vec(), b"F2".to_vec()] {
            w.append(item).unwrap();
        }
        w.set_trailer(b"Trailer2".to_vec()).unwrap();
        w.finish().unwrap();

        let mut scanner = Scanner::new(Cursor::new(sink.snapshot()), ScanOptions::default()).unwrap();
        let descriptors: Vec<String> = scanner
            .header()
            .transformers()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(descriptors, vec!["testplus 3".to_string(), "testxor 111".to_string()]);

        let mut items = Vec::new();
        while scanner.scan().unwrap() {
            items.push(scanner.get().unwrap().to_vec());
        }
        assert_eq!(items, vec![b"F0".to_vec(), b"F1".to_vec(), b"F2".to_vec()]);
        assert_eq!(scanner.trailer().unwrap(), Some(b"Trailer2".to_vec()));
    }

    #[test]
    fn sticky_error_stops_further_writes() {
        #[derive(Clone)]
        struct FailAfterOne {
            calls: Arc<AtomicUsize>,
        }
        impl std::io::Write for FailAfterOne {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(buf.len())
                } else {
                    Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
                }
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let sink = FailAfterOne { calls: Arc::new(AtomicUsize::new(0)) };
        let mut w = Writer::new(sink, WriterOptions::default()).unwrap();
        w.append(b"F0".to_vec()).unwrap();
        w.finish().unwrap_err();
        assert!(w.err().is_some());
    }
}
