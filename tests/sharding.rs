mod common;

use std::io::Cursor;

use recordbox::{ScanOptions, Scanner, Writer, WriterOptions};

use common::SharedSink;

/// A small xorshift PRNG so the test is deterministic without pulling in a
/// random-number crate.
struct Xorshift(u64);

impl Xorshift {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn range(&mut self, lo: usize, hi: usize) -> usize {
        lo + (self.next_u64() as usize % (hi - lo))
    }
}

#[test]
fn sharded_scan_covers_every_item_once_in_order() {
    let mut rng = Xorshift(0x9E3779B97F4A7C15);
    let mut items = Vec::with_capacity(100_000);
    for _ in 0..100_000 {
        let len = rng.range(1, 1025);
        let byte = (rng.next_u64() % 256) as u8;
        items.push(vec![byte; len]);
    }

    let sink = SharedSink::new();
    let mut w = Writer::new(sink.clone(), WriterOptions::default()).unwrap();
    for (i, item) in items.iter().enumerate() {
        w.append(item.clone()).unwrap();
        if i % 777 == 0 {
            w.flush().unwrap();
        }
    }
    w.finish().unwrap();
    let bytes = sink.snapshot();

    let mut full_scanner = Scanner::new(Cursor::new(bytes.clone()), ScanOptions::default()).unwrap();
    let mut full_items = Vec::new();
    while full_scanner.scan().unwrap() {
        full_items.push(full_scanner.get().unwrap().to_vec());
    }
    assert_eq!(full_items, items);

    const NSHARD: u64 = 10;
    let mut concatenated = Vec::new();
    for shard in 0..NSHARD {
        let mut scanner = Scanner::new_sharded(
            Cursor::new(bytes.clone()),
            ScanOptions::default(),
            shard,
            shard + 1,
            NSHARD,
        )
        .unwrap();
        let mut shard_items = Vec::new();
        while scanner.scan().unwrap() {
            shard_items.push(scanner.get().unwrap().to_vec());
        }
        assert!(
            (8_000..=12_000).contains(&shard_items.len()),
            "shard {shard} had {} items",
            shard_items.len()
        );
        concatenated.extend(shard_items);
    }

    assert_eq!(concatenated, items);
}
