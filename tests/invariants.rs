mod common;

use std::io::Cursor;

use proptest::prelude::*;

use recordbox::transform;
use recordbox::{Error, ScanOptions, Scanner, Writer, WriterOptions};

use common::SharedSink;

fn write_and_read(items: &[Vec<u8>], max_flush_parallelism: usize) -> Vec<Vec<u8>> {
    let sink = SharedSink::new();
    let mut options = WriterOptions::default();
    options.max_flush_parallelism = max_flush_parallelism;
    let mut w = Writer::new(sink.clone(), options).unwrap();
    for item in items {
        w.append(item.clone()).unwrap();
    }
    w.finish().unwrap();

    let mut scanner = Scanner::new(Cursor::new(sink.snapshot()), ScanOptions::default()).unwrap();
    let mut out = Vec::new();
    while scanner.scan().unwrap() {
        out.push(scanner.get().unwrap().to_vec());
    }
    out
}

#[test]
fn block_assembly_is_stable_across_flush_parallelism() {
    let items: Vec<Vec<u8>> = (0..500u32).map(|i| i.to_le_bytes().to_vec()).collect();
    for parallelism in [1usize, 2, 8, 128] {
        let round_tripped = write_and_read(&items, parallelism);
        assert_eq!(round_tripped, items, "mismatch at parallelism={parallelism}");
    }
}

#[test]
fn idempotent_flush_produces_exactly_one_block() {
    let sink = SharedSink::new();
    let mut w = Writer::new(sink.clone(), WriterOptions::default()).unwrap();
    w.append(b"only item".to_vec()).unwrap();
    w.flush().unwrap();
    w.wait().unwrap();
    let stats_after_first_flush = w.stats();
    w.flush().unwrap();
    w.wait().unwrap();
    let stats_after_second_flush = w.stats();
    assert_eq!(stats_after_first_flush.blocks_written, stats_after_second_flush.blocks_written);

    w.finish().unwrap();
    // header + one body block, nothing extra from the redundant flush.
    assert_eq!(w.stats().blocks_written, 2);
}

#[test]
fn flipping_a_chunk_header_byte_surfaces_corrupt_chunk() {
    let sink = SharedSink::new();
    let mut w = Writer::new(sink.clone(), WriterOptions::default()).unwrap();
    w.append(b"hello".to_vec()).unwrap();
    w.finish().unwrap();

    let mut bytes = sink.snapshot();
    // second chunk (index CHUNK_SIZE) is the body block; flip a byte inside
    // its header (offset 12..28), well clear of the magic and crc fields.
    let body_chunk_start = recordbox::CHUNK_SIZE;
    bytes[body_chunk_start + 13] ^= 0xFF;

    let mut scanner = Scanner::new(Cursor::new(bytes), ScanOptions::default()).unwrap();
    let result = scanner.scan();
    assert!(matches!(result, Err(Error::CorruptChunk(_))));
}

#[test]
fn flipping_a_payload_byte_surfaces_corrupt_chunk() {
    let sink = SharedSink::new();
    let mut w = Writer::new(sink.clone(), WriterOptions::default()).unwrap();
    w.append(b"hello world".to_vec()).unwrap();
    w.finish().unwrap();

    let mut bytes = sink.snapshot();
    let body_payload_start = recordbox::CHUNK_SIZE + recordbox::CHUNK_HEADER_SIZE;
    bytes[body_payload_start] ^= 0xFF;

    let mut scanner = Scanner::new(Cursor::new(bytes), ScanOptions::default()).unwrap();
    assert!(matches!(scanner.scan(), Err(Error::CorruptChunk(_))));
}

fn registered_transformer_pairs() -> Vec<Vec<String>> {
    vec![
        vec!["testplus 5".into()],
        vec!["testxor 200".into()],
        vec!["testplus 5".into(), "testxor 200".into()],
        vec!["identity".into(), "testxor 17".into()],
    ]
}

proptest! {
    #[test]
    fn transformer_chain_composition_round_trips(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
        for descriptors in registered_transformer_pairs() {
            let refs: Vec<&str> = descriptors.iter().map(String::as_str).collect();
            let fwd = transform::compose_forward(&refs).unwrap();
            let inv = transform::compose_inverse(&refs).unwrap();
            let mut scratch = Vec::new();
            let encoded = fwd(&mut scratch, &[bytes.as_slice()]).unwrap();
            let decoded = inv(&mut scratch, &[encoded.as_slice()]).unwrap();
            prop_assert_eq!(&decoded, &bytes);
        }
    }

    #[test]
    fn index_callbacks_sum_to_appended_count(count in 0usize..200) {
        let sink = SharedSink::new();
        let mut w = Writer::new(sink.clone(), WriterOptions::default()).unwrap();
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        for i in 0..count {
            let fired = fired.clone();
            w.append_indexed(
                i.to_le_bytes().to_vec(),
                Box::new(move |_loc| { fired.fetch_add(1, std::sync::atomic::Ordering::SeqCst); }),
            ).unwrap();
        }
        w.finish().unwrap();
        prop_assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), count);
    }
}
