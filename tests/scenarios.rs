mod common;

use std::io::Cursor;

use recordbox::header::{KEY_TRAILER, KEY_TRANSFORMER};
use recordbox::{
    Header, ItemLocation, MetaValue, ScanOptions, Scanner, Writer, WriterOptions, CHUNK_SIZE,
};

use common::SharedSink;

#[test]
fn empty_file_is_a_single_header_chunk() {
    let sink = SharedSink::new();
    let mut w = Writer::new(sink.clone(), WriterOptions::default()).unwrap();
    w.finish().unwrap();

    let bytes = sink.snapshot();
    assert_eq!(bytes.len(), CHUNK_SIZE);

    let mut scanner = Scanner::new(Cursor::new(bytes), ScanOptions::default()).unwrap();
    assert_eq!(scanner.header(), Header::new());
    assert!(!scanner.scan().unwrap());
    assert_eq!(scanner.trailer().unwrap(), None);
}

#[test]
fn header_only_with_trailer_set() {
    let sink = SharedSink::new();
    let mut w = Writer::new(sink.clone(), WriterOptions::default()).unwrap();
    w.add_header(KEY_TRAILER, MetaValue::Bool(true)).unwrap();
    w.set_trailer(b"TTT".to_vec()).unwrap();
    w.finish().unwrap();

    let bytes = sink.snapshot();
    assert_eq!(bytes.len(), 2 * CHUNK_SIZE);

    let mut scanner = Scanner::new(Cursor::new(bytes), ScanOptions::default()).unwrap();
    assert!(scanner.header().has_trailer());
    assert!(!scanner.scan().unwrap());
    assert_eq!(scanner.trailer().unwrap(), Some(b"TTT".to_vec()));
}

#[test]
fn three_items_with_a_mid_stream_flush() {
    let sink = SharedSink::new();
    let mut w = Writer::new(sink.clone(), WriterOptions::default()).unwrap();

    let locations: std::sync::Arc<std::sync::Mutex<Vec<ItemLocation>>> =
        std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    for item in [b"F0".to_vec(), b"F1".to_vec()] {
        let locations = locations.clone();
        w.append_indexed(item, Box::new(move |loc| locations.lock().unwrap().push(loc)))
            .unwrap();
    }
    w.flush().unwrap();
    {
        let locations = locations.clone();
        w.append_indexed(b"F2".to_vec(), Box::new(move |loc| locations.lock().unwrap().push(loc)))
            .unwrap();
    }
    w.finish().unwrap();

    let recorded = locations.lock().unwrap().clone();
    assert_eq!(recorded.len(), 3);
    let b0 = recorded[0].block_offset;
    let b1 = recorded[2].block_offset;
    assert_ne!(b0, b1);
    assert_eq!(recorded[0], ItemLocation::new(b0, 0));
    assert_eq!(recorded[1], ItemLocation::new(b0, 1));
    assert_eq!(recorded[2], ItemLocation::new(b1, 0));

    let mut scanner = Scanner::new(Cursor::new(sink.snapshot()), ScanOptions::default()).unwrap();
    let mut items = Vec::new();
    while scanner.scan().unwrap() {
        items.push(scanner.get().unwrap().to_vec());
    }
    assert_eq!(items, vec![b"F0".to_vec(), b"F1".to_vec(), b"F2".to_vec()]);
}

#[test]
fn transformer_chain_round_trips_items_and_trailer() {
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
    let header = scanner.header();
    let transformer_entries: Vec<(&str, &str)> = header
        .entries()
        .iter()
        .filter(|e| e.key == KEY_TRANSFORMER)
        .map(|e| match &e.value {
            MetaValue::Str(s) => (KEY_TRANSFORMER, s.as_str()),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(
        transformer_entries,
        vec![(KEY_TRANSFORMER, "testplus 3"), (KEY_TRANSFORMER, "testxor 111")]
    );

    let mut items = Vec::new();
    while scanner.scan().unwrap() {
        items.push(scanner.get().unwrap().to_vec());
    }
    assert_eq!(items, vec![b"F0".to_vec(), b"F1".to_vec(), b"F2".to_vec()]);
    assert_eq!(scanner.trailer().unwrap(), Some(b"Trailer2".to_vec()));
}

#[test]
fn large_zstd_payload_compresses_under_a_fifth_and_round_trips() {
    let sink = SharedSink::new();
    let mut options = WriterOptions::default();
    options.transformers = vec!["zstd".into()];
    let mut w = Writer::new(sink.clone(), options).unwrap();

    let mut items = Vec::new();
    for i in 0..300u32 {
        let letter = b'A' + (i % 26) as u8;
        items.push(vec![letter; 4096]);
    }
    for item in &items {
        w.append(item.clone()).unwrap();
    }
    w.finish().unwrap();

    let bytes = sink.snapshot();
    let input_size: usize = items.iter().map(Vec::len).sum();
    assert!(
        bytes.len() < input_size / 5,
        "encoded size {} not under 20% of input {}",
        bytes.len(),
        input_size
    );

    let mut scanner = Scanner::new(Cursor::new(bytes), ScanOptions::default()).unwrap();
    let mut decoded = Vec::new();
    while scanner.scan().unwrap() {
        decoded.push(scanner.get().unwrap().to_vec());
    }
    assert_eq!(decoded, items);
}
