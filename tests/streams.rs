//! Integration tests for stream ID allocation and reuse.
//!
//! These tests pin down the allocation policy:
//! - freed IDs are reused before the table grows
//! - closing the highest ID contracts the table
//! - no ID is ever issued to two live streams

mod common;

use std::collections::HashSet;

use common::read_all_stream;
use proptest::prelude::*;
use zipsource::Source;

fn streaming_source() -> Source {
    Source::buffer((0u8..=255).collect::<Vec<u8>>())
}

// ============================================================================
// Scenario tests
// ============================================================================

#[test]
fn test_id_reuse_after_middle_close() {
    let mut source = streaming_source();
    assert_eq!(source.open_stream().unwrap(), 0);
    assert_eq!(source.open_stream().unwrap(), 1);
    assert_eq!(source.open_stream().unwrap(), 2);

    source.close_stream(1).unwrap();
    assert_eq!(source.open_stream().unwrap(), 1);

    source.close_stream(0).unwrap();
    source.close_stream(1).unwrap();
    source.close_stream(2).unwrap();
    assert_eq!(source.open_stream_count(), 0);

    // A fresh open starts from zero again.
    assert_eq!(source.open_stream().unwrap(), 0);
    source.close_stream(0).unwrap();
}

#[test]
fn test_reused_id_has_fresh_state() {
    let mut source = streaming_source();
    let a = source.open_stream().unwrap();
    let _b = source.open_stream().unwrap();

    // Drain stream `a` to EOF, then close and reopen its slot.
    let drained = read_all_stream(&mut source, a);
    assert_eq!(drained.len(), 256);
    source.close_stream(a).unwrap();

    let reused = source.open_stream().unwrap();
    assert_eq!(reused, a);
    let mut buf = [0u8; 4];
    assert_eq!(source.read_stream(reused, &mut buf).unwrap(), 4);
    assert_eq!(&buf, &[0, 1, 2, 3]);
    assert_eq!(source.tell_stream(reused).unwrap(), 4);
}

#[test]
fn test_many_streams() {
    let mut source = streaming_source();
    let ids: Vec<usize> = (0..64).map(|_| source.open_stream().unwrap()).collect();
    assert_eq!(source.open_stream_count(), 64);

    // All IDs are distinct.
    let unique: HashSet<usize> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 64);

    for id in ids {
        source.close_stream(id).unwrap();
    }
    assert_eq!(source.open_stream_count(), 0);
}

// ============================================================================
// Property tests
// ============================================================================

#[derive(Debug, Clone)]
enum StreamOp {
    Open,
    /// Close the k-th live stream (mod the live count).
    Close(usize),
}

fn stream_op_strategy() -> impl Strategy<Value = StreamOp> {
    prop_oneof![
        2 => Just(StreamOp::Open),
        1 => (0usize..64).prop_map(StreamOp::Close),
    ]
}

proptest! {
    /// Any interleaving of opens and closes keeps IDs unique among live
    /// streams and reuses only IDs that were previously closed.
    #[test]
    fn prop_ids_unique_across_interleavings(ops in proptest::collection::vec(stream_op_strategy(), 1..120)) {
        let mut source = streaming_source();
        let mut live: Vec<usize> = Vec::new();

        for op in ops {
            match op {
                StreamOp::Open => {
                    let id = source.open_stream().unwrap();
                    prop_assert!(!live.contains(&id), "id {} issued twice", id);
                    live.push(id);
                }
                StreamOp::Close(k) => {
                    if live.is_empty() {
                        continue;
                    }
                    let id = live.remove(k % live.len());
                    source.close_stream(id).unwrap();
                }
            }
            prop_assert_eq!(source.open_stream_count(), live.len());
        }

        for id in live {
            source.close_stream(id).unwrap();
        }
        prop_assert_eq!(source.open_stream_count(), 0);
    }

    /// Streams never observe each other: interleaved reads on two streams
    /// each see the whole data in order.
    #[test]
    fn prop_streams_are_isolated(chunks in proptest::collection::vec(1usize..40, 1..20)) {
        let data: Vec<u8> = (0..500u16).map(|v| (v % 256) as u8).collect();
        let mut source = Source::buffer(data.clone());
        let a = source.open_stream().unwrap();
        let b = source.open_stream().unwrap();

        let mut got_a = Vec::new();
        let mut got_b = Vec::new();
        let mut buf = vec![0u8; 64];
        for (i, chunk) in chunks.iter().enumerate() {
            let (id, sink) = if i % 2 == 0 { (a, &mut got_a) } else { (b, &mut got_b) };
            let n = source.read_stream(id, &mut buf[..*chunk]).unwrap();
            sink.extend_from_slice(&buf[..n]);
        }

        prop_assert_eq!(&data[..got_a.len()], &got_a[..]);
        prop_assert_eq!(&data[..got_b.len()], &got_b[..]);
    }
}
