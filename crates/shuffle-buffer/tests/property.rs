//! Property-based tests for the invariants documented in `shuffle_buffer`'s
//! debug assertions.
//!
//! Coverage:
//! - Monotone acknowledgement (INV-ACK-01)
//! - Contiguous delivery (ordering guarantee, §5)
//! - Bounded memory (INV-MEM-01)

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use shuffle_buffer::{BufferConfig, OutputBuffer, OutputBuffersDescriptor, SizedPage, TokioExecutor};

struct Page(u64);

impl SizedPage for Page {
    fn size_in_bytes(&self) -> u64 {
        self.0
    }
}

fn single_consumer_buffer(max_buffered_bytes: u64) -> OutputBuffer<Page, ()> {
    let buffer = OutputBuffer::new("p", TokioExecutor::shared(), BufferConfig::new(max_buffered_bytes));
    let mut buffers = HashMap::new();
    buffers.insert("c".to_string(), ());
    buffer
        .set_output_buffers(OutputBuffersDescriptor::new(1, buffers, true).unwrap())
        .unwrap();
    buffer
}

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

// =============================================================================
// INV-ACK-01: Monotone Acknowledgement
// =============================================================================

proptest! {
    /// A consumer's ack_seq never moves backwards, regardless of the order in
    /// which `get` is called with non-decreasing or repeated sequence ids.
    #[test]
    fn prop_ack_never_regresses(probe_seqs in prop::collection::vec(0u64..25, 1..40)) {
        rt().block_on(async {
            let buffer = single_consumer_buffer(1_000_000);
            for _ in 0..20 {
                buffer.enqueue(Arc::new(Page(10))).await;
            }
            // Without this, a probe past pages_added parks forever: the
            // completion rule only fires once the state forbids new pages.
            buffer.set_no_more_pages();

            let mut last_ack = 0u64;
            for &seq in &probe_seqs {
                let _ = buffer.get("c", seq, 1024).await.unwrap();
                let ack = buffer.info().consumers[0].ack_seq;
                assert!(ack >= last_ack, "ack_seq decreased: {last_ack} -> {ack}");
                last_ack = ack;
            }
        });
    }
}

// =============================================================================
// Contiguous delivery: a single consumer's reads tile the master stream
// =============================================================================

proptest! {
    /// Reading from sequence 0 in a loop, acknowledging with each response's
    /// `end_seq`, visits every admitted page exactly once and in order.
    #[test]
    fn prop_contiguous_delivery(sizes in prop::collection::vec(1u64..500, 1..30)) {
        rt().block_on(async {
            let buffer = single_consumer_buffer(1_000_000);
            for &size in &sizes {
                buffer.enqueue(Arc::new(Page(size))).await;
            }
            buffer.set_no_more_pages();

            let mut next = 0u64;
            let mut delivered = 0usize;
            loop {
                let result = buffer.get("c", next, 64).await.unwrap();
                assert_eq!(result.start_seq, next, "gap or overlap in delivered range");
                if result.closed {
                    break;
                }
                delivered += result.pages.len();
                next = result.end_seq;
            }
            assert_eq!(delivered, sizes.len(), "did not deliver every admitted page exactly once");
        });
    }
}

// =============================================================================
// INV-MEM-01: Bounded Memory
// =============================================================================

proptest! {
    /// `buffered_bytes` may exceed the configured budget only by the margin
    /// of a single oversized page admitted into an otherwise empty queue,
    /// never by an unbounded amount.
    #[test]
    fn prop_bounded_memory(sizes in prop::collection::vec(1u64..300, 1..20)) {
        rt().block_on(async {
            let budget = 500u64;
            let largest = *sizes.iter().max().unwrap();
            let buffer = Arc::new(single_consumer_buffer(budget));

            let producer = {
                let buffer = Arc::clone(&buffer);
                let sizes = sizes.clone();
                tokio::spawn(async move {
                    for size in sizes {
                        buffer.enqueue(Arc::new(Page(size))).await;
                    }
                    buffer.set_no_more_pages();
                })
            };

            let consumer = {
                let buffer = Arc::clone(&buffer);
                tokio::spawn(async move {
                    let mut next = 0u64;
                    loop {
                        let result = buffer.get("c", next, 64).await.unwrap();
                        let buffered = buffer.info().buffered_bytes;
                        assert!(
                            buffered <= budget + largest,
                            "INV-MEM-01 violated: buffered_bytes {buffered} exceeds budget {budget} + largest page {largest}"
                        );
                        if result.closed {
                            break;
                        }
                        next = result.end_seq;
                    }
                })
            };

            let (p, c) = tokio::join!(producer, consumer);
            p.unwrap();
            c.unwrap();
            assert_eq!(buffer.info().buffered_bytes, 0, "all pages should be acknowledged and dropped by completion");
        });
    }
}
