//! End-to-end scenarios exercising the full producer/consumer lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use shuffle_buffer::{BufferConfig, BufferState, OutputBuffer, OutputBuffersDescriptor, SizedPage, TokioExecutor};

struct Page(u64);

impl SizedPage for Page {
    fn size_in_bytes(&self) -> u64 {
        self.0
    }
}

fn page(size: u64) -> Arc<Page> {
    Arc::new(Page(size))
}

fn descriptor(version: u64, ids: &[&str], no_more_buffers: bool) -> OutputBuffersDescriptor<()> {
    let mut buffers = HashMap::new();
    for id in ids {
        buffers.insert(id.to_string(), ());
    }
    OutputBuffersDescriptor::new(version, buffers, no_more_buffers).unwrap()
}

#[tokio::test]
async fn single_consumer_replay() {
    let buffer: OutputBuffer<Page, ()> = OutputBuffer::new("task-0", TokioExecutor::shared(), BufferConfig::new(1024));
    buffer.set_output_buffers(descriptor(1, &["a"], true)).unwrap();

    buffer.enqueue(page(200)).await;
    buffer.enqueue(page(300)).await;
    buffer.enqueue(page(400)).await;
    buffer.set_no_more_pages();

    let result = buffer.get("a", 0, 1024).await.unwrap();
    assert_eq!(result.start_seq, 0);
    assert_eq!(result.end_seq, 3);
    assert!(!result.closed);
    assert_eq!(result.pages.len(), 3);

    let result = buffer.get("a", 3, 1024).await.unwrap();
    assert!(result.closed);
    assert!(result.pages.is_empty());

    assert_eq!(buffer.info().state, BufferState::Finished);
}

#[tokio::test]
async fn backpressure_parks_the_producer_until_the_consumer_acks() {
    let buffer: OutputBuffer<Page, ()> = OutputBuffer::new("task-1", TokioExecutor::shared(), BufferConfig::new(500));
    buffer.set_output_buffers(descriptor(1, &["a"], true)).unwrap();

    // First page fits within budget and is admitted directly.
    buffer.enqueue(page(300)).await;
    assert_eq!(buffer.info().buffered_bytes, 300);

    // Second page of the same size would push buffered_bytes to 600,
    // over the 500-byte budget, so it parks in overflow.
    let enqueue_task = {
        let buffer = &buffer;
        buffer.enqueue(page(300))
    };
    tokio::pin!(enqueue_task);

    tokio::select! {
        _ = &mut enqueue_task => panic!("second enqueue should not resolve before the consumer acks"),
        _ = tokio::time::sleep(Duration::from_millis(20)) => {}
    }

    // The consumer pulls the first page...
    let result = buffer.get("a", 0, 300).await.unwrap();
    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.end_seq, 1);

    // ...then acknowledges it by asking for the next range, which advances
    // the master queue's base and frees room for the parked second page.
    let ack = buffer.get("a", result.end_seq, 300).await.unwrap();
    assert_eq!(ack.pages.len(), 1, "second page should now be admitted and served");

    enqueue_task.await;
    assert_eq!(buffer.info().buffered_bytes, 300);
}

#[tokio::test]
async fn two_consumers_one_slow_laggard() {
    let buffer: OutputBuffer<Page, ()> = OutputBuffer::new("task-2", TokioExecutor::shared(), BufferConfig::new(10_000));
    buffer.set_output_buffers(descriptor(1, &["fast", "slow"], true)).unwrap();

    buffer.enqueue(page(100)).await;
    buffer.enqueue(page(100)).await;
    buffer.set_no_more_pages();

    let fast_result = buffer.get("fast", 0, 10_000).await.unwrap();
    assert_eq!(fast_result.pages.len(), 2);
    assert!(!fast_result.closed);

    // The fast consumer finishes, but the buffer stays open: the slow
    // consumer hasn't acknowledged anything yet, so the master queue's
    // base can't advance past it.
    let fast_final = buffer.get("fast", 2, 10_000).await.unwrap();
    assert!(fast_final.closed);
    assert_ne!(buffer.info().state, BufferState::Finished);

    let slow_result = buffer.get("slow", 0, 10_000).await.unwrap();
    assert_eq!(slow_result.pages.len(), 2);
    let slow_final = buffer.get("slow", 2, 10_000).await.unwrap();
    assert!(slow_final.closed);

    assert_eq!(buffer.info().state, BufferState::Finished);
}

#[tokio::test]
async fn abort_before_registration_marks_the_consumer_finished_on_arrival() {
    let buffer: OutputBuffer<Page, ()> = OutputBuffer::new("task-3", TokioExecutor::shared(), BufferConfig::new(1024));
    buffer.abort("late");

    buffer.enqueue(page(100)).await;
    buffer.set_output_buffers(descriptor(1, &["late"], true)).unwrap();

    let result = buffer.get("late", 0, 1024).await.unwrap();
    assert!(result.closed);
    assert!(result.pages.is_empty());
}

#[tokio::test]
async fn late_pages_past_no_more_pages_are_discarded() {
    let buffer: OutputBuffer<Page, ()> = OutputBuffer::new("task-4", TokioExecutor::shared(), BufferConfig::new(1024));
    buffer.set_output_buffers(descriptor(1, &["a"], true)).unwrap();

    buffer.enqueue(page(100)).await;
    buffer.set_no_more_pages();
    // Enqueued after admission is closed: dropped on the floor, resolves
    // immediately, and does not become visible to the consumer.
    buffer.enqueue(page(100)).await;

    let result = buffer.get("a", 0, 1024).await.unwrap();
    assert_eq!(result.pages.len(), 1);
    assert!(result.closed);
}

#[tokio::test]
async fn destroy_resolves_a_pending_read_as_closed() {
    let buffer: OutputBuffer<Page, ()> = OutputBuffer::new("task-5", TokioExecutor::shared(), BufferConfig::new(1024));
    buffer.set_output_buffers(descriptor(1, &["a"], true)).unwrap();

    let get_task = buffer.get("a", 0, 1024);
    tokio::pin!(get_task);

    tokio::select! {
        _ = &mut get_task => panic!("get should park with no pages available"),
        _ = tokio::time::sleep(Duration::from_millis(20)) => {}
    }

    buffer.destroy();

    let result = get_task.await.unwrap();
    assert!(result.closed);
    assert!(result.pages.is_empty());
    assert_eq!(buffer.info().state, BufferState::Finished);
}
