//! Shuffle Output Buffer
//!
//! A bounded, multi-consumer, acknowledgement-driven output buffer for a
//! distributed query engine's task runtime. A single local producer calls
//! [`OutputBuffer::enqueue`] to hand pages to the buffer; any number of
//! named remote consumers pull pages back out via [`OutputBuffer::get`] by
//! monotonically increasing sequence id, acknowledging progress simply by
//! asking for the next range.
//!
//! # Lifecycle
//!
//! The buffer moves through five states — `OPEN`, `NO_MORE_BUFFERS`,
//! `NO_MORE_PAGES`, `FLUSHING`, `FINISHED` — driven by
//! [`OutputBuffer::set_output_buffers`], [`OutputBuffer::set_no_more_pages`],
//! and [`OutputBuffer::destroy`]. It reaches `FINISHED` either explicitly, or
//! once every named consumer has acknowledged every page while `FLUSHING`.
//!
//! # Backpressure
//!
//! The producer may have at most one page in flight past the byte budget at
//! a time: [`OutputBuffer::enqueue`] resolves immediately once a page has
//! either been admitted directly or queued in the overflow, and awaiting it
//! a second time isn't meaningful — call it again with the next page only
//! after the previous call's future resolves.
//!
//! # Example
//!
//! ```ignore
//! use shuffle_buffer::{BufferConfig, OutputBuffer, OutputBuffersDescriptor, TokioExecutor};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! struct Page(Vec<u8>);
//! impl shuffle_buffer::SizedPage for Page {
//!     fn size_in_bytes(&self) -> u64 { self.0.len() as u64 }
//! }
//!
//! # async fn run() {
//! let buffer: OutputBuffer<Page, ()> =
//!     OutputBuffer::new("task-0", TokioExecutor::shared(), BufferConfig::default());
//!
//! let mut buffers = HashMap::new();
//! buffers.insert("consumer-a".to_string(), ());
//! let desc = OutputBuffersDescriptor::new(1, buffers, true).unwrap();
//! buffer.set_output_buffers(desc).unwrap();
//!
//! buffer.enqueue(Arc::new(Page(vec![0u8; 128]))).await;
//! buffer.set_no_more_pages();
//!
//! let result = buffer.get("consumer-a", 0, 1024).await.unwrap();
//! assert_eq!(result.pages.len(), 1);
//! # }
//! ```

mod buffer;
mod config;
mod consumer;
mod error;
mod executor;
mod invariants;
mod overflow;
mod page;
mod pending;
mod queue;
mod state;

pub use buffer::{BufferInfo, ConsumerInfo, OutputBuffer};
pub use config::{BufferConfig, LARGE_BUFFER_CONFIG, SMALL_BUFFER_CONFIG};
pub use consumer::GetResult;
pub use error::BufferError;
pub use executor::{BufferExecutor, InlineExecutor, TokioExecutor};
pub use page::{OutputBuffersDescriptor, SizedPage};
pub use state::BufferState;
