//! The master queue: an ordered sequence of pages with byte accounting.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::invariants::{debug_assert_base_monotonic, debug_assert_buffers_frozen_before_drop};
use crate::page::SizedPage;

/// Ordered sequence of pages with a monotonically advancing base sequence id
/// and a running byte total.
pub(crate) struct MasterQueue<P> {
    pages: VecDeque<Arc<P>>,
    base_seq: u64,
    buffered_bytes: u64,
    pages_added: u64,
    max_buffered_bytes: u64,
}

impl<P: SizedPage> MasterQueue<P> {
    pub(crate) fn new(max_buffered_bytes: u64) -> Self {
        Self {
            pages: VecDeque::new(),
            base_seq: 0,
            buffered_bytes: 0,
            pages_added: 0,
            max_buffered_bytes,
        }
    }

    pub(crate) fn base_seq(&self) -> u64 {
        self.base_seq
    }

    pub(crate) fn pages_added(&self) -> u64 {
        self.pages_added
    }

    pub(crate) fn buffered_bytes(&self) -> u64 {
        self.buffered_bytes
    }

    pub(crate) fn len(&self) -> usize {
        self.pages.len()
    }

    /// `true` iff a page of `size` bytes can be admitted directly without
    /// pushing `buffered_bytes` over budget — except into an empty queue,
    /// where the first page is always admitted directly regardless of its
    /// own size (symmetric with `slice_from`'s "always include the first
    /// page" rule on the read side; see Property 3).
    pub(crate) fn can_admit(&self, size: u64) -> bool {
        self.buffered_bytes == 0 || self.buffered_bytes + size <= self.max_buffered_bytes
    }

    /// Appends `page` directly to the tail of the master queue, regardless
    /// of budget. Callers must check [`Self::can_admit`] first for the
    /// producer path; the overflow-refill path also calls this once room has
    /// been confirmed.
    pub(crate) fn admit(&mut self, page: Arc<P>) {
        self.buffered_bytes += page.size_in_bytes();
        self.pages.push_back(page);
        self.pages_added += 1;
    }

    /// Returns a contiguous prefix of pages starting at `from_seq` (which
    /// must be `>= base_seq`) whose cumulative size is `<= max_bytes`,
    /// always including at least one page if any are available.
    pub(crate) fn slice_from(&self, from_seq: u64, max_bytes: u64) -> (u64, Vec<Arc<P>>) {
        debug_assert!(from_seq >= self.base_seq, "slice_from before base_seq");
        let start_idx = (from_seq - self.base_seq) as usize;
        let mut result = Vec::new();
        let mut total = 0u64;
        for page in self.pages.iter().skip(start_idx) {
            let size = page.size_in_bytes();
            if !result.is_empty() && total + size > max_bytes {
                break;
            }
            total += size;
            result.push(Arc::clone(page));
        }
        let end_seq = from_seq + result.len() as u64;
        (end_seq, result)
    }

    /// Drops pages from the head up to (not including) `new_base`, which
    /// must be `>= base_seq`. Returns the total bytes freed. Callers are
    /// responsible for only calling this once the consumer set is frozen
    /// (spec: pages must be preserved from sequence 0 until `no_more_buffers`).
    pub(crate) fn advance_base(&mut self, new_base: u64, can_add_buffers: bool) -> u64 {
        debug_assert_base_monotonic!(self.base_seq, new_base);
        debug_assert_buffers_frozen_before_drop!(can_add_buffers);
        let mut freed = 0u64;
        while self.base_seq < new_base {
            let Some(page) = self.pages.pop_front() else {
                break;
            };
            freed += page.size_in_bytes();
            self.buffered_bytes -= page.size_in_bytes();
            self.base_seq += 1;
        }
        freed
    }

    pub(crate) fn clear(&mut self) {
        self.pages.clear();
        self.buffered_bytes = 0;
    }
}
