//! Named consumer state: acknowledgement cursor and completion flag.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::invariants::{debug_assert_ack_monotonic, debug_assert_finished_sticky};

/// A page slice plus metadata handed back from `get`.
pub struct GetResult<P, H> {
    pub start_seq: u64,
    pub end_seq: u64,
    pub closed: bool,
    pub pages: Vec<std::sync::Arc<P>>,
    pub partition_hint: Option<H>,
}

impl<P, H> GetResult<P, H> {
    pub(crate) fn empty(seq: u64, closed: bool, partition_hint: Option<H>) -> Self {
        Self {
            start_seq: seq,
            end_seq: seq,
            closed,
            pages: Vec::new(),
            partition_hint,
        }
    }
}

/// Per-output cursor tracked while a consumer identifier is registered.
///
/// `ack_seq`, `finished`, and `in_flight` are atomics so [`crate::OutputBuffer::info`]
/// can read them without taking the buffer's lock. Any use of these fields
/// that feeds a *decision* (as opposed to pure reporting) must still happen
/// under the lock, since the decision is made jointly with other buffer
/// state that only the lock protects.
pub struct NamedConsumer<H> {
    ack_seq: AtomicU64,
    finished: AtomicBool,
    in_flight: AtomicUsize,
    partition_hint: H,
}

impl<H: Clone> NamedConsumer<H> {
    pub(crate) fn new(partition_hint: H) -> Self {
        Self {
            ack_seq: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            partition_hint,
        }
    }

    pub(crate) fn partition_hint(&self) -> H {
        self.partition_hint.clone()
    }

    pub fn ack_seq(&self) -> u64 {
        self.ack_seq.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn inc_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec_in_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Advances `ack_seq` to `new_ack_seq` if it is greater than the current
    /// value. Returns the previous value.
    pub(crate) fn advance_ack(&self, new_ack_seq: u64) -> u64 {
        let prev = self.ack_seq();
        let next = new_ack_seq.max(prev);
        self.ack_seq.store(next, Ordering::Release);
        debug_assert_ack_monotonic!(prev, next);
        prev
    }

    /// Marks this consumer finished. Sticky: calling this on an
    /// already-finished consumer is a no-op.
    pub(crate) fn mark_finished(&self) {
        let was_finished = self.is_finished();
        self.finished.store(true, Ordering::Release);
        debug_assert_finished_sticky!(was_finished, self.is_finished());
    }

    /// Evaluates the completion rule from the buffer's lifecycle contract:
    /// a consumer is finished iff it was explicitly marked finished
    /// (aborted, or destroy happened), or the buffer can no longer add pages
    /// and this consumer has acknowledged every page ever admitted.
    pub(crate) fn recompute_finished(&self, can_add_pages: bool, pages_added: u64) -> bool {
        if self.is_finished() {
            return true;
        }
        if !can_add_pages && self.ack_seq() >= pages_added {
            self.mark_finished();
            return true;
        }
        false
    }
}
