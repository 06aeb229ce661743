//! The backpressure gate: an overflow queue of pages awaiting admission.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::invariants::{debug_assert_overflow_fifo, debug_assert_refill_termination};
use crate::page::SizedPage;
use crate::queue::MasterQueue;

struct OverflowEntry<P> {
    seq: u64,
    page: Arc<P>,
    completion: oneshot::Sender<()>,
}

/// FIFO of pages that couldn't be admitted directly, paired with a
/// completion signal resolved once the page is promoted into the master
/// queue (or the buffer gives up on accepting pages at all).
pub(crate) struct OverflowQueue<P> {
    entries: VecDeque<OverflowEntry<P>>,
    next_seq: u64,
}

impl<P: SizedPage> OverflowQueue<P> {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queues `page`, returning the receiver half of its completion signal.
    pub(crate) fn push(&mut self, page: Arc<P>) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(OverflowEntry {
            seq,
            page,
            completion: tx,
        });
        rx
    }

    /// Admits as many overflowed pages as fit into `master`, in FIFO order,
    /// completing each one's signal as it's promoted. Stops once the next
    /// queued page no longer fits or overflow is drained.
    pub(crate) fn refill_into(&mut self, master: &mut MasterQueue<P>) {
        let mut last_seq = None;
        loop {
            let Some(front) = self.entries.front() else {
                break;
            };
            if !master.can_admit(front.page.size_in_bytes()) {
                break;
            }
            let entry = self.entries.pop_front().expect("front just checked Some");
            if let Some(prev) = last_seq {
                debug_assert_overflow_fifo!(prev, entry.seq);
            }
            last_seq = Some(entry.seq);
            master.admit(entry.page);
            let _ = entry.completion.send(());
        }
        debug_assert_refill_termination!(
            self.entries.is_empty(),
            self.entries.front().is_some_and(|e| master.can_admit(e.page.size_in_bytes()))
        );
    }

    /// Drains every queued entry, resolving each completion signal without
    /// admitting the page (used by `destroy()` and when the buffer stops
    /// accepting pages altogether).
    pub(crate) fn drain_discard(&mut self) {
        for entry in self.entries.drain(..) {
            let _ = entry.completion.send(());
        }
    }
}
