//! Pending-read registry: outstanding `get` calls awaiting data or terminal state.

use tokio::sync::oneshot;

use crate::consumer::GetResult;

/// One outstanding `get(id, starting_seq, max_bytes)` call parked until the
/// buffer makes enough progress to answer it.
pub(crate) struct PendingRead<P, H> {
    consumer_id: String,
    starting_seq: u64,
    max_bytes: u64,
    completion: Option<oneshot::Sender<GetResult<P, H>>>,
}

impl<P, H> PendingRead<P, H> {
    pub(crate) fn new(
        consumer_id: String,
        starting_seq: u64,
        max_bytes: u64,
        completion: oneshot::Sender<GetResult<P, H>>,
    ) -> Self {
        Self {
            consumer_id,
            starting_seq,
            max_bytes,
            completion: Some(completion),
        }
    }

    fn is_settled(&self) -> bool {
        match &self.completion {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }

    fn resolve(&mut self, result: GetResult<P, H>) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(result);
        }
    }
}

/// Multiset of parked reads, re-evaluated in insertion order after any
/// mutation that could make progress.
///
/// Exposes index-based accessors rather than a single `retain`/`for_each`
/// combinator: re-evaluating a read needs mutable access to the *rest* of
/// the buffer's state (master queue, consumer table) at the same time as
/// this registry, and a closure-based API would force that access through
/// one borrow of `self` while wanting another of the sibling fields. Plain
/// indices sidestep the conflict entirely — see `buffer::finalize_locked`.
pub(crate) struct PendingReadRegistry<P, H> {
    reads: Vec<PendingRead<P, H>>,
}

impl<P, H> PendingReadRegistry<P, H> {
    pub(crate) fn new() -> Self {
        Self { reads: Vec::new() }
    }

    pub(crate) fn push(&mut self, read: PendingRead<P, H>) {
        self.reads.push(read);
    }

    pub(crate) fn len(&self) -> usize {
        self.reads.len()
    }

    pub(crate) fn count_for(&self, consumer_id: &str) -> usize {
        self.reads.iter().filter(|r| r.consumer_id == consumer_id).count()
    }

    /// Clones out the request shape of entry `i` so callers can compute a
    /// result without holding a borrow of the registry.
    pub(crate) fn request_at(&self, i: usize) -> (String, u64, u64) {
        let read = &self.reads[i];
        (read.consumer_id.clone(), read.starting_seq, read.max_bytes)
    }

    pub(crate) fn resolve_at(&mut self, i: usize, result: GetResult<P, H>) {
        self.reads[i].resolve(result);
    }

    pub(crate) fn is_settled_at(&self, i: usize) -> bool {
        self.reads[i].is_settled()
    }

    /// Removes and discards entry `i`. Callers must have already ensured
    /// it's settled (or are tearing the whole registry down).
    pub(crate) fn remove(&mut self, i: usize) {
        self.reads.remove(i);
    }
}
