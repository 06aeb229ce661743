//! The output buffer itself: ties the state machine, master queue, named
//! consumers, overflow queue and pending-read registry together behind one
//! lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::BufferConfig;
use crate::consumer::{GetResult, NamedConsumer};
use crate::error::BufferError;
use crate::executor::BufferExecutor;
use crate::overflow::OverflowQueue;
use crate::page::{OutputBuffersDescriptor, SizedPage};
use crate::pending::PendingReadRegistry;
use crate::queue::MasterQueue;
use crate::state::{dispatch_transitions, BufferState, Listener, StateMachine};

/// Point-in-time observability snapshot, safe to read without blocking the
/// buffer's producer or consumers.
#[derive(Debug, Clone)]
pub struct BufferInfo {
    pub state: BufferState,
    pub base_seq: u64,
    pub pages_added: u64,
    pub buffered_bytes: u64,
    pub consumers: Vec<ConsumerInfo>,
}

#[derive(Debug, Clone)]
pub struct ConsumerInfo {
    pub id: String,
    pub finished: bool,
    pub in_flight: usize,
    pub ack_seq: u64,
}

struct Inner<P, H> {
    state: StateMachine,
    master: MasterQueue<P>,
    overflow: OverflowQueue<P>,
    consumers: HashMap<String, Arc<NamedConsumer<H>>>,
    aborted: HashSet<String>,
    pending: PendingReadRegistry<P, H>,
    buffers_version: Option<u64>,
    no_more_buffers_seen: bool,
}

impl<P: SizedPage, H: Clone> Inner<P, H> {
    fn new(max_buffered_bytes: u64) -> Self {
        Self {
            state: StateMachine::new(),
            master: MasterQueue::new(max_buffered_bytes),
            overflow: OverflowQueue::new(),
            consumers: HashMap::new(),
            aborted: HashSet::new(),
            pending: PendingReadRegistry::new(),
            buffers_version: None,
            no_more_buffers_seen: false,
        }
    }

    fn transition(&mut self, next: BufferState, transitions: &mut Vec<BufferState>) {
        if self.state.transition_to(next) {
            transitions.push(next);
        }
    }
}

/// A bounded, multi-consumer, acknowledgement-driven output buffer.
///
/// `P` is the page payload type; `H` is the opaque per-consumer partition
/// hint. See the crate docs for the full lifecycle contract.
pub struct OutputBuffer<P, H> {
    inner: Mutex<Inner<P, H>>,
    executor: Arc<dyn BufferExecutor>,
    task_id: String,
    config: BufferConfig,
}

enum GetOutcome<P, H> {
    Ready(GetResult<P, H>),
    Pending(oneshot::Receiver<GetResult<P, H>>),
}

impl<P, H> OutputBuffer<P, H>
where
    P: SizedPage,
    H: Clone + Send + Sync + 'static,
{
    /// Creates a new, empty buffer in state `OPEN`.
    ///
    /// # Panics
    ///
    /// Panics if `config.max_buffered_bytes` is zero (see [`BufferConfig::new`]).
    pub fn new(task_id: impl Into<String>, executor: Arc<dyn BufferExecutor>, config: BufferConfig) -> Self {
        assert!(config.max_buffered_bytes > 0, "max_buffered_bytes must be positive");
        Self {
            inner: Mutex::new(Inner::new(config.max_buffered_bytes)),
            executor,
            task_id: task_id.into(),
            config,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Registers a listener to be invoked, on the buffer's executor, on
    /// every future state transition. Never invoked while the buffer lock
    /// is held.
    pub fn add_state_change_listener<F>(&self, listener: F)
    where
        F: Fn(BufferState) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.state.add_listener(listener);
    }

    /// Observability snapshot. Reads consumer cursors via relaxed atomics;
    /// does not take the buffer's lock for the per-consumer fields, only
    /// briefly to snapshot the consumer map and master-queue counters.
    pub fn info(&self) -> BufferInfo {
        let inner = self.inner.lock().unwrap();
        let consumers = inner
            .consumers
            .iter()
            .map(|(id, c)| ConsumerInfo {
                id: id.clone(),
                finished: c.is_finished(),
                in_flight: c.in_flight(),
                ack_seq: c.ack_seq(),
            })
            .collect();
        BufferInfo {
            state: inner.state.current(),
            base_seq: inner.master.base_seq(),
            pages_added: inner.master.pages_added(),
            buffered_bytes: inner.master.buffered_bytes(),
            consumers,
        }
    }

    /// Accepts a new (or finalized) view of the consumer set.
    ///
    /// Descriptors with a version less than or equal to the currently
    /// accepted one are ignored (idempotent), as are any descriptors at all
    /// once the buffer is `FINISHED`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::IllegalState`] if `desc` would drop a
    /// previously registered consumer identifier, or would un-set
    /// `no_more_buffers` once it has been observed `true`.
    #[instrument(skip(self, desc), fields(task_id = %self.task_id))]
    pub fn set_output_buffers(&self, desc: OutputBuffersDescriptor<H>) -> Result<(), BufferError> {
        let mut transitions = Vec::new();
        let snapshot: Vec<Listener>;
        {
            let mut inner = self.inner.lock().unwrap();

            if inner.state.current().is_terminal() {
                debug!("ignoring set_output_buffers: buffer already FINISHED");
                return Ok(());
            }
            if let Some(current_version) = inner.buffers_version {
                if desc.version() <= current_version {
                    debug!(version = desc.version(), current_version, "ignoring stale OutputBuffers version");
                    return Ok(());
                }
            }
            for existing_id in inner.consumers.keys() {
                if !desc.buffers().contains_key(existing_id) {
                    return Err(BufferError::illegal_state(format!(
                        "OutputBuffers version {} drops previously registered consumer {existing_id}",
                        desc.version()
                    )));
                }
            }
            if inner.no_more_buffers_seen && !desc.no_more_buffers() {
                return Err(BufferError::illegal_state(
                    "no_more_buffers cannot become false once observed true",
                ));
            }

            for (id, hint) in desc.buffers() {
                if !inner.consumers.contains_key(id) {
                    let consumer = Arc::new(NamedConsumer::new(hint.clone()));
                    if inner.aborted.contains(id) {
                        consumer.mark_finished();
                        warn!(consumer = %id, "registering already-aborted consumer as finished");
                    }
                    inner.consumers.insert(id.clone(), consumer);
                }
            }
            inner.buffers_version = Some(desc.version());

            if desc.no_more_buffers() {
                inner.no_more_buffers_seen = true;
                let next = match inner.state.current() {
                    BufferState::Open => Some(BufferState::NoMoreBuffers),
                    BufferState::NoMorePages => Some(BufferState::Flushing),
                    _ => None,
                };
                if let Some(next) = next {
                    inner.transition(next, &mut transitions);
                }
            }

            finalize_locked(&mut inner, &mut transitions);
            snapshot = if transitions.is_empty() {
                Vec::new()
            } else {
                inner.state.listeners_snapshot()
            };
        }
        dispatch_transitions(&transitions, &snapshot, &self.executor);
        Ok(())
    }

    /// Submits a page for delivery. Resolves immediately if the page was
    /// admitted directly or discarded (state forbids pages); resolves once
    /// the page is promoted out of overflow otherwise.
    #[instrument(skip(self, page), fields(task_id = %self.task_id, size = page.size_in_bytes()))]
    pub async fn enqueue(&self, page: Arc<P>) {
        let overflow_rx = {
            let mut transitions = Vec::new();
            let snapshot: Vec<Listener>;
            let rx;
            {
                let mut inner = self.inner.lock().unwrap();
                if !inner.state.current().can_add_pages() {
                    trace!("discarding late page: buffer no longer accepts pages");
                    rx = None;
                } else if inner.master.can_admit(page.size_in_bytes()) {
                    inner.master.admit(page);
                    rx = None;
                } else {
                    rx = Some(inner.overflow.push(page));
                }
                finalize_locked(&mut inner, &mut transitions);
                snapshot = if transitions.is_empty() {
                    Vec::new()
                } else {
                    inner.state.listeners_snapshot()
                };
            }
            dispatch_transitions(&transitions, &snapshot, &self.executor);
            rx
        };
        if let Some(rx) = overflow_rx {
            let _ = rx.await;
        }
    }

    /// Reads the next batch of pages for consumer `id` starting at
    /// `starting_seq`, bounded by `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidParameter`] if `max_bytes` is zero or
    /// `id` is empty.
    pub async fn get(&self, id: &str, starting_seq: u64, max_bytes: u64) -> Result<GetResult<P, H>, BufferError> {
        if max_bytes == 0 {
            return Err(BufferError::invalid_parameter("max_bytes must be positive"));
        }
        if id.is_empty() {
            return Err(BufferError::invalid_parameter("consumer id must not be empty"));
        }

        let outcome = {
            let mut transitions = Vec::new();
            let snapshot: Vec<Listener>;
            let outcome;
            {
                let mut inner = self.inner.lock().unwrap();
                outcome = match attempt_get(&mut inner, id, starting_seq, max_bytes) {
                    Some(result) => GetOutcome::Ready(result),
                    None => {
                        if let Some(consumer) = inner.consumers.get(id) {
                            consumer.inc_in_flight();
                        }
                        let (tx, rx) = oneshot::channel();
                        inner
                            .pending
                            .push(crate::pending::PendingRead::new(id.to_string(), starting_seq, max_bytes, tx));
                        debug_assert!(
                            inner.pending.count_for(id) <= self.config.max_pending_reads_per_consumer,
                            "consumer {id} has more than {} reads parked at once",
                            self.config.max_pending_reads_per_consumer
                        );
                        GetOutcome::Pending(rx)
                    }
                };
                finalize_locked(&mut inner, &mut transitions);
                snapshot = if transitions.is_empty() {
                    Vec::new()
                } else {
                    inner.state.listeners_snapshot()
                };
            }
            dispatch_transitions(&transitions, &snapshot, &self.executor);
            outcome
        };

        match outcome {
            GetOutcome::Ready(result) => Ok(result),
            GetOutcome::Pending(rx) => {
                let result = rx
                    .await
                    .unwrap_or_else(|_| GetResult::empty(starting_seq, true, None));
                let mut inner = self.inner.lock().unwrap();
                if let Some(consumer) = inner.consumers.get(id) {
                    consumer.dec_in_flight();
                }
                Ok(result)
            }
        }
    }

    /// Marks consumer `id` finished, regardless of whether it has registered
    /// yet. Idempotent; a no-op if `id` is already finished.
    #[instrument(skip(self), fields(task_id = %self.task_id))]
    pub fn abort(&self, id: &str) {
        let mut transitions = Vec::new();
        let snapshot: Vec<Listener>;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.aborted.insert(id.to_string());
            if let Some(consumer) = inner.consumers.get(id) {
                consumer.mark_finished();
            } else {
                debug!(consumer = id, "abort arrived before registration");
            }
            finalize_locked(&mut inner, &mut transitions);
            snapshot = if transitions.is_empty() {
                Vec::new()
            } else {
                inner.state.listeners_snapshot()
            };
        }
        dispatch_transitions(&transitions, &snapshot, &self.executor);
    }

    /// Blocks further page admission. Legal from `OPEN` or `NO_MORE_BUFFERS`.
    #[instrument(skip(self), fields(task_id = %self.task_id))]
    pub fn set_no_more_pages(&self) {
        let mut transitions = Vec::new();
        let snapshot: Vec<Listener>;
        {
            let mut inner = self.inner.lock().unwrap();
            let next = match inner.state.current() {
                BufferState::Open => Some(BufferState::NoMorePages),
                BufferState::NoMoreBuffers => Some(BufferState::Flushing),
                _ => None,
            };
            if let Some(next) = next {
                inner.transition(next, &mut transitions);
            }
            finalize_locked(&mut inner, &mut transitions);
            snapshot = if transitions.is_empty() {
                Vec::new()
            } else {
                inner.state.listeners_snapshot()
            };
        }
        dispatch_transitions(&transitions, &snapshot, &self.executor);
    }

    /// Forces the buffer to `FINISHED`, discarding buffered pages and
    /// resolving every outstanding signal. Idempotent.
    #[instrument(skip(self), fields(task_id = %self.task_id))]
    pub fn destroy(&self) {
        let mut transitions = Vec::new();
        let snapshot: Vec<Listener>;
        {
            let mut inner = self.inner.lock().unwrap();
            destroy_locked(&mut inner, &mut transitions);
            snapshot = if transitions.is_empty() {
                Vec::new()
            } else {
                inner.state.listeners_snapshot()
            };
        }
        if !transitions.is_empty() {
            info!(task_id = %self.task_id, "output buffer destroyed");
        }
        dispatch_transitions(&transitions, &snapshot, &self.executor);
    }
}

/// Attempts to resolve a `get` request against the current buffer state.
/// Returns `None` if the request must stay parked. Has side effects even
/// when it returns `None`: an ack carried in `starting_seq` is applied
/// regardless of whether data is available yet.
fn attempt_get<P: SizedPage, H: Clone>(
    inner: &mut Inner<P, H>,
    id: &str,
    starting_seq: u64,
    max_bytes: u64,
) -> Option<GetResult<P, H>> {
    if inner.state.current().is_terminal() && !inner.consumers.contains_key(id) {
        return Some(GetResult::empty(0, true, None));
    }

    let consumer = inner.consumers.get(id)?.clone();

    let ack = consumer.ack_seq();
    if starting_seq < ack {
        return Some(GetResult::empty(starting_seq, false, Some(consumer.partition_hint())));
    }
    if starting_seq > ack {
        consumer.advance_ack(starting_seq);
    }

    let can_add_pages = inner.state.current().can_add_pages();
    let pages_added = inner.master.pages_added();
    consumer.recompute_finished(can_add_pages, pages_added);

    if consumer.is_finished() {
        return Some(GetResult::empty(consumer.ack_seq(), true, Some(consumer.partition_hint())));
    }

    let (end_seq, pages) = inner.master.slice_from(consumer.ack_seq(), max_bytes);
    if pages.is_empty() {
        None
    } else {
        Some(GetResult {
            start_seq: consumer.ack_seq(),
            end_seq,
            closed: false,
            pages,
            partition_hint: Some(consumer.partition_hint()),
        })
    }
}

/// Runs after every public mutator while still holding the lock: discards
/// overflow once pages are blocked, advances the master queue base once the
/// consumer set is frozen, refills from overflow, recomputes each
/// consumer's `finished` flag, re-evaluates parked reads, and finally
/// checks whether the buffer can finish.
///
/// Guarded against reentrancy by construction: this is called exactly once,
/// at the tail of each public method's critical section, never from within
/// itself.
fn finalize_locked<P: SizedPage, H: Clone>(inner: &mut Inner<P, H>, transitions: &mut Vec<BufferState>) {
    let can_add_pages = inner.state.current().can_add_pages();
    if !can_add_pages {
        // Per the overflow contract (spec 4.4): once the buffer can no
        // longer accept pages, every page still parked in overflow resolves
        // empty instead of waiting to be promoted once buffers freeze.
        inner.overflow.drain_discard();
    }

    let can_add_buffers = inner.state.current().can_add_buffers();
    if !can_add_buffers {
        let new_base = inner.consumers.values().map(|c| c.ack_seq()).min();
        if let Some(new_base) = new_base {
            if new_base > inner.master.base_seq() {
                inner.master.advance_base(new_base, can_add_buffers);
            }
        }
        inner.overflow.refill_into(&mut inner.master);
    }

    let pages_added = inner.master.pages_added();
    for consumer in inner.consumers.values() {
        consumer.recompute_finished(can_add_pages, pages_added);
    }

    reevaluate_pending(inner);

    if inner.state.current() == BufferState::Flushing && inner.consumers.values().all(|c| c.is_finished()) {
        destroy_locked(inner, transitions);
    }
}

fn reevaluate_pending<P: SizedPage, H: Clone>(inner: &mut Inner<P, H>) {
    let mut i = 0;
    while i < inner.pending.len() {
        if !inner.pending.is_settled_at(i) {
            let (id, starting_seq, max_bytes) = inner.pending.request_at(i);
            if let Some(result) = attempt_get(inner, &id, starting_seq, max_bytes) {
                inner.pending.resolve_at(i, result);
            }
        }
        if inner.pending.is_settled_at(i) {
            inner.pending.remove(i);
        } else {
            i += 1;
        }
    }
}

fn destroy_locked<P: SizedPage, H: Clone>(inner: &mut Inner<P, H>, transitions: &mut Vec<BufferState>) {
    inner.transition(BufferState::Finished, transitions);
    inner.master.clear();
    inner.overflow.drain_discard();
    for consumer in inner.consumers.values() {
        consumer.mark_finished();
    }
    reevaluate_pending(inner);
}
