//! The buffer lifecycle state machine.

use std::fmt;
use std::sync::Arc;

use crate::executor::BufferExecutor;

/// Lifecycle states of an [`crate::OutputBuffer`].
///
/// The only legal transitions are OPEN -> NO_MORE_BUFFERS,
/// OPEN -> NO_MORE_PAGES, NO_MORE_BUFFERS -> FLUSHING,
/// NO_MORE_PAGES -> FLUSHING, FLUSHING -> FINISHED, and
/// `<any>` -> FINISHED via `destroy()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// New pages may be admitted; new consumers may be registered.
    Open,
    /// Admissions allowed; consumer set frozen.
    NoMoreBuffers,
    /// Admissions blocked; registrations still allowed.
    NoMorePages,
    /// No admissions, no new consumers; waiting for consumers to drain.
    Flushing,
    /// Terminal. Master queue and overflow are discarded.
    Finished,
}

impl BufferState {
    /// `true` iff new pages may be admitted to the master queue.
    #[inline]
    pub fn can_add_pages(self) -> bool {
        matches!(self, Self::Open | Self::NoMoreBuffers)
    }

    /// `true` iff the consumer set is not yet frozen.
    #[inline]
    pub fn can_add_buffers(self) -> bool {
        matches!(self, Self::Open | Self::NoMorePages)
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "OPEN",
            Self::NoMoreBuffers => "NO_MORE_BUFFERS",
            Self::NoMorePages => "NO_MORE_PAGES",
            Self::Flushing => "FLUSHING",
            Self::Finished => "FINISHED",
        };
        f.write_str(name)
    }
}

pub(crate) type Listener = Arc<dyn Fn(BufferState) + Send + Sync + 'static>;

/// Tracks the current [`BufferState`] and dispatches transitions to
/// registered listeners on an external executor.
///
/// All mutation happens under the parent buffer's single lock; this type has
/// no locking of its own, it's a plain field of the buffer's `Inner` struct.
/// Listener dispatch is the one thing that must happen *outside* that lock:
/// [`Self::dispatch`] only ever clones `Arc` handles into the executor's
/// job closures, so it never needs to run a listener synchronously while the
/// caller still holds the buffer lock.
pub(crate) struct StateMachine {
    current: BufferState,
    listeners: Vec<Listener>,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self {
            current: BufferState::Open,
            listeners: Vec::new(),
        }
    }

    pub(crate) fn current(&self) -> BufferState {
        self.current
    }

    pub(crate) fn add_listener<F>(&mut self, listener: F)
    where
        F: Fn(BufferState) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Moves to `next` if `next != current`, returning `true` if a
    /// transition actually happened.
    pub(crate) fn transition_to(&mut self, next: BufferState) -> bool {
        if self.current == next {
            return false;
        }
        debug_assert!(
            is_legal_transition(self.current, next),
            "illegal buffer state transition: {} -> {}",
            self.current,
            next
        );
        self.current = next;
        true
    }

    /// Clones out the current listener list so callers can dispatch after
    /// releasing the buffer lock without holding a borrow of `self`.
    pub(crate) fn listeners_snapshot(&self) -> Vec<Listener> {
        self.listeners.clone()
    }
}

/// Hands every listener in `listeners` to `executor` once per state in
/// `transitions`, in order. Must be called with the buffer's lock already
/// released.
pub(crate) fn dispatch_transitions(
    transitions: &[BufferState],
    listeners: &[Listener],
    executor: &Arc<dyn BufferExecutor>,
) {
    for &state in transitions {
        for listener in listeners {
            let listener = Arc::clone(listener);
            executor.execute(Box::new(move || listener(state)));
        }
    }
}

fn is_legal_transition(from: BufferState, to: BufferState) -> bool {
    use BufferState::{Finished, Flushing, NoMoreBuffers, NoMorePages, Open};
    matches!(
        (from, to),
        (Open, NoMoreBuffers)
            | (Open, NoMorePages)
            | (NoMoreBuffers, Flushing)
            | (NoMorePages, Flushing)
            | (Flushing, Finished)
            | (_, Finished)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_match_spec_table() {
        assert!(BufferState::Open.can_add_pages());
        assert!(BufferState::Open.can_add_buffers());
        assert!(BufferState::NoMoreBuffers.can_add_pages());
        assert!(!BufferState::NoMoreBuffers.can_add_buffers());
        assert!(!BufferState::NoMorePages.can_add_pages());
        assert!(BufferState::NoMorePages.can_add_buffers());
        assert!(!BufferState::Flushing.can_add_pages());
        assert!(!BufferState::Flushing.can_add_buffers());
        assert!(!BufferState::Finished.can_add_pages());
        assert!(!BufferState::Finished.can_add_buffers());
    }

    #[test]
    fn transition_to_is_idempotent_at_fixed_point() {
        let mut sm = StateMachine::new();
        assert!(!sm.transition_to(BufferState::Open));
        assert!(sm.transition_to(BufferState::NoMoreBuffers));
        assert!(!sm.transition_to(BufferState::NoMoreBuffers));
    }

    #[test]
    #[should_panic(expected = "illegal buffer state transition")]
    fn illegal_transition_panics_in_debug() {
        let mut sm = StateMachine::new();
        sm.transition_to(BufferState::Flushing);
    }
}
