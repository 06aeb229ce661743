//! Debug assertion macros for output buffer invariants.
//!
//! These macros provide runtime checks for the invariants documented in the
//! crate's module docs. They are only active in debug builds
//! (`#[cfg(debug_assertions)]`), so there is zero overhead in release builds.

// =============================================================================
// INV-ACK-01: Monotone Acknowledgement (Property 1)
// =============================================================================

/// Assert that a consumer's `ack_seq` never moves backwards.
///
/// **Invariant**: `new_ack_seq >= old_ack_seq`
///
/// Used in: `NamedConsumer::advance_ack`
macro_rules! debug_assert_ack_monotonic {
    ($old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-ACK-01 violated: ack_seq decreased from {} to {}",
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-SEQ-01: Base Sequence Never Regresses
// =============================================================================

/// Assert that `base_seq` only advances.
///
/// **Invariant**: `new_base_seq >= old_base_seq`
///
/// Used in: `MasterQueue::advance_base`
macro_rules! debug_assert_base_monotonic {
    ($old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-SEQ-01 violated: base_seq decreased from {} to {}",
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-MEM-01: Bounded Memory (Property 3)
// =============================================================================

/// Assert that the overflow refill loop only stops because overflow is
/// empty or the next queued page genuinely doesn't fit, never because of a
/// bookkeeping error.
///
/// **Invariant**: after refilling from overflow, `overflow.is_empty() ||
/// !master.can_admit(next_page_size)`
///
/// Used in: `OverflowQueue::refill_into`
macro_rules! debug_assert_refill_termination {
    ($overflow_empty:expr, $front_fits:expr) => {
        debug_assert!(
            $overflow_empty || !$front_fits,
            "INV-MEM-01 violated: refill stopped with room for the next overflow entry"
        )
    };
}

// =============================================================================
// INV-DROP-01: No Head-Drop Before Buffers Are Frozen
// =============================================================================

/// Assert that the master queue head is never dropped while the consumer set
/// can still grow (an as-yet-unregistered consumer is assumed to want the
/// full stream from sequence 0).
///
/// **Invariant**: `advance_base` is only ever called once `can_add_buffers`
/// is `false`.
///
/// Used in: `MasterQueue::advance_base`
macro_rules! debug_assert_buffers_frozen_before_drop {
    ($can_add_buffers:expr) => {
        debug_assert!(
            !$can_add_buffers,
            "INV-DROP-01 violated: dropped master queue head while consumer set was still open"
        )
    };
}

// =============================================================================
// INV-FIN-01: Finished Is Sticky
// =============================================================================

/// Assert that a consumer already finished never becomes un-finished.
///
/// **Invariant**: `was_finished => is_finished`
///
/// Used in: `NamedConsumer::mark_finished`
macro_rules! debug_assert_finished_sticky {
    ($was_finished:expr, $is_finished:expr) => {
        debug_assert!(
            !$was_finished || $is_finished,
            "INV-FIN-01 violated: a finished consumer became un-finished"
        )
    };
}

// =============================================================================
// INV-OVF-01: Overflow FIFO Order Preserved
// =============================================================================

/// Assert that overflow entries are admitted in the order they were queued.
///
/// Used in: `OverflowQueue::drain_into`
macro_rules! debug_assert_overflow_fifo {
    ($prev_seq:expr, $this_seq:expr) => {
        debug_assert!(
            $this_seq > $prev_seq,
            "INV-OVF-01 violated: overflow admitted out of FIFO order ({} after {})",
            $this_seq,
            $prev_seq
        )
    };
}

pub(crate) use debug_assert_ack_monotonic;
pub(crate) use debug_assert_base_monotonic;
pub(crate) use debug_assert_buffers_frozen_before_drop;
pub(crate) use debug_assert_finished_sticky;
pub(crate) use debug_assert_overflow_fifo;
pub(crate) use debug_assert_refill_termination;
