//! Error types for output buffer operations.

use thiserror::Error;

/// Errors that can occur when driving an [`crate::OutputBuffer`].
///
/// Per the error taxonomy, these are both synchronous, non-retryable failures:
/// they indicate a caller bug, not a transient condition. Internal invariant
/// breaches are not represented here; they panic at the call site instead
/// (see `crate::invariants`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// A caller-supplied parameter was invalid (non-positive byte bound, empty
    /// consumer id, empty task id, ...).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An operation would violate a data-model invariant (e.g. an
    /// `OutputBuffers` descriptor that drops a previously registered
    /// consumer, or an out-of-order version).
    #[error("illegal state transition: {0}")]
    IllegalState(String),
}

impl BufferError {
    pub(crate) fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub(crate) fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Returns `true` if this error reflects a caller bug rather than a
    /// condition that could ever be retried.
    #[inline]
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::InvalidParameter(_))
    }
}
