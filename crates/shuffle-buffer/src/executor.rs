//! Executor abstraction for dispatching state-change listeners.
//!
//! State-change listeners must never run while the buffer's lock is held
//! (see `crate::state`). The buffer takes an injected executor rather than
//! assuming a global runtime, so embedders can route listener dispatch onto
//! whatever task scheduler they already run.

use std::fmt;
use std::sync::Arc;

/// A unit of work to run outside the buffer's critical section.
pub type BoxedJob = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs handed to it by the buffer, off the caller's stack.
///
/// Implementors must not run `job` synchronously on the thread that calls
/// `execute` if that thread might be holding the buffer's lock; in practice
/// this means "spawn it", not "call it".
pub trait BufferExecutor: Send + Sync {
    fn execute(&self, job: BoxedJob);
}

impl fmt::Debug for dyn BufferExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn BufferExecutor")
    }
}

/// A [`BufferExecutor`] that spawns each job onto the ambient Tokio runtime.
///
/// This is the standard executor used by the crate's own tests and examples.
/// Constructing one outside of a Tokio runtime context is a caller error that
/// will surface the first time a listener fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl TokioExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Convenience constructor returning a shareable handle.
    pub fn shared() -> Arc<dyn BufferExecutor> {
        Arc::new(Self)
    }
}

impl BufferExecutor for TokioExecutor {
    fn execute(&self, job: BoxedJob) {
        tokio::spawn(async move { job() });
    }
}

/// A [`BufferExecutor`] that runs jobs inline on the calling thread.
///
/// Useful for unit tests that don't want to spin up a runtime and don't care
/// about the "never under the lock" guarantee (the buffer never calls
/// `execute` while holding its lock regardless of which executor is
/// supplied, so inline execution is safe here — it just forfeits the
/// off-thread dispatch real deployments want).
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl BufferExecutor for InlineExecutor {
    fn execute(&self, job: BoxedJob) {
        job();
    }
}
