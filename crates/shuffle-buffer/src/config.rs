//! Configuration for the output buffer's byte budget and diagnostics.

/// Configuration for an [`crate::OutputBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    /// Maximum number of bytes the master queue may hold before the
    /// producer is pushed into the overflow (backpressure) path.
    pub max_buffered_bytes: u64,
    /// Diagnostic cap on the number of outstanding `get` calls a single
    /// consumer may have parked in the pending-read registry at once.
    /// Exceeding this is not an error; it only trips a debug assertion,
    /// since real pull-based consumers keep at most one read in flight.
    pub max_pending_reads_per_consumer: usize,
}

impl BufferConfig {
    /// Creates a new configuration with the given byte budget.
    ///
    /// # Panics
    ///
    /// Panics if `max_buffered_bytes` is zero: a zero budget can never admit
    /// a page directly, which is not a useful buffer to construct.
    pub const fn new(max_buffered_bytes: u64) -> Self {
        assert!(max_buffered_bytes > 0, "max_buffered_bytes must be positive");
        Self {
            max_buffered_bytes,
            max_pending_reads_per_consumer: 1,
        }
    }

    /// Sets the diagnostic per-consumer pending-read cap.
    pub const fn with_max_pending_reads_per_consumer(mut self, max: usize) -> Self {
        self.max_pending_reads_per_consumer = max;
        self
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::new(32 * 1024 * 1024)
    }
}

/// A conservative configuration for small, low-fan-out tasks (1 MiB budget).
pub const SMALL_BUFFER_CONFIG: BufferConfig = BufferConfig::new(1024 * 1024);

/// A generous configuration for wide, high-fan-out shuffles (256 MiB budget).
pub const LARGE_BUFFER_CONFIG: BufferConfig = BufferConfig::new(256 * 1024 * 1024);
