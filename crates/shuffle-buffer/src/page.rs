//! Page payload trait and the `OutputBuffers` descriptor.

use crate::error::BufferError;
use std::collections::HashMap;

/// An opaque, immutable unit of transfer. The buffer only ever needs to know
/// a page's size; everything else (columnar layout, row count, encoding) is
/// the producer/consumer's business.
pub trait SizedPage: Send + Sync + 'static {
    /// Size of this page in bytes, used for byte-budget accounting.
    fn size_in_bytes(&self) -> u64;
}

/// A versioned snapshot of the consumer set for one task.
///
/// Invariants (enforced by [`OutputBuffer::set_output_buffers`], not by this
/// type): the set of identifiers in version `v + 1` is a superset of that in
/// version `v`, and once `no_more_buffers` is `true` in an accepted version
/// it remains `true` in every later one.
#[derive(Debug, Clone)]
pub struct OutputBuffersDescriptor<H> {
    version: u64,
    buffers: HashMap<String, H>,
    no_more_buffers: bool,
}

impl<H: Clone> OutputBuffersDescriptor<H> {
    /// Builds a new descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidParameter`] if any consumer identifier
    /// is empty.
    pub fn new(
        version: u64,
        buffers: HashMap<String, H>,
        no_more_buffers: bool,
    ) -> Result<Self, BufferError> {
        if buffers.keys().any(|id| id.is_empty()) {
            return Err(BufferError::invalid_parameter(
                "consumer identifier must not be empty",
            ));
        }
        Ok(Self {
            version,
            buffers,
            no_more_buffers,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn no_more_buffers(&self) -> bool {
        self.no_more_buffers
    }

    pub fn buffers(&self) -> &HashMap<String, H> {
        &self.buffers
    }
}
