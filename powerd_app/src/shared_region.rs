//! The shared-memory abstraction backing the status map (§4.7). In the
//! original system this is a memory-mapped region attached by multiple
//! processes; the real attach/detach machinery is an out-of-scope external
//! collaborator here (per the tree communicator's `GroupChannel` seam), so
//! this crate depends only on the `SharedRegion` trait and ships one
//! in-process implementation backed by a plain `Vec` of atomics.

use std::sync::atomic::AtomicU64;

/// A fixed-size region of 64-bit words, shared between a producer and one
/// or more readers. Implementations must make every word independently
/// atomically readable/writable; this crate never assumes exclusive access.
pub trait SharedRegion: Send + Sync {
    /// The region's words, in order.
    fn words(&self) -> &[AtomicU64];

    fn len(&self) -> usize {
        self.words().len()
    }
}

/// A `SharedRegion` backed by process-local memory. Suitable for a single
/// controller process; stands in for the cross-process mapping a real
/// deployment would use.
pub struct InProcessRegion {
    storage: Vec<AtomicU64>,
}

impl InProcessRegion {
    pub fn new(num_words: usize) -> Self {
        let mut storage = Vec::with_capacity(num_words);
        storage.resize_with(num_words, || AtomicU64::new(0));
        InProcessRegion { storage }
    }
}

impl SharedRegion for InProcessRegion {
    fn words(&self) -> &[AtomicU64] {
        &self.storage
    }
}
