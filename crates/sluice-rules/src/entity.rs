//! Rule entity contract and id allocation.

use std::sync::atomic::{AtomicU64, Ordering};

/// A rule scoped to one app instance.
pub trait RuleEntity: Clone + Send + Sync + 'static {
    fn id(&self) -> Option<u64>;
    fn set_id(&mut self, id: u64);
    fn app(&self) -> &str;
    fn ip(&self) -> &str;
    fn port(&self) -> i32;
}

/// Source of fresh rule ids for one rule kind.
pub trait IdAllocator: Send + Sync {
    /// Next unused id. Strictly increasing across calls.
    fn next_id(&self) -> u64;

    /// Note an id that entered the repository from outside (e.g. a bulk
    /// refresh), so later allocations never collide with it.
    fn observe(&self, _id: u64) {}
}

/// Atomic counter starting at 1.
#[derive(Debug, Default)]
pub struct SequentialIds {
    last: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdAllocator for SequentialIds {
    fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn observe(&self, id: u64) {
        self.last.fetch_max(id, Ordering::SeqCst);
    }
}
