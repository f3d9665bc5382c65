use std::sync::atomic::{AtomicI64, Ordering};

/// Offset of the next pull-path event to fetch.
///
/// Events with an id below the cursor have been handed to the dispatcher
/// and are never fetched again. The value only moves forward.
#[derive(Debug, Default)]
pub struct IngestionCursor {
    next: AtomicI64,
}

impl IngestionCursor {
    pub fn new(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }

    pub fn get(&self) -> i64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Move the cursor to `next` if that is ahead. Returns the new value.
    pub fn advance_to(&self, next: i64) -> i64 {
        self.next.fetch_max(next, Ordering::SeqCst).max(next)
    }

    /// Whether the event `id` was already handed off.
    pub fn delivered(&self, id: i64) -> bool {
        id < self.get()
    }
}
