//! Wrapping arrival-sequence generator.
//!
//! Entries inside a priority queue are ordered by the raw sequence value, so
//! once the counter wraps, entries admitted after the wrap sort ahead of older
//! entries still queued. That ordering inversion is kept as is; with the
//! default `u64` range it needs 2^64 admissions on one port to show up.

/// Counter handing out `0, 1, .., limit, 0, 1, ..`.
#[derive(Debug, Clone)]
pub struct RotarySequence {
    next: u64,
    limit: u64,
}

impl RotarySequence {
    pub fn new() -> Self {
        Self::with_limit(u64::MAX)
    }

    /// Counter wrapping back to zero after handing out `limit`.
    pub fn with_limit(limit: u64) -> Self {
        RotarySequence { next: 0, limit }
    }

    pub fn next_value(&mut self) -> u64 {
        let value = self.next;
        self.next = if value >= self.limit { 0 } else { value + 1 };
        value
    }

    pub fn peek(&self) -> u64 {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl Default for RotarySequence {
    fn default() -> Self {
        Self::new()
    }
}
