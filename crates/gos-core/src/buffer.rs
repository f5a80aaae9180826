//! # Priority buffers
//!
//! [`BufferEntry`] is the admission record of a queued packet and
//! [`PriorityQueue`] one mutex-guarded ordered collection of them. An active
//! port owns one queue per priority level.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::packet::GosPacket;
use crate::priority::Priority;

// ─── BufferEntry ────────────────────────────────────────────────────────────

/// A packet admitted into a port, tagged with its arrival sequence.
///
/// Entries compare by `sequence` only; the priority picks the queue, not the
/// position inside it.
#[derive(Debug)]
pub struct BufferEntry<P> {
    priority: Priority,
    sequence: u64,
    size: usize,
    packet: P,
}

impl<P: GosPacket> BufferEntry<P> {
    pub fn new(priority: Priority, sequence: u64, packet: P) -> Self {
        BufferEntry {
            priority,
            sequence,
            size: packet.size(),
            packet,
        }
    }
}

impl<P> BufferEntry<P> {
    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Size recorded at admission time.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn packet(&self) -> &P {
        &self.packet
    }

    pub fn into_packet(self) -> P {
        self.packet
    }
}

impl<P> PartialEq for BufferEntry<P> {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl<P> Eq for BufferEntry<P> {}

impl<P> PartialOrd for BufferEntry<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for BufferEntry<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

// ─── PriorityQueue ──────────────────────────────────────────────────────────

struct QueueInner<P> {
    entries: BinaryHeap<Reverse<BufferEntry<P>>>,
    bytes: u64,
}

/// Queue of entries for one priority level, oldest sequence first.
///
/// Every operation takes the queue lock for the duration of a single insert or
/// pop and releases it before returning.
pub struct PriorityQueue<P> {
    inner: Mutex<QueueInner<P>>,
}

impl<P> PriorityQueue<P> {
    pub fn new() -> Self {
        PriorityQueue {
            inner: Mutex::new(QueueInner {
                entries: BinaryHeap::new(),
                bytes: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, entry: BufferEntry<P>) {
        let mut inner = self.lock();
        inner.bytes += entry.size as u64;
        inner.entries.push(Reverse(entry));
    }

    /// Removes the entry with the lowest sequence.
    pub fn pop_oldest(&self) -> Option<BufferEntry<P>> {
        let mut inner = self.lock();
        let Reverse(entry) = inner.entries.pop()?;
        inner.bytes = inner.bytes.saturating_sub(entry.size as u64);
        Some(entry)
    }

    /// Pops the oldest entry only when `allow` holds and the queue is non-empty.
    /// Returns `Err(is_empty)` when nothing was popped.
    pub(crate) fn pop_oldest_if(&self, allow: bool) -> Result<BufferEntry<P>, bool> {
        let mut inner = self.lock();
        if inner.entries.is_empty() {
            return Err(true);
        }
        if !allow {
            return Err(false);
        }
        match inner.entries.pop() {
            Some(Reverse(entry)) => {
                inner.bytes = inner.bytes.saturating_sub(entry.size as u64);
                Ok(entry)
            }
            None => Err(true),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Total bytes of the queued entries.
    pub fn bytes(&self) -> u64 {
        self.lock().bytes
    }

    /// Empties the queue and hands back the removed entries, oldest first.
    pub fn drain(&self) -> Vec<BufferEntry<P>> {
        let mut inner = self.lock();
        inner.bytes = 0;
        let mut drained: Vec<BufferEntry<P>> =
            inner.entries.drain().map(|Reverse(entry)| entry).collect();
        drained.sort();
        drained
    }
}

impl<P> Default for PriorityQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}
