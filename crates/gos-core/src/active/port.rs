//! Active port: eleven priority buffers served by weighted round robin, with
//! Early Packet Catch and Discard admission.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, trace};

use crate::budget::{BufferBudget, EPCD_THRESHOLD};
use crate::buffer::{BufferEntry, PriorityQueue};
use crate::classifier::classify;
use crate::packet::GosPacket;
use crate::port::{Admission, LinkSlot, NodeHandle, Port};
use crate::priority::{level_weights, Priority, PRIORITY_LEVELS};
use crate::sequence::RotarySequence;
use crate::stats::{PortCounters, PortStatsSnapshot};

/// A selection attempt gives up after this many empty-buffer observations.
pub const EMPTY_SCAN_LIMIT: u32 = PRIORITY_LEVELS as u32 + 1;

/// Cursor and budget state of the per-port weighted round robin.
struct SchedulerState<P> {
    selected_buffer: usize,
    max_reads: [u32; PRIORITY_LEVELS],
    current_reads: [u32; PRIORITY_LEVELS],
    cached_next: Option<BufferEntry<P>>,
    sequence: RotarySequence,
}

impl<P> SchedulerState<P> {
    fn new(sequence: RotarySequence) -> Self {
        SchedulerState {
            selected_buffer: 0,
            max_reads: level_weights(),
            current_reads: [0; PRIORITY_LEVELS],
            cached_next: None,
            sequence,
        }
    }
}

/// Read-only view of the scheduler cursor, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub selected_buffer: usize,
    pub current_reads: [u32; PRIORITY_LEVELS],
    pub has_cached: bool,
}

/// GoS port.
///
/// Locks nest as port state → one priority queue at a time. The occupancy
/// budget is atomic and never held across a queue lock.
pub struct ActivePort<P> {
    port_id: usize,
    queues: [PriorityQueue<P>; PRIORITY_LEVELS],
    state: Mutex<SchedulerState<P>>,
    budget: Arc<BufferBudget>,
    node: Arc<dyn NodeHandle<P>>,
    link: LinkSlot,
    counters: PortCounters,
}

impl<P: GosPacket> ActivePort<P> {
    /// Port charging its admissions to `budget`, possibly shared with the
    /// other ports of a set.
    pub fn new(port_id: usize, budget: Arc<BufferBudget>, node: Arc<dyn NodeHandle<P>>) -> Self {
        Self::with_sequence(port_id, budget, node, RotarySequence::new())
    }

    pub fn with_sequence(
        port_id: usize,
        budget: Arc<BufferBudget>,
        node: Arc<dyn NodeHandle<P>>,
        sequence: RotarySequence,
    ) -> Self {
        ActivePort {
            port_id,
            queues: std::array::from_fn(|_| PriorityQueue::new()),
            state: Mutex::new(SchedulerState::new(sequence)),
            budget,
            node,
            link: LinkSlot::new(),
            counters: PortCounters::new(),
        }
    }

    /// Standalone bounded port with its own budget.
    pub fn with_capacity(
        port_id: usize,
        capacity_bytes: u64,
        node: Arc<dyn NodeHandle<P>>,
    ) -> Self {
        Self::new(port_id, Arc::new(BufferBudget::bounded(capacity_bytes)), node)
    }

    /// Standalone port that admits everything.
    pub fn unlimited(port_id: usize, node: Arc<dyn NodeHandle<P>>) -> Self {
        Self::new(port_id, Arc::new(BufferBudget::unlimited()), node)
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn budget(&self) -> &Arc<BufferBudget> {
        &self.budget
    }

    /// Shared admission arithmetic. `epcd` selects the reserved headroom and
    /// the notification / retransmission side effects of the arrival path.
    fn admit(&self, packet: P, epcd: bool) -> Admission {
        let priority = classify(&packet);
        let size = packet.size() as u64;

        let mut state = self.lock_state();
        let admitted = self.budget.is_unlimited() || {
            let capacity = self.budget.capacity();
            // A capacity below the headroom admits nothing on the arrival path.
            let limit = if epcd {
                capacity.checked_sub(EPCD_THRESHOLD)
            } else {
                Some(capacity)
            };
            limit.is_some_and(|limit| self.budget.try_reserve(size, limit))
        };

        if admitted {
            let sequence = state.sequence.next_value();
            if epcd {
                self.node
                    .notify_packet_received(&packet, self.node.current_timestamp());
                self.node.record_incoming_stat(&packet);
            }
            self.queues[priority.index()].push(BufferEntry::new(priority, sequence, packet));
            drop(state);
            trace!(port = self.port_id, %priority, sequence, size, "packet admitted");
            self.counters.record_admission(Admission::Admitted);
            return Admission::Admitted;
        }
        drop(state);

        debug!(
            port = self.port_id,
            %priority,
            size,
            occupancy = self.budget.occupancy(),
            capacity = self.budget.capacity(),
            "buffer headroom exhausted, rejecting packet"
        );
        let outcome = if epcd && packet.is_gos_marked() {
            info!(
                port = self.port_id,
                %priority,
                "EPCD discard of GoS packet, requesting retransmission"
            );
            self.node.request_retransmission(&packet, self.port_id);
            Admission::RetransmissionRequested
        } else {
            Admission::Discarded
        };
        self.node.discard(packet);
        self.counters.record_admission(outcome);
        outcome
    }

    /// Weighted round robin over the priority buffers.
    ///
    /// Level `p` is read up to `p + 1` times per cycle. An empty buffer is
    /// marked as fully read so it never holds the cycle back; once all eleven
    /// buffers have been seen as read the budgets start over. The cursor
    /// persists between calls, and the scan gives up after twelve empty-buffer
    /// observations.
    fn select_next(&self, state: &mut SchedulerState<P>) {
        if state.cached_next.is_some() {
            return;
        }

        let mut serviced = 0u32;
        let mut empty = 0u32;
        while empty < EMPTY_SCAN_LIMIT {
            let p = state.selected_buffer;
            let has_budget = state.current_reads[p] < state.max_reads[p];
            match self.queues[p].pop_oldest_if(has_budget) {
                Ok(entry) => {
                    state.current_reads[p] += 1;
                    trace!(
                        port = self.port_id,
                        priority = p,
                        reads = state.current_reads[p],
                        "buffer selected"
                    );
                    state.cached_next = Some(entry);
                    return;
                }
                Err(false) => serviced += 1,
                Err(true) => {
                    state.current_reads[p] = state.max_reads[p];
                    serviced += 1;
                    empty += 1;
                }
            }

            state.selected_buffer = (p + 1) % PRIORITY_LEVELS;
            if serviced == PRIORITY_LEVELS as u32 {
                state.current_reads = [0; PRIORITY_LEVELS];
                serviced = 0;
                trace!(port = self.port_id, "weighted cycle restarted");
            }
        }
    }

    pub fn scheduler_snapshot(&self) -> SchedulerSnapshot {
        let state = self.lock_state();
        SchedulerSnapshot {
            selected_buffer: state.selected_buffer,
            current_reads: state.current_reads,
            has_cached: state.cached_next.is_some(),
        }
    }

    /// Number of packets waiting at one level, not counting a selected one.
    pub fn queued_at(&self, priority: Priority) -> usize {
        self.queues[priority.index()].len()
    }

    pub fn stats(&self) -> PortStatsSnapshot {
        self.counters
            .snapshot(self.port_id, self.occupancy(), self.congestion_level())
    }
}

impl<P: GosPacket> Port<P> for ActivePort<P> {
    fn port_id(&self) -> usize {
        self.port_id
    }

    fn enqueue(&self, packet: P) -> Admission {
        self.admit(packet, true)
    }

    fn re_enqueue(&self, packet: P) -> Admission {
        self.admit(packet, false)
    }

    fn dequeue(&self) -> Option<P> {
        let entry = {
            let mut state = self.lock_state();
            self.select_next(&mut state);
            state.cached_next.take()?
        };
        if !self.budget.is_unlimited() {
            self.budget.release(entry.size() as u64);
        }
        self.counters.record_dequeue(entry.priority(), entry.size());
        Some(entry.into_packet())
    }

    fn peek_priority(&self) -> Option<Priority> {
        let mut state = self.lock_state();
        self.select_next(&mut state);
        state.cached_next.as_ref().map(BufferEntry::priority)
    }

    fn can_dequeue(&self, budget_bytes: usize) -> bool {
        let mut state = self.lock_state();
        self.select_next(&mut state);
        state
            .cached_next
            .as_ref()
            .is_some_and(|entry| entry.size() <= budget_bytes)
    }

    fn occupancy(&self) -> u64 {
        if self.budget.is_unlimited() {
            let state = self.lock_state();
            let cached = state.cached_next.as_ref().map_or(0, |e| e.size() as u64);
            cached + self.queues.iter().map(PriorityQueue::bytes).sum::<u64>()
        } else {
            self.budget.occupancy()
        }
    }

    fn capacity(&self) -> u64 {
        self.budget.capacity()
    }

    fn is_unlimited(&self) -> bool {
        self.budget.is_unlimited()
    }

    fn congestion_level(&self) -> u64 {
        self.budget.congestion_level()
    }

    fn queued_packets(&self) -> usize {
        let state = self.lock_state();
        let cached = usize::from(state.cached_next.is_some());
        cached + self.queues.iter().map(PriorityQueue::len).sum::<usize>()
    }

    fn reset(&self) {
        let mut state = self.lock_state();
        let mut freed = state.cached_next.take().map_or(0, |e| e.size() as u64);
        for queue in &self.queues {
            freed += queue.drain().iter().map(|e| e.size() as u64).sum::<u64>();
        }
        state.selected_buffer = 0;
        state.current_reads = [0; PRIORITY_LEVELS];
        state.sequence.reset();
        drop(state);

        if !self.budget.is_unlimited() {
            self.budget.release(freed);
        }
        self.counters.reset();
        debug!(port = self.port_id, freed, "active port reset");
    }

    fn links(&self) -> &LinkSlot {
        &self.link
    }
}

impl<P> fmt::Debug for ActivePort<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivePort")
            .field("port_id", &self.port_id)
            .field("budget", &self.budget)
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}
