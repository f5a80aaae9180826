//! # Drop-tail FIFO ports
//!
//! The discipline of non-active nodes: one queue per port, no classification,
//! no reserved headroom, no retransmission requests, plain round robin across
//! the ports of a set. Everything is reported as best effort.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace, warn};

use crate::budget::{BufferBudget, BufferMode};
use crate::config::PortSetConfig;
use crate::error::{GosError, Result};
use crate::packet::GosPacket;
use crate::port::{Admission, LinkSlot, NodeHandle, Port, PortSet};
use crate::priority::Priority;
use crate::stats::{PortCounters, PortSetStatsSnapshot, PortStatsSnapshot};

// ─── FifoPort ───────────────────────────────────────────────────────────────

struct FifoQueue<P> {
    packets: VecDeque<P>,
    bytes: u64,
}

pub struct FifoPort<P> {
    port_id: usize,
    queue: Mutex<FifoQueue<P>>,
    budget: Arc<BufferBudget>,
    node: Arc<dyn NodeHandle<P>>,
    link: LinkSlot,
    counters: PortCounters,
}

impl<P: GosPacket> FifoPort<P> {
    pub fn new(port_id: usize, budget: Arc<BufferBudget>, node: Arc<dyn NodeHandle<P>>) -> Self {
        FifoPort {
            port_id,
            queue: Mutex::new(FifoQueue {
                packets: VecDeque::new(),
                bytes: 0,
            }),
            budget,
            node,
            link: LinkSlot::new(),
            counters: PortCounters::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FifoQueue<P>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self, packet: P, notify: bool) -> Admission {
        let size = packet.size() as u64;
        let mut queue = self.lock();
        let admitted = self.budget.is_unlimited()
            || self.budget.try_reserve(size, self.budget.capacity());
        if !admitted {
            drop(queue);
            debug!(port = self.port_id, size, "fifo port full, dropping packet");
            self.node.discard(packet);
            self.counters.record_admission(Admission::Discarded);
            return Admission::Discarded;
        }
        if notify {
            self.node
                .notify_packet_received(&packet, self.node.current_timestamp());
            self.node.record_incoming_stat(&packet);
        }
        queue.bytes += size;
        queue.packets.push_back(packet);
        self.counters.record_admission(Admission::Admitted);
        Admission::Admitted
    }

    pub fn stats(&self) -> PortStatsSnapshot {
        self.counters
            .snapshot(self.port_id, self.occupancy(), self.congestion_level())
    }
}

impl<P: GosPacket> Port<P> for FifoPort<P> {
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
        let packet = {
            let mut queue = self.lock();
            let packet = queue.packets.pop_front()?;
            queue.bytes = queue.bytes.saturating_sub(packet.size() as u64);
            packet
        };
        if !self.budget.is_unlimited() {
            self.budget.release(packet.size() as u64);
        }
        self.counters
            .record_dequeue(Priority::BEST_EFFORT, packet.size());
        Some(packet)
    }

    fn peek_priority(&self) -> Option<Priority> {
        (!self.lock().packets.is_empty()).then_some(Priority::BEST_EFFORT)
    }

    fn can_dequeue(&self, budget_bytes: usize) -> bool {
        self.lock()
            .packets
            .front()
            .is_some_and(|p| p.size() <= budget_bytes)
    }

    fn occupancy(&self) -> u64 {
        if self.budget.is_unlimited() {
            self.lock().bytes
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
        self.lock().packets.len()
    }

    fn reset(&self) {
        let freed = {
            let mut queue = self.lock();
            queue.packets.clear();
            std::mem::take(&mut queue.bytes)
        };
        if !self.budget.is_unlimited() {
            self.budget.release(freed);
        }
        self.counters.reset();
    }

    fn links(&self) -> &LinkSlot {
        &self.link
    }
}

impl<P> fmt::Debug for FifoPort<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoPort")
            .field("port_id", &self.port_id)
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

// ─── FifoPortSet ────────────────────────────────────────────────────────────

struct RoundRobin<P> {
    read_port: usize,
    cursor: usize,
    cached_next: Option<(usize, P)>,
}

pub struct FifoPortSet<P> {
    ports: Vec<FifoPort<P>>,
    state: Mutex<RoundRobin<P>>,
    budget: Arc<BufferBudget>,
}

impl<P: GosPacket> FifoPortSet<P> {
    pub fn new(num_ports: usize, mode: BufferMode, node: Arc<dyn NodeHandle<P>>) -> Result<Self> {
        if num_ports == 0 {
            return Err(GosError::InvalidPortCount);
        }
        let budget = Arc::new(mode.into_budget()?);
        let ports = (0..num_ports)
            .map(|id| FifoPort::new(id, budget.clone(), node.clone()))
            .collect();
        Ok(FifoPortSet {
            ports,
            state: Mutex::new(RoundRobin {
                read_port: 0,
                cursor: 0,
                cached_next: None,
            }),
            budget,
        })
    }

    pub fn from_config(config: &PortSetConfig, node: Arc<dyn NodeHandle<P>>) -> Result<Self> {
        Self::new(config.ports, config.buffer, node)
    }

    fn lock_state(&self) -> MutexGuard<'_, RoundRobin<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn select_next(&self, state: &mut RoundRobin<P>) {
        if state.cached_next.is_some() {
            return;
        }
        let n = self.ports.len();
        for k in 0..n {
            let i = (state.cursor + k) % n;
            if let Some(packet) = self.ports[i].dequeue() {
                trace!(port = i, "fifo packet selected for switching");
                state.read_port = i;
                state.cursor = (i + 1) % n;
                state.cached_next = Some((i, packet));
                return;
            }
        }
    }
}

impl<P: GosPacket> PortSet<P> for FifoPortSet<P> {
    type Port = FifoPort<P>;

    fn port(&self, index: usize) -> Result<&FifoPort<P>> {
        self.ports.get(index).ok_or(GosError::PortIndexOutOfRange {
            index,
            len: self.ports.len(),
        })
    }

    fn port_count(&self) -> usize {
        self.ports.len()
    }

    fn next_packet(&self) -> Option<P> {
        let mut state = self.lock_state();
        self.select_next(&mut state);
        state.cached_next.take().map(|(_, packet)| packet)
    }

    fn can_switch(&self, budget_bytes: usize) -> bool {
        let mut state = self.lock_state();
        self.select_next(&mut state);
        state
            .cached_next
            .as_ref()
            .is_some_and(|(_, p)| p.size() <= budget_bytes)
    }

    fn skip_port(&self) {
        let mut state = self.lock_state();
        state.cursor = (state.cursor + 1) % self.ports.len();
    }

    fn read_port(&self) -> usize {
        self.lock_state().read_port
    }

    fn occupancy(&self) -> u64 {
        if self.budget.is_unlimited() {
            self.ports.iter().map(|p| p.occupancy()).sum()
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

    fn set_artificially_congested(&self, congested: bool) {
        if !self.budget.set_artificially_congested(congested) {
            warn!("artificial congestion requested on an unlimited port set, ignoring");
        }
    }

    fn is_artificially_congested(&self) -> bool {
        self.budget.is_artificially_congested()
    }

    fn queued_packets(&self) -> usize {
        let state = self.lock_state();
        let cached = usize::from(state.cached_next.is_some());
        cached + self.ports.iter().map(|p| p.queued_packets()).sum::<usize>()
    }

    fn reset(&self) {
        let mut state = self.lock_state();
        for port in &self.ports {
            port.reset();
        }
        self.budget.reset();
        state.read_port = 0;
        state.cursor = 0;
        state.cached_next = None;
    }

    fn stats(&self) -> PortSetStatsSnapshot {
        PortSetStatsSnapshot {
            occupancy: self.occupancy(),
            capacity: self.capacity(),
            unlimited: self.is_unlimited(),
            congestion_level: self.congestion_level(),
            artificially_congested: self.is_artificially_congested(),
            ports: self.ports.iter().map(FifoPort::stats).collect(),
        }
    }
}
