//! # Port statistics
//!
//! Counters kept by each port and the serializable snapshots built from them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::port::Admission;
use crate::priority::{Priority, PRIORITY_LEVELS};

/// Live counters, updated without taking the port lock.
#[derive(Debug, Default)]
pub struct PortCounters {
    admitted: AtomicU64,
    discarded: AtomicU64,
    retransmission_requests: AtomicU64,
    dequeued: AtomicU64,
    dequeued_bytes: AtomicU64,
    dequeued_by_priority: [AtomicU64; PRIORITY_LEVELS],
}

impl PortCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admission(&self, outcome: Admission) {
        match outcome {
            Admission::Admitted => self.admitted.fetch_add(1, Ordering::Relaxed),
            Admission::Discarded => self.discarded.fetch_add(1, Ordering::Relaxed),
            Admission::RetransmissionRequested => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                self.retransmission_requests.fetch_add(1, Ordering::Relaxed)
            }
        };
    }

    pub fn record_dequeue(&self, priority: Priority, size: usize) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        self.dequeued_bytes.fetch_add(size as u64, Ordering::Relaxed);
        self.dequeued_by_priority[priority.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [
            &self.admitted,
            &self.discarded,
            &self.retransmission_requests,
            &self.dequeued,
            &self.dequeued_bytes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        for counter in &self.dequeued_by_priority {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(
        &self,
        port_id: usize,
        occupancy: u64,
        congestion_level: u64,
    ) -> PortStatsSnapshot {
        PortStatsSnapshot {
            port_id,
            admitted: self.admitted.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            retransmission_requests: self.retransmission_requests.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dequeued_bytes: self.dequeued_bytes.load(Ordering::Relaxed),
            dequeued_by_priority: std::array::from_fn(|i| {
                self.dequeued_by_priority[i].load(Ordering::Relaxed)
            }),
            occupancy,
            congestion_level,
        }
    }
}

/// Point-in-time view of one port.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortStatsSnapshot {
    pub port_id: usize,
    pub admitted: u64,
    /// Includes packets dropped after a retransmission request.
    pub discarded: u64,
    pub retransmission_requests: u64,
    pub dequeued: u64,
    pub dequeued_bytes: u64,
    pub dequeued_by_priority: [u64; PRIORITY_LEVELS],
    pub occupancy: u64,
    pub congestion_level: u64,
}

/// Point-in-time view of a port set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortSetStatsSnapshot {
    pub occupancy: u64,
    pub capacity: u64,
    pub unlimited: bool,
    pub congestion_level: u64,
    pub artificially_congested: bool,
    pub ports: Vec<PortStatsSnapshot>,
}

impl PortSetStatsSnapshot {
    pub fn total_discarded(&self) -> u64 {
        self.ports.iter().map(|p| p.discarded).sum()
    }

    pub fn total_dequeued(&self) -> u64 {
        self.ports.iter().map(|p| p.dequeued).sum()
    }

    pub fn dequeued_by_priority(&self) -> [u64; PRIORITY_LEVELS] {
        let mut totals = [0u64; PRIORITY_LEVELS];
        for port in &self.ports {
            for (total, n) in totals.iter_mut().zip(port.dequeued_by_priority) {
                *total += n;
            }
        }
        totals
    }
}
