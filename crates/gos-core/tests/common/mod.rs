//! Shared test doubles for the gos-core integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use gos_core::packet::{GosLevel, SimPacket};
use gos_core::port::{NodeHandle, PortLink};
use gos_core::Priority;

// ─── Mock Node ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNode {
    pub clock: AtomicU64,
    discarded: Mutex<Vec<u64>>,
    retransmissions: Mutex<Vec<(u64, usize)>>,
    received: Mutex<Vec<(u64, u64)>>,
}

impl MockNode {
    pub fn discarded(&self) -> Vec<u64> {
        self.discarded.lock().unwrap().clone()
    }

    pub fn retransmissions(&self) -> Vec<(u64, usize)> {
        self.retransmissions.lock().unwrap().clone()
    }

    /// `(packet id, timestamp)` of every accepted packet.
    pub fn received(&self) -> Vec<(u64, u64)> {
        self.received.lock().unwrap().clone()
    }
}

impl NodeHandle<SimPacket> for MockNode {
    fn discard(&self, packet: SimPacket) {
        self.discarded.lock().unwrap().push(packet.id);
    }

    fn request_retransmission(&self, packet: &SimPacket, port_id: usize) {
        self.retransmissions
            .lock()
            .unwrap()
            .push((packet.id, port_id));
    }

    fn notify_packet_received(&self, packet: &SimPacket, timestamp: u64) {
        self.received.lock().unwrap().push((packet.id, timestamp));
    }

    fn record_incoming_stat(&self, _packet: &SimPacket) {}

    fn current_timestamp(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }
}

// ─── Mock Link ───────────────────────────────────────────────────────────────

pub struct MockLink {
    id: u64,
    broken: AtomicBool,
}

impl MockLink {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            broken: AtomicBool::new(false),
        }
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::Relaxed);
    }
}

impl PortLink for MockLink {
    fn link_id(&self) -> u64 {
        self.id
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Relaxed)
    }
}

/// A packet that classifies to `level`.
pub fn packet_at(level: u8, id: u64, size: usize) -> SimPacket {
    match level {
        10 => SimPacket::signalling(id, size),
        9 => SimPacket::retransmission_request(id, size, 0, 0),
        8 => SimPacket::reservation(id, size),
        level => SimPacket::mpls_gos(
            id,
            size,
            GosLevel {
                level: level / 2,
                backup: level % 2 == 1,
            },
        ),
    }
}

pub fn level_of(packet: &SimPacket) -> u8 {
    gos_core::classify(packet).level()
}

pub fn priority(level: u8) -> Priority {
    Priority::new(level).unwrap()
}
