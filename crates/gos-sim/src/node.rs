//! The node side of the port contract.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use tracing::trace;

use gos_core::packet::SimPacket;
use gos_core::{classify, NodeHandle, Priority, PRIORITY_LEVELS};

/// Something a port told the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NodeEvent {
    Received {
        packet_id: u64,
        priority: Priority,
        tick: u64,
    },
    Discarded {
        packet_id: u64,
        size: usize,
    },
    RetransmissionRequested {
        packet_id: u64,
        port: usize,
    },
}

/// Simulated active node.
///
/// Keeps the simulation clock and forwards every port callback as a
/// [`NodeEvent`]. Events sent after the receiver is gone are dropped.
pub struct SimNode {
    clock: AtomicU64,
    events: Sender<NodeEvent>,
    incoming_by_priority: [AtomicU64; PRIORITY_LEVELS],
}

impl SimNode {
    pub fn new() -> (Self, Receiver<NodeEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let node = SimNode {
            clock: AtomicU64::new(0),
            events: tx,
            incoming_by_priority: std::array::from_fn(|_| AtomicU64::new(0)),
        };
        (node, rx)
    }

    /// Advances the clock by one tick and returns the new time.
    pub fn advance(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Accepted packets per priority level.
    pub fn incoming_by_priority(&self) -> [u64; PRIORITY_LEVELS] {
        std::array::from_fn(|i| self.incoming_by_priority[i].load(Ordering::Relaxed))
    }

    fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event);
    }
}

impl NodeHandle<SimPacket> for SimNode {
    fn discard(&self, packet: SimPacket) {
        self.emit(NodeEvent::Discarded {
            packet_id: packet.id,
            size: packet.size,
        });
    }

    fn request_retransmission(&self, packet: &SimPacket, port_id: usize) {
        trace!(packet = packet.id, port = port_id, "retransmission request emitted");
        self.emit(NodeEvent::RetransmissionRequested {
            packet_id: packet.id,
            port: port_id,
        });
    }

    fn notify_packet_received(&self, packet: &SimPacket, timestamp: u64) {
        self.emit(NodeEvent::Received {
            packet_id: packet.id,
            priority: classify(packet),
            tick: timestamp,
        });
    }

    fn record_incoming_stat(&self, packet: &SimPacket) {
        self.incoming_by_priority[classify(packet).index()].fetch_add(1, Ordering::Relaxed);
    }

    fn current_timestamp(&self) -> u64 {
        self.now()
    }
}
