use std::sync::Mutex;

use crate::packet::{GosLevel, SimPacket};
use crate::port::NodeHandle;
use crate::priority::Priority;

/// Node that records every call made into it.
#[derive(Default)]
pub struct RecordingNode {
    discarded: Mutex<Vec<u64>>,
    received: Mutex<Vec<u64>>,
    retransmissions: Mutex<Vec<(u64, usize)>>,
    incoming: Mutex<Vec<u64>>,
}

impl RecordingNode {
    pub fn discarded(&self) -> Vec<u64> {
        self.discarded.lock().unwrap().clone()
    }

    pub fn received(&self) -> Vec<u64> {
        self.received.lock().unwrap().clone()
    }

    pub fn retransmissions(&self) -> Vec<(u64, usize)> {
        self.retransmissions.lock().unwrap().clone()
    }

    pub fn incoming(&self) -> Vec<u64> {
        self.incoming.lock().unwrap().clone()
    }
}

impl NodeHandle<SimPacket> for RecordingNode {
    fn discard(&self, packet: SimPacket) {
        self.discarded.lock().unwrap().push(packet.id);
    }

    fn request_retransmission(&self, packet: &SimPacket, port_id: usize) {
        self.retransmissions
            .lock()
            .unwrap()
            .push((packet.id, port_id));
    }

    fn notify_packet_received(&self, packet: &SimPacket, _timestamp: u64) {
        self.received.lock().unwrap().push(packet.id);
    }

    fn record_incoming_stat(&self, packet: &SimPacket) {
        self.incoming.lock().unwrap().push(packet.id);
    }

    fn current_timestamp(&self) -> u64 {
        0
    }
}

/// Packet that classifies to `priority`.
pub fn packet_at(priority: Priority, id: u64, size: usize) -> SimPacket {
    match priority.level() {
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
