//! # Port contracts
//!
//! Behaviour shared by every port discipline: admission, selection, capacity
//! accounting, availability and link attachment. [`crate::active`] implements
//! the GoS scheduler, [`crate::fifo`] a plain drop-tail queue.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::Result;
use crate::priority::Priority;
use crate::stats::PortSetStatsSnapshot;

/// Outcome of offering a packet to a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    Admitted,
    /// Dropped through the node's discard path.
    Discarded,
    /// Dropped after asking the node to request a retransmission.
    RetransmissionRequested,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        self == Admission::Admitted
    }
}

/// Node-side capabilities a port calls into.
pub trait NodeHandle<P>: Send + Sync {
    /// Takes ownership of a packet that will not be forwarded.
    fn discard(&self, packet: P);
    /// Ask the node to emit a store-and-retransmit request for `packet`.
    fn request_retransmission(&self, packet: &P, port_id: usize);
    fn notify_packet_received(&self, packet: &P, timestamp: u64);
    fn record_incoming_stat(&self, packet: &P);
    /// Current simulation time.
    fn current_timestamp(&self) -> u64;
}

/// The link end a port is attached to.
pub trait PortLink: Send + Sync {
    fn link_id(&self) -> u64;
    fn is_broken(&self) -> bool;
}

// ─── Link slot ──────────────────────────────────────────────────────────────

/// Holds the link attached to a port, if any.
#[derive(Default)]
pub struct LinkSlot {
    link: Mutex<Option<Arc<dyn PortLink>>>,
}

impl LinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<dyn PortLink>>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches `link`, returning the one it replaces.
    pub fn attach(&self, link: Arc<dyn PortLink>) -> Option<Arc<dyn PortLink>> {
        self.lock().replace(link)
    }

    pub fn detach(&self) -> Option<Arc<dyn PortLink>> {
        self.lock().take()
    }

    pub fn get(&self) -> Option<Arc<dyn PortLink>> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    pub fn is_broken(&self) -> bool {
        self.lock().as_ref().is_some_and(|l| l.is_broken())
    }

    pub fn link_id(&self) -> Option<u64> {
        self.lock().as_ref().map(|l| l.link_id())
    }
}

impl fmt::Debug for LinkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSlot")
            .field("link_id", &self.link_id())
            .finish()
    }
}

// ─── Port ───────────────────────────────────────────────────────────────────

pub trait Port<P>: Send + Sync {
    fn port_id(&self) -> usize;

    /// Admission path: classifies, checks capacity and either queues the
    /// packet or hands it to the node's discard path.
    fn enqueue(&self, packet: P) -> Admission;

    /// Silent re-insertion checked against the full capacity.
    fn re_enqueue(&self, packet: P) -> Admission;

    fn dequeue(&self) -> Option<P>;

    /// Priority of the packet the next `dequeue` would return.
    fn peek_priority(&self) -> Option<Priority>;

    /// Whether the next packet fits in `budget_bytes`.
    fn can_dequeue(&self, budget_bytes: usize) -> bool;

    fn occupancy(&self) -> u64;
    fn capacity(&self) -> u64;
    fn is_unlimited(&self) -> bool;

    /// Percentage of capacity in use, `0` when unlimited.
    fn congestion_level(&self) -> u64;

    /// Number of packets held, including one already selected.
    fn queued_packets(&self) -> usize;

    /// Drops every queued packet and restores cursors and counters.
    /// Not to be called concurrently with enqueue or dequeue.
    fn reset(&self);

    fn links(&self) -> &LinkSlot;

    fn attach_link(&self, link: Arc<dyn PortLink>) -> Option<Arc<dyn PortLink>> {
        self.links().attach(link)
    }

    fn detach_link(&self) -> Option<Arc<dyn PortLink>> {
        self.links().detach()
    }

    fn link(&self) -> Option<Arc<dyn PortLink>> {
        self.links().get()
    }

    /// A port with no link attached can be wired to a new one.
    fn is_available(&self) -> bool {
        self.links().is_empty()
    }

    fn is_connected_to_broken_link(&self) -> bool {
        self.links().is_broken()
    }
}

// ─── PortSet ────────────────────────────────────────────────────────────────

pub trait PortSet<P>: Send + Sync {
    type Port: Port<P>;

    fn port(&self, index: usize) -> Result<&Self::Port>;
    fn port_count(&self) -> usize;

    /// Removes and returns the next packet to switch.
    fn next_packet(&self) -> Option<P>;

    /// Whether the next packet to switch fits in `budget_bytes`.
    fn can_switch(&self, budget_bytes: usize) -> bool;

    /// Moves the port cursor past the current port.
    fn skip_port(&self);

    /// Index of the port the last switched packet came from.
    fn read_port(&self) -> usize;

    fn occupancy(&self) -> u64;
    fn capacity(&self) -> u64;
    fn is_unlimited(&self) -> bool;

    /// Highest congestion level over all ports.
    fn congestion_level(&self) -> u64;

    /// Pins the shared occupancy counter near capacity, or lifts the pin.
    fn set_artificially_congested(&self, congested: bool);
    fn is_artificially_congested(&self) -> bool;

    /// Packets held by every port plus one already selected for switching.
    fn queued_packets(&self) -> usize;

    fn reset(&self);

    fn stats(&self) -> PortSetStatsSnapshot;

    fn first_available_port(&self) -> Option<usize> {
        (0..self.port_count()).find(|&i| self.port(i).is_ok_and(|p| p.is_available()))
    }

    fn has_available_ports(&self) -> bool {
        self.first_available_port().is_some()
    }

    fn port_by_link(&self, link_id: u64) -> Option<usize> {
        (0..self.port_count())
            .find(|&i| self.port(i).is_ok_and(|p| p.links().link_id() == Some(link_id)))
    }

    fn attach_link(&self, index: usize, link: Arc<dyn PortLink>) -> Result<()> {
        self.port(index)?.attach_link(link);
        Ok(())
    }

    fn detach_link(&self, index: usize) -> Result<Option<Arc<dyn PortLink>>> {
        Ok(self.port(index)?.detach_link())
    }
}
