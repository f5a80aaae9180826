//! # gos-core
//!
//! Guarantee-of-Service port scheduling for active network nodes.
//!
//! Incoming packets are classified into eleven priority levels
//! ([`classifier`]), admitted under Early Packet Catch and Discard
//! ([`active::ActivePort`]), and switched out by two nested weighted round
//! robins: one across the levels of a port, one across the ports of a set
//! ([`active::ActivePortSet`]). [`fifo`] provides the plain drop-tail
//! discipline used by non-active nodes behind the same [`port::Port`] and
//! [`port::PortSet`] traits.

pub mod active;
pub mod budget;
pub mod buffer;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fifo;
pub mod packet;
pub mod port;
pub mod priority;
pub mod sequence;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_util;

pub use active::{ActivePort, ActivePortSet, Switched};
pub use budget::{BufferBudget, BufferMode, EPCD_THRESHOLD};
pub use classifier::classify;
pub use config::{GosConfig, PortKind, PortSetConfig, SwitchingConfig};
pub use error::{GosError, Result};
pub use fifo::{FifoPort, FifoPortSet};
pub use packet::{GosLevel, GosPacket, PacketKind, SimPacket};
pub use port::{Admission, NodeHandle, Port, PortLink, PortSet};
pub use priority::{Priority, PRIORITY_LEVELS};
pub use stats::{PortSetStatsSnapshot, PortStatsSnapshot};
