//! GoS scheduling for active nodes.
//!
//! - [`port::ActivePort`]: eleven priority buffers, weighted round robin,
//!   EPCD admission
//! - [`port_set::ActivePortSet`]: cross-port weighted round robin deciding
//!   which port is switched next

pub mod port;
pub mod port_set;

pub use port::{ActivePort, SchedulerSnapshot, EMPTY_SCAN_LIMIT};
pub use port_set::{ActivePortSet, SwitchSnapshot, Switched};
