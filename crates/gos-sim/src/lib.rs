//! Node harness for the GoS scheduler.
//!
//! Drives a port set from `gos-core` the way an active node would: one
//! producer thread per port delivering seeded link arrivals, and one
//! forwarding thread spending a per-tick switching budget.

pub mod config;
pub mod node;
pub mod runner;
pub mod scenario;

pub use config::NodeConfig;
pub use node::{NodeEvent, SimNode};
pub use runner::{run_scenario, RunReport};
pub use scenario::{Arrival, TrafficConfig, TrafficScenario};
