//! Active port set: cross-port weighted round robin.
//!
//! For each priority level the set keeps a per-cycle budget of `p + 1`
//! switched packets. A call to [`ActivePortSet::next_packet`] walks the levels
//! starting at the level that won last time and, per level, the ports starting
//! at the port that won last time, taking the first port whose own scheduler
//! offers a packet of that level.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace, warn};

use crate::active::port::ActivePort;
use crate::budget::{BufferBudget, BufferMode};
use crate::config::PortSetConfig;
use crate::error::{GosError, Result};
use crate::packet::GosPacket;
use crate::port::{NodeHandle, Port, PortSet};
use crate::priority::{level_weights, Priority, PRIORITY_LEVELS};
use crate::stats::PortSetStatsSnapshot;

/// A packet picked by the switching scheduler, with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switched<P> {
    pub port: usize,
    pub priority: Priority,
    pub packet: P,
}

struct SetState<P> {
    read_port: usize,
    current_priority: usize,
    ratio_by_priority: [u32; PRIORITY_LEVELS],
    current_by_priority: [u32; PRIORITY_LEVELS],
    cached_next: Option<Switched<P>>,
}

impl<P> SetState<P> {
    fn new() -> Self {
        SetState {
            read_port: 0,
            current_priority: 0,
            ratio_by_priority: level_weights(),
            current_by_priority: [0; PRIORITY_LEVELS],
            cached_next: None,
        }
    }
}

/// Read-only view of the switching cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchSnapshot {
    pub read_port: usize,
    pub current_priority: usize,
    pub current_by_priority: [u32; PRIORITY_LEVELS],
    pub has_cached: bool,
}

/// The ports of one active node.
///
/// Locks nest as set state → port state → one priority queue. Producers may
/// enqueue on individual ports concurrently with switching.
pub struct ActivePortSet<P> {
    ports: Vec<ActivePort<P>>,
    state: Mutex<SetState<P>>,
    budget: Arc<BufferBudget>,
}

impl<P: GosPacket> ActivePortSet<P> {
    pub fn new(num_ports: usize, mode: BufferMode, node: Arc<dyn NodeHandle<P>>) -> Result<Self> {
        if num_ports == 0 {
            return Err(GosError::InvalidPortCount);
        }
        let budget = Arc::new(mode.into_budget()?);
        let ports = (0..num_ports)
            .map(|id| ActivePort::new(id, budget.clone(), node.clone()))
            .collect();
        Ok(ActivePortSet {
            ports,
            state: Mutex::new(SetState::new()),
            budget,
        })
    }

    pub fn from_config(config: &PortSetConfig, node: Arc<dyn NodeHandle<P>>) -> Result<Self> {
        Self::new(config.ports, config.buffer, node)
    }

    fn lock_state(&self) -> MutexGuard<'_, SetState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ports(&self) -> &[ActivePort<P>] {
        &self.ports
    }

    pub fn budget(&self) -> &Arc<BufferBudget> {
        &self.budget
    }

    /// Changes the shared capacity of a bounded set.
    pub fn resize_buffer(&self, capacity_bytes: u64) -> Result<()> {
        if self.budget.is_unlimited() {
            return Err(GosError::InvalidBufferSize(
                "cannot resize an unlimited buffer".into(),
            ));
        }
        if capacity_bytes == 0 {
            return Err(GosError::InvalidBufferSize("capacity must be non-zero".into()));
        }
        self.budget.resize(capacity_bytes);
        Ok(())
    }

    fn select_next(&self, state: &mut SetState<P>) {
        if state.cached_next.is_some() {
            return;
        }

        let n = self.ports.len();
        for offset in 0..PRIORITY_LEVELS {
            let p = (state.current_priority + offset) % PRIORITY_LEVELS;
            if state.current_by_priority[p] >= state.ratio_by_priority[p] {
                continue;
            }
            let wanted = Priority::from_index(p);
            let winner = (0..n)
                .map(|k| (state.read_port + k) % n)
                .find(|&i| self.ports[i].peek_priority() == Some(wanted));

            let picked = winner.and_then(|i| self.ports[i].dequeue().map(|packet| (i, packet)));
            match picked {
                Some((port, packet)) => {
                    state.read_port = port;
                    state.current_priority = p;
                    state.current_by_priority[p] += 1;
                    trace!(port, priority = p, "packet selected for switching");
                    state.cached_next = Some(Switched {
                        port,
                        priority: wanted,
                        packet,
                    });
                    break;
                }
                None => state.current_by_priority[p] = state.ratio_by_priority[p],
            }
        }

        let exhausted = state
            .current_by_priority
            .iter()
            .zip(&state.ratio_by_priority)
            .all(|(current, ratio)| current >= ratio);
        if exhausted {
            state.current_by_priority = [0; PRIORITY_LEVELS];
            trace!("switching cycle restarted");
        }
    }

    /// Like [`PortSet::next_packet`], also reporting the source port and level.
    pub fn next_switched(&self) -> Option<Switched<P>> {
        let mut state = self.lock_state();
        self.select_next(&mut state);
        state.cached_next.take()
    }

    /// Priority of the packet that will be switched next.
    pub fn peek_priority(&self) -> Option<Priority> {
        let mut state = self.lock_state();
        self.select_next(&mut state);
        state.cached_next.as_ref().map(|s| s.priority)
    }

    pub fn current_priority(&self) -> usize {
        self.lock_state().current_priority
    }

    pub fn switch_snapshot(&self) -> SwitchSnapshot {
        let state = self.lock_state();
        SwitchSnapshot {
            read_port: state.read_port,
            current_priority: state.current_priority,
            current_by_priority: state.current_by_priority,
            has_cached: state.cached_next.is_some(),
        }
    }
}

impl<P: GosPacket> PortSet<P> for ActivePortSet<P> {
    type Port = ActivePort<P>;

    fn port(&self, index: usize) -> Result<&ActivePort<P>> {
        self.ports.get(index).ok_or(GosError::PortIndexOutOfRange {
            index,
            len: self.ports.len(),
        })
    }

    fn port_count(&self) -> usize {
        self.ports.len()
    }

    fn next_packet(&self) -> Option<P> {
        self.next_switched().map(|s| s.packet)
    }

    fn can_switch(&self, budget_bytes: usize) -> bool {
        let mut state = self.lock_state();
        self.select_next(&mut state);
        state
            .cached_next
            .as_ref()
            .is_some_and(|s| s.packet.size() <= budget_bytes)
    }

    fn skip_port(&self) {
        let mut state = self.lock_state();
        state.read_port = (state.read_port + 1) % self.ports.len();
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
        self.ports
            .iter()
            .map(|p| p.congestion_level())
            .max()
            .unwrap_or(0)
    }

    fn set_artificially_congested(&self, congested: bool) {
        if !self.budget.set_artificially_congested(congested) {
            warn!("artificial congestion requested on an unlimited port set, ignoring");
            return;
        }
        debug!(
            congested,
            occupancy = self.budget.occupancy(),
            "artificial congestion updated"
        );
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
        *state = SetState::new();
        debug!(ports = self.ports.len(), "active port set reset");
    }

    fn stats(&self) -> PortSetStatsSnapshot {
        PortSetStatsSnapshot {
            occupancy: self.occupancy(),
            capacity: self.capacity(),
            unlimited: self.is_unlimited(),
            congestion_level: self.congestion_level(),
            artificially_congested: self.is_artificially_congested(),
            ports: self.ports.iter().map(ActivePort::stats).collect(),
        }
    }
}

impl<P> fmt::Debug for ActivePortSet<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivePortSet")
            .field("ports", &self.ports)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::MIB;
    use crate::packet::SimPacket;
    use crate::test_util::{packet_at, RecordingNode};

    fn set(ports: usize) -> ActivePortSet<SimPacket> {
        let node = Arc::new(RecordingNode::default());
        ActivePortSet::new(ports, BufferMode::Bounded { capacity_bytes: MIB }, node).unwrap()
    }

    fn prio(level: u8) -> Priority {
        Priority::new(level).unwrap()
    }

    #[test]
    fn rejects_empty_set() {
        let node = Arc::new(RecordingNode::default());
        let err = ActivePortSet::<SimPacket>::new(0, BufferMode::Unlimited, node).unwrap_err();
        assert_eq!(err, GosError::InvalidPortCount);
    }

    #[test]
    fn port_index_is_checked() {
        let set = set(2);
        assert!(set.port(1).is_ok());
        assert_eq!(
            set.port(2).unwrap_err(),
            GosError::PortIndexOutOfRange { index: 2, len: 2 }
        );
    }

    #[test]
    fn single_packet_sets_cursors() {
        let set = set(2);
        set.port(0).unwrap().enqueue(packet_at(prio(5), 1, 100));

        let switched = set.next_switched().unwrap();
        assert_eq!(switched.port, 0);
        assert_eq!(switched.packet.id, 1);
        assert_eq!(set.read_port(), 0);
        assert_eq!(set.current_priority(), 5);
        assert!(set.next_packet().is_none());
    }

    #[test]
    fn ports_share_the_buffer_budget() {
        let node = Arc::new(RecordingNode::default());
        let set: ActivePortSet<SimPacket> = ActivePortSet::new(
            3,
            BufferMode::Bounded {
                capacity_bytes: 1000,
            },
            node.clone(),
        )
        .unwrap();
        assert!(set.port(0).unwrap().enqueue(SimPacket::other(1, 500)).is_admitted());
        assert!(set.port(1).unwrap().enqueue(SimPacket::other(2, 400)).is_admitted());
        assert!(!set.port(2).unwrap().enqueue(SimPacket::other(3, 1)).is_admitted());
        assert_eq!(set.occupancy(), 900);
        assert_eq!(set.congestion_level(), 90);
        assert_eq!(node.discarded(), vec![3]);
    }

    #[test]
    fn same_level_rotates_from_winning_port() {
        let set = set(3);
        for port in 0..3 {
            for k in 0..4 {
                let id = (port * 10 + k) as u64;
                set.port(port).unwrap().enqueue(packet_at(prio(3), id, 100));
            }
        }
        let first: Vec<usize> = std::iter::from_fn(|| set.next_switched())
            .take(4)
            .map(|s| s.port)
            .collect();
        // The winning port keeps the cursor until the level's budget runs out.
        assert_eq!(first, vec![0, 0, 0, 0]);
        assert_eq!(set.switch_snapshot().current_by_priority[3], 4);
    }

    #[test]
    fn skip_port_moves_cursor() {
        let set = set(3);
        set.skip_port();
        set.skip_port();
        assert_eq!(set.read_port(), 2);
        set.skip_port();
        assert_eq!(set.read_port(), 0);
    }

    #[test]
    fn can_switch_checks_size_without_consuming() {
        let set = set(2);
        set.port(1).unwrap().enqueue(SimPacket::signalling(9, 700));
        assert!(!set.can_switch(699));
        assert!(set.can_switch(700));
        assert_eq!(set.peek_priority(), Some(Priority::SIGNALLING));
        assert_eq!(set.next_packet().map(|p| p.id), Some(9));
        assert_eq!(set.read_port(), 1);
    }

    #[test]
    fn higher_levels_get_more_switching_slots() {
        let set = set(2);
        let mut id = 0;
        for _ in 0..40 {
            for port in 0..2 {
                for level in [0u8, 4] {
                    set.port(port).unwrap().enqueue(packet_at(prio(level), id, 64));
                    id += 1;
                }
            }
        }
        let mut served = [0u32; PRIORITY_LEVELS];
        let mut attempts = 0;
        while served.iter().sum::<u32>() < 60 {
            attempts += 1;
            assert!(attempts < 200, "switching stalled: {served:?}");
            if let Some(s) = set.next_switched() {
                served[s.priority.index()] += 1;
            }
        }
        assert!(served[4] > served[0], "{served:?}");
        assert_eq!(served[4] + served[0], 60);
    }

    #[test]
    fn artificial_congestion_blocks_admission_until_lifted() {
        let set = set(1);
        set.set_artificially_congested(true);
        assert!(set.is_artificially_congested());
        assert!(set.congestion_level() >= 96);
        let port = set.port(0).unwrap();
        assert!(!port.enqueue(SimPacket::other(1, MIB as usize / 20)).is_admitted());

        set.set_artificially_congested(false);
        assert_eq!(set.occupancy(), 0);
        assert!(port.enqueue(SimPacket::other(2, MIB as usize / 20)).is_admitted());
    }

    #[test]
    fn unlimited_set_ignores_artificial_congestion() {
        let node = Arc::new(RecordingNode::default());
        let set: ActivePortSet<SimPacket> =
            ActivePortSet::new(2, BufferMode::Unlimited, node).unwrap();
        set.set_artificially_congested(true);
        assert!(!set.is_artificially_congested());
        assert_eq!(set.congestion_level(), 0);
        assert!(set.resize_buffer(10).is_err());
    }

    #[test]
    fn reset_clears_everything() {
        let set = set(2);
        for id in 0..10 {
            let port = (id % 2) as usize;
            set.port(port).unwrap().enqueue(packet_at(prio((id % 11) as u8), id, 300));
        }
        set.next_packet();
        set.can_switch(0);
        set.set_artificially_congested(true);

        set.reset();
        assert_eq!(set.occupancy(), 0);
        assert!(!set.is_artificially_congested());
        assert_eq!(
            set.switch_snapshot(),
            SwitchSnapshot {
                read_port: 0,
                current_priority: 0,
                current_by_priority: [0; PRIORITY_LEVELS],
                has_cached: false,
            }
        );
        assert!(set.ports().iter().all(|p| p.queued_packets() == 0));
        assert!(set.next_packet().is_none());
    }

    #[test]
    fn resize_changes_capacity() {
        let set = set(1);
        set.resize_buffer(2 * MIB).unwrap();
        assert_eq!(set.capacity(), 2 * MIB);
        assert!(set.resize_buffer(0).is_err());
    }
}
