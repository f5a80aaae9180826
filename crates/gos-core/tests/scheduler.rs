//! End-to-end behaviour of the GoS port and port-set schedulers.
//!
//! 1. One packet per level drains in level order
//! 2. Full weighted cycles serve level `p` exactly `p + 1` times
//! 3. EPCD rejection and retransmission requests
//! 4. Cross-port switching picks the right port and level
//! 5. Concurrent producers against one switching consumer and one bounded budget
//! 6. Link attachment and FIFO sets behind the same trait

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use common::{level_of, packet_at, priority, MockLink, MockNode};
use gos_core::budget::MIB;
use gos_core::config::{GosConfig, PortKind};
use gos_core::packet::{GosLevel, SimPacket};
use gos_core::{
    ActivePort, ActivePortSet, Admission, BufferMode, FifoPortSet, Port, PortLink, PortSet,
    EPCD_THRESHOLD, PRIORITY_LEVELS,
};

fn node() -> Arc<MockNode> {
    Arc::new(MockNode::default())
}

fn bounded_set(
    ports: usize,
    capacity_bytes: u64,
    node: Arc<MockNode>,
) -> ActivePortSet<SimPacket> {
    ActivePortSet::<SimPacket>::new(ports, BufferMode::Bounded { capacity_bytes }, node).unwrap()
}

// ─── Single port ─────────────────────────────────────────────────────────────

#[test]
fn one_packet_per_level_drains_in_level_order() {
    let port = ActivePort::<SimPacket>::with_capacity(0, MIB, node());
    for level in 0..PRIORITY_LEVELS as u8 {
        assert!(port.enqueue(packet_at(level, level as u64, 1000)).is_admitted());
    }
    assert_eq!(port.occupancy(), 11_000);

    let levels: Vec<u8> = (0..PRIORITY_LEVELS)
        .map(|_| level_of(&port.dequeue().expect("packet available")))
        .collect();
    assert_eq!(levels, (0..PRIORITY_LEVELS as u8).collect::<Vec<_>>());
    assert!(port.dequeue().is_none());
    assert_eq!(port.occupancy(), 0);
}

#[test]
fn full_cycles_serve_each_level_by_weight() {
    let port = ActivePort::<SimPacket>::unlimited(0, node());
    let mut id = 0;
    for level in 0..PRIORITY_LEVELS as u8 {
        for _ in 0..24 {
            port.enqueue(packet_at(level, id, 100));
            id += 1;
        }
    }

    for window in 0..2 {
        let mut served = [0u32; PRIORITY_LEVELS];
        for _ in 0..66 {
            let packet = port.dequeue().expect("every level is backlogged");
            served[level_of(&packet) as usize] += 1;
        }
        let expected: Vec<u32> = (1..=PRIORITY_LEVELS as u32).collect();
        assert_eq!(served.to_vec(), expected, "window {window}");
    }
}

#[test]
fn packets_of_one_level_leave_in_arrival_order() {
    let port = ActivePort::<SimPacket>::unlimited(0, node());
    for id in 0..20 {
        port.enqueue(packet_at(4, id, 64));
    }
    let ids: Vec<u64> = std::iter::from_fn(|| port.dequeue()).map(|p| p.id).collect();
    assert_eq!(ids, (0..20).collect::<Vec<_>>());
}

#[test]
fn epcd_rejection_requests_retransmission_for_gos_traffic() {
    let node = node();
    let port = ActivePort::<SimPacket>::with_capacity(3, 1000, node.clone());
    port.budget().charge(950);

    let gos = SimPacket::mpls_gos(1, 60, GosLevel { level: 2, backup: false });
    assert_eq!(port.enqueue(gos), Admission::RetransmissionRequested);
    assert_eq!(node.retransmissions(), vec![(1, 3)]);
    assert_eq!(node.discarded(), vec![1]);

    assert_eq!(port.enqueue(SimPacket::other(2, 60)), Admission::Discarded);
    assert_eq!(node.retransmissions().len(), 1);
    assert_eq!(node.discarded(), vec![1, 2]);
    assert_eq!(port.occupancy(), 950);
}

#[test]
fn epcd_boundary_is_inclusive() {
    let node = node();
    let port = ActivePort::<SimPacket>::with_capacity(0, 1000, node.clone());
    port.budget().charge(850);
    assert!(port.enqueue(SimPacket::other(1, 50)).is_admitted());
    assert_eq!(port.enqueue(SimPacket::other(2, 1)), Admission::Discarded);

    // Silent re-insertion may use the reserved headroom.
    assert!(port.re_enqueue(SimPacket::other(3, 100)).is_admitted());
    assert_eq!(port.occupancy(), 1000);
    assert_eq!(node.received().len(), 1);
}

#[test]
fn admissions_are_stamped_with_node_time() {
    let node = node();
    let port = ActivePort::<SimPacket>::unlimited(0, node.clone());
    node.clock.store(42, Ordering::Relaxed);
    port.enqueue(SimPacket::signalling(9, 64));
    assert_eq!(node.received(), vec![(9, 42)]);
}

// ─── Port set ────────────────────────────────────────────────────────────────

#[test]
fn switching_picks_the_only_backlogged_port() {
    let set = bounded_set(2, MIB, node());
    set.port(0).unwrap().enqueue(packet_at(5, 77, 500));

    let switched = set.next_switched().expect("port 0 has a packet");
    assert_eq!(switched.port, 0);
    assert_eq!(switched.priority, priority(5));
    assert_eq!(switched.packet.id, 77);

    let snap = set.switch_snapshot();
    assert_eq!(snap.read_port, 0);
    assert_eq!(snap.current_priority, 5);
    assert_eq!(set.occupancy(), 0);
}

#[test]
fn shared_budget_spans_every_port() {
    let node = node();
    let set = bounded_set(2, 1100, node.clone());
    assert!(set.port(0).unwrap().enqueue(SimPacket::other(1, 600)).is_admitted());
    assert!(set.port(1).unwrap().enqueue(SimPacket::other(2, 400)).is_admitted());
    assert_eq!(
        set.port(1).unwrap().enqueue(SimPacket::other(3, 1)),
        Admission::Discarded
    );
    assert_eq!(set.occupancy(), 1000);
    assert_eq!(set.congestion_level(), 90);
}

#[test]
fn artificial_congestion_blocks_admission_until_lifted() {
    let node = node();
    let set = bounded_set(1, 10_000, node.clone());
    set.port(0).unwrap().enqueue(SimPacket::other(1, 1000));

    set.set_artificially_congested(true);
    assert!(set.is_artificially_congested());
    assert_eq!(set.occupancy(), 9_700);
    assert_eq!(
        set.port(0).unwrap().enqueue(SimPacket::other(2, 500)),
        Admission::Discarded
    );

    set.set_artificially_congested(false);
    assert_eq!(set.occupancy(), 1000);
    assert!(set.port(0).unwrap().enqueue(SimPacket::other(3, 500)).is_admitted());
}

#[test]
fn artificial_congestion_never_overfills_the_buffer() {
    let set = bounded_set(2, MIB, node());
    let limit = MIB - EPCD_THRESHOLD;
    set.set_artificially_congested(true);

    let mut admitted = 0;
    for id in 0..100u64 {
        let port = set.port((id % 2) as usize).unwrap();
        if port.enqueue(SimPacket::other(id, 30_000)).is_admitted() {
            admitted += 1;
        }
        assert!(set.occupancy() <= limit, "occupancy {}", set.occupancy());
    }
    assert_eq!(admitted, 1);
    assert!(set.congestion_level() <= 100);

    let pinned = set.occupancy();
    assert!(set.next_packet().is_some());
    assert_eq!(set.occupancy(), pinned - 30_000);

    set.set_artificially_congested(false);
    assert_eq!(set.occupancy(), 0);
    assert_eq!(set.queued_packets(), 0);
}

#[test]
fn reset_restores_a_fresh_set() {
    let set = bounded_set(3, MIB, node());
    for port in 0..3 {
        for level in [0u8, 4, 10] {
            set.port(port)
                .unwrap()
                .enqueue(packet_at(level, port as u64 * 100 + level as u64, 200));
        }
    }
    set.next_packet();
    set.set_artificially_congested(true);
    set.reset();

    assert_eq!(set.occupancy(), 0);
    assert!(!set.is_artificially_congested());
    let snap = set.switch_snapshot();
    assert_eq!(snap.read_port, 0);
    assert_eq!(snap.current_priority, 0);
    assert!(!snap.has_cached);
    assert!(set.next_packet().is_none());
    assert_eq!(set.stats().total_dequeued(), 0);
}

#[test]
fn out_of_range_port_is_an_error() {
    let set = ActivePortSet::<SimPacket>::new(2, BufferMode::Unlimited, node()).unwrap();
    assert!(set.port(2).is_err());
    assert!(ActivePortSet::<SimPacket>::new(0, BufferMode::Unlimited, node()).is_err());
}

#[test]
fn concurrent_producers_lose_nothing() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: u64 = 500;

    let set = Arc::new(
        ActivePortSet::<SimPacket>::new(PRODUCERS, BufferMode::Unlimited, node()).unwrap(),
    );
    let done = Arc::new(AtomicBool::new(false));

    let consumer = {
        let set = set.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut ids = Vec::new();
            let mut idle = 0u32;
            loop {
                match set.next_packet() {
                    Some(packet) => {
                        ids.push(packet.id);
                        idle = 0;
                    }
                    None if done.load(Ordering::Acquire)
                        && set.ports().iter().all(|p| p.queued_packets() == 0) =>
                    {
                        break
                    }
                    None => {
                        idle += 1;
                        assert!(idle < 1_000_000, "switching stalled");
                        thread::yield_now();
                    }
                }
            }
            ids
        })
    };

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|port| {
            let set = set.clone();
            thread::spawn(move || {
                for n in 0..PER_PRODUCER {
                    let id = port as u64 * PER_PRODUCER + n;
                    let level = (n % PRIORITY_LEVELS as u64) as u8;
                    let admission = set.port(port).unwrap().enqueue(packet_at(level, id, 256));
                    assert!(admission.is_admitted());
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    done.store(true, Ordering::Release);

    let mut ids = consumer.join().unwrap();
    ids.sort_unstable();
    let expected: Vec<u64> = (0..PRODUCERS as u64 * PER_PRODUCER).collect();
    assert_eq!(ids, expected);
    assert_eq!(set.stats().total_dequeued(), PRODUCERS as u64 * PER_PRODUCER);
}

#[test]
fn concurrent_admissions_share_one_bounded_budget() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: u64 = 400;
    const CAPACITY: u64 = 200_000;

    let node = node();
    let set = Arc::new(bounded_set(PRODUCERS, CAPACITY, node.clone()));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|port| {
            let set = set.clone();
            thread::spawn(move || {
                let (mut bytes, mut admitted, mut rejected) = (0u64, 0u64, 0u64);
                for n in 0..PER_PRODUCER {
                    let id = port as u64 * PER_PRODUCER + n;
                    let level = (n % PRIORITY_LEVELS as u64) as u8;
                    let size = 100 + (n as usize * 37) % 1400;
                    let packet = packet_at(level, id, size);
                    if set.port(port).unwrap().enqueue(packet).is_admitted() {
                        bytes += size as u64;
                        admitted += 1;
                    } else {
                        rejected += 1;
                    }
                    assert!(set.occupancy() <= CAPACITY - EPCD_THRESHOLD);
                }
                (bytes, admitted, rejected)
            })
        })
        .collect();

    let (mut bytes, mut admitted, mut rejected) = (0, 0, 0);
    for producer in producers {
        let (b, a, r) = producer.join().unwrap();
        bytes += b;
        admitted += a;
        rejected += r;
    }

    assert!(rejected > 0, "offered load should exceed the buffer");
    assert!(set.occupancy() <= CAPACITY - EPCD_THRESHOLD);
    assert_eq!(set.occupancy(), bytes);
    assert_eq!(admitted + rejected, PRODUCERS as u64 * PER_PRODUCER);
    assert_eq!(node.discarded().len() as u64, rejected);
    assert_eq!(node.received().len() as u64, admitted);
    assert_eq!(set.queued_packets() as u64, admitted);

    let mut drained = 0;
    while set.queued_packets() > 0 {
        if set.next_packet().is_some() {
            drained += 1;
        }
    }
    assert_eq!(drained, admitted);
    assert_eq!(set.occupancy(), 0);
}

// ─── Links and disciplines ───────────────────────────────────────────────────

#[test]
fn link_attachment_drives_availability() {
    let set = ActivePortSet::<SimPacket>::new(3, BufferMode::Unlimited, node()).unwrap();
    assert_eq!(set.first_available_port(), Some(0));

    let a = Arc::new(MockLink::new(10));
    let b = Arc::new(MockLink::new(11));
    set.attach_link(0, a.clone()).unwrap();
    set.attach_link(1, b.clone()).unwrap();
    assert_eq!(set.first_available_port(), Some(2));
    assert_eq!(set.port_by_link(11), Some(1));
    assert_eq!(set.port_by_link(99), None);

    b.set_broken(true);
    assert!(set.port(1).unwrap().is_connected_to_broken_link());
    assert!(!set.port(0).unwrap().is_connected_to_broken_link());

    let old = set.detach_link(1).unwrap().expect("link was attached");
    assert_eq!(old.link_id(), 11);
    assert!(set.port(1).unwrap().is_available());
    assert!(set.attach_link(3, a).is_err());
}

fn drain<S: PortSet<SimPacket>>(set: &S) -> Vec<u64> {
    let mut ids = Vec::new();
    let mut misses = 0;
    while misses < 2 {
        match set.next_packet() {
            Some(p) => {
                ids.push(p.id);
                misses = 0;
            }
            None => misses += 1,
        }
    }
    ids
}

#[test]
fn both_disciplines_build_from_config() {
    let cfg = GosConfig::from_toml_str("[port_set]\nports = 2\nkind = \"fifo\"\n").unwrap();
    assert_eq!(cfg.port_set.kind, PortKind::Fifo);

    let fifo = FifoPortSet::<SimPacket>::from_config(&cfg.port_set, node()).unwrap();
    let active = ActivePortSet::<SimPacket>::from_config(&cfg.port_set, node()).unwrap();
    for id in 0..4 {
        let level = if id % 2 == 0 { 10 } else { 0 };
        fifo.port(0).unwrap().enqueue(packet_at(level, id, 100));
        active.port(0).unwrap().enqueue(packet_at(level, id, 100));
    }

    assert_eq!(drain(&fifo), vec![0, 1, 2, 3]);
    let mut active_ids = drain(&active);
    active_ids.sort_unstable();
    assert_eq!(active_ids, vec![0, 1, 2, 3]);
}
