//! # Scenario runner
//!
//! Runs a seeded traffic scenario through a port set in lockstep ticks:
//!
//! 1. the clock advances
//! 2. every producer thread enqueues its port's arrivals for the tick
//! 3. the forwarding thread switches packets until the tick's byte budget
//!    is spent or the set runs dry
//!
//! Threads are coordinated over `crossbeam-channel`; node callbacks are
//! collected from the [`SimNode`] event stream once the run ends.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use tracing::{debug, info};

use gos_core::config::PortKind;
use gos_core::packet::SimPacket;
use gos_core::{
    classify, ActivePortSet, FifoPortSet, GosPacket, Port, PortSet, PortSetStatsSnapshot,
    PRIORITY_LEVELS,
};

use crate::config::NodeConfig;
use crate::node::{NodeEvent, SimNode};
use crate::scenario::{Arrival, TrafficScenario};

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub kind: PortKind,
    pub ports: usize,
    pub ticks: u64,
    pub offered: u64,
    pub admitted: u64,
    pub discarded: u64,
    pub retransmission_requests: u64,
    pub switched: u64,
    pub switched_bytes: u64,
    /// Switched packets per classified priority.
    pub served_by_priority: [u64; PRIORITY_LEVELS],
    /// Admitted packets per classified priority.
    pub incoming_by_priority: [u64; PRIORITY_LEVELS],
    /// Packets still buffered when the run ended.
    pub residual_packets: usize,
    pub peak_congestion_level: u64,
    pub final_congestion_level: u64,
    pub port_set: PortSetStatsSnapshot,
}

impl RunReport {
    /// Share of offered packets that were admitted.
    pub fn admission_ratio(&self) -> f64 {
        if self.offered == 0 {
            return 1.0;
        }
        self.admitted as f64 / self.offered as f64
    }
}

#[derive(Debug, Default)]
struct ForwardTotals {
    switched: u64,
    switched_bytes: u64,
    served_by_priority: [u64; PRIORITY_LEVELS],
}

/// Builds the configured port set and runs the scenario against it.
pub fn run_scenario(config: &NodeConfig) -> Result<RunReport> {
    let (node, events) = SimNode::new();
    let node = Arc::new(node);
    let port_set = &config.gos.port_set;

    info!(
        kind = ?port_set.kind,
        ports = port_set.ports,
        buffer = ?port_set.buffer,
        ticks = config.traffic.ticks,
        seed = config.traffic.seed,
        "starting scenario"
    );

    match port_set.kind {
        PortKind::Active => {
            let set = ActivePortSet::<SimPacket>::from_config(port_set, node.clone())
                .context("building active port set")?;
            run_with(Arc::new(set), node, events, config)
        }
        PortKind::Fifo => {
            let set = FifoPortSet::<SimPacket>::from_config(port_set, node.clone())
                .context("building fifo port set")?;
            run_with(Arc::new(set), node, events, config)
        }
    }
}

fn run_with<S>(
    set: Arc<S>,
    node: Arc<SimNode>,
    events: Receiver<NodeEvent>,
    config: &NodeConfig,
) -> Result<RunReport>
where
    S: PortSet<SimPacket> + 'static,
{
    let ports = set.port_count();
    let arrivals = TrafficScenario::new(config.traffic.clone(), ports).arrivals_by_port();
    let offered = arrivals.iter().map(|a| a.len() as u64).sum();

    // ── Producers ───────────────────────────────────────────────
    let (producer_done_tx, producer_done_rx) = crossbeam_channel::unbounded::<usize>();
    let mut producer_ticks = Vec::with_capacity(ports);
    let mut producers = Vec::with_capacity(ports);
    for (port, port_arrivals) in arrivals.into_iter().enumerate() {
        let (tick_tx, tick_rx) = crossbeam_channel::bounded::<u64>(1);
        producer_ticks.push(tick_tx);
        producers.push(spawn_producer(
            set.clone(),
            port,
            port_arrivals,
            tick_rx,
            producer_done_tx.clone(),
        )?);
    }
    drop(producer_done_tx);

    // ── Forwarder ───────────────────────────────────────────────
    let (forward_tick_tx, forward_tick_rx) = crossbeam_channel::bounded::<u64>(1);
    let (forward_done_tx, forward_done_rx) = crossbeam_channel::unbounded::<()>();
    let budget = config.gos.switching.capacity_bytes_per_tick;
    let forwarder = spawn_forwarder(set.clone(), budget, forward_tick_rx, forward_done_tx)?;

    // ── Tick loop ───────────────────────────────────────────────
    let mut peak_congestion_level = 0;
    for _ in 0..config.traffic.ticks {
        let tick = node.advance();
        for tx in &producer_ticks {
            tx.send(tick).context("producer thread exited early")?;
        }
        for _ in 0..ports {
            producer_done_rx
                .recv()
                .context("producer thread exited early")?;
        }
        peak_congestion_level = peak_congestion_level.max(set.congestion_level());

        forward_tick_tx
            .send(tick)
            .context("forwarding thread exited early")?;
        forward_done_rx
            .recv()
            .context("forwarding thread exited early")?;
        debug!(
            tick,
            occupancy = set.occupancy(),
            congestion = set.congestion_level(),
            "tick complete"
        );
    }

    drop(producer_ticks);
    drop(forward_tick_tx);
    for producer in producers {
        join(producer, "producer")?;
    }
    let totals = join(forwarder, "forwarder")?;

    // ── Report ──────────────────────────────────────────────────
    let mut admitted = 0;
    let mut discarded = 0;
    let mut retransmission_requests = 0;
    for event in events.try_iter() {
        match event {
            NodeEvent::Received { .. } => admitted += 1,
            NodeEvent::Discarded { .. } => discarded += 1,
            NodeEvent::RetransmissionRequested { .. } => retransmission_requests += 1,
        }
    }

    let residual_packets = set.queued_packets();

    let report = RunReport {
        kind: config.gos.port_set.kind,
        ports,
        ticks: config.traffic.ticks,
        offered,
        admitted,
        discarded,
        retransmission_requests,
        switched: totals.switched,
        switched_bytes: totals.switched_bytes,
        served_by_priority: totals.served_by_priority,
        incoming_by_priority: node.incoming_by_priority(),
        residual_packets,
        peak_congestion_level,
        final_congestion_level: set.congestion_level(),
        port_set: set.stats(),
    };
    info!(
        offered = report.offered,
        admitted = report.admitted,
        discarded = report.discarded,
        retransmission_requests = report.retransmission_requests,
        switched = report.switched,
        residual = report.residual_packets,
        "scenario finished"
    );
    Ok(report)
}

fn spawn_producer<S>(
    set: Arc<S>,
    port: usize,
    arrivals: Vec<Arrival>,
    ticks: Receiver<u64>,
    done: Sender<usize>,
) -> Result<JoinHandle<()>>
where
    S: PortSet<SimPacket> + 'static,
{
    let handle = thread::Builder::new()
        .name(format!("producer-{port}"))
        .spawn(move || {
            let Ok(target) = set.port(port) else {
                return;
            };
            let mut pending = arrivals.into_iter().peekable();
            for tick in ticks.iter() {
                while let Some(arrival) = pending.next_if(|a| a.tick <= tick) {
                    target.enqueue(arrival.packet);
                }
                if done.send(port).is_err() {
                    break;
                }
            }
        })?;
    Ok(handle)
}

fn spawn_forwarder<S>(
    set: Arc<S>,
    budget_per_tick: usize,
    ticks: Receiver<u64>,
    done: Sender<()>,
) -> Result<JoinHandle<ForwardTotals>>
where
    S: PortSet<SimPacket> + 'static,
{
    let handle = thread::Builder::new()
        .name("forwarder".into())
        .spawn(move || {
            let mut totals = ForwardTotals::default();
            for tick in ticks.iter() {
                let switched = forward_tick(set.as_ref(), budget_per_tick, &mut totals);
                debug!(tick, switched, "switching budget spent");
                if done.send(()).is_err() {
                    break;
                }
            }
            totals
        })?;
    Ok(handle)
}

/// Switches packets until `budget` bytes are used or nothing is pending.
/// A packet too large for the remaining budget waits for the next tick.
fn forward_tick<S: PortSet<SimPacket>>(set: &S, budget: usize, totals: &mut ForwardTotals) -> u64 {
    let mut remaining = budget;
    let mut switched = 0;
    loop {
        // The active set may yield one empty selection mid-cycle, so try twice.
        if !(0..2).any(|_| set.can_switch(remaining)) {
            break;
        }
        let Some(packet) = set.next_packet() else {
            break;
        };
        remaining -= packet.size();
        switched += 1;
        totals.switched += 1;
        totals.switched_bytes += packet.size() as u64;
        totals.served_by_priority[classify(&packet).index()] += 1;
    }
    switched
}

fn join<T>(handle: JoinHandle<T>, role: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("{role} thread panicked"))
}
