use rand::RngExt as _;
use rand::SeedableRng;
use rand::rngs::StdRng;

use gos_core::packet::{GosLevel, SimPacket};

/// Traffic offered to the node, the `[traffic]` table.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficConfig {
    pub seed: u64,
    pub ticks: u64,
    /// Arrivals per tick across all ports.
    pub packets_per_tick: usize,
    pub min_packet_size: usize,
    pub max_packet_size: usize,
    /// Fraction of data packets carrying a GoS marking.
    pub gos_share: f64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ticks: 200,
            packets_per_tick: 8,
            min_packet_size: 64,
            max_packet_size: 1500,
            gos_share: 0.6,
        }
    }
}

/// One packet arriving on one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub tick: u64,
    pub port: usize,
    pub packet: SimPacket,
}

// Control traffic shares, cumulative.
const SIGNALLING_SHARE: f64 = 0.03;
const RESERVATION_SHARE: f64 = 0.05;
const RETRANSMISSION_SHARE: f64 = 0.06;

/// Ordinary MPLS labels start above the reserved range.
const FIRST_PLAIN_LABEL: u32 = 16;

/// Deterministic traffic generator.
///
/// Given a seed, produces the same arrivals every time: a small share of
/// control packets (signalling, reservation, retransmission requests), then
/// data packets that are GoS-marked with probability `gos_share`, spread
/// uniformly over the ports.
#[derive(Debug)]
pub struct TrafficScenario {
    cfg: TrafficConfig,
    ports: usize,
    rng: StdRng,
    next_id: u64,
}

impl TrafficScenario {
    pub fn new(cfg: TrafficConfig, ports: usize) -> Self {
        let rng = StdRng::seed_from_u64(cfg.seed);
        Self {
            cfg,
            ports: ports.max(1),
            rng,
            next_id: 0,
        }
    }

    /// All arrivals of the run, in tick order.
    pub fn arrivals(&mut self) -> Vec<Arrival> {
        let total = self.cfg.ticks as usize * self.cfg.packets_per_tick;
        let mut out = Vec::with_capacity(total);
        for tick in 1..=self.cfg.ticks {
            for _ in 0..self.cfg.packets_per_tick {
                let port = (self.rng.random::<u64>() % self.ports as u64) as usize;
                let packet = self.next_packet(port);
                out.push(Arrival { tick, port, packet });
            }
        }
        out
    }

    /// Arrivals grouped by port, each group in tick order.
    pub fn arrivals_by_port(&mut self) -> Vec<Vec<Arrival>> {
        let mut by_port = vec![Vec::new(); self.ports];
        for arrival in self.arrivals() {
            by_port[arrival.port].push(arrival);
        }
        by_port
    }

    fn next_packet(&mut self, port: usize) -> SimPacket {
        let id = self.next_id;
        self.next_id += 1;
        let control_size = self.cfg.min_packet_size;

        let r = self.rng.random::<f64>();
        if r < SIGNALLING_SHARE {
            return SimPacket::signalling(id, control_size);
        }
        if r < RESERVATION_SHARE {
            return SimPacket::reservation(id, control_size);
        }
        if r < RETRANSMISSION_SHARE {
            let lost = self.rng.random::<u64>() % id.max(1);
            return SimPacket::retransmission_request(id, control_size, lost, port);
        }

        let size = self.packet_size();
        if self.rng.random::<f64>() < self.cfg.gos_share {
            let level = GosLevel {
                level: (self.rng.random::<u32>() % 4) as u8,
                backup: self.rng.random::<bool>(),
            };
            return if self.rng.random::<bool>() {
                SimPacket::mpls_gos(id, size, level)
            } else {
                SimPacket::ipv4(id, size, Some(level))
            };
        }

        match self.rng.random::<u32>() % 3 {
            0 => {
                let label = FIRST_PLAIN_LABEL + self.rng.random::<u32>() % 1024;
                let exp = (self.rng.random::<u32>() % 8) as u8;
                SimPacket::mpls(id, size, label, exp)
            }
            1 => SimPacket::ipv4(id, size, None),
            _ => SimPacket::other(id, size),
        }
    }

    fn packet_size(&mut self) -> usize {
        let span = self.cfg.max_packet_size.saturating_sub(self.cfg.min_packet_size) + 1;
        let offset = (self.rng.random::<f64>() * span as f64) as usize;
        (self.cfg.min_packet_size + offset).min(self.cfg.max_packet_size)
    }
}
