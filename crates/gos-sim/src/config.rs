//! Node configuration: the `gos-core` tables plus `[traffic]`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use gos_core::config::GosConfig;

use crate::scenario::TrafficConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TrafficDocument {
    traffic: TrafficConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrafficConfigInput {
    pub seed: Option<u64>,
    pub ticks: Option<u64>,
    pub packets_per_tick: Option<usize>,
    pub min_packet_size: Option<usize>,
    pub max_packet_size: Option<usize>,
    pub gos_share: Option<f64>,
}

impl TrafficConfigInput {
    pub fn resolve(self) -> Result<TrafficConfig> {
        let defaults = TrafficConfig::default();
        let cfg = TrafficConfig {
            seed: self.seed.unwrap_or(defaults.seed),
            ticks: self.ticks.unwrap_or(defaults.ticks),
            packets_per_tick: self.packets_per_tick.unwrap_or(defaults.packets_per_tick),
            min_packet_size: self.min_packet_size.unwrap_or(defaults.min_packet_size),
            max_packet_size: self.max_packet_size.unwrap_or(defaults.max_packet_size),
            gos_share: self.gos_share.unwrap_or(defaults.gos_share),
        };
        if cfg.ticks == 0 {
            bail!("traffic.ticks must be at least 1");
        }
        if cfg.min_packet_size == 0 || cfg.min_packet_size > cfg.max_packet_size {
            bail!(
                "traffic packet sizes must satisfy 1 <= min ({}) <= max ({})",
                cfg.min_packet_size,
                cfg.max_packet_size
            );
        }
        if !(0.0..=1.0).contains(&cfg.gos_share) {
            bail!("traffic.gos_share must be within 0.0..=1.0, got {}", cfg.gos_share);
        }
        Ok(cfg)
    }
}

/// Everything `gos-node` needs to run.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub gos: GosConfig,
    pub traffic: TrafficConfig,
}

impl NodeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let gos = GosConfig::from_toml_str(input)?;
        let doc: TrafficDocument =
            toml::from_str(input).context("Invalid [traffic] table")?;
        let traffic = doc.traffic.resolve()?;
        if gos.switching.capacity_bytes_per_tick < traffic.max_packet_size {
            bail!(
                "switching.capacity_bytes_per_tick ({}) is smaller than traffic.max_packet_size ({})",
                gos.switching.capacity_bytes_per_tick,
                traffic.max_packet_size
            );
        }
        Ok(NodeConfig { gos, traffic })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&input).with_context(|| format!("loading config {}", path.display()))
    }
}
