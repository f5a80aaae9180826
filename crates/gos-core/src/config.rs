//! TOML configuration for a node's port set and switching fabric.
//!
//! ```toml
//! version = 1
//!
//! [port_set]
//! ports = 4
//! buffer_size_mib = 1
//! unlimited = false
//! kind = "active"
//!
//! [switching]
//! capacity_bytes_per_tick = 15000
//! ```
//!
//! Every field is optional. Unknown sections are ignored so that callers can
//! keep their own tables in the same document.

use serde::{Deserialize, Serialize};

use crate::budget::{BufferMode, MIB};
use crate::error::{GosError, Result};

pub const CONFIG_VERSION: u32 = 1;

pub const DEFAULT_PORTS: usize = 4;
pub const DEFAULT_BUFFER_MIB: u64 = 1;
pub const DEFAULT_SWITCHING_BYTES_PER_TICK: usize = 15_000;

/// Queueing discipline of a port set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    /// Eleven-level weighted round robin with EPCD admission.
    #[default]
    Active,
    /// Single drop-tail queue per port.
    Fifo,
}

// ─── Raw input ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GosConfigInput {
    pub version: u32,
    pub port_set: PortSetConfigInput,
    pub switching: SwitchingConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PortSetConfigInput {
    pub ports: Option<usize>,
    pub buffer_size_mib: Option<u64>,
    pub unlimited: Option<bool>,
    pub kind: Option<PortKind>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SwitchingConfigInput {
    pub capacity_bytes_per_tick: Option<usize>,
}

// ─── Resolved config ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSetConfig {
    pub ports: usize,
    pub buffer: BufferMode,
    pub kind: PortKind,
}

impl Default for PortSetConfig {
    fn default() -> Self {
        Self {
            ports: DEFAULT_PORTS,
            buffer: BufferMode::Bounded {
                capacity_bytes: DEFAULT_BUFFER_MIB * MIB,
            },
            kind: PortKind::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchingConfig {
    /// Bytes the fabric may forward per tick across all ports.
    pub capacity_bytes_per_tick: usize,
}

impl Default for SwitchingConfig {
    fn default() -> Self {
        Self {
            capacity_bytes_per_tick: DEFAULT_SWITCHING_BYTES_PER_TICK,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GosConfig {
    pub version: u32,
    pub port_set: PortSetConfig,
    pub switching: SwitchingConfig,
}

impl GosConfigInput {
    pub fn resolve(self) -> Result<GosConfig> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(GosError::Config(format!(
                "Unsupported config version {}",
                version
            )));
        }

        let ports = self.port_set.ports.unwrap_or(DEFAULT_PORTS);
        if ports == 0 {
            return Err(GosError::InvalidPortCount);
        }

        let buffer = if self.port_set.unlimited.unwrap_or(false) {
            BufferMode::Unlimited
        } else {
            let mib = self.port_set.buffer_size_mib.unwrap_or(DEFAULT_BUFFER_MIB);
            if mib == 0 {
                return Err(GosError::InvalidBufferSize(
                    "buffer_size_mib must be at least 1".into(),
                ));
            }
            let capacity_bytes = mib.checked_mul(MIB).ok_or_else(|| {
                GosError::InvalidBufferSize(format!("buffer_size_mib {} overflows", mib))
            })?;
            BufferMode::Bounded { capacity_bytes }
        };

        let capacity_bytes_per_tick = self
            .switching
            .capacity_bytes_per_tick
            .unwrap_or(DEFAULT_SWITCHING_BYTES_PER_TICK);
        if capacity_bytes_per_tick == 0 {
            return Err(GosError::Config(
                "switching.capacity_bytes_per_tick must be non-zero".into(),
            ));
        }

        Ok(GosConfig {
            version,
            port_set: PortSetConfig {
                ports,
                buffer,
                kind: self.port_set.kind.unwrap_or_default(),
            },
            switching: SwitchingConfig {
                capacity_bytes_per_tick,
            },
        })
    }
}

impl GosConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(GosConfig {
                version: CONFIG_VERSION,
                ..GosConfig::default()
            });
        }
        let parsed: GosConfigInput = toml::from_str(input)
            .map_err(|e| GosError::Config(format!("Invalid config TOML: {}", e)))?;
        parsed.resolve()
    }
}
