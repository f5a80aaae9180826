//! # Priority levels
//!
//! Eleven service classes, `0` (best effort) through `10` (label-distribution
//! signalling). Level `p` carries a weighted round-robin weight of `p + 1`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GosError, Result};

/// Number of priority levels served by an active port.
pub const PRIORITY_LEVELS: usize = 11;

/// A validated priority level in `0..=10`.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const BEST_EFFORT: Priority = Priority(0);
    pub const RESERVATION: Priority = Priority(8);
    pub const RETRANSMISSION_REQUEST: Priority = Priority(9);
    pub const SIGNALLING: Priority = Priority(10);
    pub const HIGHEST: Priority = Priority::SIGNALLING;

    pub fn new(level: u8) -> Result<Self> {
        if (level as usize) < PRIORITY_LEVELS {
            Ok(Priority(level))
        } else {
            Err(GosError::InvalidPriority(level))
        }
    }

    /// Builds a priority from a table index. Callers guarantee `index < 11`.
    pub(crate) const fn from_index(index: usize) -> Self {
        Priority(index as u8)
    }

    pub const fn level(self) -> u8 {
        self.0
    }

    /// Stable index into per-priority arrays.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Number of services this level receives per weighted cycle.
    pub const fn weight(self) -> u32 {
        self.0 as u32 + 1
    }

    /// All levels, lowest first.
    pub fn all() -> impl DoubleEndedIterator<Item = Priority> + ExactSizeIterator {
        (0..PRIORITY_LEVELS).map(Priority::from_index)
    }
}

impl TryFrom<u8> for Priority {
    type Error = GosError;

    fn try_from(level: u8) -> Result<Self> {
        Priority::new(level)
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Priority::SIGNALLING => write!(f, "P10(signalling)"),
            Priority::RETRANSMISSION_REQUEST => write!(f, "P9(retransmission)"),
            Priority::RESERVATION => write!(f, "P8(reservation)"),
            Priority::BEST_EFFORT => write!(f, "P0(best-effort)"),
            Priority(level) => write!(f, "P{level}"),
        }
    }
}

/// Per-level weights, `p + 1` for level `p`.
pub(crate) const fn level_weights() -> [u32; PRIORITY_LEVELS] {
    let mut weights = [0u32; PRIORITY_LEVELS];
    let mut i = 0;
    while i < PRIORITY_LEVELS {
        weights[i] = i as u32 + 1;
        i += 1;
    }
    weights
}
