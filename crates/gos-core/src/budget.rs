//! Shared occupancy accounting.
//!
//! A [`BufferBudget`] is the byte counter a port charges on admission and
//! credits on dequeue. Ports of a bounded port set share one budget; a
//! standalone port owns its own. All updates are atomic and independent of
//! the queue locks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{GosError, Result};

/// Bytes kept free below capacity by the Early Packet Catch and Discard check.
pub const EPCD_THRESHOLD: u64 = 100;

/// Share of the capacity the counter is pinned to while artificially
/// congested, in percent.
pub const ARTIFICIAL_CONGESTION_PERCENT: u64 = 97;

pub const MIB: u64 = 1024 * 1024;

/// How a port set accounts for buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// All ports share `capacity_bytes`.
    Bounded { capacity_bytes: u64 },
    Unlimited,
}

impl BufferMode {
    pub fn into_budget(self) -> Result<BufferBudget> {
        match self {
            BufferMode::Bounded { capacity_bytes: 0 } => Err(GosError::InvalidBufferSize(
                "capacity must be non-zero".into(),
            )),
            BufferMode::Bounded { capacity_bytes } => Ok(BufferBudget::bounded(capacity_bytes)),
            BufferMode::Unlimited => Ok(BufferBudget::unlimited()),
        }
    }
}

/// Counter value installed by artificial congestion and the real value it
/// replaced.
#[derive(Debug, Clone, Copy)]
struct Pin {
    pinned: u64,
    saved_real: u64,
}

#[derive(Debug)]
pub struct BufferBudget {
    unlimited: bool,
    capacity: AtomicU64,
    occupancy: AtomicU64,
    pin: Mutex<Option<Pin>>,
}

impl BufferBudget {
    pub fn bounded(capacity_bytes: u64) -> Self {
        BufferBudget {
            unlimited: false,
            capacity: AtomicU64::new(capacity_bytes),
            occupancy: AtomicU64::new(0),
            pin: Mutex::new(None),
        }
    }

    pub fn bounded_mib(mib: u64) -> Self {
        Self::bounded(mib.saturating_mul(MIB))
    }

    pub fn unlimited() -> Self {
        BufferBudget {
            unlimited: true,
            capacity: AtomicU64::new(u64::MAX),
            occupancy: AtomicU64::new(0),
            pin: Mutex::new(None),
        }
    }

    fn lock_pin(&self) -> MutexGuard<'_, Option<Pin>> {
        self.pin.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_unlimited(&self) -> bool {
        self.unlimited
    }

    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::Acquire)
    }

    /// Changes the capacity of a bounded budget. Queued bytes are untouched.
    pub fn resize(&self, capacity_bytes: u64) {
        if !self.unlimited {
            self.capacity.store(capacity_bytes, Ordering::Release);
        }
    }

    /// Occupancy as seen by admission control and congestion reporting.
    /// While artificially congested this is the pinned counter.
    pub fn occupancy(&self) -> u64 {
        self.occupancy.load(Ordering::Acquire)
    }

    /// Bytes actually charged: the saved real value plus everything charged
    /// or released since the counter was pinned.
    pub fn real_occupancy(&self) -> u64 {
        let pin = *self.lock_pin();
        let current = self.occupancy();
        match pin {
            Some(pin) => current
                .saturating_add(pin.saved_real)
                .saturating_sub(pin.pinned),
            None => current,
        }
    }

    fn pinned_occupancy(&self) -> u64 {
        self.capacity() / 100 * ARTIFICIAL_CONGESTION_PERCENT
            + self.capacity() % 100 * ARTIFICIAL_CONGESTION_PERCENT / 100
    }

    /// Charges `size` bytes if the resulting occupancy stays within `limit`.
    ///
    /// The check and the charge happen in one atomic step, so concurrent
    /// admissions on ports sharing this budget never overshoot the limit.
    pub fn try_reserve(&self, size: u64, limit: u64) -> bool {
        self.occupancy
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.checked_add(size)?;
                (next <= limit).then_some(next)
            })
            .is_ok()
    }

    /// Charges `size` bytes unconditionally.
    pub fn charge(&self, size: u64) {
        self.occupancy.fetch_add(size, Ordering::AcqRel);
    }

    pub fn release(&self, size: u64) {
        let _ = self
            .occupancy
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(size))
            });
    }

    /// Pins the counter to 97% of capacity, saving the real value. Traffic
    /// keeps charging and releasing the pinned counter; lifting the pin
    /// restores the saved value plus those changes.
    /// Returns `false` when the budget is unlimited.
    pub fn set_artificially_congested(&self, congested: bool) -> bool {
        if self.unlimited {
            return false;
        }
        let mut pin = self.lock_pin();
        match (*pin, congested) {
            (None, true) => {
                let pinned = self.pinned_occupancy();
                let saved_real = self.occupancy.swap(pinned, Ordering::AcqRel);
                *pin = Some(Pin { pinned, saved_real });
            }
            (Some(Pin { pinned, saved_real }), false) => {
                let _ = self
                    .occupancy
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                        Some(current.saturating_add(saved_real).saturating_sub(pinned))
                    });
                *pin = None;
            }
            _ => {}
        }
        true
    }

    pub fn is_artificially_congested(&self) -> bool {
        self.lock_pin().is_some()
    }

    /// Percentage of the capacity in use, `0` for unlimited budgets.
    pub fn congestion_level(&self) -> u64 {
        if self.unlimited {
            return 0;
        }
        (self.occupancy().saturating_mul(100))
            .checked_div(self.capacity())
            .unwrap_or(0)
    }

    /// Zeroes the occupancy and lifts any artificial congestion.
    pub fn reset(&self) {
        let mut pin = self.lock_pin();
        self.occupancy.store(0, Ordering::Release);
        *pin = None;
    }
}
