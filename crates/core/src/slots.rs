use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::TrailguardError;

/// Atomic ledger of reserved position capacity.
///
/// The only globally shared counter in the system. `reserve` fails fast with
/// `CapacityExceeded` instead of blocking, so two near-simultaneous opens can
/// never both succeed once capacity is exhausted.
#[derive(Debug)]
pub struct SlotLedger {
    reserved: AtomicU32,
    max: AtomicU32,
}

impl SlotLedger {
    #[must_use]
    pub fn new(max: u32) -> Self {
        Self {
            reserved: AtomicU32::new(0),
            max: AtomicU32::new(max),
        }
    }

    /// Reserves one slot.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when all slots are reserved.
    pub fn reserve(&self) -> Result<(), TrailguardError> {
        let max = self.max.load(Ordering::Acquire);
        let mut current = self.reserved.load(Ordering::Acquire);
        loop {
            if current >= max {
                return Err(TrailguardError::CapacityExceeded {
                    reserved: current,
                    max,
                });
            }
            match self.reserved.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases one slot. Saturates at zero so a double release after
    /// reconciliation cannot underflow the ledger.
    pub fn release(&self) {
        let mut current = self.reserved.load(Ordering::Acquire);
        while current > 0 {
            match self.reserved.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    #[must_use]
    pub fn reserved(&self) -> u32 {
        self.reserved.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn available(&self) -> u32 {
        let max = self.max.load(Ordering::Acquire);
        max.saturating_sub(self.reserved.load(Ordering::Acquire))
    }

    /// Adjusts capacity, e.g. auto-delever dropping from 3 to 2 slots.
    /// Existing reservations above the new max are drained by closes.
    pub fn set_max(&self, max: u32) {
        self.max.store(max, Ordering::Release);
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max.load(Ordering::Acquire)
    }
}
