//! Available current measurement
//!
//! The allocator consumes a signed per-phase delta against the site's safety
//! threshold. [`FuseCapacity`] derives it from a fuse rating and a live load
//! reading.

use std::sync::Arc;

use crate::phase::{Amps, PerPhase};

/// Source of the per-phase available current
pub trait CapacitySource: Send + Sync {
    /// Signed headroom per phase; negative is overcurrent.
    /// `None` when no fresh reading exists.
    fn available_currents(&self) -> Option<PerPhase<Amps>>;
}

/// Per-phase load measured at the site connection
pub trait LoadMeter: Send + Sync {
    fn measured_load(&self) -> Option<PerPhase<Amps>>;
}

/// Headroom below a fuse rating minus a safety margin
pub struct FuseCapacity {
    fuse_limit: PerPhase<Amps>,
    margin: Amps,
    meter: Arc<dyn LoadMeter>,
}

impl FuseCapacity {
    pub fn new(fuse_limit: PerPhase<Amps>, meter: Arc<dyn LoadMeter>) -> Self {
        Self {
            fuse_limit,
            margin: 0,
            meter,
        }
    }

    /// Keep `margin` amps free below the fuse on every phase
    pub fn with_margin(mut self, margin: Amps) -> Self {
        self.margin = margin;
        self
    }

    /// Effective per-phase threshold
    pub fn threshold(&self) -> PerPhase<Amps> {
        self.fuse_limit.map(|limit| limit - self.margin)
    }
}

impl CapacitySource for FuseCapacity {
    fn available_currents(&self) -> Option<PerPhase<Amps>> {
        let load = self.meter.measured_load()?;
        Some(self.threshold().zip_with(load, |threshold, load| threshold - load))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct FixedMeter(Mutex<Option<PerPhase<Amps>>>);

    impl LoadMeter for FixedMeter {
        fn measured_load(&self) -> Option<PerPhase<Amps>> {
            *self.0.lock()
        }
    }

    #[test]
    fn test_fuse_capacity() {
        let meter = Arc::new(FixedMeter(Mutex::new(Some(PerPhase::new(30, 20, 10)))));
        let capacity = FuseCapacity::new(PerPhase::uniform(25), meter.clone()).with_margin(2);

        assert_eq!(capacity.threshold(), PerPhase::uniform(23));
        assert_eq!(capacity.available_currents(), Some(PerPhase::new(-7, 3, 13)));

        *meter.0.lock() = None;
        assert_eq!(capacity.available_currents(), None);
    }
}
