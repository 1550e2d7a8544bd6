//! Simulated charger
//!
//! In-memory [`Charger`] used by the demo node and by tests. The car draws
//! exactly the configured limit while charging, which is good enough to
//! close the loop between the balancer and a simulated meter.

use parking_lot::Mutex;
use tracing::debug;

use crate::charger::Charger;
use crate::error::ChargerError;
use crate::phase::{Amps, PerPhase};

#[derive(Debug, Clone)]
struct SimState {
    limit: PerPhase<Amps>,
    car_connected: bool,
    charging: bool,
    limit_readable: bool,
    fail_writes: bool,
    writes: usize,
}

/// Charger backed by in-memory state
#[derive(Debug)]
pub struct SimulatedCharger {
    id: String,
    max_current: Option<PerPhase<Amps>>,
    synced_phase_limits: bool,
    state: Mutex<SimState>,
}

impl SimulatedCharger {
    /// Create a connected, charging device with a uniform initial limit
    pub fn new(id: impl Into<String>, initial_current: Amps, max_current: Amps) -> Self {
        Self {
            id: id.into(),
            max_current: Some(PerPhase::uniform(max_current)),
            synced_phase_limits: false,
            state: Mutex::new(SimState {
                limit: PerPhase::uniform(initial_current),
                car_connected: true,
                charging: true,
                limit_readable: true,
                fail_writes: false,
                writes: 0,
            }),
        }
    }

    /// Accept independent per-phase limits
    pub fn with_synced_phase_limits(mut self, synced: bool) -> Self {
        self.synced_phase_limits = synced;
        self
    }

    /// Device that does not report a maximum
    pub fn without_max_current(mut self) -> Self {
        self.max_current = None;
        self
    }

    /// Plug in (and start charging) or unplug the car
    pub fn set_can_charge(&self, can_charge: bool) {
        let mut state = self.state.lock();
        state.car_connected = can_charge;
        state.charging = can_charge;
    }

    /// Car plugged in but not accepting charge (full, paused)
    pub fn set_paused(&self) {
        let mut state = self.state.lock();
        state.car_connected = true;
        state.charging = false;
    }

    /// Change the limit out of band, as an app or the device's own UI would
    pub fn set_current_limits(&self, limit: PerPhase<Amps>) {
        self.state.lock().limit = limit;
    }

    /// Take the device off the bus: `get_current_limit` reports nothing and
    /// writes fail with [`ChargerError::Unavailable`]
    pub fn set_limit_readable(&self, readable: bool) {
        self.state.lock().limit_readable = readable;
    }

    /// Make every `set_current_limit` call fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    /// Current drawn from the grid right now
    pub fn draw(&self) -> PerPhase<Amps> {
        let state = self.state.lock();
        if state.charging {
            state.limit
        } else {
            PerPhase::uniform(0)
        }
    }
}

impl Charger for SimulatedCharger {
    fn id(&self) -> &str {
        &self.id
    }

    fn can_charge(&self) -> bool {
        let state = self.state.lock();
        state.car_connected && state.charging
    }

    fn car_connected(&self) -> bool {
        self.state.lock().car_connected
    }

    fn get_current_limit(&self) -> Option<PerPhase<Amps>> {
        let state = self.state.lock();
        state.limit_readable.then_some(state.limit)
    }

    fn get_max_current_limit(&self) -> Option<PerPhase<Amps>> {
        self.max_current
    }

    fn has_synced_phase_limits(&self) -> bool {
        self.synced_phase_limits
    }

    fn set_current_limit(&self, limit: PerPhase<Amps>) -> Result<(), ChargerError> {
        let mut state = self.state.lock();
        if !state.limit_readable {
            return Err(ChargerError::Unavailable(self.id.clone()));
        }
        if state.fail_writes {
            return Err(ChargerError::WriteRejected {
                id: self.id.clone(),
                reason: "simulated write failure".to_string(),
            });
        }

        debug!("Simulated charger {}: limit {} -> {}", self.id, state.limit, limit);
        state.limit = limit;
        state.writes += 1;
        Ok(())
    }
}
