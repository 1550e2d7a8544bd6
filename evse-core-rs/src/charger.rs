//! Charger capability interface
//!
//! Each supported charger family implements [`Charger`]. The allocator is
//! written against this trait only and never inspects which family it is
//! talking to.
//!
//! # Implementing a charger
//!
//! ```ignore
//! struct MyWallbox { /* protocol client */ }
//!
//! impl Charger for MyWallbox {
//!     fn id(&self) -> &str {
//!         &self.serial
//!     }
//!
//!     fn get_current_limit(&self) -> Option<PerPhase<Amps>> {
//!         // Read the configured limit from the device
//!     }
//!
//!     // ... implement other methods
//! }
//! ```

use crate::error::ChargerError;
use crate::phase::{Amps, PerPhase};

/// Capability set of a single charging device
pub trait Charger: Send + Sync {
    /// Stable identifier, unique per site
    fn id(&self) -> &str;

    /// Car is connected and charging or ready to accept charge
    fn can_charge(&self) -> bool;

    /// Car is plugged in and authorised
    ///
    /// This does not mean the car can take charge right now; use
    /// [`Charger::can_charge`] for that.
    fn car_connected(&self) -> bool;

    /// Limit currently configured on the device, if it can be read
    fn get_current_limit(&self) -> Option<PerPhase<Amps>>;

    /// Hardware or installation maximum of the device
    fn get_max_current_limit(&self) -> Option<PerPhase<Amps>>;

    /// Whether the device accepts an independent limit for each phase
    ///
    /// When false the device only takes one limit that applies to all
    /// three phases.
    fn has_synced_phase_limits(&self) -> bool;

    /// Write a new limit to the device
    fn set_current_limit(&self, limit: PerPhase<Amps>) -> Result<(), ChargerError>;
}
