//! EVSE Load Balancer Core
//!
//! Shares a site's per-phase current budget between several EV chargers so
//! that the main fuse is never exceeded, while giving as much current as
//! possible to the chargers that can still take it.
//!
//! ## Control loop
//!
//! ```text
//!   CapacitySource ──available──► PowerAllocator ──limits──► Charger
//!                                   ▲     │                    │
//!                                   │     └─ override/session ◄┤
//!                                   └───── applied current ◄───┘
//! ```
//!
//! [`PowerAllocator`] holds the charger registry and the allocation
//! algorithm. [`Balancer`] is the poll loop that feeds it and writes its
//! output back to the chargers.

pub mod phase;
pub mod error;
pub mod charger;
pub mod state;
pub mod allocator;
pub mod capacity;
pub mod config;
pub mod balancer;
pub mod sim;

pub use phase::{Amps, PerPhase, Phase};
pub use error::{AllocatorError, ChargerError, ConfigError};
pub use charger::Charger;
pub use state::{ChargerState, SessionTransition};
pub use allocator::PowerAllocator;
pub use capacity::{CapacitySource, FuseCapacity, LoadMeter};
pub use config::{BalancerConfig, ChargerConfig, SiteConfig};
pub use balancer::{Balancer, TickOutcome, TickReport};
pub use sim::SimulatedCharger;
