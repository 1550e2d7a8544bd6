//! Balancing poll loop
//!
//! Drives the allocator the way a host integration does:
//!
//! 1. Reconcile every charger's session / override state
//! 2. Skip the pass when no charger can take charge
//! 3. Read available current and compute new limits
//! 4. Write changed limits to the chargers and confirm them back
//!
//! The allocator lives behind one mutex that is held for the whole tick, so
//! an allocation pass never sees a half-updated registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::capacity::CapacitySource;
use crate::charger::Charger;
use crate::config::BalancerConfig;
use crate::error::AllocatorError;
use crate::phase::{Amps, PerPhase, Phase};
use crate::state::SessionTransition;
use crate::PowerAllocator;

/// What happened to each charger during one allocation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Limits written and confirmed
    pub applied: Vec<(String, PerPhase<Amps>)>,
    /// Raises held back by `min_raise_interval`
    pub deferred: Vec<String>,
    /// Calculated limit equal to the applied one
    pub unchanged: Vec<String>,
    /// Chargers whose write failed
    pub failed: Vec<String>,
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No charger can take charge
    Idle,
    /// Capacity source had no reading
    NoCapacityReading,
    /// Allocation ran against the given available current
    Allocated {
        available: PerPhase<Amps>,
        report: TickReport,
    },
}

/// Periodic driver around a [`PowerAllocator`]
pub struct Balancer {
    config: BalancerConfig,
    allocator: Arc<Mutex<PowerAllocator>>,
    capacity: Arc<dyn CapacitySource>,
}

impl Balancer {
    pub fn new(config: BalancerConfig, capacity: Arc<dyn CapacitySource>) -> Self {
        Self::with_allocator(config, Arc::new(Mutex::new(PowerAllocator::new())), capacity)
    }

    /// Use an existing, possibly shared, allocator
    pub fn with_allocator(
        config: BalancerConfig,
        allocator: Arc<Mutex<PowerAllocator>>,
        capacity: Arc<dyn CapacitySource>,
    ) -> Self {
        Self {
            config,
            allocator,
            capacity,
        }
    }

    pub fn allocator(&self) -> Arc<Mutex<PowerAllocator>> {
        self.allocator.clone()
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Register a charger and read its initial limit
    pub fn register(&self, charger: Arc<dyn Charger>) -> bool {
        self.allocator.lock().register_and_initialize(charger)
    }

    /// Run one balancing pass
    pub fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let mut allocator = self.allocator.lock();

        for (id, transition) in allocator.detect_manual_overrides() {
            match transition {
                SessionTransition::Override => {
                    warn!("Balancer: charger {} limit changed outside the balancer", id)
                }
                SessionTransition::Started | SessionTransition::Ended => {
                    let connected = allocator
                        .get(&id)
                        .map(|state| state.charger().car_connected())
                        .unwrap_or(false);
                    info!(
                        "Balancer: charger {} session {} (car connected: {})",
                        id, transition, connected
                    )
                }
                _ => {}
            }
        }

        if !allocator.should_monitor() {
            debug!("Balancer: no charger can take charge, skipping");
            return TickOutcome::Idle;
        }

        let Some(available) = self.capacity.available_currents() else {
            warn!("Balancer: no capacity reading, skipping");
            return TickOutcome::NoCapacityReading;
        };

        let allocation = allocator.update_allocation(available);

        let mut ids: Vec<&String> = allocation.keys().collect();
        ids.sort();

        let mut report = TickReport::default();
        for id in ids {
            let limit = allocation[id];
            let Some(state) = allocator.get(id) else {
                continue;
            };

            let applied = state.last_applied_current();
            if applied == Some(limit) {
                report.unchanged.push(id.clone());
                continue;
            }

            let reduces = applied
                .map(|applied| Phase::ALL.iter().any(|&p| limit[p] < applied[p]))
                .unwrap_or(true);
            if !reduces && self.raised_too_recently(state.last_update_time(), now) {
                debug!("Balancer: deferring raise of {} to {}", id, limit);
                report.deferred.push(id.clone());
                continue;
            }

            match apply_limit(&mut allocator, id, limit, now) {
                Ok(()) => {
                    info!("Balancer: charger {} limit {:?} -> {}", id, applied, limit);
                    report.applied.push((id.clone(), limit));
                }
                Err(e) => {
                    warn!("Balancer: failed to apply limit to {}: {}", id, e);
                    report.failed.push(id.clone());
                }
            }
        }

        TickOutcome::Allocated { available, report }
    }

    /// Tick on `poll_interval` until `shutdown` turns true or its sender drops.
    ///
    /// Each outcome is sent to `reports` when a channel is given.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
        reports: Option<mpsc::UnboundedSender<TickOutcome>>,
    ) {
        info!(
            "Balancer: starting, poll interval {:?}",
            self.config.poll_interval
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.tick(Utc::now());
                    if let Some(tx) = &reports {
                        let _ = tx.send(outcome);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Balancer: stopped");
    }

    fn raised_too_recently(&self, last_update: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last_update) = last_update else {
            return false;
        };
        now.signed_duration_since(last_update)
            .to_std()
            .map(|elapsed| elapsed < self.config.min_raise_interval)
            .unwrap_or(false)
    }
}

/// Write a limit to the charger and confirm it in the allocator
fn apply_limit(
    allocator: &mut PowerAllocator,
    id: &str,
    limit: PerPhase<Amps>,
    now: DateTime<Utc>,
) -> Result<(), AllocatorError> {
    let charger = allocator
        .get(id)
        .map(|state| state.charger().clone())
        .ok_or_else(|| AllocatorError::UnknownCharger(id.to_string()))?;

    charger.set_current_limit(limit)?;
    allocator.update_applied_current(id, limit, now)
}
