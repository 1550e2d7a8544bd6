//! Proportional per-phase current allocation
//!
//! The allocator receives, per phase, the signed difference between the
//! site's safety threshold and its present load. A negative value is an
//! overcurrent that must be shed, a positive value is headroom that may be
//! handed back. The delta is split across active chargers in proportion to
//! the current each of them was last confirmed to use.
//!
//! Shares are floored (towards negative infinity), so the sum of the cuts is
//! never smaller than the overcurrent and the sum of the raises never exceeds
//! the headroom. The price is an over-correction of at most `N - 1` amps for
//! `N` chargers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::charger::Charger;
use crate::error::AllocatorError;
use crate::phase::{Amps, PerPhase, Phase};
use crate::state::{ChargerState, SessionTransition};

/// Registry of chargers sharing one site connection
#[derive(Debug, Default)]
pub struct PowerAllocator {
    chargers: HashMap<String, ChargerState>,
}

/// Snapshot of one participant taken at the start of an allocation pass
struct Participant {
    id: String,
    usage: PerPhase<Amps>,
    ceiling: PerPhase<Amps>,
    synced_phase_limits: bool,
}

impl PowerAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a charger without reading its state.
    ///
    /// Returns false and keeps the existing record when the id is taken.
    pub fn register(&mut self, charger: Arc<dyn Charger>) -> bool {
        let id = charger.id().to_string();
        if self.chargers.contains_key(&id) {
            debug!("Allocator: charger {} already registered", id);
            return false;
        }

        info!("Allocator: registered charger {}", id);
        self.chargers.insert(id, ChargerState::new(charger));
        true
    }

    /// Register a charger and try to read its current limit right away.
    ///
    /// A failed read leaves the charger registered but uninitialized; the
    /// next allocation pass retries.
    pub fn register_and_initialize(&mut self, charger: Arc<dyn Charger>) -> bool {
        let id = charger.id().to_string();
        if !self.register(charger) {
            return false;
        }

        if let Some(state) = self.chargers.get_mut(&id) {
            state.initialize();
        }
        true
    }

    /// Remove a charger from the registry
    pub fn unregister(&mut self, id: &str) -> bool {
        let removed = self.chargers.remove(id).is_some();
        if removed {
            info!("Allocator: unregistered charger {}", id);
        }
        removed
    }

    /// Whether any registered charger can currently take charge
    pub fn should_monitor(&self) -> bool {
        self.chargers.values().any(|s| s.charger().can_charge())
    }

    pub fn get(&self, id: &str) -> Option<&ChargerState> {
        self.chargers.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ChargerState> {
        self.chargers.get_mut(id)
    }

    /// Registered charger ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.chargers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.chargers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chargers.is_empty()
    }

    /// Compute new limits for every active charger.
    ///
    /// Only initialized chargers that can charge take part. Chargers that
    /// can charge but were never initialized get one initialization attempt
    /// first. The returned limits are stored as `last_calculated_current`;
    /// writing them to the devices is up to the caller.
    pub fn update_allocation(&mut self, available: PerPhase<Amps>) -> HashMap<String, PerPhase<Amps>> {
        let participants = self.collect_participants();
        if participants.is_empty() {
            return HashMap::new();
        }

        let mut candidates: Vec<PerPhase<Amps>> =
            participants.iter().map(|p| p.usage.zip_with(p.ceiling, clamp_to)).collect();

        for phase in Phase::ALL {
            let usages: Vec<Amps> = participants.iter().map(|p| p.usage[phase]).collect();
            let Some(shares) = proportional_shares(available[phase], &usages) else {
                debug!(
                    "Allocator: {} has no usage, {}A not distributable",
                    phase, available[phase]
                );
                continue;
            };

            for ((participant, candidate), share) in
                participants.iter().zip(candidates.iter_mut()).zip(shares)
            {
                let target = participant.usage[phase].saturating_add(share);
                candidate[phase] = clamp_to(target, participant.ceiling[phase]);
            }
        }

        let mut result = HashMap::with_capacity(participants.len());
        for (participant, candidate) in participants.into_iter().zip(candidates) {
            let limit = if participant.synced_phase_limits {
                candidate
            } else {
                PerPhase::uniform(candidate.min())
            };

            if let Some(state) = self.chargers.get_mut(&participant.id) {
                state.set_last_calculated_current(limit);
            }

            debug!(
                "Allocator: {} usage {} -> {}",
                participant.id, participant.usage, limit
            );
            result.insert(participant.id, limit);
        }

        result
    }

    /// Record the limit a charger confirmed it is now using
    pub fn update_applied_current(
        &mut self,
        id: &str,
        values: PerPhase<Amps>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), AllocatorError> {
        let state = self
            .chargers
            .get_mut(id)
            .ok_or_else(|| AllocatorError::UnknownCharger(id.to_string()))?;

        state.update_applied_current(values, timestamp);
        Ok(())
    }

    /// Run override / session detection for one charger
    pub fn detect_manual_override(&mut self, id: &str) -> Result<SessionTransition, AllocatorError> {
        let state = self
            .chargers
            .get_mut(id)
            .ok_or_else(|| AllocatorError::UnknownCharger(id.to_string()))?;

        Ok(state.detect_manual_override())
    }

    /// Run override / session detection for every charger, in id order
    pub fn detect_manual_overrides(&mut self) -> Vec<(String, SessionTransition)> {
        let mut transitions: Vec<(String, SessionTransition)> = self
            .chargers
            .iter_mut()
            .map(|(id, state)| (id.clone(), state.detect_manual_override()))
            .collect();
        transitions.sort_by(|a, b| a.0.cmp(&b.0));
        transitions
    }

    fn collect_participants(&mut self) -> Vec<Participant> {
        let mut ids: Vec<&String> = self.chargers.keys().collect();
        ids.sort();
        let ids: Vec<String> = ids.into_iter().cloned().collect();

        let mut participants = Vec::new();
        for id in ids {
            let Some(state) = self.chargers.get_mut(&id) else {
                continue;
            };

            let charger = state.charger().clone();
            if !charger.can_charge() {
                continue;
            }
            if !state.initialized() && !state.initialize() {
                continue;
            }

            let (Some(usage), Some(requested)) =
                (state.last_applied_current(), state.requested_current())
            else {
                continue;
            };

            let ceiling = match charger.get_max_current_limit() {
                Some(max) => requested.zip_with(max, Amps::min),
                None => requested,
            };

            participants.push(Participant {
                id,
                usage,
                ceiling,
                synced_phase_limits: charger.has_synced_phase_limits(),
            });
        }
        participants
    }
}

/// Clamp a target current into `[0, ceiling]`
fn clamp_to(target: Amps, ceiling: Amps) -> Amps {
    target.min(ceiling).max(0)
}

/// Floored proportional split of `delta` by `usages`.
///
/// Negative usages count as zero. Returns `None` when the total usage is
/// zero and the delta cannot be anchored to anything.
pub fn proportional_shares(delta: Amps, usages: &[Amps]) -> Option<Vec<Amps>> {
    let total: i64 = usages.iter().map(|&u| i64::from(u.max(0))).sum();
    if total <= 0 {
        return None;
    }

    Some(
        usages
            .iter()
            .map(|&usage| {
                let share = (i64::from(delta) * i64::from(usage.max(0))).div_euclid(total);
                share.clamp(i64::from(Amps::MIN), i64::from(Amps::MAX)) as Amps
            })
            .collect(),
    )
}
