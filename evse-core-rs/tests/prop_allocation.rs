//! Property tests for the allocator
//!
//! Tests invariants for:
//! - Flooring: never under-corrects overcurrent, never over-grants headroom
//! - Single charger: exact clamp of usage + delta
//! - Uniform chargers: same value on every phase, equal to the minimum
//! - Registry: duplicate registration, should_monitor

use std::ops::RangeInclusive;
use std::sync::Arc;

use evse_core::allocator::proportional_shares;
use evse_core::*;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn usage() -> RangeInclusive<Amps> {
    0..=32
}

fn nonzero_usage() -> RangeInclusive<Amps> {
    1..=32
}

fn delta() -> RangeInclusive<Amps> {
    -64..=64
}

fn per_phase<S: Strategy<Value = Amps> + Clone>(s: S) -> impl Strategy<Value = PerPhase<Amps>> {
    (s.clone(), s.clone(), s).prop_map(|(l1, l2, l3)| PerPhase::new(l1, l2, l3))
}

/// Allocator with one initialized, charging device
fn single_charger(
    usage: PerPhase<Amps>,
    requested: Amps,
    max: Amps,
    synced: bool,
) -> PowerAllocator {
    let charger = SimulatedCharger::new("charger1", 0, max).with_synced_phase_limits(synced);
    charger.set_current_limits(usage);

    let mut allocator = PowerAllocator::new();
    allocator.register_and_initialize(Arc::new(charger));
    allocator
        .get_mut("charger1")
        .unwrap()
        .set_requested_current(PerPhase::uniform(requested));
    allocator
}

// ============================================================================
// Flooring Property Tests
// ============================================================================

proptest! {
    /// CORE INVARIANT: cuts are never smaller than the overcurrent
    #[test]
    fn overcurrent_never_under_corrected(
        u1 in nonzero_usage(),
        u2 in nonzero_usage(),
        a in -64..=-1i32
    ) {
        let shares = proportional_shares(a, &[u1, u2]).unwrap();
        let total: i32 = shares.iter().sum();

        prop_assert!(total <= a, "shares {:?} sum {} smaller cut than {}", shares, total, a);
        // Over-correction bounded by N - 1
        prop_assert!(total >= a - 1, "shares {:?} over-corrected {}", shares, a);
    }

    /// CORE INVARIANT: raises never exceed the headroom
    #[test]
    fn headroom_never_over_granted(
        u1 in nonzero_usage(),
        u2 in nonzero_usage(),
        a in 1..=64i32
    ) {
        let shares = proportional_shares(a, &[u1, u2]).unwrap();
        let total: i32 = shares.iter().sum();

        prop_assert!(total <= a, "shares {:?} sum {} exceeds {}", shares, total, a);
        prop_assert!(total >= 0);
    }

    /// Zero total usage is not distributable
    #[test]
    fn zero_usage_not_distributable(a in delta(), n in 1usize..5) {
        prop_assert!(proportional_shares(a, &vec![0; n]).is_none());
    }
}

// ============================================================================
// Single Charger Property Tests
// ============================================================================

proptest! {
    /// One participant gets exactly clamp(u + a, 0, min(requested, max))
    #[test]
    fn single_charger_exact_clamp(
        u in per_phase(usage()),
        a in per_phase(delta()),
        requested in 0..=32i32,
        max in 1..=32i32
    ) {
        let mut allocator = single_charger(u, requested, max, true);
        let result = allocator.update_allocation(a);
        let limit = result["charger1"];

        for phase in Phase::ALL {
            let expected = if u[phase] == 0 {
                // Phase skipped, usage kept
                u[phase].clamp(0, requested.min(max))
            } else {
                (u[phase] + a[phase]).clamp(0, requested.min(max))
            };
            prop_assert_eq!(limit[phase], expected, "phase {}", phase);
        }
    }

    /// Uniform chargers get the minimum of the per-phase candidates
    #[test]
    fn uniform_charger_takes_minimum(
        u in per_phase(nonzero_usage()),
        a in per_phase(delta()),
        requested in 0..=32i32,
        max in 1..=32i32
    ) {
        let mut independent = single_charger(u, requested, max, true);
        let mut uniform = single_charger(u, requested, max, false);

        let candidates = independent.update_allocation(a)["charger1"];
        let limit = uniform.update_allocation(a)["charger1"];

        prop_assert!(limit.is_uniform());
        prop_assert_eq!(limit, PerPhase::uniform(candidates.min()));
    }

    /// Allocation never produces a negative current or exceeds the ceiling
    #[test]
    fn limits_within_bounds(
        usages in prop::collection::vec(per_phase(usage()), 1..5),
        a in per_phase(delta()),
        max in 1..=32i32
    ) {
        let mut allocator = PowerAllocator::new();
        for (i, u) in usages.iter().enumerate() {
            let charger = SimulatedCharger::new(format!("charger{}", i), 0, max)
                .with_synced_phase_limits(i % 2 == 0);
            charger.set_current_limits(*u);
            allocator.register_and_initialize(Arc::new(charger));
        }

        let result = allocator.update_allocation(a);
        prop_assert_eq!(result.len(), usages.len());

        for (i, u) in usages.iter().enumerate() {
            let limit = result[&format!("charger{}", i)];
            for phase in Phase::ALL {
                prop_assert!(limit[phase] >= 0);
                // Requested is the initial limit, so nothing is raised above it
                prop_assert!(limit[phase] <= u[phase].min(max));
            }
        }
    }
}

// ============================================================================
// Registry Property Tests
// ============================================================================

proptest! {
    /// should_monitor is true iff some charger can charge
    #[test]
    fn should_monitor_iff_any_can_charge(flags in prop::collection::vec(any::<bool>(), 0..6)) {
        let mut allocator = PowerAllocator::new();
        for (i, can_charge) in flags.iter().enumerate() {
            let charger = SimulatedCharger::new(format!("charger{}", i), 10, 16);
            charger.set_can_charge(*can_charge);
            allocator.register_and_initialize(Arc::new(charger));
        }

        prop_assert_eq!(allocator.should_monitor(), flags.iter().any(|f| *f));
    }

    /// A second registration with the same id never replaces the first
    #[test]
    fn duplicate_registration_keeps_first(first in 0..=16i32, second in 0..=16i32) {
        let mut allocator = PowerAllocator::new();
        prop_assert!(allocator.register_and_initialize(Arc::new(SimulatedCharger::new("dup", first, 16))));
        prop_assert!(!allocator.register_and_initialize(Arc::new(SimulatedCharger::new("dup", second, 16))));

        let state = allocator.get("dup").unwrap();
        prop_assert_eq!(state.last_applied_current(), Some(PerPhase::uniform(first)));
        prop_assert_eq!(allocator.len(), 1);
    }
}
