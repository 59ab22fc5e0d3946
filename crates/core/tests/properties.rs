//! Property-based tests for the simulation core.
//!
//! Random action sequences and random save blobs are thrown at the engine and
//! the reconciler, then structural invariants are checked.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};
use tycoon_core::{
    catalog::{Catalog, OverseerDefinition, UnitDefinition},
    engine::{Engine, EngineOptions},
    models::UnitState,
    save::reconcile,
    store::MemoryStore,
    unit::{self, Tuning},
    wallet::MemoryWallet,
};

// ===========================================================================
// Fixtures
// ===========================================================================

fn catalog() -> Catalog {
    Catalog::new(
        vec![
            UnitDefinition::new("a", 25.0, 1.07, 4.0, 1.2).with_overseer("m"),
            UnitDefinition::new("b", 120.0, 1.08, 12.0, 1.6).with_overseer("n"),
        ],
        vec![
            OverseerDefinition::new("m", 500.0, "a"),
            OverseerDefinition::new("n", 2_000.0, "b"),
        ],
    )
    .expect("valid catalog")
}

fn engine(balance: f64) -> Engine {
    Engine::open(
        Arc::new(catalog()),
        Arc::new(MemoryWallet::new(balance)),
        Arc::new(MemoryStore::new()),
        EngineOptions::default(),
    )
}

fn relative_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

// ===========================================================================
// Generators
// ===========================================================================

#[derive(Debug, Clone)]
enum Action {
    Buy(usize, u32),
    Start(usize),
    Hire(usize),
    Advance(f64),
}

fn arb_actions(max_ops: usize) -> impl Strategy<Value = Vec<Action>> {
    proptest::collection::vec(
        prop_oneof![
            (0..2usize, 1..5u32).prop_map(|(unit, count)| Action::Buy(unit, count)),
            (0..2usize).prop_map(Action::Start),
            (0..2usize).prop_map(Action::Hire),
            (0.0..30.0f64).prop_map(Action::Advance),
        ],
        1..=max_ops,
    )
}

/// Stored unit entries in every shape a save might hold, sane or not.
fn arb_unit_entry() -> impl Strategy<Value = Value> {
    let number = prop_oneof![
        (0.0..500.0f64).prop_map(|n| json!(n)),
        (0u32..500).prop_map(|n| json!(n)),
        (-50.0..0.0f64).prop_map(|n| json!(n)),
        "[a-z0-9.]{0,6}".prop_map(|s| json!(s)),
        Just(Value::Null),
    ]
    .boxed();
    (
        number.clone(),
        any::<bool>(),
        number.clone(),
        number,
        any::<bool>(),
    )
        .prop_map(|(level, running, time, earned, legacy)| {
            if legacy {
                json!({ "lvl": level, "running": running, "timeLeft": time, "total": earned })
            } else {
                json!({ "level": level, "running": running, "time_remaining": time, "total_earned": earned })
            }
        })
}

fn arb_blob() -> impl Strategy<Value = Value> {
    (
        proptest::option::of(arb_unit_entry()),
        proptest::option::of(arb_unit_entry()),
        proptest::option::of(arb_unit_entry()),
        proptest::collection::vec(prop_oneof![Just("m"), Just("n"), Just("ghost")], 0..3),
    )
        .prop_map(|(a, b, stale, overseers)| {
            let mut units = serde_json::Map::new();
            if let Some(entry) = a {
                units.insert("a".to_string(), entry);
            }
            if let Some(entry) = b {
                units.insert("b".to_string(), entry);
            }
            if let Some(entry) = stale {
                units.insert("retired".to_string(), entry);
            }
            json!({ "state": { "units": units, "overseers": overseers } })
        })
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn levels_never_decrease_and_balance_stays_non_negative(
        balance in 0.0..5_000.0f64,
        actions in arb_actions(40),
    ) {
        let engine = engine(balance);
        let ids = ["a", "b"];
        let overseers = ["m", "n"];
        let mut levels = [0u32; 2];

        for action in actions {
            match action {
                Action::Buy(unit, count) => { let _ = engine.purchase_levels(ids[unit], count); }
                Action::Start(unit) => { let _ = engine.start_manual(ids[unit]); }
                Action::Hire(overseer) => { let _ = engine.hire(overseers[overseer]); }
                Action::Advance(elapsed) => { engine.advance(elapsed); }
            }
            prop_assert!(engine.balance() >= 0.0);
            for (slot, id) in ids.iter().enumerate() {
                let level = engine.unit_state(id).map(|s| s.level).unwrap_or(0);
                prop_assert!(level >= levels[slot]);
                levels[slot] = level;
            }
        }
    }

    #[test]
    fn purchases_debit_the_geometric_price(purchases in 1usize..40) {
        let engine = engine(1e6);
        let unit = catalog().unit("a").cloned().expect("unit a");
        for level in 0..purchases {
            let before = engine.balance();
            let purchase = engine.purchase_level("a").expect("affordable");
            let expected = unit.base_cost * unit.cost_multiplier.powi(level as i32);
            prop_assert!(relative_eq(purchase.cost, expected));
            prop_assert!(relative_eq(before - engine.balance(), expected));
        }
    }

    #[test]
    fn bulk_price_equals_sum_of_single_prices(level in 0u32..200, count in 0u32..50) {
        let unit = UnitDefinition::new("x", 10.0, 1.09, 1.0, 1.0);
        let summed: f64 = (level..level + count).map(|l| unit::level_cost(&unit, l)).sum();
        prop_assert!(relative_eq(unit::bulk_cost(&unit, level, count), summed));
    }

    #[test]
    fn reconciliation_is_idempotent(blob in arb_blob()) {
        let catalog = catalog();
        let (first, _) = reconcile(&blob, &catalog);
        prop_assert_eq!(first.units.len(), catalog.units().len());

        let stored = json!({ "version": 1, "state": &first });
        let (second, report) = reconcile(&stored, &catalog);
        prop_assert_eq!(&second, &first);
        prop_assert!(report.is_clean(), "second pass not clean: {:?}", report);
    }

    #[test]
    fn automated_catch_up_pays_every_whole_cycle(
        level in 1u32..60,
        whole in 0u64..200,
        fraction in 0.01..0.99f64,
    ) {
        let unit = UnitDefinition::new("a", 25.0, 1.07, 4.0, 1.2);
        let tuning = Tuning::default();
        let cycle = unit::cycle_time(&unit, level, &tuning);
        let elapsed = (whole as f64 + fraction) * cycle;
        let mut state = UnitState { level, ..UnitState::default() };

        let outcome = unit::advance(&unit, &mut state, true, elapsed, &tuning);
        prop_assert_eq!(outcome.cycles, whole);
        prop_assert!(relative_eq(outcome.earned, whole as f64 * f64::from(level) * 4.0));
        prop_assert!(state.running);
        prop_assert!((state.time_remaining - (cycle - elapsed % cycle)).abs() < 1e-6);
    }

    #[test]
    fn manual_units_pay_at_most_once(level in 1u32..60, cycles in 1.0..500.0f64, started: bool) {
        let unit = UnitDefinition::new("a", 25.0, 1.07, 4.0, 1.2);
        let tuning = Tuning::default();
        let mut state = UnitState { level, ..UnitState::default() };
        if started {
            unit::start_manual(&unit, &mut state, &tuning);
        }
        let elapsed = cycles * unit::cycle_time(&unit, level, &tuning);

        let outcome = unit::advance(&unit, &mut state, false, elapsed, &tuning);
        prop_assert_eq!(outcome.cycles, u64::from(started));
        prop_assert!(!state.running);
    }
}
