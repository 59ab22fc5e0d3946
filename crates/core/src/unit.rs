//! Per-unit leveling, timer progression and payout rules.
//!
//! These functions only touch a single [`UnitState`]; moving currency is the
//! caller's job (see [`crate::engine::Engine`]).

use serde::{Deserialize, Serialize};

use crate::{
    catalog::UnitDefinition,
    error::{EngineError, EngineResult},
    models::{SimulationState, UnitState},
};

/// Default lower bound for a cycle, in seconds.
pub const DEFAULT_MIN_CYCLE_SECONDS: f64 = 0.05;

/// Slack used when comparing timers, so `10 × C` of elapsed time yields
/// exactly ten cycles despite rounding.
const TIMER_EPSILON: f64 = 1e-9;

/// Engine-wide timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    /// Floor applied to every cycle length.
    pub min_cycle_seconds: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            min_cycle_seconds: DEFAULT_MIN_CYCLE_SECONDS,
        }
    }
}

/// Outcome of advancing a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Advance {
    /// Completed cycles.
    pub cycles: u64,
    /// Currency earned by those cycles.
    pub earned: f64,
}

impl Advance {
    /// True when nothing paid out.
    pub fn is_empty(&self) -> bool {
        self.cycles == 0
    }
}

/// Price of buying the level after `level`: `base_cost × multiplier^level`.
pub fn level_cost(unit: &UnitDefinition, level: u32) -> f64 {
    unit.base_cost * unit.cost_multiplier.powf(f64::from(level))
}

/// Price of buying `count` consecutive levels starting at `level`.
pub fn bulk_cost(unit: &UnitDefinition, level: u32, count: u32) -> f64 {
    match count {
        0 => return 0.0,
        1 => return level_cost(unit, level),
        _ => {}
    }
    let first = level_cost(unit, level);
    let mul = unit.cost_multiplier;
    first * (mul.powf(f64::from(count)) - 1.0) / (mul - 1.0)
}

/// Cycle length at `level`: `base / multiplier^level`, floored at the tuning minimum.
///
/// Level 0 reports the base cycle.
pub fn cycle_time(unit: &UnitDefinition, level: u32, tuning: &Tuning) -> f64 {
    let raw = if level == 0 {
        unit.base_cycle_seconds
    } else {
        unit.base_cycle_seconds / unit.cost_multiplier.powf(f64::from(level))
    };
    raw.max(tuning.min_cycle_seconds)
}

/// Currency produced by one completed cycle.
pub fn payout_per_cycle(unit: &UnitDefinition, level: u32) -> f64 {
    f64::from(level) * unit.base_income
}

/// Whether the unit's unlock requirement is met.
pub fn is_unlocked(unit: &UnitDefinition, state: &SimulationState) -> bool {
    check_unlocked(unit, state).is_ok()
}

/// Fails with [`EngineError::Locked`] when the unlock requirement is not met.
pub fn check_unlocked(unit: &UnitDefinition, state: &SimulationState) -> EngineResult<()> {
    match &unit.requires {
        Some(requirement) if state.level_of(&requirement.unit_id) < requirement.level => {
            Err(EngineError::Locked {
                unit: unit.id.clone(),
                requires: requirement.unit_id.clone(),
                level: requirement.level,
            })
        }
        _ => Ok(()),
    }
}

/// Add purchased levels. Timers are left alone.
pub fn apply_purchase(state: &mut UnitState, count: u32) {
    state.level = state.level.saturating_add(count);
}

/// Start a cycle by hand. Returns `false` (and changes nothing) unless the
/// unit is owned and idle.
pub fn start_manual(unit: &UnitDefinition, state: &mut UnitState, tuning: &Tuning) -> bool {
    if state.level == 0 || state.running {
        return false;
    }
    state.running = true;
    state.time_remaining = cycle_time(unit, state.level, tuning);
    true
}

/// Move the unit's timer forward by `elapsed` seconds.
///
/// Automated units start themselves and are credited every whole cycle that
/// fits in `elapsed`. Manual units pay out at most once and then stop.
pub fn advance(
    unit: &UnitDefinition,
    state: &mut UnitState,
    automated: bool,
    elapsed: f64,
    tuning: &Tuning,
) -> Advance {
    let elapsed = if elapsed.is_finite() && elapsed > 0.0 {
        elapsed
    } else {
        0.0
    };

    if state.level == 0 {
        state.running = false;
        state.time_remaining = 0.0;
        return Advance::default();
    }

    let cycle = cycle_time(unit, state.level, tuning);
    if !state.running {
        if !automated {
            return Advance::default();
        }
        state.running = true;
        state.time_remaining = cycle;
    }

    let remaining = if state.time_remaining.is_finite() {
        state.time_remaining.max(0.0)
    } else {
        0.0
    };
    if remaining - elapsed > TIMER_EPSILON {
        state.time_remaining = remaining - elapsed;
        return Advance::default();
    }

    let cycles = if automated {
        let overflow = (elapsed - remaining).max(0.0);
        let extra = (overflow / cycle + TIMER_EPSILON).floor();
        let residual = (overflow - extra * cycle).max(0.0);
        let left = cycle - residual;
        state.time_remaining = if left > TIMER_EPSILON { left } else { cycle };
        1 + extra as u64
    } else {
        state.running = false;
        state.time_remaining = 0.0;
        1
    };

    let earned = payout_per_cycle(unit, state.level) * cycles as f64;
    state.total_earned += earned;
    Advance { cycles, earned }
}
