//! Read-only projections of the simulation state for presentation.
//!
//! Nothing here is persisted; everything is recomputed on demand.

use serde::Serialize;

use crate::{
    catalog::{Catalog, UnitDefinition},
    models::{SimulationState, UnitPhase, UnitState},
    unit::{self, Tuning},
};

/// Price of the next level.
pub fn next_level_cost(unit: &UnitDefinition, state: &UnitState) -> f64 {
    unit::level_cost(unit, state.level)
}

/// Price of the next `count` levels.
pub fn bulk_cost(unit: &UnitDefinition, state: &UnitState, count: u32) -> f64 {
    unit::bulk_cost(unit, state.level, count)
}

/// Cycle length at the unit's current level.
pub fn current_cycle_seconds(unit: &UnitDefinition, state: &UnitState, tuning: &Tuning) -> f64 {
    unit::cycle_time(unit, state.level, tuning)
}

/// Steady-state income of a continuously running unit.
pub fn income_per_second(unit: &UnitDefinition, state: &UnitState, tuning: &Tuning) -> f64 {
    if state.level == 0 {
        return 0.0;
    }
    unit::payout_per_cycle(unit, state.level) / unit::cycle_time(unit, state.level, tuning)
}

/// Sum of [`income_per_second`] over every unit.
pub fn total_income_per_second(catalog: &Catalog, state: &SimulationState, tuning: &Tuning) -> f64 {
    catalog
        .units()
        .iter()
        .filter_map(|unit| {
            state
                .unit(&unit.id)
                .map(|unit_state| income_per_second(unit, unit_state, tuning))
        })
        .sum()
}

/// Per-unit view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitMetrics {
    /// Unit id.
    pub unit_id: String,
    /// Display name.
    pub name: String,
    /// Current level.
    pub level: u32,
    /// Lifecycle position.
    pub phase: UnitPhase,
    /// Whether the unlock requirement is met.
    pub unlocked: bool,
    /// Whether the unit's overseer is hired.
    pub automated: bool,
    /// Price of the next level.
    pub next_level_cost: f64,
    /// Cycle length at the current level.
    pub cycle_seconds: f64,
    /// Seconds left in the running cycle.
    pub time_remaining: f64,
    /// Fraction of the running cycle already elapsed.
    pub progress: f64,
    /// Steady-state income.
    pub income_per_second: f64,
    /// Lifetime payouts.
    pub total_earned: f64,
}

/// The first unit still locked, with what it takes to open it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextUnlock {
    /// Locked unit.
    pub unit_id: String,
    /// Unit that has to be levelled.
    pub requires: String,
    /// Level it has to reach.
    pub required_level: u32,
    /// Level it has now.
    pub current_level: u32,
    /// Levels still missing.
    pub missing_levels: u32,
    /// Price of buying the missing levels in one go.
    pub estimated_cost: f64,
}

/// First locked unit in catalog order.
pub fn next_unlock(catalog: &Catalog, state: &SimulationState) -> Option<NextUnlock> {
    catalog.units().iter().find_map(|unit| {
        let requirement = unit.requires.as_ref()?;
        let current_level = state.level_of(&requirement.unit_id);
        if current_level >= requirement.level {
            return None;
        }
        let required = catalog.unit(&requirement.unit_id)?;
        let missing_levels = requirement.level - current_level;
        Some(NextUnlock {
            unit_id: unit.id.clone(),
            requires: requirement.unit_id.clone(),
            required_level: requirement.level,
            current_level,
            missing_levels,
            estimated_cost: unit::bulk_cost(required, current_level, missing_levels).ceil(),
        })
    })
}

/// Everything a front-end needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Wallet balance at capture time.
    pub balance: f64,
    /// Units in catalog order.
    pub units: Vec<UnitMetrics>,
    /// Sum of per-unit income.
    pub total_income_per_second: f64,
    /// First locked unit, if any.
    pub next_unlock: Option<NextUnlock>,
}

impl MetricsSnapshot {
    /// Compute every projection from the given state.
    pub fn capture(catalog: &Catalog, state: &SimulationState, balance: f64, tuning: &Tuning) -> Self {
        let default_state = UnitState::default();
        let units = catalog
            .units()
            .iter()
            .map(|unit| {
                let unit_state = state.unit(&unit.id).unwrap_or(&default_state);
                let cycle_seconds = current_cycle_seconds(unit, unit_state, tuning);
                let progress = if unit_state.running {
                    (1.0 - unit_state.time_remaining / cycle_seconds).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                UnitMetrics {
                    unit_id: unit.id.clone(),
                    name: unit.name.clone(),
                    level: unit_state.level,
                    phase: unit_state.phase(),
                    unlocked: unit::is_unlocked(unit, state),
                    automated: catalog
                        .overseer_for(unit)
                        .map(|overseer| state.owns(&overseer.id))
                        .unwrap_or(false),
                    next_level_cost: next_level_cost(unit, unit_state),
                    cycle_seconds,
                    time_remaining: unit_state.time_remaining,
                    progress,
                    income_per_second: income_per_second(unit, unit_state, tuning),
                    total_earned: unit_state.total_earned,
                }
            })
            .collect();

        Self {
            balance,
            units,
            total_income_per_second: total_income_per_second(catalog, state, tuning),
            next_unlock: next_unlock(catalog, state),
        }
    }

    /// Metrics of one unit.
    pub fn unit(&self, unit_id: &str) -> Option<&UnitMetrics> {
        self.units.iter().find(|unit| unit.unit_id == unit_id)
    }
}

/// Compact currency label: `950`, `12.3k`, `4.5m`, `1.2b`.
pub fn format_amount(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    if value < 1_000.0 {
        format!("{value:.0}")
    } else if value < 1_000_000.0 {
        format!("{:.1}k", value / 1_000.0)
    } else if value < 1_000_000_000.0 {
        format!("{:.1}m", value / 1_000_000.0)
    } else {
        format!("{:.1}b", value / 1_000_000_000.0)
    }
}

/// Countdown label: `4.2s` under a minute, `m:ss` above.
pub fn format_seconds(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else {
        let whole = seconds.floor() as u64;
        format!("{}:{:02}", whole / 60, whole % 60)
    }
}
