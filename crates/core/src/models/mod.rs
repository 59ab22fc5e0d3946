//! Mutable simulation state.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;

/// Runtime state of a single production unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    /// Purchased levels; never decreases.
    pub level: u32,
    /// Whether a cycle is in progress.
    pub running: bool,
    /// Seconds left in the current cycle.
    pub time_remaining: f64,
    /// Currency paid out by this unit over the life of the save.
    pub total_earned: f64,
}

impl UnitState {
    /// Where the unit sits in its lifecycle.
    pub fn phase(&self) -> UnitPhase {
        if self.level == 0 {
            UnitPhase::Idle
        } else if self.running {
            UnitPhase::Counting
        } else {
            UnitPhase::Armed
        }
    }
}

/// Lifecycle position of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitPhase {
    /// Not yet purchased.
    Idle,
    /// Owned and waiting for a start.
    Armed,
    /// A cycle is counting down.
    Counting,
}

/// Aggregate state persisted as one blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Unit id to state. Contains every catalog unit.
    pub units: BTreeMap<String, UnitState>,
    /// Ids of hired overseers.
    pub overseers: BTreeSet<String>,
}

impl SimulationState {
    /// Fresh state: every catalog unit idle, no overseers.
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            units: catalog
                .units()
                .iter()
                .map(|unit| (unit.id.clone(), UnitState::default()))
                .collect(),
            overseers: BTreeSet::new(),
        }
    }

    /// State of the given unit.
    pub fn unit(&self, id: &str) -> Option<&UnitState> {
        self.units.get(id)
    }

    /// Whether the overseer has been hired.
    pub fn owns(&self, overseer_id: &str) -> bool {
        self.overseers.contains(overseer_id)
    }

    /// Level of a unit, zero when unknown.
    pub fn level_of(&self, id: &str) -> u32 {
        self.units.get(id).map(|unit| unit.level).unwrap_or(0)
    }
}
