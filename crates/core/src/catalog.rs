//! Immutable definitions of production units and overseers.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Level another unit must reach before a unit can be bought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockRequirement {
    /// Unit that has to be levelled.
    pub unit_id: String,
    /// Minimum level of that unit.
    pub level: u32,
}

/// A purchasable production unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDefinition {
    /// Stable identifier, also the key in persisted state.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Price of the first level.
    pub base_cost: f64,
    /// Price growth per level; also speeds up the cycle. Must be > 1.
    pub cost_multiplier: f64,
    /// Payout per level per cycle.
    pub base_income: f64,
    /// Cycle length before any level speed-up. Must be > 0.
    pub base_cycle_seconds: f64,
    /// Overseer that automates this unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overseer_id: Option<String>,
    /// Unlock requirement, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<UnlockRequirement>,
}

impl UnitDefinition {
    /// Definition without overseer or unlock requirement.
    pub fn new(
        id: impl Into<String>,
        base_cost: f64,
        cost_multiplier: f64,
        base_income: f64,
        base_cycle_seconds: f64,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            base_cost,
            cost_multiplier,
            base_income,
            base_cycle_seconds,
            overseer_id: None,
            requires: None,
        }
    }

    /// Set the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Link the overseer that automates this unit.
    pub fn with_overseer(mut self, overseer_id: impl Into<String>) -> Self {
        self.overseer_id = Some(overseer_id.into());
        self
    }

    /// Require `unit_id` to reach `level` before this unit can be bought.
    pub fn requiring(mut self, unit_id: impl Into<String>, level: u32) -> Self {
        self.requires = Some(UnlockRequirement {
            unit_id: unit_id.into(),
            level,
        });
        self
    }
}

/// A one-time hire that keeps a unit's cycle running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverseerDefinition {
    /// Stable identifier, also the key in persisted state.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Hiring price.
    pub price: f64,
    /// Unit whose cycle this overseer restarts.
    pub automates_unit_id: String,
}

impl OverseerDefinition {
    /// Overseer automating `automates_unit_id`.
    pub fn new(id: impl Into<String>, price: f64, automates_unit_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            price,
            automates_unit_id: automates_unit_id.into(),
        }
    }

    /// Set the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// On-disk shape of a catalog file.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    units: Vec<UnitDefinition>,
    #[serde(default)]
    overseers: Vec<OverseerDefinition>,
}

/// Validated, ordered set of unit and overseer definitions.
///
/// Catalog order is the order units are advanced in every tick.
#[derive(Debug, Clone)]
pub struct Catalog {
    units: Vec<UnitDefinition>,
    overseers: Vec<OverseerDefinition>,
    unit_index: HashMap<String, usize>,
    overseer_index: HashMap<String, usize>,
}

impl Catalog {
    /// Validate the definitions and build the catalog.
    pub fn new(
        units: Vec<UnitDefinition>,
        overseers: Vec<OverseerDefinition>,
    ) -> Result<Self, CatalogError> {
        let unit_index = index_ids("unit", units.iter().map(|unit| unit.id.as_str()))?;
        let overseer_index =
            index_ids("overseer", overseers.iter().map(|overseer| overseer.id.as_str()))?;

        for unit in &units {
            validate_unit(unit)?;
            if let Some(overseer_id) = &unit.overseer_id {
                let linked = overseer_index
                    .get(overseer_id)
                    .map(|&idx| &overseers[idx])
                    .ok_or_else(|| CatalogError::BrokenLink {
                        kind: "unit",
                        id: unit.id.clone(),
                        target: overseer_id.clone(),
                        reason: "overseer does not exist",
                    })?;
                if linked.automates_unit_id != unit.id {
                    return Err(CatalogError::BrokenLink {
                        kind: "unit",
                        id: unit.id.clone(),
                        target: overseer_id.clone(),
                        reason: "overseer automates a different unit",
                    });
                }
            }
            if let Some(requirement) = &unit.requires {
                if requirement.unit_id == unit.id {
                    return Err(CatalogError::BrokenLink {
                        kind: "unit",
                        id: unit.id.clone(),
                        target: requirement.unit_id.clone(),
                        reason: "unit cannot require itself",
                    });
                }
                if !unit_index.contains_key(&requirement.unit_id) {
                    return Err(CatalogError::BrokenLink {
                        kind: "unit",
                        id: unit.id.clone(),
                        target: requirement.unit_id.clone(),
                        reason: "required unit does not exist",
                    });
                }
            }
        }

        for overseer in &overseers {
            if !overseer.price.is_finite() || overseer.price < 0.0 {
                return Err(CatalogError::InvalidValue {
                    kind: "overseer",
                    id: overseer.id.clone(),
                    field: "price",
                    value: overseer.price,
                    reason: "must be finite and >= 0",
                });
            }
            let target = unit_index
                .get(&overseer.automates_unit_id)
                .map(|&idx| &units[idx])
                .ok_or_else(|| CatalogError::BrokenLink {
                    kind: "overseer",
                    id: overseer.id.clone(),
                    target: overseer.automates_unit_id.clone(),
                    reason: "unit does not exist",
                })?;
            if target.overseer_id.as_deref() != Some(overseer.id.as_str()) {
                return Err(CatalogError::BrokenLink {
                    kind: "overseer",
                    id: overseer.id.clone(),
                    target: overseer.automates_unit_id.clone(),
                    reason: "unit does not list this overseer",
                });
            }
        }

        Ok(Self {
            units,
            overseers,
            unit_index,
            overseer_index,
        })
    }

    /// Parse and validate a JSON catalog document.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: CatalogFile =
            serde_json::from_str(content).context("failed to parse catalog")?;
        let catalog = Self::new(file.units, file.overseers)?;
        Ok(catalog)
    }

    /// Load a JSON catalog from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("invalid catalog {}", path.display()))
    }

    /// The built-in ten-business catalog.
    pub fn standard() -> Result<Self, CatalogError> {
        const UNITS: &[(&str, &str, f64, f64, f64, f64, &str, &str)] = &[
            ("chai", "Chai Tapri", 25.0, 1.07, 4.0, 1.2, "zolly", ""),
            ("kirana", "Kirana Grocery", 120.0, 1.08, 12.0, 1.6, "guddu", "chai"),
            ("auto", "Auto-Rickshaw Fleet", 480.0, 1.09, 40.0, 2.0, "arjun", "kirana"),
            ("dosa", "Dosa Cart", 1_600.0, 1.10, 120.0, 2.2, "shreya", "auto"),
            ("dairy", "Dairy Farm", 4_500.0, 1.11, 320.0, 2.6, "paaji", "dosa"),
            ("cowork", "Co-Working Hub", 10_000.0, 1.12, 820.0, 3.0, "suraj", "dairy"),
            ("solar", "Solar Park", 24_000.0, 1.12, 1_800.0, 3.4, "sangeeta", "cowork"),
            ("bollywood", "Bollywood Studio", 55_000.0, 1.13, 3_900.0, 3.8, "dev", "solar"),
            ("metro", "Inter-City Metro", 120_000.0, 1.14, 8_500.0, 4.2, "meena", "bollywood"),
            ("space", "Space-Tech Launchpad", 260_000.0, 1.15, 18_000.0, 5.0, "kapoor", "metro"),
        ];
        const OVERSEERS: &[(&str, &str, f64)] = &[
            ("zolly", "Zolly Chaiwala", 1_000.0),
            ("guddu", "Guddu Grocer", 3_500.0),
            ("arjun", "Auto Arjun", 8_000.0),
            ("shreya", "Chef Shreya", 16_000.0),
            ("paaji", "Paaji Parminder", 28_000.0),
            ("suraj", "Startup Suraj", 45_000.0),
            ("sangeeta", "Sunny Sangeeta", 75_000.0),
            ("dev", "Director Dev", 120_000.0),
            ("meena", "Metro Meena", 180_000.0),
            ("kapoor", "Commander Kapoor", 260_000.0),
        ];
        const UNLOCK_LEVEL: u32 = 20;

        let units = UNITS
            .iter()
            .map(|&(id, name, cost, mul, income, cycle, overseer, requires)| {
                let unit = UnitDefinition::new(id, cost, mul, income, cycle)
                    .named(name)
                    .with_overseer(overseer);
                if requires.is_empty() {
                    unit
                } else {
                    unit.requiring(requires, UNLOCK_LEVEL)
                }
            })
            .collect();
        let overseers = OVERSEERS
            .iter()
            .zip(UNITS)
            .map(|(&(id, name, price), unit)| OverseerDefinition::new(id, price, unit.0).named(name))
            .collect();
        Self::new(units, overseers)
    }

    /// Units in catalog order.
    pub fn units(&self) -> &[UnitDefinition] {
        &self.units
    }

    /// Overseers in catalog order.
    pub fn overseers(&self) -> &[OverseerDefinition] {
        &self.overseers
    }

    /// Look up a unit by id.
    pub fn unit(&self, id: &str) -> Option<&UnitDefinition> {
        self.unit_index.get(id).map(|&idx| &self.units[idx])
    }

    /// Look up an overseer by id.
    pub fn overseer(&self, id: &str) -> Option<&OverseerDefinition> {
        self.overseer_index.get(id).map(|&idx| &self.overseers[idx])
    }

    /// Overseer automating the given unit, if the catalog defines one.
    pub fn overseer_for(&self, unit: &UnitDefinition) -> Option<&OverseerDefinition> {
        unit.overseer_id.as_deref().and_then(|id| self.overseer(id))
    }

    /// Whether `id` names a unit.
    pub fn contains_unit(&self, id: &str) -> bool {
        self.unit_index.contains_key(id)
    }

    /// Whether `id` names an overseer.
    pub fn contains_overseer(&self, id: &str) -> bool {
        self.overseer_index.contains_key(id)
    }
}

fn index_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, usize>, CatalogError> {
    let mut seen = HashSet::new();
    let mut index = HashMap::new();
    for (position, id) in ids.enumerate() {
        if id.trim().is_empty() {
            return Err(CatalogError::EmptyId { kind });
        }
        if !seen.insert(id) {
            return Err(CatalogError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
        index.insert(id.to_string(), position);
    }
    Ok(index)
}

fn validate_unit(unit: &UnitDefinition) -> Result<(), CatalogError> {
    let invalid = |field: &'static str, value: f64, reason: &'static str| {
        Err(CatalogError::InvalidValue {
            kind: "unit",
            id: unit.id.clone(),
            field,
            value,
            reason,
        })
    };
    if !unit.base_cost.is_finite() || unit.base_cost < 0.0 {
        return invalid("base_cost", unit.base_cost, "must be finite and >= 0");
    }
    if !unit.cost_multiplier.is_finite() || unit.cost_multiplier <= 1.0 {
        return invalid("cost_multiplier", unit.cost_multiplier, "must be finite and > 1");
    }
    if !unit.base_income.is_finite() || unit.base_income < 0.0 {
        return invalid("base_income", unit.base_income, "must be finite and >= 0");
    }
    if !unit.base_cycle_seconds.is_finite() || unit.base_cycle_seconds <= 0.0 {
        return invalid("base_cycle_seconds", unit.base_cycle_seconds, "must be finite and > 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chai() -> UnitDefinition {
        UnitDefinition::new("chai", 25.0, 1.07, 4.0, 1.2).with_overseer("zolly")
    }

    fn zolly() -> OverseerDefinition {
        OverseerDefinition::new("zolly", 1_000.0, "chai")
    }

    #[test]
    fn standard_catalog_is_valid() -> Result<()> {
        let catalog = Catalog::standard()?;
        assert_eq!(catalog.units().len(), 10);
        assert_eq!(catalog.overseers().len(), 10);
        assert_eq!(catalog.units()[0].id, "chai");
        let kirana = catalog.unit("kirana").expect("kirana");
        assert_eq!(
            kirana.requires,
            Some(UnlockRequirement {
                unit_id: "chai".to_string(),
                level: 20
            })
        );
        let overseer = catalog.overseer_for(kirana).expect("guddu");
        assert_eq!(overseer.id, "guddu");
        assert_eq!(overseer.price, 3_500.0);
        Ok(())
    }

    #[test]
    fn rejects_multiplier_at_or_below_one() {
        let mut unit = chai();
        unit.cost_multiplier = 1.0;
        let err = Catalog::new(vec![unit], vec![zolly()]).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::InvalidValue {
                field: "cost_multiplier",
                ..
            }
        ));
    }

    #[test]
    fn rejects_non_positive_cycle() {
        let mut unit = chai();
        unit.base_cycle_seconds = 0.0;
        let err = Catalog::new(vec![unit], vec![zolly()]).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::InvalidValue {
                field: "base_cycle_seconds",
                ..
            }
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = Catalog::new(vec![chai(), chai()], vec![zolly()]).unwrap_err();
        assert_eq!(
            err,
            CatalogError::DuplicateId {
                kind: "unit",
                id: "chai".to_string()
            }
        );
    }

    #[test]
    fn rejects_one_sided_overseer_link() {
        let unit = UnitDefinition::new("chai", 25.0, 1.07, 4.0, 1.2);
        let err = Catalog::new(vec![unit], vec![zolly()]).unwrap_err();
        assert!(matches!(err, CatalogError::BrokenLink { kind: "overseer", .. }));

        let err = Catalog::new(vec![chai()], vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::BrokenLink { kind: "unit", .. }));
    }

    #[test]
    fn rejects_unknown_requirement() {
        let unit = UnitDefinition::new("kirana", 120.0, 1.08, 12.0, 1.6).requiring("chai", 20);
        let err = Catalog::new(vec![unit], vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::BrokenLink { .. }));
    }

    #[test]
    fn loads_json_catalog() -> Result<()> {
        let catalog = Catalog::from_json(
            r#"{
                "units": [
                    { "id": "stall", "name": "Stall", "base_cost": 10, "cost_multiplier": 1.5,
                      "base_income": 1, "base_cycle_seconds": 2, "overseer_id": "ann" },
                    { "id": "shop", "base_cost": 100, "cost_multiplier": 1.2,
                      "base_income": 8, "base_cycle_seconds": 3,
                      "requires": { "unit_id": "stall", "level": 5 } }
                ],
                "overseers": [
                    { "id": "ann", "price": 50, "automates_unit_id": "stall" }
                ]
            }"#,
        )?;
        assert_eq!(catalog.units().len(), 2);
        assert!(catalog.contains_overseer("ann"));
        assert_eq!(catalog.unit("shop").and_then(|u| u.requires.clone()).map(|r| r.level), Some(5));
        Ok(())
    }
}
