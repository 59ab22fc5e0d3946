//! Save-game persistence and reconciliation against the current catalog.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::{
    catalog::Catalog,
    error::{EngineError, EngineResult},
    models::{SimulationState, UnitState},
    store::KeyValueStore,
};

/// Namespaced key the simulation state is stored under.
pub const DEFAULT_STATE_KEY: &str = "tycoon.state.v1";

/// Version written into every envelope.
pub const SAVE_VERSION: u32 = 1;

const LEVEL_FIELDS: &[&str] = &["level", "lvl", "qty"];
const TIME_FIELDS: &[&str] = &["time_remaining", "timeLeft"];
const EARNED_FIELDS: &[&str] = &["total_earned", "total"];
const UNIT_MAP_FIELDS: &[&str] = &["units", "biz"];

/// Serialized representation of a save blob.
#[derive(Debug, Serialize)]
struct SavePayload<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    state: &'a SimulationState,
}

/// A field that had to be replaced while reconciling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRepair {
    /// Unit the field belongs to.
    pub unit: String,
    /// Name of the repaired field.
    pub field: &'static str,
}

/// Differences between a stored blob and the current catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Catalog units that were missing from the blob.
    pub added_units: Vec<String>,
    /// Stored units no longer in the catalog.
    pub dropped_units: Vec<String>,
    /// Stored overseers no longer in the catalog.
    pub dropped_overseers: Vec<String>,
    /// Fields replaced because they were invalid.
    pub repaired: Vec<FieldRepair>,
}

impl ReconcileReport {
    /// True when the blob matched the catalog exactly.
    pub fn is_clean(&self) -> bool {
        self.added_units.is_empty()
            && self.dropped_units.is_empty()
            && self.dropped_overseers.is_empty()
            && self.repaired.is_empty()
    }

    fn repair(&mut self, unit: &str, field: &'static str) {
        self.repaired.push(FieldRepair {
            unit: unit.to_string(),
            field,
        });
    }
}

/// How a load deviated from a clean read.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// Nothing stored yet; started fresh.
    Missing,
    /// The store failed to read; started fresh without touching the blob.
    ReadFailed {
        /// Store error.
        reason: String,
    },
    /// Blob unparsable; started fresh.
    CorruptState {
        /// Why the blob was rejected.
        reason: String,
    },
    /// Blob parsed but disagreed with the catalog; reconciled.
    SchemaDrift(ReconcileReport),
}

impl Recovery {
    /// Whether the stored blob may still hold progress that a write would
    /// destroy.
    pub fn protects_stored_blob(&self) -> bool {
        matches!(self, Recovery::ReadFailed { .. })
    }
}

/// Result of [`StateStore::load`].
#[derive(Debug, Clone)]
pub struct LoadedState {
    /// Reconciled state, always consistent with the catalog.
    pub state: SimulationState,
    /// When the blob was written, if it says.
    pub saved_at: Option<DateTime<Utc>>,
    /// Set when the load was not a clean read.
    pub recovery: Option<Recovery>,
}

/// Loads and writes the simulation state through a [`KeyValueStore`].
pub struct StateStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    catalog: Arc<Catalog>,
}

impl StateStore {
    /// Adapter storing under `key`.
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, catalog: Arc<Catalog>) -> Self {
        Self {
            store,
            key: key.into(),
            catalog,
        }
    }

    /// Storage key in use.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read and reconcile the stored state. Never fails: anything unusable
    /// falls back to a fresh state.
    pub fn load(&self) -> LoadedState {
        let fresh = |recovery| LoadedState {
            state: SimulationState::new(&self.catalog),
            saved_at: None,
            recovery: Some(recovery),
        };

        let bytes = match self.store.read_blob(&self.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!(key = %self.key, "no saved state, starting fresh");
                return fresh(Recovery::Missing);
            }
            Err(err) => {
                error!(key = %self.key, ?err, "saved state could not be read, starting fresh");
                return fresh(Recovery::ReadFailed {
                    reason: format!("{err:#}"),
                });
            }
        };

        let raw = match parse_blob(&bytes) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key = %self.key, ?err, "saved state corrupt, starting fresh");
                return fresh(Recovery::CorruptState {
                    reason: format!("{err:#}"),
                });
            }
        };

        let (state, report) = reconcile(&raw, &self.catalog);
        let recovery = if report.is_clean() {
            None
        } else {
            warn!(
                key = %self.key,
                added = ?report.added_units,
                dropped = ?report.dropped_units,
                dropped_overseers = ?report.dropped_overseers,
                repaired = report.repaired.len(),
                "saved state reconciled against catalog"
            );
            Some(Recovery::SchemaDrift(report))
        };

        LoadedState {
            state,
            saved_at: saved_at(&raw),
            recovery,
        }
    }

    /// Write the full state. Returns the timestamp recorded in the envelope.
    pub fn save(&self, state: &SimulationState) -> EngineResult<DateTime<Utc>> {
        let payload = SavePayload {
            version: SAVE_VERSION,
            saved_at: Utc::now(),
            state,
        };
        let serialised = serde_json::to_vec_pretty(&payload)
            .context("failed to serialise simulation state")
            .map_err(EngineError::StoreWrite)?;
        self.store
            .write_blob(&self.key, &serialised)
            .with_context(|| format!("failed to write state blob '{}'", self.key))
            .map_err(EngineError::StoreWrite)?;
        Ok(payload.saved_at)
    }
}

/// Decode a blob into JSON, requiring an object at the root.
pub fn parse_blob(bytes: &[u8]) -> anyhow::Result<Value> {
    let value: Value = serde_json::from_slice(bytes).context("state blob is not valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("state blob is not a JSON object");
    }
    Ok(value)
}

/// Bring a parsed blob in line with `catalog`.
///
/// Pure and idempotent: reconciling the serialised result again yields the
/// same state and a clean report.
pub fn reconcile(raw: &Value, catalog: &Catalog) -> (SimulationState, ReconcileReport) {
    let mut report = ReconcileReport::default();
    let root = match raw.get("state") {
        Some(state) if state.is_object() => state,
        _ => raw,
    };
    let stored_units = UNIT_MAP_FIELDS
        .iter()
        .find_map(|field| root.get(*field).and_then(Value::as_object));

    let mut state = SimulationState::default();
    for unit in catalog.units() {
        let entry = match stored_units.and_then(|units| units.get(&unit.id)) {
            Some(entry) => reconcile_unit(&unit.id, entry, &mut report),
            None => {
                report.added_units.push(unit.id.clone());
                UnitState::default()
            }
        };
        state.units.insert(unit.id.clone(), entry);
    }
    if let Some(units) = stored_units {
        report.dropped_units.extend(
            units
                .keys()
                .filter(|id| !catalog.contains_unit(id))
                .cloned(),
        );
    }

    for id in owned_overseers(root.get("overseers")) {
        if catalog.contains_overseer(&id) {
            state.overseers.insert(id);
        } else {
            report.dropped_overseers.push(id);
        }
    }

    (state, report)
}

fn reconcile_unit(id: &str, raw: &Value, report: &mut ReconcileReport) -> UnitState {
    let Some(fields) = raw.as_object() else {
        report.repair(id, "entry");
        return UnitState::default();
    };

    let level = match non_negative(fields, LEVEL_FIELDS) {
        Field::Missing => 0,
        Field::Invalid => {
            report.repair(id, "level");
            0
        }
        Field::Valid(value) => {
            if value.fract() != 0.0 {
                report.repair(id, "level");
            }
            value.floor().min(f64::from(u32::MAX)) as u32
        }
    };

    let mut running = fields.get("running").map(truthy).unwrap_or(false);
    if running && level == 0 {
        report.repair(id, "running");
        running = false;
    }

    let time_remaining = number_field(id, fields, TIME_FIELDS, "time_remaining", report);
    let total_earned = number_field(id, fields, EARNED_FIELDS, "total_earned", report);

    UnitState {
        level,
        running,
        time_remaining,
        total_earned,
    }
}

fn number_field(
    id: &str,
    fields: &Map<String, Value>,
    names: &[&str],
    field: &'static str,
    report: &mut ReconcileReport,
) -> f64 {
    match non_negative(fields, names) {
        Field::Missing => 0.0,
        Field::Invalid => {
            report.repair(id, field);
            0.0
        }
        Field::Valid(value) => value,
    }
}

enum Field {
    Missing,
    Invalid,
    Valid(f64),
}

fn non_negative(fields: &Map<String, Value>, names: &[&str]) -> Field {
    let Some(value) = names.iter().find_map(|name| fields.get(*name)) else {
        return Field::Missing;
    };
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Null => return Field::Missing,
        _ => None,
    };
    match number {
        Some(number) if number.is_finite() && number >= 0.0 => Field::Valid(number),
        _ => Field::Invalid,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn owned_overseers(raw: Option<&Value>) -> Vec<String> {
    match raw {
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, owned)| truthy(owned))
            .map(|(id, _)| id.clone())
            .collect(),
        Some(Value::Array(ids)) => ids
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn saved_at(raw: &Value) -> Option<DateTime<Utc>> {
    raw.get("saved_at")
        .and_then(Value::as_str)
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|stamp| stamp.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{OverseerDefinition, UnitDefinition},
        store::{FileStore, MemoryStore},
    };
    use anyhow::Result;
    use serde_json::json;
    use tempfile::tempdir;

    fn catalog() -> Arc<Catalog> {
        let units = vec![
            UnitDefinition::new("chai", 25.0, 1.07, 4.0, 1.2).with_overseer("zolly"),
            UnitDefinition::new("kirana", 120.0, 1.08, 12.0, 1.6),
        ];
        let overseers = vec![OverseerDefinition::new("zolly", 1_000.0, "chai")];
        Arc::new(Catalog::new(units, overseers).expect("valid catalog"))
    }

    fn adapter(store: Arc<dyn KeyValueStore>) -> StateStore {
        StateStore::new(store, DEFAULT_STATE_KEY, catalog())
    }

    #[test]
    fn missing_blob_starts_fresh() {
        let loaded = adapter(Arc::new(MemoryStore::new())).load();
        assert_eq!(loaded.recovery, Some(Recovery::Missing));
        assert_eq!(loaded.state, SimulationState::new(&catalog()));
        assert!(loaded.saved_at.is_none());
    }

    #[test]
    fn corrupt_blob_starts_fresh() {
        for garbage in [&b"{not json"[..], b"[1, 2, 3]", b""] {
            let store = MemoryStore::with_blob(DEFAULT_STATE_KEY, garbage.to_vec());
            let loaded = adapter(Arc::new(store)).load();
            assert!(matches!(loaded.recovery, Some(Recovery::CorruptState { .. })));
            assert_eq!(loaded.state, SimulationState::new(&catalog()));
        }
    }

    struct UnreadableStore;

    impl KeyValueStore for UnreadableStore {
        fn read_blob(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            anyhow::bail!("input/output error")
        }

        fn write_blob(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn read_error_is_not_mistaken_for_corruption() {
        let loaded = adapter(Arc::new(UnreadableStore)).load();
        let recovery = loaded.recovery.expect("recovery reported");
        assert!(matches!(recovery, Recovery::ReadFailed { ref reason } if reason.contains("input/output")));
        assert!(recovery.protects_stored_blob());
        assert!(!Recovery::Missing.protects_stored_blob());
        assert_eq!(loaded.state, SimulationState::new(&catalog()));
    }

    #[test]
    fn missing_unit_is_synthesised_and_others_kept() {
        let raw = json!({
            "units": {
                "chai": { "level": 3, "running": true, "time_remaining": 0.4, "total_earned": 96.0 }
            },
            "overseers": ["zolly"]
        });
        let (state, report) = reconcile(&raw, &catalog());
        assert_eq!(report.added_units, vec!["kirana".to_string()]);
        assert_eq!(state.unit("kirana"), Some(&UnitState::default()));
        assert_eq!(
            state.unit("chai"),
            Some(&UnitState {
                level: 3,
                running: true,
                time_remaining: 0.4,
                total_earned: 96.0,
            })
        );
        assert!(state.owns("zolly"));
    }

    #[test]
    fn stale_entries_are_dropped_and_bad_fields_repaired() {
        let raw = json!({
            "units": {
                "chai": { "level": -2, "running": true, "time_remaining": "abc", "total_earned": 5 },
                "kirana": { "level": 2.7, "time_remaining": -1 },
                "lemonade": { "level": 9 }
            },
            "overseers": { "zolly": false, "ghost": true }
        });
        let (state, report) = reconcile(&raw, &catalog());

        let chai = state.unit("chai").expect("chai");
        assert_eq!(chai.level, 0);
        assert!(!chai.running, "running without a level is normalised");
        assert_eq!(chai.time_remaining, 0.0);
        assert_eq!(chai.total_earned, 5.0);

        let kirana = state.unit("kirana").expect("kirana");
        assert_eq!(kirana.level, 2);
        assert_eq!(kirana.time_remaining, 0.0);

        assert!(!state.units.contains_key("lemonade"));
        assert!(state.overseers.is_empty());
        assert_eq!(report.dropped_units, vec!["lemonade".to_string()]);
        assert_eq!(report.dropped_overseers, vec!["ghost".to_string()]);
        assert_eq!(report.repaired.len(), 5);
    }

    #[test]
    fn reads_legacy_layout() {
        let raw = json!({
            "coins": 4200,
            "biz": {
                "chai": { "qty": 12, "running": true, "timeLeft": 0.8, "total": 640 },
                "kirana": { "lvl": 1 }
            },
            "overseers": { "zolly": true }
        });
        let (state, report) = reconcile(&raw, &catalog());
        assert!(report.is_clean());
        assert_eq!(state.level_of("chai"), 12);
        assert_eq!(state.level_of("kirana"), 1);
        assert_eq!(state.unit("chai").map(|u| u.total_earned), Some(640.0));
        assert!(state.owns("zolly"));
    }

    #[test]
    fn reconciliation_is_idempotent() -> Result<()> {
        let raw = json!({
            "units": {
                "chai": { "level": "7", "running": 1, "time_remaining": 0.25, "total_earned": -3 },
                "gone": {}
            },
            "overseers": { "zolly": true, "ghost": true }
        });
        let (once, _) = reconcile(&raw, &catalog());
        let (twice, report) = reconcile(&serde_json::to_value(&once)?, &catalog());
        assert_eq!(once, twice);
        assert!(report.is_clean());
        Ok(())
    }

    #[test]
    fn save_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(dir.path()));
        let adapter = adapter(store);

        let mut state = SimulationState::new(&catalog());
        if let Some(chai) = state.units.get_mut("chai") {
            chai.level = 4;
            chai.running = true;
            chai.time_remaining = 0.5;
        }
        state.overseers.insert("zolly".to_string());
        let saved_at = adapter.save(&state)?;

        let loaded = adapter.load();
        assert_eq!(loaded.recovery, None);
        assert_eq!(loaded.state, state);
        assert_eq!(loaded.saved_at, Some(saved_at));
        Ok(())
    }
}
