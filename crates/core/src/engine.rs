//! The engine aggregate: catalog, simulation state, wallet and persistence.
//!
//! RULES:
//!   - One mutex guards the simulation state; ticks and player actions both
//!     take it, so nothing interleaves.
//!   - Every debit and credit happens inside that critical section, strictly
//!     ordered against the mutation it pays for.
//!   - Units advance in catalog order.
//!   - A failed write keeps the state dirty; the next persist retries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    catalog::Catalog,
    error::{EngineError, EngineResult},
    metrics::MetricsSnapshot,
    models::{SimulationState, UnitState},
    save::{Recovery, StateStore, DEFAULT_STATE_KEY},
    store::KeyValueStore,
    unit::{self, Tuning},
    wallet::{Wallet, WalletGateway},
};

/// Default cap on a single offline catch-up (eight hours).
pub const DEFAULT_MAX_OFFLINE_SECONDS: f64 = 8.0 * 60.0 * 60.0;

/// Construction options for [`Engine::open`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Key the simulation state is stored under.
    pub state_key: String,
    /// Timing knobs shared by every unit.
    pub tuning: Tuning,
    /// Longest stretch [`Engine::catch_up`] will apply at once.
    pub max_offline_seconds: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            state_key: DEFAULT_STATE_KEY.to_string(),
            tuning: Tuning::default(),
            max_offline_seconds: DEFAULT_MAX_OFFLINE_SECONDS,
        }
    }
}

/// Receipt for a successful level purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct Purchase {
    /// Unit that was levelled.
    pub unit_id: String,
    /// Levels bought.
    pub levels: u32,
    /// Level after the purchase.
    pub new_level: u32,
    /// Amount debited.
    pub cost: f64,
}

/// Outcome of [`Engine::hire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HireOutcome {
    /// The overseer was hired and paid for.
    Hired,
    /// Already on the payroll; nothing charged.
    AlreadyOwned,
}

/// Payout from a single unit during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitPayout {
    /// Paying unit.
    pub unit_id: String,
    /// Completed cycles.
    pub cycles: u64,
    /// Amount credited.
    pub earned: f64,
}

/// What one [`Engine::advance`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Seconds applied.
    pub elapsed: f64,
    /// Units that paid out, in catalog order.
    pub payouts: Vec<UnitPayout>,
    /// Sum of all payouts.
    pub earned: f64,
    /// Whether any unit state changed.
    pub changed: bool,
}

struct Inner {
    state: SimulationState,
    dirty: bool,
    saved_at: Option<DateTime<Utc>>,
}

/// Thread-safe simulation engine.
pub struct Engine {
    catalog: Arc<Catalog>,
    wallet: WalletGateway,
    saves: StateStore,
    options: EngineOptions,
    recovery: Option<Recovery>,
    writes_suspended: bool,
    inner: Mutex<Inner>,
}

impl Engine {
    /// Load (or initialise) the state stored under `options.state_key`.
    ///
    /// Never fails: missing or corrupt saves fall back to a fresh state, which
    /// is reported through [`Engine::load_recovery`].
    pub fn open(
        catalog: Arc<Catalog>,
        wallet: Arc<dyn Wallet>,
        store: Arc<dyn KeyValueStore>,
        options: EngineOptions,
    ) -> Self {
        let saves = StateStore::new(store, options.state_key.clone(), catalog.clone());
        let loaded = saves.load();
        let writes_suspended = loaded
            .recovery
            .as_ref()
            .map(Recovery::protects_stored_blob)
            .unwrap_or(false);
        let dirty = loaded.recovery.is_some() && !writes_suspended;
        if writes_suspended {
            warn!(
                key = %options.state_key,
                "saved state could not be read; progress this session will not be written"
            );
        }
        info!(
            key = %options.state_key,
            units = catalog.units().len(),
            overseers = loaded.state.overseers.len(),
            recovered = loaded.recovery.is_some(),
            "engine state loaded"
        );
        Self {
            catalog,
            wallet: WalletGateway::new(wallet),
            saves,
            options,
            recovery: loaded.recovery,
            writes_suspended,
            inner: Mutex::new(Inner {
                state: loaded.state,
                dirty,
                saved_at: loaded.saved_at,
            }),
        }
    }

    /// Catalog the engine was built with.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Timing knobs in use.
    pub fn tuning(&self) -> &Tuning {
        &self.options.tuning
    }

    /// How the initial load deviated from a clean read, if it did.
    pub fn load_recovery(&self) -> Option<&Recovery> {
        self.recovery.as_ref()
    }

    /// Timestamp of the last save read or written.
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().saved_at
    }

    /// Current wallet balance.
    pub fn balance(&self) -> f64 {
        self.wallet.balance()
    }

    /// Copy of the whole simulation state.
    pub fn snapshot(&self) -> SimulationState {
        self.inner.lock().state.clone()
    }

    /// Copy of one unit's state.
    pub fn unit_state(&self, unit_id: &str) -> Option<UnitState> {
        self.inner.lock().state.unit(unit_id).cloned()
    }

    /// Whether the overseer has been hired.
    pub fn owns_overseer(&self, overseer_id: &str) -> bool {
        self.inner.lock().state.owns(overseer_id)
    }

    /// Whether writes are off because the stored state could not be read.
    pub fn writes_suspended(&self) -> bool {
        self.writes_suspended
    }

    /// Whether there are changes not yet written.
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Derived read-only projections of the current state.
    pub fn metrics(&self) -> MetricsSnapshot {
        let inner = self.inner.lock();
        MetricsSnapshot::capture(
            &self.catalog,
            &inner.state,
            self.wallet.balance(),
            &self.options.tuning,
        )
    }

    /// Buy the next level of a unit.
    pub fn purchase_level(&self, unit_id: &str) -> EngineResult<Purchase> {
        self.purchase_levels(unit_id, 1)
    }

    /// Buy `count` levels of a unit in one all-or-nothing debit.
    pub fn purchase_levels(&self, unit_id: &str, count: u32) -> EngineResult<Purchase> {
        if count == 0 {
            return Err(EngineError::InvalidAmount(
                "cannot purchase zero levels".to_string(),
            ));
        }
        let unit = self
            .catalog
            .unit(unit_id)
            .ok_or_else(|| EngineError::UnknownUnit(unit_id.to_string()))?;

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if let Err(err) = unit::check_unlocked(unit, &inner.state) {
            warn!(unit = %unit.id, %err, "purchase rejected");
            return Err(err);
        }

        let level = inner.state.level_of(&unit.id);
        let cost = unit::bulk_cost(unit, level, count);
        if let Err(err) = self.wallet.debit(cost) {
            warn!(unit = %unit.id, levels = count, cost, %err, "purchase rejected");
            return Err(err);
        }

        let state = inner.state.units.entry(unit.id.clone()).or_default();
        unit::apply_purchase(state, count);
        let new_level = state.level;
        inner.dirty = true;
        info!(unit = %unit.id, levels = count, new_level, cost, "levels purchased");
        self.persist_locked(inner);

        Ok(Purchase {
            unit_id: unit.id.clone(),
            levels: count,
            new_level,
            cost,
        })
    }

    /// Start an armed unit's cycle by hand.
    ///
    /// Returns `Ok(false)` when the unit is idle or already running.
    pub fn start_manual(&self, unit_id: &str) -> EngineResult<bool> {
        let unit = self
            .catalog
            .unit(unit_id)
            .ok_or_else(|| EngineError::UnknownUnit(unit_id.to_string()))?;

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let state = inner.state.units.entry(unit.id.clone()).or_default();
        if !unit::start_manual(unit, state, &self.options.tuning) {
            debug!(unit = %unit.id, phase = ?state.phase(), "manual start ignored");
            return Ok(false);
        }
        debug!(unit = %unit.id, cycle = state.time_remaining, "manual start");
        inner.dirty = true;
        self.persist_locked(inner);
        Ok(true)
    }

    /// Hire an overseer. Automation applies from the next advance.
    pub fn hire(&self, overseer_id: &str) -> EngineResult<HireOutcome> {
        let overseer = self
            .catalog
            .overseer(overseer_id)
            .ok_or_else(|| EngineError::UnknownOverseer(overseer_id.to_string()))?;

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state.owns(&overseer.id) {
            return Ok(HireOutcome::AlreadyOwned);
        }
        if let Err(err) = self.wallet.debit(overseer.price) {
            warn!(overseer = %overseer.id, price = overseer.price, %err, "hire rejected");
            return Err(err);
        }

        inner.state.overseers.insert(overseer.id.clone());
        inner.dirty = true;
        info!(
            overseer = %overseer.id,
            unit = %overseer.automates_unit_id,
            price = overseer.price,
            "overseer hired"
        );
        self.persist_locked(inner);
        Ok(HireOutcome::Hired)
    }

    /// Advance every unit by `elapsed` seconds, crediting payouts.
    pub fn advance(&self, elapsed: f64) -> TickReport {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut report = TickReport {
            elapsed,
            ..TickReport::default()
        };

        for unit in self.catalog.units() {
            let automated = self
                .catalog
                .overseer_for(unit)
                .map(|overseer| inner.state.owns(&overseer.id))
                .unwrap_or(false);
            let state = inner.state.units.entry(unit.id.clone()).or_default();
            let before = state.clone();
            let outcome = unit::advance(unit, state, automated, elapsed, &self.options.tuning);
            if *state != before {
                report.changed = true;
            }
            if outcome.is_empty() {
                continue;
            }
            if let Err(err) = self.wallet.credit(outcome.earned) {
                error!(unit = %unit.id, earned = outcome.earned, %err, "payout not credited");
                continue;
            }
            report.earned += outcome.earned;
            report.payouts.push(UnitPayout {
                unit_id: unit.id.clone(),
                cycles: outcome.cycles,
                earned: outcome.earned,
            });
        }

        if report.changed {
            inner.dirty = true;
        }
        if !report.payouts.is_empty() {
            debug!(
                elapsed,
                earned = report.earned,
                units = report.payouts.len(),
                "tick paid out"
            );
        }
        report
    }

    /// Fast-forward after the engine went unobserved for `elapsed` seconds.
    ///
    /// One advance with the whole duration (capped at the configured
    /// maximum), so automated units are credited every cycle they completed.
    pub fn catch_up(&self, elapsed: f64) -> TickReport {
        let capped = if elapsed.is_finite() {
            elapsed.clamp(0.0, self.options.max_offline_seconds)
        } else {
            0.0
        };
        let report = self.advance(capped);
        info!(
            elapsed,
            applied = capped,
            earned = report.earned,
            "offline progress applied"
        );
        report
    }

    /// Catch up on the time since the loaded save was written.
    pub fn catch_up_since_save(&self, now: DateTime<Utc>) -> Option<TickReport> {
        let saved_at = self.saved_at()?;
        let offline = (now - saved_at).num_milliseconds() as f64 / 1_000.0;
        if offline <= 0.0 {
            return None;
        }
        Some(self.catch_up(offline))
    }

    /// Write the state if it changed since the last successful write.
    ///
    /// Returns whether a write happened. Never writes while
    /// [`Engine::writes_suspended`] holds.
    pub fn persist(&self) -> EngineResult<bool> {
        let mut guard = self.inner.lock();
        if !guard.dirty || self.writes_suspended {
            return Ok(false);
        }
        self.write_locked(&mut guard)?;
        Ok(true)
    }

    fn persist_locked(&self, inner: &mut Inner) {
        if self.writes_suspended {
            return;
        }
        if let Err(err) = self.write_locked(inner) {
            error!(%err, "state kept in memory; write will be retried");
        }
    }

    fn write_locked(&self, inner: &mut Inner) -> EngineResult<()> {
        let saved_at = self.saves.save(&inner.state)?;
        inner.dirty = false;
        inner.saved_at = Some(saved_at);
        Ok(())
    }
}
