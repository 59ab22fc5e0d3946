#![warn(clippy::all, missing_docs)]

//! Core simulation for the tycoon idle game.
//!
//! This crate hosts the business catalog, the per-unit state machine, the
//! engine that moves currency through an external wallet, save/restore with
//! schema reconciliation, and the tick scheduler used by the headless runner
//! and any future frontends.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod save;
pub mod scheduler;
pub mod store;
pub mod unit;
pub mod wallet;

pub use catalog::{Catalog, OverseerDefinition, UnitDefinition, UnlockRequirement};
pub use config::AppConfig;
pub use engine::{Engine, EngineOptions, HireOutcome, Purchase, TickReport, UnitPayout};
pub use error::{CatalogError, EngineError, EngineResult};
pub use metrics::{MetricsSnapshot, NextUnlock, UnitMetrics};
pub use models::{SimulationState, UnitPhase, UnitState};
pub use save::{LoadedState, ReconcileReport, Recovery, StateStore};
pub use scheduler::{SchedulerOptions, TickScheduler};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use unit::Tuning;
pub use wallet::{MemoryWallet, StoredWallet, Wallet, WalletGateway};
