//! Error taxonomy for engine actions and catalog construction.

use thiserror::Error;

/// Failure of a player action or a persistence attempt.
///
/// None of these are fatal: every variant means "no state change" (or, for
/// [`EngineError::StoreWrite`], "state kept in memory only") plus a reason the
/// caller can surface.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The wallet cannot cover the requested debit.
    #[error("insufficient funds: need {required:.2}, have {available:.2}")]
    InsufficientFunds {
        /// Amount the action would have debited.
        required: f64,
        /// Balance observed when the debit was rejected.
        available: f64,
    },

    /// The unit's unlock requirement is not met yet.
    #[error("unit '{unit}' is locked until '{requires}' reaches level {level}")]
    Locked {
        /// Unit the caller tried to buy.
        unit: String,
        /// Unit that has to be levelled first.
        requires: String,
        /// Level the required unit must reach.
        level: u32,
    },

    /// No unit with this id exists in the catalog.
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    /// No overseer with this id exists in the catalog.
    #[error("unknown overseer '{0}'")]
    UnknownOverseer(String),

    /// Negative, non-finite or otherwise unusable amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The persistent store rejected a write; the previous blob is untouched.
    #[error("failed to persist state: {0:#}")]
    StoreWrite(#[source] anyhow::Error),
}

impl EngineError {
    /// Whether the error came from the wallet refusing a debit.
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, EngineError::InsufficientFunds { .. })
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

/// Rejected catalog input.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    /// A definition id is empty.
    #[error("{kind} with empty id")]
    EmptyId {
        /// `unit` or `overseer`.
        kind: &'static str,
    },

    /// Two definitions share an id.
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId {
        /// `unit` or `overseer`.
        kind: &'static str,
        /// Offending id.
        id: String,
    },

    /// A numeric field is outside its allowed range.
    #[error("{kind} '{id}': {field} = {value} ({reason})")]
    InvalidValue {
        /// `unit` or `overseer`.
        kind: &'static str,
        /// Definition id.
        id: String,
        /// Field name.
        field: &'static str,
        /// Rejected value.
        value: f64,
        /// Constraint that was violated.
        reason: &'static str,
    },

    /// A reference points at an id that does not exist or does not point back.
    #[error("{kind} '{id}' references {target}: {reason}")]
    BrokenLink {
        /// `unit` or `overseer`.
        kind: &'static str,
        /// Definition id holding the reference.
        id: String,
        /// Referenced id.
        target: String,
        /// What is wrong with the reference.
        reason: &'static str,
    },
}
