//! Wallet contract and the gateway every currency movement goes through.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::{
    error::{EngineError, EngineResult},
    store::KeyValueStore,
};

/// Key the stored wallet lives under by default.
pub const DEFAULT_WALLET_KEY: &str = "tycoon.wallet.v1";

/// Balance a fresh stored wallet is seeded with.
pub const DEFAULT_STARTING_BALANCE: f64 = 100.0;

/// Shared balance owned outside the engine.
///
/// Implementations must make `debit` an atomic check-and-subtract.
pub trait Wallet: Send + Sync {
    /// Current balance snapshot.
    fn balance(&self) -> f64;

    /// Add `amount` to the balance.
    fn credit(&self, amount: f64);

    /// Subtract `amount` if the balance covers it. Returns whether it did.
    fn debit(&self, amount: f64) -> bool;
}

/// Validating front for a [`Wallet`].
#[derive(Clone)]
pub struct WalletGateway {
    wallet: Arc<dyn Wallet>,
}

impl WalletGateway {
    /// Wrap a wallet.
    pub fn new(wallet: Arc<dyn Wallet>) -> Self {
        Self { wallet }
    }

    /// Current balance snapshot.
    pub fn balance(&self) -> f64 {
        self.wallet.balance()
    }

    /// Credit a non-negative amount.
    pub fn credit(&self, amount: f64) -> EngineResult<()> {
        let amount = checked_amount(amount)?;
        if amount > 0.0 {
            self.wallet.credit(amount);
            debug!(amount, balance = self.wallet.balance(), "wallet credited");
        }
        Ok(())
    }

    /// Debit a non-negative amount, failing without side effects when the
    /// balance is too low.
    pub fn debit(&self, amount: f64) -> EngineResult<()> {
        let amount = checked_amount(amount)?;
        if self.wallet.debit(amount) {
            debug!(amount, balance = self.wallet.balance(), "wallet debited");
            Ok(())
        } else {
            Err(EngineError::InsufficientFunds {
                required: amount,
                available: self.wallet.balance(),
            })
        }
    }
}

impl std::fmt::Debug for WalletGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletGateway")
            .field("balance", &self.wallet.balance())
            .finish()
    }
}

fn checked_amount(amount: f64) -> EngineResult<f64> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(amount)
    } else {
        Err(EngineError::InvalidAmount(format!(
            "{amount} is not a finite non-negative amount"
        )))
    }
}

fn sane_balance(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Balance held in memory only.
#[derive(Debug, Default)]
pub struct MemoryWallet {
    balance: Mutex<f64>,
}

impl MemoryWallet {
    /// Wallet starting at `initial` (negative or non-finite values become 0).
    pub fn new(initial: f64) -> Self {
        Self {
            balance: Mutex::new(sane_balance(initial)),
        }
    }
}

impl Wallet for MemoryWallet {
    fn balance(&self) -> f64 {
        *self.balance.lock()
    }

    fn credit(&self, amount: f64) {
        let mut balance = self.balance.lock();
        *balance = sane_balance(*balance + amount);
    }

    fn debit(&self, amount: f64) -> bool {
        let mut balance = self.balance.lock();
        if *balance < amount {
            return false;
        }
        *balance = sane_balance(*balance - amount);
        true
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WalletBlob {
    balance: f64,
}

/// Balance persisted under its own key in a [`KeyValueStore`].
///
/// The in-memory balance is authoritative; failed writes are logged and
/// retried on the next change. When the stored balance could not be read,
/// nothing is written for the life of the wallet.
pub struct StoredWallet {
    store: Arc<dyn KeyValueStore>,
    key: String,
    balance: Mutex<f64>,
    writable: bool,
}

impl StoredWallet {
    /// Open the wallet stored under `key`, seeding it with `starting_balance`
    /// the first time.
    pub fn open(store: Arc<dyn KeyValueStore>, key: impl Into<String>, starting_balance: f64) -> Self {
        let key = key.into();
        let mut writable = true;
        let balance = match store.read_blob(&key) {
            Ok(Some(bytes)) => match serde_json::from_slice::<WalletBlob>(&bytes) {
                Ok(blob) => sane_balance(blob.balance),
                Err(err) => {
                    warn!(key = %key, ?err, "wallet blob unreadable, starting from zero");
                    0.0
                }
            },
            Ok(None) => {
                let seeded = sane_balance(starting_balance);
                write_balance(store.as_ref(), &key, seeded);
                seeded
            }
            Err(err) => {
                error!(key = %key, ?err, "wallet unreadable, balance will not be written");
                writable = false;
                0.0
            }
        };
        Self {
            store,
            key,
            balance: Mutex::new(balance),
            writable,
        }
    }

    /// Whether balance changes reach the store.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    fn write(&self, balance: f64) {
        if self.writable {
            write_balance(self.store.as_ref(), &self.key, balance);
        }
    }
}

impl Wallet for StoredWallet {
    fn balance(&self) -> f64 {
        *self.balance.lock()
    }

    fn credit(&self, amount: f64) {
        let mut balance = self.balance.lock();
        *balance = sane_balance(*balance + amount);
        self.write(*balance);
    }

    fn debit(&self, amount: f64) -> bool {
        let mut balance = self.balance.lock();
        if *balance < amount {
            return false;
        }
        *balance = sane_balance(*balance - amount);
        self.write(*balance);
        true
    }
}

fn write_balance(store: &dyn KeyValueStore, key: &str, balance: f64) {
    let result = serde_json::to_vec(&WalletBlob { balance })
        .map_err(anyhow::Error::from)
        .and_then(|bytes| store.write_blob(key, &bytes));
    if let Err(err) = result {
        warn!(key, ?err, "failed to persist wallet balance");
    }
}
