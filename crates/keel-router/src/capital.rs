//! Capital ledger with provisional reservations.
//!
//! Execution reserves the source amount before signing. A reservation is
//! either committed (the destination asset is credited) or restored (the
//! source amount is credited back). Dropping a reservation without doing
//! either restores it, so capital is never lost on an early return.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use keel_core::Asset;

use crate::error::RouterError;

#[derive(Debug, Default)]
pub struct CapitalLedger {
    balances: Arc<Mutex<HashMap<Asset, Decimal>>>,
}

/// Capital debited from the ledger pending the outcome of one execution.
#[must_use = "a reservation must be committed or restored"]
#[derive(Debug)]
pub struct Reservation {
    asset: Asset,
    amount: Decimal,
    balances: Arc<Mutex<HashMap<Asset, Decimal>>>,
    settled: bool,
}

impl Reservation {
    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    fn credit_back(&mut self) {
        if !self.settled {
            self.settled = true;
            *self.balances.lock().entry(self.asset.clone()).or_default() += self.amount;
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.credit_back();
    }
}

impl CapitalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger seeded with starting balances.
    pub fn with_balances(balances: impl IntoIterator<Item = (Asset, Decimal)>) -> Self {
        let ledger = Self::new();
        for (asset, amount) in balances {
            ledger.deposit(&asset, amount);
        }
        ledger
    }

    pub fn deposit(&self, asset: &Asset, amount: Decimal) {
        *self.balances.lock().entry(asset.clone()).or_default() += amount;
    }

    /// Unreserved balance of `asset`.
    pub fn available(&self, asset: &Asset) -> Decimal {
        self.balances.lock().get(asset).copied().unwrap_or_default()
    }

    /// All balances, including zero entries.
    pub fn snapshot(&self) -> HashMap<Asset, Decimal> {
        self.balances.lock().clone()
    }

    /// Debit `amount` of `asset` provisionally.
    pub fn reserve(&self, asset: &Asset, amount: Decimal) -> Result<Reservation, RouterError> {
        let mut balances = self.balances.lock();
        let available = balances.get(asset).copied().unwrap_or_default();
        if available < amount {
            return Err(RouterError::InsufficientCapital {
                asset: asset.clone(),
                available,
                required: amount,
            });
        }
        balances.insert(asset.clone(), available - amount);
        debug!(asset = %asset, amount = %amount, "capital reserved");
        Ok(Reservation {
            asset: asset.clone(),
            amount,
            balances: Arc::clone(&self.balances),
            settled: false,
        })
    }

    /// Finalize a reservation: the source stays debited and `received` of `dst` is credited.
    pub fn commit(&self, mut reservation: Reservation, dst: &Asset, received: Decimal) {
        reservation.settled = true;
        *self.balances.lock().entry(dst.clone()).or_default() += received;
        debug!(
            src = %reservation.asset,
            spent = %reservation.amount,
            dst = %dst,
            received = %received,
            "capital committed"
        );
    }

    /// Return a reservation's amount to the source asset.
    pub fn restore(&self, mut reservation: Reservation) {
        reservation.credit_back();
        debug!(asset = %reservation.asset, amount = %reservation.amount, "capital restored");
    }
}
