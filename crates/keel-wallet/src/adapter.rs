//! The per-family wallet capability and its snapshot view.

use async_trait::async_trait;
use rust_decimal::Decimal;

use keel_core::traits::BalanceProvider;
use keel_core::{ChainFamily, SignedTx, TxRequest};

use crate::error::WalletError;

/// Address, balance, and signing for one chain family.
#[async_trait]
pub trait ChainWallet: Send + Sync {
    fn family(&self) -> ChainFamily;

    fn address(&self) -> &str;

    fn derivation_path(&self) -> &str;

    /// Whether `address` is well formed for this family.
    fn is_valid_address(&self, address: &str) -> bool;

    /// Sign `tx`. Fails when the request targets another family.
    fn sign(&self, tx: &TxRequest) -> Result<SignedTx, WalletError>;

    /// Native balance of this wallet's address.
    async fn balance(&self, provider: &dyn BalanceProvider) -> Result<Decimal, WalletError> {
        Ok(provider.get_balance(self.address(), self.family()).await?)
    }
}

/// Reject a request meant for another family.
pub(crate) fn ensure_family(expected: ChainFamily, tx: &TxRequest) -> Result<(), WalletError> {
    if tx.family != expected {
        return Err(WalletError::Signing(format!(
            "{} wallet cannot sign a {} transaction",
            expected, tx.family
        )));
    }
    Ok(())
}

/// Snapshot of one wallet with its last fetched balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wallet {
    pub address: String,
    pub chain_family: ChainFamily,
    pub derivation_path: String,
    pub cached_balance: Decimal,
}

impl Wallet {
    pub fn of(wallet: &dyn ChainWallet, cached_balance: Decimal) -> Self {
        Self {
            address: wallet.address().to_string(),
            chain_family: wallet.family(),
            derivation_path: wallet.derivation_path().to_string(),
            cached_balance,
        }
    }
}
