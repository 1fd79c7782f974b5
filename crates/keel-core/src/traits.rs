//! Trait interfaces for external collaborators.
//!
//! These traits define the seams between Keel and the outside world:
//! - [`PriceFeed`]: spot prices for portfolio valuation
//! - [`SwapQuoteProvider`]: same-chain aggregator quotes
//! - [`BridgeQuoteProvider`]: cross-chain EVM bridge quotes and execution
//! - [`CrossProtocolQuoteProvider`]: settlement-asset swap quotes and deposits
//! - [`BalanceProvider`]: on-chain balance lookups
//! - [`GasEstimator`]: fee estimates for display
//! - [`BroadcastService`]: protected transaction dispatch and confirmation
//!
//! Every method is a suspension point. Callers bound each call with a
//! timeout and treat an elapsed timeout as [`ProviderError::Timeout`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::asset::{Asset, ChainFamily};
use crate::error::ProviderError;
use crate::quote::Quote;
use crate::tx::{DepositInstruction, PriorityTier, ProtectedTx, TxStatus};

/// Spot prices in a common quote currency.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Price of one unit of `asset`.
    async fn get_price(&self, asset: &Asset) -> Result<Decimal, ProviderError>;

    /// Prices for many assets. Results may be partial: assets without a
    /// price are simply absent from the map.
    ///
    /// Default implementation queries [`get_price`](Self::get_price) one
    /// asset at a time and keeps the successes.
    async fn get_batch_prices(
        &self,
        assets: &[Asset],
    ) -> Result<HashMap<Asset, Decimal>, ProviderError> {
        let mut prices = HashMap::with_capacity(assets.len());
        for asset in assets {
            if let Ok(price) = self.get_price(asset).await {
                prices.insert(asset.clone(), price);
            }
        }
        Ok(prices)
    }
}

/// Same-chain aggregator.
#[async_trait]
pub trait SwapQuoteProvider: Send + Sync {
    /// Quote for selling `amount` of `src` for `dst` from `wallet_address`.
    async fn get_quote(
        &self,
        src: &Asset,
        dst: &Asset,
        amount: Decimal,
        wallet_address: &str,
    ) -> Result<Quote, ProviderError>;
}

/// Cross-chain EVM bridge.
#[async_trait]
pub trait BridgeQuoteProvider: Send + Sync {
    async fn get_quote(
        &self,
        from_chain: u64,
        to_chain: u64,
        from: &Asset,
        to: &Asset,
        amount: Decimal,
    ) -> Result<Quote, ProviderError>;

    /// Start the transfer described by `quote`. Returns the bridge transfer id.
    async fn execute(&self, quote: &Quote, wallet_address: &str) -> Result<String, ProviderError>;
}

/// Cross-protocol swaps between EVM assets and the settlement asset.
#[async_trait]
pub trait CrossProtocolQuoteProvider: Send + Sync {
    async fn get_quote(
        &self,
        src: &Asset,
        dst: &Asset,
        amount: Decimal,
    ) -> Result<Quote, ProviderError>;

    /// Open a swap paying out to `dest_address`. The caller funds it by
    /// transferring to the returned deposit address.
    async fn initiate_swap(
        &self,
        src: &Asset,
        dst: &Asset,
        amount: Decimal,
        dest_address: &str,
    ) -> Result<DepositInstruction, ProviderError>;
}

/// Native-asset balance lookups.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn get_balance(&self, address: &str, family: ChainFamily) -> Result<Decimal, ProviderError>;
}

/// Fee estimates in the chain's native asset.
#[async_trait]
pub trait GasEstimator: Send + Sync {
    async fn get_estimated_fee(
        &self,
        chain_id: u64,
        tier: PriorityTier,
    ) -> Result<Decimal, ProviderError>;
}

/// Dispatch and confirmation of protected transactions.
#[async_trait]
pub trait BroadcastService: Send + Sync {
    /// Hand a protected transaction to the relay.
    async fn submit(&self, tx: &ProtectedTx) -> Result<TxStatus, ProviderError>;

    /// Current status of a previously submitted transaction.
    async fn status(&self, hash: &str) -> Result<TxStatus, ProviderError>;
}
