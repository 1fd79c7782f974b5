//! Simulated collaborators for tests and demos.
//!
//! Prices come from a fixed [`PriceTable`]. Every simulated provider can be
//! switched into a failing mode and given latency, and counts its calls.
//! Nothing here touches a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use keel_core::traits::{
    BalanceProvider, BridgeQuoteProvider, BroadcastService, CrossProtocolQuoteProvider, GasEstimator, PriceFeed,
    SwapQuoteProvider,
};
use keel_core::{
    Asset, ChainFamily, DepositInstruction, ExecutionCall, PriorityTier, ProtectedTx, ProviderError, ProviderSource,
    Quote, TxStatus,
};

/// Aggregator router contract the simulated swap asks to be called.
pub const SWAP_ROUTER: &str = "0x1111111254eeb25477b68fb85ed929f73a960582";
/// Bridge diamond contract the simulated bridge asks to be called.
pub const BRIDGE_ROUTER: &str = "0x1231deb6f5749ef6ce6943a275a1d3e7486f4eae";
/// EVM deposit address handed out by the simulated cross-protocol provider.
pub const EVM_DEPOSIT: &str = "0x000000000000000000000000000000000000dead";
/// UTXO deposit address handed out by the simulated cross-protocol provider.
pub const UTXO_DEPOSIT: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

/// USD prices by symbol. Chain pinning does not change the price.
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: HashMap<String, Decimal>,
}

impl Default for PriceTable {
    fn default() -> Self {
        let prices = [
            ("ETH", 3000),
            ("WETH", 3000),
            ("USDC", 1),
            ("USDT", 1),
            ("DAI", 1),
            ("WBTC", 60_000),
            ("LINK", 15),
            ("UNI", 8),
            ("BTC", 60_000),
        ];
        Self {
            prices: prices
                .iter()
                .map(|(s, p)| (s.to_string(), Decimal::from(*p)))
                .collect(),
        }
    }
}

impl PriceTable {
    pub fn with_price(mut self, symbol: &str, usd: Decimal) -> Self {
        self.prices.insert(symbol.to_uppercase(), usd);
        self
    }

    pub fn without(mut self, symbol: &str) -> Self {
        self.prices.remove(&symbol.to_uppercase());
        self
    }

    pub fn price(&self, asset: &Asset) -> Option<Decimal> {
        self.prices.get(asset.symbol()).copied()
    }

    /// Amount of `dst` worth `amount` of `src`, less `fee_bps`.
    pub fn convert(&self, src: &Asset, dst: &Asset, amount: Decimal, fee_bps: u32) -> Result<Decimal, ProviderError> {
        let unpriced = |a: &Asset| ProviderError::PriceUnavailable(a.to_string());
        let src_price = self.price(src).ok_or_else(|| unpriced(src))?;
        let dst_price = self.price(dst).ok_or_else(|| unpriced(dst))?;
        let overflow = || ProviderError::InvalidResponse("amount overflow".into());
        let gross = amount
            .checked_mul(src_price)
            .and_then(|v| v.checked_div(dst_price))
            .ok_or_else(overflow)?;
        let fee = gross
            .checked_mul(Decimal::from(fee_bps))
            .and_then(|v| v.checked_div(Decimal::from(10_000)))
            .ok_or_else(overflow)?;
        Ok(gross - fee)
    }
}

/// Latency, failure switch and call counter shared by every simulator.
#[derive(Debug, Default)]
struct Behaviour {
    latency: Duration,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl Behaviour {
    async fn call(&self, name: &str) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable(format!("{name} simulated outage")));
        }
        Ok(())
    }
}

macro_rules! simulated_controls {
    ($ty:ty) => {
        impl $ty {
            /// Delay every call by `latency`.
            pub fn with_latency(mut self, latency: Duration) -> Self {
                self.behaviour.latency = latency;
                self
            }

            /// Start in the failing mode.
            pub fn failing(self) -> Self {
                self.set_failing(true);
                self
            }

            pub fn set_failing(&self, failing: bool) {
                self.behaviour.failing.store(failing, Ordering::SeqCst);
            }

            /// Calls received so far, failed ones included.
            pub fn calls(&self) -> usize {
                self.behaviour.calls.load(Ordering::SeqCst)
            }
        }
    };
}

/// Same-chain aggregator quoting from a price table.
#[derive(Debug)]
pub struct SimulatedSwap {
    prices: PriceTable,
    fee_bps: u32,
    behaviour: Behaviour,
}

impl SimulatedSwap {
    pub fn new(prices: PriceTable) -> Self {
        Self {
            prices,
            fee_bps: 30,
            behaviour: Behaviour::default(),
        }
    }

    pub fn with_fee_bps(mut self, fee_bps: u32) -> Self {
        self.fee_bps = fee_bps;
        self
    }
}

simulated_controls!(SimulatedSwap);

#[async_trait]
impl SwapQuoteProvider for SimulatedSwap {
    async fn get_quote(
        &self,
        src: &Asset,
        dst: &Asset,
        amount: Decimal,
        wallet_address: &str,
    ) -> Result<Quote, ProviderError> {
        self.behaviour.call("swap").await?;
        let out = self.prices.convert(src, dst, amount, self.fee_bps)?;
        let call = ExecutionCall {
            to: SWAP_ROUTER.to_string(),
            data: format!("swap:{src}:{dst}:{amount}:{wallet_address}").into_bytes(),
        };
        Ok(Quote::new(src.clone(), dst.clone(), amount, out, ProviderSource::PrimaryAmm)
            .with_fees(Decimal::new(2, 3), amount * Decimal::from(self.fee_bps) / Decimal::from(10_000))
            .with_duration(15)
            .with_execution(call))
    }
}

/// Cross-chain EVM bridge. Transfer ids are `xfer-<n>`.
#[derive(Debug)]
pub struct SimulatedBridge {
    prices: PriceTable,
    behaviour: Behaviour,
    transfers: AtomicUsize,
}

impl SimulatedBridge {
    pub fn new(prices: PriceTable) -> Self {
        Self {
            prices,
            behaviour: Behaviour::default(),
            transfers: AtomicUsize::new(0),
        }
    }

    /// Transfers started through [`BridgeQuoteProvider::execute`].
    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }
}

simulated_controls!(SimulatedBridge);

#[async_trait]
impl BridgeQuoteProvider for SimulatedBridge {
    async fn get_quote(
        &self,
        from_chain: u64,
        to_chain: u64,
        from: &Asset,
        to: &Asset,
        amount: Decimal,
    ) -> Result<Quote, ProviderError> {
        self.behaviour.call("bridge").await?;
        let out = self.prices.convert(from, to, amount, 10)?;
        let call = ExecutionCall {
            to: BRIDGE_ROUTER.to_string(),
            data: format!("bridge:{from_chain}:{to_chain}:{amount}:").into_bytes(),
        };
        Ok(Quote::new(from.clone(), to.clone(), amount, out, ProviderSource::CrossChainBridge)
            .with_fees(Decimal::new(5, 3), Decimal::ZERO)
            .with_duration(180)
            .with_execution(call))
    }

    async fn execute(&self, _quote: &Quote, _wallet_address: &str) -> Result<String, ProviderError> {
        self.behaviour.call("bridge").await?;
        let n = self.transfers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("xfer-{n}"))
    }
}

/// Cross-protocol swap service between EVM assets and BTC.
#[derive(Debug)]
pub struct SimulatedCrossProtocol {
    prices: PriceTable,
    behaviour: Behaviour,
    swaps: AtomicUsize,
    deposit_override: Mutex<Option<String>>,
}

impl SimulatedCrossProtocol {
    pub fn new(prices: PriceTable) -> Self {
        Self {
            prices,
            behaviour: Behaviour::default(),
            swaps: AtomicUsize::new(0),
            deposit_override: Mutex::new(None),
        }
    }

    /// Hand out `address` as the deposit address for every swap.
    pub fn set_deposit_address(&self, address: &str) {
        *self.deposit_override.lock() = Some(address.to_string());
    }

    /// Swaps started through [`CrossProtocolQuoteProvider::initiate_swap`].
    pub fn swaps(&self) -> usize {
        self.swaps.load(Ordering::SeqCst)
    }
}

simulated_controls!(SimulatedCrossProtocol);

#[async_trait]
impl CrossProtocolQuoteProvider for SimulatedCrossProtocol {
    async fn get_quote(&self, src: &Asset, dst: &Asset, amount: Decimal) -> Result<Quote, ProviderError> {
        self.behaviour.call("cross-protocol").await?;
        let out = self.prices.convert(src, dst, amount, 50)?;
        Ok(Quote::new(src.clone(), dst.clone(), amount, out, ProviderSource::CrossProtocolBridge)
            .with_fees(Decimal::new(1, 4), amount * Decimal::new(5, 3))
            .with_duration(600))
    }

    async fn initiate_swap(
        &self,
        src: &Asset,
        _dst: &Asset,
        amount: Decimal,
        _dest_address: &str,
    ) -> Result<DepositInstruction, ProviderError> {
        self.behaviour.call("cross-protocol").await?;
        let n = self.swaps.fetch_add(1, Ordering::SeqCst) + 1;
        let deposit_address = match self.deposit_override.lock().clone() {
            Some(address) => address,
            None => match src.family() {
                Some(ChainFamily::Utxo) => UTXO_DEPOSIT.to_string(),
                _ => EVM_DEPOSIT.to_string(),
            },
        };
        Ok(DepositInstruction {
            deposit_address,
            amount,
            memo: Some(format!("keel:{n}")),
        })
    }
}

/// Balance source answering from a fixed table. Unknown addresses hold zero.
#[derive(Debug, Default)]
pub struct StaticBalances {
    balances: Mutex<HashMap<ChainFamily, Decimal>>,
    behaviour: Behaviour,
}

impl StaticBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, family: ChainFamily, amount: Decimal) -> Self {
        self.balances.lock().insert(family, amount);
        self
    }
}

simulated_controls!(StaticBalances);

#[async_trait]
impl BalanceProvider for StaticBalances {
    async fn get_balance(&self, _address: &str, family: ChainFamily) -> Result<Decimal, ProviderError> {
        self.behaviour.call("balances").await?;
        Ok(self.balances.lock().get(&family).copied().unwrap_or_default())
    }
}

/// Price feed over a [`PriceTable`].
#[derive(Debug, Default)]
pub struct StaticPrices {
    prices: PriceTable,
    behaviour: Behaviour,
}

impl StaticPrices {
    pub fn new(prices: PriceTable) -> Self {
        Self {
            prices,
            behaviour: Behaviour::default(),
        }
    }
}

simulated_controls!(StaticPrices);

#[async_trait]
impl PriceFeed for StaticPrices {
    async fn get_price(&self, asset: &Asset) -> Result<Decimal, ProviderError> {
        self.behaviour.call("prices").await?;
        self.prices
            .price(asset)
            .ok_or_else(|| ProviderError::PriceUnavailable(asset.to_string()))
    }
}

/// Gas estimator with one flat fee per tier.
#[derive(Debug)]
pub struct FlatGas {
    base: Decimal,
}

impl FlatGas {
    pub fn new(base: Decimal) -> Self {
        Self { base }
    }
}

#[async_trait]
impl GasEstimator for FlatGas {
    async fn get_estimated_fee(&self, _chain_id: u64, tier: PriorityTier) -> Result<Decimal, ProviderError> {
        let factor = match tier {
            PriorityTier::Low => Decimal::new(8, 1),
            PriorityTier::Standard => Decimal::ONE,
            PriorityTier::Fast => Decimal::new(15, 1),
        };
        Ok(self.base * factor)
    }
}

/// Broadcast service that accepts everything and confirms on the first status poll.
#[derive(Debug, Default)]
pub struct SimulatedBroadcast {
    submitted: Mutex<Vec<ProtectedTx>>,
    reject: AtomicBool,
    fail_on_status: AtomicBool,
    behaviour: Behaviour,
}

impl SimulatedBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `submit` with [`TxStatus::Failed`].
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Answer `status` with [`TxStatus::Failed`].
    pub fn set_fail_on_status(&self, fail: bool) {
        self.fail_on_status.store(fail, Ordering::SeqCst);
    }

    /// Every transaction submitted so far, in order.
    pub fn submitted(&self) -> Vec<ProtectedTx> {
        self.submitted.lock().clone()
    }
}

simulated_controls!(SimulatedBroadcast);

#[async_trait]
impl BroadcastService for SimulatedBroadcast {
    async fn submit(&self, tx: &ProtectedTx) -> Result<TxStatus, ProviderError> {
        self.behaviour.call("broadcast").await?;
        self.submitted.lock().push(tx.clone());
        if self.reject.load(Ordering::SeqCst) {
            return Ok(TxStatus::Failed);
        }
        Ok(TxStatus::Pending)
    }

    async fn status(&self, hash: &str) -> Result<TxStatus, ProviderError> {
        if !self.submitted.lock().iter().any(|tx| tx.handle.hash == hash) {
            return Err(ProviderError::InvalidResponse(format!("unknown transaction {hash}")));
        }
        if self.fail_on_status.load(Ordering::SeqCst) {
            return Ok(TxStatus::Failed);
        }
        Ok(TxStatus::Confirmed)
    }
}
