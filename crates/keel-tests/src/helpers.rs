//! Shared fixtures for integration tests.

use std::sync::Arc;

use rust_decimal::Decimal;

use keel_core::AssetPair;
use keel_router::testing::{
    FlatGas, PriceTable, SimulatedBridge, SimulatedBroadcast, SimulatedCrossProtocol, SimulatedSwap,
    StaticBalances,
};
use keel_router::{ExecutionRouter, ProviderSet, QuoteAggregator, RouterConfig};
use keel_wallet::AgentWalletManager;

/// BIP-39 test mnemonic ("abandon" x11 + "about").
pub const ABANDON: &str = "abandon abandon abandon abandon abandon abandon \
                           abandon abandon abandon abandon abandon about";

/// EVM address of [`ABANDON`] at `m/44'/60'/0'/0/0`.
pub const ABANDON_EVM: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";

/// P2WPKH address of [`ABANDON`] at `m/84'/0'/0'/0/0`.
pub const ABANDON_UTXO: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";

pub fn pair(src: &str, dst: &str) -> AssetPair {
    AssetPair::parse(src, dst).unwrap()
}

pub fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

/// A router wired to simulated collaborators, with handles to each of them.
pub struct Harness {
    pub router: ExecutionRouter,
    pub wallets: Arc<AgentWalletManager>,
    pub quotes: Arc<QuoteAggregator>,
    pub balances: Arc<StaticBalances>,
    pub swap: Arc<SimulatedSwap>,
    pub swap_fallback: Option<Arc<SimulatedSwap>>,
    pub bridge: Arc<SimulatedBridge>,
    pub cross_protocol: Arc<SimulatedCrossProtocol>,
    pub broadcast: Arc<SimulatedBroadcast>,
}

impl Harness {
    /// Default harness: every provider healthy, 10 ETH / 10 000 USDC / 1 BTC of capital.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HarnessBuilder {
    config: RouterConfig,
    balances: StaticBalances,
    swap: SimulatedSwap,
    swap_fallback: Option<SimulatedSwap>,
    bridge: SimulatedBridge,
    cross_protocol: SimulatedCrossProtocol,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        let mut config = RouterConfig::default();
        for (asset, amount) in [("ETH", 10), ("USDC", 10_000), ("BTC", 1)] {
            config.initial_capital.insert(asset.to_string(), dec(amount));
        }
        Self {
            config,
            balances: StaticBalances::new(),
            swap: SimulatedSwap::new(PriceTable::default()),
            swap_fallback: None,
            bridge: SimulatedBridge::new(PriceTable::default()),
            cross_protocol: SimulatedCrossProtocol::new(PriceTable::default()),
        }
    }
}

impl HarnessBuilder {
    /// Replace all starting capital.
    pub fn capital(mut self, capital: &[(&str, i64)]) -> Self {
        self.config.initial_capital = capital
            .iter()
            .map(|(asset, amount)| (asset.to_string(), dec(*amount)))
            .collect();
        self
    }

    pub fn provider_timeout_ms(mut self, ms: u64) -> Self {
        self.config.provider_timeout_ms = ms;
        self
    }

    pub fn balances(mut self, balances: StaticBalances) -> Self {
        self.balances = balances;
        self
    }

    pub fn swap(mut self, swap: SimulatedSwap) -> Self {
        self.swap = swap;
        self
    }

    pub fn swap_fallback(mut self, swap: SimulatedSwap) -> Self {
        self.swap_fallback = Some(swap);
        self
    }

    pub fn bridge(mut self, bridge: SimulatedBridge) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn cross_protocol(mut self, cross_protocol: SimulatedCrossProtocol) -> Self {
        self.cross_protocol = cross_protocol;
        self
    }

    pub fn build(self) -> Harness {
        let balances = Arc::new(self.balances);
        let wallets = Arc::new(
            AgentWalletManager::from_phrase(ABANDON, balances.clone()).unwrap(),
        );
        let swap = Arc::new(self.swap);
        let swap_fallback = self.swap_fallback.map(Arc::new);
        let bridge = Arc::new(self.bridge);
        let cross_protocol = Arc::new(self.cross_protocol);
        let broadcast = Arc::new(SimulatedBroadcast::new());

        let mut providers = ProviderSet::new()
            .with_swap(swap.clone())
            .with_bridge(bridge.clone())
            .with_cross_protocol(cross_protocol.clone())
            .with_gas(Arc::new(FlatGas::new(Decimal::new(21, 4))));
        if let Some(fallback) = &swap_fallback {
            providers = providers.with_swap_fallback(fallback.clone());
        }
        let quotes = Arc::new(QuoteAggregator::new(providers, self.config.provider_timeout()));
        let router = ExecutionRouter::new(&self.config, wallets.clone(), quotes.clone(), broadcast.clone()).unwrap();

        Harness {
            router,
            wallets,
            quotes,
            balances,
            swap,
            swap_fallback,
            bridge,
            cross_protocol,
            broadcast,
        }
    }
}
