//! Agent wallet manager.
//!
//! Owns one mnemonic, the seed derived from it, and the EVM and UTXO wallets
//! at account 0. Key material never leaves the manager except through
//! [`AgentWalletManager::export_security`]; the router signs through
//! [`AgentWalletManager::sign`].

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use keel_core::error::ProviderError;
use keel_core::traits::{BalanceProvider, PriceFeed};
use keel_core::{Asset, ChainFamily, SignedTx, TxRequest};

use crate::adapter::{ChainWallet, Wallet};
use crate::error::WalletError;
use crate::evm::EvmWallet;
use crate::keys::{path_template, KeyDerivationEngine, Seed};
use crate::mnemonic::{Mnemonic, SeedManager};
use crate::utxo::UtxoWallet;

/// Default deadline for one balance query.
pub const DEFAULT_BALANCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Account index used for agent wallets.
const AGENT_ACCOUNT: u32 = 0;

/// Secret backup material handed out by [`AgentWalletManager::export_security`].
pub struct SecurityExport {
    /// The recovery phrase. Zeroized on drop.
    pub mnemonic: Zeroizing<String>,
    /// Derivation path template per family.
    pub derivation_path_templates: Vec<(ChainFamily, &'static str)>,
}

impl fmt::Debug for SecurityExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityExport")
            .field("mnemonic", &"[REDACTED]")
            .field("derivation_path_templates", &self.derivation_path_templates)
            .finish()
    }
}

/// Valuation of cached balances.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortfolioValue {
    /// Sum over priced holdings.
    pub total: Decimal,
    /// Value per family for holdings that had a price.
    pub priced: Vec<(ChainFamily, Decimal)>,
    /// Native assets that could not be priced.
    pub unpriced: Vec<Asset>,
}

/// Everything derived by [`AgentWalletManager::initialize`]. The seed is
/// zeroized when the last reference goes away.
struct WalletSet {
    seed: Seed,
    evm: EvmWallet,
    utxo: UtxoWallet,
}

impl WalletSet {
    fn get(&self, family: ChainFamily) -> &dyn ChainWallet {
        match family {
            ChainFamily::Evm => &self.evm,
            ChainFamily::Utxo => &self.utxo,
        }
    }
}

pub struct AgentWalletManager {
    mnemonic: Mnemonic,
    engine: KeyDerivationEngine,
    balances: Arc<dyn BalanceProvider>,
    balance_timeout: RwLock<Duration>,
    wallets: RwLock<Option<Arc<WalletSet>>>,
    cached: Mutex<HashMap<ChainFamily, Decimal>>,
}

impl AgentWalletManager {
    /// Manager over a freshly generated mnemonic.
    pub fn generate(balances: Arc<dyn BalanceProvider>) -> Self {
        Self::from_mnemonic(SeedManager::generate(), balances)
    }

    /// Manager over an existing phrase.
    pub fn from_phrase(phrase: &str, balances: Arc<dyn BalanceProvider>) -> Result<Self, WalletError> {
        Ok(Self::from_mnemonic(SeedManager::from_phrase(phrase)?, balances))
    }

    pub fn from_mnemonic(mnemonic: Mnemonic, balances: Arc<dyn BalanceProvider>) -> Self {
        Self {
            mnemonic,
            engine: KeyDerivationEngine::new(),
            balances,
            balance_timeout: RwLock::new(DEFAULT_BALANCE_TIMEOUT),
            wallets: RwLock::new(None),
            cached: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_balance_timeout(self, timeout: Duration) -> Self {
        self.set_balance_timeout(timeout);
        self
    }

    /// Replace the deadline for balance queries on a shared manager.
    pub fn set_balance_timeout(&self, timeout: Duration) {
        *self.balance_timeout.write() = timeout;
    }

    pub fn balance_timeout(&self) -> Duration {
        *self.balance_timeout.read()
    }

    /// Derive the account-0 wallet of each family. Calling it again is a no-op.
    pub fn initialize(&self) -> Result<(), WalletError> {
        let mut slot = self.wallets.write();
        if slot.is_some() {
            debug!("wallet manager already initialized");
            return Ok(());
        }

        let seed = SeedManager::to_seed(&self.mnemonic);
        let evm = EvmWallet::from_key(self.engine.derive_key(&seed, ChainFamily::Evm, AGENT_ACCOUNT)?)?;
        let utxo =
            UtxoWallet::from_key(self.engine.derive_key(&seed, ChainFamily::Utxo, AGENT_ACCOUNT)?)?;

        info!(evm = %evm.address(), utxo = %utxo.address(), "agent wallets initialized");
        *slot = Some(Arc::new(WalletSet { seed, evm, utxo }));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.wallets.read().is_some()
    }

    fn set(&self) -> Result<Arc<WalletSet>, WalletError> {
        self.wallets.read().clone().ok_or(WalletError::NotInitialized)
    }

    /// Both wallets with balances refreshed from the balance provider.
    ///
    /// One balance query per wallet, each bounded by the balance timeout.
    pub async fn wallets(&self) -> Result<Vec<Wallet>, WalletError> {
        let set = self.set()?;
        let (evm, utxo) = tokio::join!(
            self.fetch_balance(set.get(ChainFamily::Evm)),
            self.fetch_balance(set.get(ChainFamily::Utxo)),
        );
        let evm = evm?;
        let utxo = utxo?;

        let mut cached = self.cached.lock();
        cached.insert(ChainFamily::Evm, evm);
        cached.insert(ChainFamily::Utxo, utxo);
        drop(cached);

        Ok(vec![
            Wallet::of(set.get(ChainFamily::Evm), evm),
            Wallet::of(set.get(ChainFamily::Utxo), utxo),
        ])
    }

    async fn fetch_balance(&self, wallet: &dyn ChainWallet) -> Result<Decimal, WalletError> {
        let timeout = self.balance_timeout();
        match tokio::time::timeout(timeout, wallet.balance(&*self.balances)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(family = %wallet.family(), "balance query timed out");
                Err(ProviderError::Timeout {
                    provider: "balance".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }

    /// Both wallets with the balances from the last refresh (zero if never refreshed).
    pub fn cached_wallets(&self) -> Result<Vec<Wallet>, WalletError> {
        let set = self.set()?;
        let cached = self.cached.lock();
        Ok(ChainFamily::ALL
            .iter()
            .map(|f| Wallet::of(set.get(*f), cached.get(f).copied().unwrap_or_default()))
            .collect())
    }

    pub fn address(&self, family: ChainFamily) -> Result<String, WalletError> {
        Ok(self.set()?.get(family).address().to_string())
    }

    /// Address of `family` at another account index, derived from the held seed.
    pub fn account_address(&self, family: ChainFamily, account: u32) -> Result<String, WalletError> {
        let set = self.set()?;
        let key = self.engine.derive_key(&set.seed, family, account)?;
        let address = match family {
            ChainFamily::Evm => EvmWallet::from_key(key)?.address().to_string(),
            ChainFamily::Utxo => UtxoWallet::from_key(key)?.address().to_string(),
        };
        Ok(address)
    }

    pub fn is_valid_address(&self, family: ChainFamily, address: &str) -> Result<bool, WalletError> {
        Ok(self.set()?.get(family).is_valid_address(address))
    }

    /// Sign `tx` with the wallet of `family`.
    pub fn sign(&self, family: ChainFamily, tx: &TxRequest) -> Result<SignedTx, WalletError> {
        let signed = self.set()?.get(family).sign(tx)?;
        debug!(family = %family, hash = %signed.hash, nonce = tx.nonce, "signed transaction");
        Ok(signed)
    }

    /// Hand out the recovery phrase and path templates.
    pub fn export_security(&self) -> SecurityExport {
        warn!("security material exported");
        SecurityExport {
            mnemonic: self.mnemonic.phrase(),
            derivation_path_templates: ChainFamily::ALL
                .iter()
                .map(|f| (*f, path_template(*f)))
                .collect(),
        }
    }

    /// Value cached native balances. Missing prices are reported, not fatal.
    pub async fn portfolio_value(&self, feed: &dyn PriceFeed) -> Result<PortfolioValue, WalletError> {
        let holdings: Vec<(ChainFamily, Asset, Decimal)> = {
            let cached = self.cached.lock();
            ChainFamily::ALL
                .iter()
                .map(|f| {
                    (
                        *f,
                        Asset::new(f.native_symbol()),
                        cached.get(f).copied().unwrap_or_default(),
                    )
                })
                .collect()
        };
        let assets: Vec<Asset> = holdings.iter().map(|(_, a, _)| a.clone()).collect();
        let prices = match feed.get_batch_prices(&assets).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!(error = %e, "price feed unavailable");
                HashMap::new()
            }
        };

        let mut value = PortfolioValue::default();
        for (family, asset, balance) in holdings {
            match prices.get(&asset) {
                Some(price) => {
                    let v = balance * *price;
                    value.total += v;
                    value.priced.push((family, v));
                }
                None => value.unpriced.push(asset),
            }
        }
        Ok(value)
    }
}

impl fmt::Debug for AgentWalletManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentWalletManager")
            .field("initialized", &self.is_initialized())
            .field("balance_timeout", &self.balance_timeout())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::tests::ABANDON;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBalances {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FixedBalances {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl BalanceProvider for FixedBalances {
        async fn get_balance(&self, _address: &str, family: ChainFamily) -> Result<Decimal, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(match family {
                ChainFamily::Evm => Decimal::new(2, 0),
                ChainFamily::Utxo => Decimal::new(5, 1),
            })
        }
    }

    struct EthOnlyPrices;

    #[async_trait]
    impl PriceFeed for EthOnlyPrices {
        async fn get_price(&self, asset: &Asset) -> Result<Decimal, ProviderError> {
            if asset.symbol() == "ETH" {
                Ok(Decimal::new(3000, 0))
            } else {
                Err(ProviderError::PriceUnavailable(asset.to_string()))
            }
        }
    }

    fn manager(balances: Arc<FixedBalances>) -> AgentWalletManager {
        AgentWalletManager::from_phrase(ABANDON, balances).unwrap()
    }

    #[test]
    fn uninitialized_manager_refuses_work() {
        let m = manager(FixedBalances::new());
        assert_eq!(m.address(ChainFamily::Evm), Err(WalletError::NotInitialized));
        assert!(!m.is_initialized());
    }

    #[test]
    fn initialize_is_idempotent() {
        let m = manager(FixedBalances::new());
        m.initialize().unwrap();
        let first = m.address(ChainFamily::Evm).unwrap();
        m.initialize().unwrap();
        assert_eq!(m.address(ChainFamily::Evm).unwrap(), first);
        assert_eq!(first, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
        assert_eq!(
            m.address(ChainFamily::Utxo).unwrap(),
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
        );
    }

    #[test]
    fn held_seed_derives_further_accounts() {
        let m = manager(FixedBalances::new());
        assert_eq!(m.account_address(ChainFamily::Evm, 1), Err(WalletError::NotInitialized));
        m.initialize().unwrap();
        for family in ChainFamily::ALL {
            assert_eq!(m.account_address(family, 0).unwrap(), m.address(family).unwrap());
            assert_ne!(m.account_address(family, 1).unwrap(), m.address(family).unwrap());
        }
    }

    #[tokio::test]
    async fn shared_manager_timeout_can_be_replaced() {
        let balances = Arc::new(FixedBalances {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(200),
        });
        let m = Arc::new(manager(balances));
        m.initialize().unwrap();
        assert_eq!(m.balance_timeout(), DEFAULT_BALANCE_TIMEOUT);
        m.set_balance_timeout(Duration::from_millis(10));
        let err = m.wallets().await.unwrap_err();
        assert!(matches!(err, WalletError::Balance(ProviderError::Timeout { timeout_ms: 10, .. })));
    }

    #[test]
    fn invalid_phrase_is_rejected() {
        let err = AgentWalletManager::from_phrase("not a phrase", FixedBalances::new()).unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(_)));
    }

    #[tokio::test]
    async fn wallets_query_each_balance_once() {
        let balances = FixedBalances::new();
        let m = manager(balances.clone());
        m.initialize().unwrap();
        let wallets = m.wallets().await.unwrap();
        assert_eq!(balances.calls.load(Ordering::SeqCst), 2);
        assert_eq!(wallets.len(), 2);
        assert_eq!(wallets[0].chain_family, ChainFamily::Evm);
        assert_eq!(wallets[0].cached_balance, Decimal::new(2, 0));
        assert_eq!(wallets[1].derivation_path, "m/84'/0'/0'/0/0");
        assert_eq!(m.cached_wallets().unwrap(), wallets);
    }

    #[tokio::test]
    async fn slow_balance_query_times_out() {
        let balances = Arc::new(FixedBalances {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(200),
        });
        let m = manager(balances).with_balance_timeout(Duration::from_millis(10));
        m.initialize().unwrap();
        let err = m.wallets().await.unwrap_err();
        assert!(matches!(err, WalletError::Balance(ProviderError::Timeout { .. })));
    }

    #[test]
    fn sign_uses_family_wallet() {
        let m = manager(FixedBalances::new());
        m.initialize().unwrap();
        let tx = TxRequest::new(
            ChainFamily::Evm,
            Some(1),
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            Asset::new("USDC"),
            Decimal::ONE,
        );
        assert_eq!(m.sign(ChainFamily::Evm, &tx).unwrap().family, ChainFamily::Evm);
        assert!(m.sign(ChainFamily::Utxo, &tx).is_err());
    }

    #[test]
    fn export_security_returns_phrase_and_templates() {
        let m = manager(FixedBalances::new());
        let export = m.export_security();
        assert_eq!(*export.mnemonic, ABANDON.split_whitespace().collect::<Vec<_>>().join(" "));
        assert_eq!(
            export.derivation_path_templates,
            vec![
                (ChainFamily::Evm, "m/44'/60'/{account}'/0/0"),
                (ChainFamily::Utxo, "m/84'/0'/{account}'/0/0"),
            ]
        );
        assert!(!format!("{export:?}").contains("abandon"));
    }

    #[tokio::test]
    async fn portfolio_tolerates_missing_prices() {
        let m = manager(FixedBalances::new());
        m.initialize().unwrap();
        m.wallets().await.unwrap();
        let value = m.portfolio_value(&EthOnlyPrices).await.unwrap();
        assert_eq!(value.total, Decimal::new(6000, 0));
        assert_eq!(value.priced, vec![(ChainFamily::Evm, Decimal::new(6000, 0))]);
        assert_eq!(value.unpriced, vec![Asset::new("BTC")]);
    }
}
