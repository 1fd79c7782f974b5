//! Execution router: classification, quoting and execution per asset pair.
//!
//! Each attempt walks `Idle → Classifying → QuotingInProgress → Quoted →
//! Executing → Completed | Failed`. Attempts for one pair hold that pair's
//! lock for their whole lifetime, so they never interleave; different pairs
//! run concurrently. Unsupported pairs are rejected before any lock or state
//! is created, and a pair's lock is dropped once no attempt holds or awaits it.
//!
//! Dropping the caller's future before `Executing` cancels the attempt and
//! returns the pair to `Idle`. From `Executing` on, the work runs in a
//! spawned task that owns the pair lock, so the capital ledger and the
//! execution log are settled exactly once even if the caller goes away.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as PairLock, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use keel_core::traits::BroadcastService;
use keel_core::{
    classify, AssetPair, ChainFamily, ExecutionRecord, PriorityTier, ProtectedTxHandle, ProviderError, Quote,
    RouteCategory, TxRequest, TxStatus,
};
use keel_wallet::AgentWalletManager;

use crate::aggregator::{with_deadline, QuoteAggregator};
use crate::capital::CapitalLedger;
use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::protection::ProtectionWrapper;
use crate::records::ExecutionLog;
use crate::state::{RouteState, StateTable};

/// Cheaply cloneable handle to one router instance.
#[derive(Clone)]
pub struct ExecutionRouter {
    inner: Arc<Inner>,
}

struct Inner {
    wallets: Arc<AgentWalletManager>,
    quotes: Arc<QuoteAggregator>,
    protection: ProtectionWrapper,
    broadcast: Arc<dyn BroadcastService>,
    ledger: CapitalLedger,
    log: ExecutionLog,
    states: StateTable,
    pair_locks: Arc<PairLocks>,
    nonces: Mutex<HashMap<ChainFamily, u64>>,
    provider_timeout: Duration,
    default_chain_id: u64,
}

struct PairSlot {
    lock: Arc<PairLock<()>>,
    /// Attempts holding or waiting for `lock`.
    users: usize,
}

/// One lock per pair with an attempt in progress.
#[derive(Default)]
struct PairLocks {
    slots: Mutex<HashMap<AssetPair, PairSlot>>,
}

impl PairLocks {
    /// Wait for exclusive use of `pair`.
    async fn acquire(locks: &Arc<PairLocks>, pair: &AssetPair) -> PairLease {
        let lock = {
            let mut slots = locks.slots.lock();
            let slot = slots.entry(pair.clone()).or_insert_with(|| PairSlot {
                lock: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.lock)
        };
        let mut lease = PairLease {
            locks: Arc::clone(locks),
            pair: pair.clone(),
            guard: None,
        };
        lease.guard = Some(lock.lock_owned().await);
        lease
    }

    fn release(&self, pair: &AssetPair) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(pair) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(pair);
            }
        }
    }

    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Exclusive use of one pair. Also counts while still waiting, so a caller
/// cancelled in the queue is released too.
struct PairLease {
    locks: Arc<PairLocks>,
    pair: AssetPair,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PairLease {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(&self.pair);
    }
}

/// Why an execution attempt failed, with whatever it produced before failing.
struct Failure {
    reason: String,
    handle: Option<ProtectedTxHandle>,
    reference: Option<String>,
}

impl Failure {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            handle: None,
            reference: None,
        }
    }

    fn with_handle(mut self, handle: ProtectedTxHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    fn with_reference(mut self, reference: Option<String>) -> Self {
        if self.reference.is_none() {
            self.reference = reference;
        }
        self
    }
}

/// A dispatched transaction and the provider reference it belongs to.
struct Dispatched {
    handle: ProtectedTxHandle,
    reference: Option<String>,
}

/// Returns the pair to `Idle` when an attempt is abandoned before execution.
struct StateGuard<'a> {
    states: &'a StateTable,
    pair: &'a AssetPair,
}

impl<'a> StateGuard<'a> {
    fn enter(states: &'a StateTable, pair: &'a AssetPair) -> Self {
        states.transition(pair, RouteState::Classifying);
        Self { states, pair }
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        // Failed and Executing have no edge back to Idle; only an abandoned
        // attempt is reset here.
        if self.states.get(self.pair).can_transition_to(RouteState::Idle) {
            self.states.transition(self.pair, RouteState::Idle);
        }
    }
}

impl ExecutionRouter {
    /// Build a router. Initializes the wallets if they are not yet derived.
    pub fn new(
        config: &RouterConfig,
        wallets: Arc<AgentWalletManager>,
        quotes: Arc<QuoteAggregator>,
        broadcast: Arc<dyn BroadcastService>,
    ) -> Result<Self, RouterError> {
        config.validate()?;
        wallets.initialize()?;
        wallets.set_balance_timeout(config.balance_timeout());
        let protection = ProtectionWrapper::new(config.protection.clone(), config.status_timeout())?;
        let ledger = CapitalLedger::with_balances(config.capital()?);
        Ok(Self {
            inner: Arc::new(Inner {
                wallets,
                quotes,
                protection,
                broadcast,
                ledger,
                log: ExecutionLog::new(),
                states: StateTable::new(),
                pair_locks: Arc::default(),
                nonces: Mutex::new(HashMap::new()),
                provider_timeout: config.provider_timeout(),
                default_chain_id: config.default_chain_id,
            }),
        })
    }

    /// Current state of `pair`.
    pub fn state(&self, pair: &AssetPair) -> RouteState {
        self.inner.states.get(pair)
    }

    pub fn ledger(&self) -> &CapitalLedger {
        &self.inner.ledger
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.inner.log
    }

    /// Snapshot of every execution record so far.
    pub fn records(&self) -> Vec<Arc<ExecutionRecord>> {
        self.inner.log.snapshot()
    }

    pub fn wallets(&self) -> &Arc<AgentWalletManager> {
        &self.inner.wallets
    }

    pub fn protection(&self) -> &ProtectionWrapper {
        &self.inner.protection
    }

    /// Quote `pair` without executing. Does not touch the pair's state.
    pub async fn quote(&self, pair: &AssetPair, amount: Decimal) -> Result<Arc<Quote>, RouterError> {
        if amount <= Decimal::ZERO {
            return Err(RouterError::InvalidAmount(amount));
        }
        let category = classify(pair);
        if !category.is_supported() {
            return Err(RouterError::UnsupportedPair(pair.clone()));
        }
        self.inner.fetch_quote(pair, amount, category).await
    }

    /// Network fee estimate for trading out of `pair.src`. Non-EVM sources
    /// are estimated on the configured default chain.
    pub async fn estimated_fee(&self, pair: &AssetPair, tier: PriorityTier) -> Result<Decimal, ProviderError> {
        let chain_id = pair.src.evm_chain_id().unwrap_or(self.inner.default_chain_id);
        self.inner.quotes.estimated_fee(chain_id, tier).await
    }

    /// Quote many pairs concurrently. Results are in request order.
    pub async fn quote_all(&self, requests: Vec<(AssetPair, Decimal)>) -> Vec<Result<Arc<Quote>, RouterError>> {
        let tasks: Vec<_> = requests
            .into_iter()
            .map(|(pair, amount)| {
                let router = self.clone();
                let handle = tokio::spawn({
                    let pair = pair.clone();
                    async move { router.quote(&pair, amount).await }
                });
                (pair, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for (pair, handle) in tasks {
            results.push(handle.await.unwrap_or_else(|e| {
                Err(RouterError::QuoteUnavailable {
                    category: classify(&pair),
                    last_error: ProviderError::Unavailable(format!("quote task aborted: {e}")),
                })
            }));
        }
        results
    }

    /// Classify, quote and execute one trade of `amount` of `pair.src`.
    ///
    /// Unsupported pairs and quote failures return before any capital moves
    /// and write no record. Every attempt that reaches `Executing` writes
    /// exactly one [`ExecutionRecord`]; on failure the reserved capital is
    /// restored and [`RouterError::ExecutionFailed`] is returned.
    pub async fn quote_and_execute(
        &self,
        pair: &AssetPair,
        amount: Decimal,
    ) -> Result<Arc<ExecutionRecord>, RouterError> {
        if amount <= Decimal::ZERO {
            return Err(RouterError::InvalidAmount(amount));
        }
        let category = classify(pair);
        if !category.is_supported() {
            warn!(pair = %pair, "unsupported pair");
            return Err(RouterError::UnsupportedPair(pair.clone()));
        }
        let inner = &self.inner;
        let lease = PairLocks::acquire(&inner.pair_locks, pair).await;
        let _guard = StateGuard::enter(&inner.states, pair);
        inner.states.transition(pair, RouteState::QuotingInProgress);

        let quote = match inner.fetch_quote(pair, amount, category).await {
            Ok(quote) => quote,
            Err(e) => {
                inner.states.transition(pair, RouteState::Failed);
                warn!(pair = %pair, %category, error = %e, "quoting failed");
                return Err(e);
            }
        };
        inner.states.transition(pair, RouteState::Quoted);
        inner.states.transition(pair, RouteState::Executing);

        let order_id = Uuid::new_v4();
        info!(
            order = %order_id,
            pair = %pair,
            %category,
            amount = %amount,
            dst_amount = %quote.dst_amount,
            source = ?quote.provider_source,
            "executing"
        );

        let task = tokio::spawn({
            let inner = Arc::clone(inner);
            let pair = pair.clone();
            async move {
                let _lease = lease;
                inner.execute(order_id, &pair, amount, category, &quote).await
            }
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                let reason = format!("execution task aborted: {e}");
                error!(order = %order_id, pair = %pair, error = %e, "execution task aborted");
                inner
                    .log
                    .append(ExecutionRecord::failed(order_id, pair.clone(), amount, category, None, &reason));
                inner.states.transition(pair, RouteState::Failed);
                Err(RouterError::ExecutionFailed { order_id, reason })
            }
        }
    }
}

impl Inner {
    fn next_nonce(&self, family: ChainFamily) -> u64 {
        let mut nonces = self.nonces.lock();
        let next = nonces.entry(family).or_insert(0);
        let nonce = *next;
        *next += 1;
        nonce
    }

    async fn fetch_quote(
        &self,
        pair: &AssetPair,
        amount: Decimal,
        category: RouteCategory,
    ) -> Result<Arc<Quote>, RouterError> {
        let wallet = self.wallets.address(ChainFamily::Evm)?;
        self.quotes.quote(pair, amount, category, &wallet).await
    }

    async fn execute(
        &self,
        order_id: Uuid,
        pair: &AssetPair,
        amount: Decimal,
        category: RouteCategory,
        quote: &Quote,
    ) -> Result<Arc<ExecutionRecord>, RouterError> {
        let reservation = match self.ledger.reserve(&pair.src, amount) {
            Ok(reservation) => reservation,
            Err(e) => return Err(self.fail(order_id, pair, amount, category, quote, Failure::new(e.to_string()))),
        };

        match self.dispatch(pair, amount, category, quote).await {
            Ok(Dispatched { handle, reference }) => {
                self.ledger.commit(reservation, &pair.dst, quote.dst_amount);
                let record = self.log.append(
                    ExecutionRecord::completed(
                        order_id,
                        pair.clone(),
                        amount,
                        category,
                        quote.provider_source,
                        handle.clone(),
                    )
                    .with_reference(reference),
                );
                self.states.transition(pair, RouteState::Completed);
                info!(
                    order = %order_id,
                    pair = %pair,
                    tx = %handle.hash,
                    status = %handle.status,
                    protected = handle.protected,
                    "execution completed"
                );
                Ok(record)
            }
            Err(failure) => {
                self.ledger.restore(reservation);
                Err(self.fail(order_id, pair, amount, category, quote, failure))
            }
        }
    }

    /// Record a failed execution and move the pair to `Failed`.
    fn fail(
        &self,
        order_id: Uuid,
        pair: &AssetPair,
        amount: Decimal,
        category: RouteCategory,
        quote: &Quote,
        failure: Failure,
    ) -> RouterError {
        self.log.append(
            ExecutionRecord::failed(
                order_id,
                pair.clone(),
                amount,
                category,
                Some(quote.provider_source),
                &failure.reason,
            )
            .with_protected_tx(failure.handle)
            .with_reference(failure.reference),
        );
        self.states.transition(pair, RouteState::Failed);
        warn!(order = %order_id, pair = %pair, reason = %failure.reason, "execution failed");
        RouterError::ExecutionFailed {
            order_id,
            reason: failure.reason,
        }
    }

    async fn dispatch(
        &self,
        pair: &AssetPair,
        amount: Decimal,
        category: RouteCategory,
        quote: &Quote,
    ) -> Result<Dispatched, Failure> {
        let (request, reference) = self.build_request(pair, amount, category, quote).await?;
        match self.send(request).await {
            Ok(handle) => Ok(Dispatched { handle, reference }),
            Err(failure) => Err(failure.with_reference(reference)),
        }
    }

    /// The transaction that executes `quote`, and the provider reference it carries.
    async fn build_request(
        &self,
        pair: &AssetPair,
        amount: Decimal,
        category: RouteCategory,
        quote: &Quote,
    ) -> Result<(TxRequest, Option<String>), Failure> {
        match category {
            RouteCategory::SameChainAggregator => {
                let call = quote
                    .execution
                    .as_ref()
                    .ok_or_else(|| Failure::new("quote carries no execution call"))?;
                let request = TxRequest::new(
                    ChainFamily::Evm,
                    pair.src.evm_chain_id(),
                    &call.to,
                    pair.src.clone(),
                    amount,
                )
                .with_data(call.data.clone());
                Ok((request, None))
            }
            RouteCategory::CrossChainBridge => {
                let bridge = self
                    .quotes
                    .bridge_for(quote)
                    .ok_or_else(|| Failure::new("no bridge available for quote"))?;
                let call = quote
                    .execution
                    .as_ref()
                    .ok_or_else(|| Failure::new("quote carries no execution call"))?;
                let wallet = self
                    .wallets
                    .address(ChainFamily::Evm)
                    .map_err(|e| Failure::new(e.to_string()))?;
                let transfer_id = with_deadline("bridge-execute", self.provider_timeout, bridge.execute(quote, &wallet))
                    .await
                    .map_err(|e| Failure::new(format!("bridge execute failed: {e}")))?;

                let mut data = call.data.clone();
                data.extend_from_slice(transfer_id.as_bytes());
                let request = TxRequest::new(
                    ChainFamily::Evm,
                    pair.src.evm_chain_id(),
                    &call.to,
                    pair.src.clone(),
                    amount,
                )
                .with_data(data);
                Ok((request, Some(transfer_id)))
            }
            RouteCategory::CrossProtocolBridge => {
                let (Some(src_family), Some(dst_family)) = (pair.src.family(), pair.dst.family()) else {
                    return Err(Failure::new(format!("{pair} has no chain family")));
                };
                let provider = self
                    .quotes
                    .cross_protocol_for(quote)
                    .ok_or_else(|| Failure::new("no cross-protocol provider available for quote"))?;
                let dest_address = self
                    .wallets
                    .address(dst_family)
                    .map_err(|e| Failure::new(e.to_string()))?;
                let deposit = with_deadline(
                    "cross-protocol-initiate",
                    self.provider_timeout,
                    provider.initiate_swap(&pair.src, &pair.dst, amount, &dest_address),
                )
                .await
                .map_err(|e| Failure::new(format!("swap initiation failed: {e}")))?;

                let reference = Some(deposit.deposit_address.clone());
                let valid = self
                    .wallets
                    .is_valid_address(src_family, &deposit.deposit_address)
                    .map_err(|e| Failure::new(e.to_string()))?;
                if !valid {
                    return Err(
                        Failure::new(format!("invalid {src_family} deposit address {}", deposit.deposit_address))
                            .with_reference(reference),
                    );
                }
                let data = deposit.memo.map(String::into_bytes).unwrap_or_default();
                let request = TxRequest::new(
                    src_family,
                    pair.src.evm_chain_id(),
                    &deposit.deposit_address,
                    pair.src.clone(),
                    amount,
                )
                .with_data(data);
                Ok((request, reference))
            }
            RouteCategory::Unsupported => Err(Failure::new("unsupported route")),
        }
    }

    /// Sign, wrap, submit and poll once.
    async fn send(&self, request: TxRequest) -> Result<ProtectedTxHandle, Failure> {
        let family = request.family;
        let request = request.with_nonce(self.next_nonce(family));
        let signed = self
            .wallets
            .sign(family, &request)
            .map_err(|e| Failure::new(format!("signing failed: {e}")))?;
        let protected = self
            .protection
            .protect(&signed)
            .map_err(|e| Failure::new(e.to_string()))?;
        let pending = protected.handle.clone();

        let submitted = self
            .protection
            .submit(&protected, &*self.broadcast)
            .await
            .map_err(|e| Failure::new(format!("broadcast failed: {e}")).with_handle(pending.clone()))?;
        if submitted == TxStatus::Failed {
            return Err(Failure::new("broadcast rejected transaction").with_handle(pending.with_status(submitted)));
        }
        let handle = pending.with_status(submitted);

        match self.protection.check_status(&handle, &*self.broadcast).await {
            Ok(checked) if checked.status == TxStatus::Failed => {
                Err(Failure::new("transaction failed").with_handle(checked))
            }
            Ok(checked) => Ok(checked),
            Err(e) => {
                warn!(tx = %handle.hash, error = %e, "status check failed, keeping last status");
                Ok(handle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ProviderSet;
    use crate::testing::{PriceTable, SimulatedBroadcast, SimulatedSwap, StaticBalances};
    use async_trait::async_trait;
    use keel_core::traits::GasEstimator;

    fn router_with(
        config: &RouterConfig,
        providers: ProviderSet,
        balances: StaticBalances,
    ) -> (ExecutionRouter, Arc<SimulatedBroadcast>) {
        let wallets = Arc::new(AgentWalletManager::generate(Arc::new(balances)));
        let quotes = Arc::new(QuoteAggregator::new(providers, config.provider_timeout()));
        let broadcast = Arc::new(SimulatedBroadcast::new());
        let router = ExecutionRouter::new(config, wallets, quotes, broadcast.clone()).unwrap();
        (router, broadcast)
    }

    fn config_with(capital: &[(&str, i64)]) -> RouterConfig {
        let mut config = RouterConfig::default();
        for (asset, amount) in capital {
            config.initial_capital.insert(asset.to_string(), Decimal::new(*amount, 0));
        }
        config
    }

    fn router(capital: &[(&str, i64)]) -> (ExecutionRouter, Arc<SimulatedBroadcast>) {
        let providers = ProviderSet::new().with_swap(Arc::new(SimulatedSwap::new(PriceTable::default())));
        router_with(&config_with(capital), providers, StaticBalances::default())
    }

    /// Answers with the chain id it was asked about.
    struct ChainIdFee;

    #[async_trait]
    impl GasEstimator for ChainIdFee {
        async fn get_estimated_fee(&self, chain_id: u64, _tier: PriorityTier) -> Result<Decimal, ProviderError> {
            Ok(Decimal::from(chain_id))
        }
    }

    fn eth_usdc() -> AssetPair {
        AssetPair::parse("ETH", "USDC").unwrap()
    }

    #[tokio::test]
    async fn same_chain_trade_completes() {
        let (router, broadcast) = router(&[("ETH", 2)]);
        let record = router.quote_and_execute(&eth_usdc(), Decimal::ONE).await.unwrap();
        assert!(record.success);
        assert_eq!(record.route_category, RouteCategory::SameChainAggregator);
        assert!(record.protected_tx.as_ref().unwrap().protected);
        assert_eq!(router.state(&eth_usdc()), RouteState::Completed);
        assert_eq!(router.ledger().available(&eth_usdc().src), Decimal::ONE);
        assert!(router.ledger().available(&eth_usdc().dst) > Decimal::ZERO);
        assert_eq!(broadcast.submitted().len(), 1);
    }

    #[tokio::test]
    async fn invalid_amount_rejected_before_classifying() {
        let (router, _) = router(&[]);
        let err = router.quote_and_execute(&eth_usdc(), Decimal::ZERO).await.unwrap_err();
        assert_eq!(err, RouterError::InvalidAmount(Decimal::ZERO));
        assert_eq!(router.state(&eth_usdc()), RouteState::Idle);
    }

    #[tokio::test]
    async fn unsupported_pair_fails_without_record_or_tracking() {
        let (router, _) = router(&[]);
        for (src, dst) in [("XYZ", "ETH"), ("ABC", "ETH"), ("BTC", "BTC")] {
            let pair = AssetPair::parse(src, dst).unwrap();
            let err = router.quote_and_execute(&pair, Decimal::ONE).await.unwrap_err();
            assert_eq!(err, RouterError::UnsupportedPair(pair.clone()));
            assert_eq!(router.state(&pair), RouteState::Idle);
        }
        assert!(router.records().is_empty());
        assert!(router.inner.states.is_empty());
        assert_eq!(router.inner.pair_locks.len(), 0);
    }

    #[tokio::test]
    async fn pair_lock_is_dropped_after_each_attempt() {
        let (router, _) = router(&[("ETH", 2)]);
        router.quote_and_execute(&eth_usdc(), Decimal::ONE).await.unwrap();
        assert_eq!(router.inner.pair_locks.len(), 0);
        assert!(router.quote_and_execute(&eth_usdc(), Decimal::TEN).await.is_err());
        assert_eq!(router.inner.pair_locks.len(), 0);
    }

    #[tokio::test]
    async fn caller_cancelled_while_queued_releases_the_pair() {
        let swap = SimulatedSwap::new(PriceTable::default()).with_latency(Duration::from_millis(100));
        let providers = ProviderSet::new().with_swap(Arc::new(swap));
        let (router, _) = router_with(&config_with(&[("ETH", 5)]), providers, StaticBalances::default());

        let first = tokio::spawn({
            let router = router.clone();
            async move { router.quote_and_execute(&eth_usdc(), Decimal::ONE).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let queued = tokio::time::timeout(
            Duration::from_millis(10),
            router.quote_and_execute(&eth_usdc(), Decimal::ONE),
        )
        .await;
        assert!(queued.is_err());
        assert_eq!(router.inner.pair_locks.len(), 1);

        assert!(first.await.unwrap().is_ok());
        assert_eq!(router.inner.pair_locks.len(), 0);
        assert_eq!(router.records().len(), 1);
    }

    #[tokio::test]
    async fn non_evm_fee_estimates_use_the_default_chain() {
        let config = RouterConfig {
            default_chain_id: 10,
            ..RouterConfig::default()
        };
        let providers = ProviderSet::new().with_gas(Arc::new(ChainIdFee));
        let (router, _) = router_with(&config, providers, StaticBalances::default());
        let btc_eth = AssetPair::parse("BTC", "ETH").unwrap();
        let polygon = AssetPair::parse("USDC@137", "ETH@137").unwrap();
        assert_eq!(router.estimated_fee(&btc_eth, PriorityTier::Standard).await.unwrap(), Decimal::from(10u64));
        assert_eq!(router.estimated_fee(&polygon, PriorityTier::Standard).await.unwrap(), Decimal::from(137u64));
        assert_eq!(router.estimated_fee(&eth_usdc(), PriorityTier::Fast).await.unwrap(), Decimal::ONE);
    }

    #[tokio::test]
    async fn configured_balance_timeout_reaches_the_wallets() {
        let config = RouterConfig {
            balance_timeout_ms: 10,
            ..RouterConfig::default()
        };
        let balances = StaticBalances::new().with_latency(Duration::from_millis(200));
        let (router, _) = router_with(&config, ProviderSet::new(), balances);
        assert_eq!(router.wallets().balance_timeout(), Duration::from_millis(10));
        let err = router.wallets().wallets().await.unwrap_err();
        assert!(matches!(
            err,
            keel_wallet::WalletError::Balance(ProviderError::Timeout { timeout_ms: 10, .. })
        ));
    }

    #[tokio::test]
    async fn insufficient_capital_is_recorded_as_failure() {
        let (router, broadcast) = router(&[]);
        let err = router.quote_and_execute(&eth_usdc(), Decimal::ONE).await.unwrap_err();
        assert!(matches!(&err, RouterError::ExecutionFailed { reason, .. } if reason.contains("insufficient")));
        let records = router.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert!(broadcast.submitted().is_empty());
        assert_eq!(router.state(&eth_usdc()), RouteState::Failed);
    }

    #[tokio::test]
    async fn preview_quote_leaves_state_alone() {
        let (router, _) = router(&[]);
        let q = router.quote(&eth_usdc(), Decimal::ONE).await.unwrap();
        assert_eq!(q.src_amount, Decimal::ONE);
        assert_eq!(router.state(&eth_usdc()), RouteState::Idle);
    }

    #[test]
    fn nonces_increase_per_family() {
        let (router, _) = router(&[]);
        assert_eq!(router.inner.next_nonce(ChainFamily::Evm), 0);
        assert_eq!(router.inner.next_nonce(ChainFamily::Evm), 1);
        assert_eq!(router.inner.next_nonce(ChainFamily::Utxo), 0);
    }
}
