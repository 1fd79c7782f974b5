//! Quote aggregation with deadlines, fallback, and in-flight deduplication.
//!
//! Each route category has a primary provider and an optional secondary one.
//! A request asks the primary first; an error or an elapsed deadline sends
//! one retry to the secondary, whose quote is marked degraded
//! ([`keel_core::ProviderSource::Fallback`]). Concurrent requests for the same pair and
//! amount share one in-flight lookup and receive the same `Arc<Quote>`.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use keel_core::traits::{BridgeQuoteProvider, CrossProtocolQuoteProvider, GasEstimator, SwapQuoteProvider};
use keel_core::{AssetPair, PriorityTier, ProviderError, Quote, RouteCategory};

use crate::error::RouterError;

/// Run `fut` under `timeout`, mapping an elapsed deadline to [`ProviderError::Timeout`].
pub(crate) async fn with_deadline<T, F>(provider: &str, timeout: Duration, fut: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: provider.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Quote providers per route category.
#[derive(Clone, Default)]
pub struct ProviderSet {
    /// MEV-protected same-chain source.
    pub swap: Option<Arc<dyn SwapQuoteProvider>>,
    /// Plain aggregator used when the protected source fails.
    pub swap_fallback: Option<Arc<dyn SwapQuoteProvider>>,
    pub bridge: Option<Arc<dyn BridgeQuoteProvider>>,
    pub bridge_fallback: Option<Arc<dyn BridgeQuoteProvider>>,
    pub cross_protocol: Option<Arc<dyn CrossProtocolQuoteProvider>>,
    pub cross_protocol_fallback: Option<Arc<dyn CrossProtocolQuoteProvider>>,
    pub gas: Option<Arc<dyn GasEstimator>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_swap(mut self, primary: Arc<dyn SwapQuoteProvider>) -> Self {
        self.swap = Some(primary);
        self
    }

    pub fn with_swap_fallback(mut self, fallback: Arc<dyn SwapQuoteProvider>) -> Self {
        self.swap_fallback = Some(fallback);
        self
    }

    pub fn with_bridge(mut self, primary: Arc<dyn BridgeQuoteProvider>) -> Self {
        self.bridge = Some(primary);
        self
    }

    pub fn with_bridge_fallback(mut self, fallback: Arc<dyn BridgeQuoteProvider>) -> Self {
        self.bridge_fallback = Some(fallback);
        self
    }

    pub fn with_cross_protocol(mut self, primary: Arc<dyn CrossProtocolQuoteProvider>) -> Self {
        self.cross_protocol = Some(primary);
        self
    }

    pub fn with_cross_protocol_fallback(mut self, fallback: Arc<dyn CrossProtocolQuoteProvider>) -> Self {
        self.cross_protocol_fallback = Some(fallback);
        self
    }

    pub fn with_gas(mut self, gas: Arc<dyn GasEstimator>) -> Self {
        self.gas = Some(gas);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Primary,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct QuoteKey {
    pair: AssetPair,
    amount: Decimal,
}

type QuoteResult = Result<Arc<Quote>, RouterError>;

/// A lookup running in its own task. Waiters watch for its result.
#[derive(Clone)]
struct Inflight {
    id: u64,
    result: watch::Receiver<Option<QuoteResult>>,
}

/// Removes a lookup from the in-flight map once its task is done with it.
struct InflightEntry {
    sources: Arc<Sources>,
    key: QuoteKey,
    id: u64,
}

impl Drop for InflightEntry {
    fn drop(&mut self) {
        let mut inflight = self.sources.inflight.lock();
        if inflight.get(&self.key).is_some_and(|e| e.id == self.id) {
            inflight.remove(&self.key);
        }
    }
}

/// Providers, deadline and in-flight lookups shared with lookup tasks.
struct Sources {
    providers: ProviderSet,
    timeout: Duration,
    inflight: Mutex<HashMap<QuoteKey, Inflight>>,
    next_id: AtomicU64,
}

pub struct QuoteAggregator {
    sources: Arc<Sources>,
}

impl QuoteAggregator {
    pub fn new(providers: ProviderSet, timeout: Duration) -> Self {
        Self {
            sources: Arc::new(Sources {
                providers,
                timeout,
                inflight: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Per-call provider deadline.
    pub fn timeout(&self) -> Duration {
        self.sources.timeout
    }

    /// Number of lookups currently in flight.
    pub fn inflight(&self) -> usize {
        self.sources.inflight.lock().len()
    }

    /// Best available quote for selling `amount` of `pair.src`.
    ///
    /// Callers that arrive while an identical lookup is running wait for it
    /// instead of issuing their own provider call. The lookup runs in its own
    /// task, so cancelling any caller (including the first) neither aborts nor
    /// restarts it.
    pub async fn quote(
        &self,
        pair: &AssetPair,
        amount: Decimal,
        category: RouteCategory,
        wallet_address: &str,
    ) -> QuoteResult {
        let key = QuoteKey {
            pair: pair.clone(),
            amount: amount.normalize(),
        };
        let mut result = {
            let mut inflight = self.sources.inflight.lock();
            match inflight.get(&key) {
                Some(entry) => {
                    debug!(pair = %pair, amount = %amount, "joining in-flight quote");
                    entry.result.clone()
                }
                None => {
                    let id = self.sources.next_id.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(key.clone(), Inflight { id, result: rx.clone() });
                    let entry = InflightEntry {
                        sources: Arc::clone(&self.sources),
                        key,
                        id,
                    };
                    let (pair, wallet) = (pair.clone(), wallet_address.to_string());
                    tokio::spawn(async move {
                        let quote = entry.sources.fetch(&pair, amount, category, &wallet).await;
                        // Later callers start a fresh lookup; current waiters still get this one.
                        drop(entry);
                        let _ = tx.send(Some(quote));
                    });
                    rx
                }
            }
        };

        let quote = match result.wait_for(Option::is_some).await {
            Ok(quote) => (*quote).clone(),
            Err(_) => None,
        };
        quote.unwrap_or_else(|| {
            Err(RouterError::QuoteUnavailable {
                category,
                last_error: ProviderError::Unavailable("quote lookup aborted".into()),
            })
        })
    }

    /// The bridge that served a quote, for executing it.
    pub fn bridge_for(&self, quote: &Quote) -> Option<Arc<dyn BridgeQuoteProvider>> {
        let providers = &self.sources.providers;
        if quote.is_degraded() {
            providers.bridge_fallback.clone()
        } else {
            providers.bridge.clone()
        }
    }

    /// The cross-protocol provider that served a quote, for initiating the swap.
    pub fn cross_protocol_for(&self, quote: &Quote) -> Option<Arc<dyn CrossProtocolQuoteProvider>> {
        let providers = &self.sources.providers;
        if quote.is_degraded() {
            providers.cross_protocol_fallback.clone()
        } else {
            providers.cross_protocol.clone()
        }
    }

    /// Fee estimate for display. Not used for routing decisions.
    pub async fn estimated_fee(&self, chain_id: u64, tier: PriorityTier) -> Result<Decimal, ProviderError> {
        let gas = self
            .sources
            .providers
            .gas
            .as_ref()
            .ok_or_else(|| ProviderError::Unavailable("no gas estimator configured".into()))?;
        with_deadline("gas", self.sources.timeout, gas.get_estimated_fee(chain_id, tier)).await
    }
}

impl Sources {
    async fn fetch(
        &self,
        pair: &AssetPair,
        amount: Decimal,
        category: RouteCategory,
        wallet_address: &str,
    ) -> QuoteResult {
        let Some(primary_source) = category.primary_source() else {
            return Err(RouterError::UnsupportedPair(pair.clone()));
        };

        let mut last_error = ProviderError::Unavailable(format!("no {category} provider configured"));

        if let Some(result) = self.ask(Slot::Primary, pair, amount, category, wallet_address).await {
            match result.and_then(|q| validate(q, pair, amount)) {
                Ok(q) => {
                    debug!(pair = %pair, %category, dst_amount = %q.dst_amount, "primary quote");
                    return Ok(Arc::new(q.with_source(primary_source)));
                }
                Err(e) => {
                    warn!(pair = %pair, %category, error = %e, "primary quote failed");
                    last_error = e;
                }
            }
        }

        if let Some(result) = self.ask(Slot::Fallback, pair, amount, category, wallet_address).await {
            match result.and_then(|q| validate(q, pair, amount)) {
                Ok(q) => {
                    info!(pair = %pair, %category, dst_amount = %q.dst_amount, "serving fallback quote");
                    return Ok(Arc::new(q.degraded()));
                }
                Err(e) => {
                    warn!(pair = %pair, %category, error = %e, "fallback quote failed");
                    last_error = e;
                }
            }
        }

        Err(RouterError::QuoteUnavailable {
            category,
            last_error,
        })
    }

    /// One bounded provider call, or `None` when the slot is empty.
    async fn ask(
        &self,
        slot: Slot,
        pair: &AssetPair,
        amount: Decimal,
        category: RouteCategory,
        wallet_address: &str,
    ) -> Option<Result<Quote, ProviderError>> {
        let primary = slot == Slot::Primary;
        let (src, dst) = (&pair.src, &pair.dst);
        match category {
            RouteCategory::SameChainAggregator => {
                let p = if primary { &self.providers.swap } else { &self.providers.swap_fallback };
                let p = p.as_ref()?;
                let name = if primary { "swap" } else { "swap-fallback" };
                Some(with_deadline(name, self.timeout, p.get_quote(src, dst, amount, wallet_address)).await)
            }
            RouteCategory::CrossChainBridge => {
                let p = if primary { &self.providers.bridge } else { &self.providers.bridge_fallback };
                let p = p.as_ref()?;
                let name = if primary { "bridge" } else { "bridge-fallback" };
                let (Some(from_chain), Some(to_chain)) = (src.evm_chain_id(), dst.evm_chain_id()) else {
                    return Some(Err(ProviderError::InvalidResponse(format!("{pair} is not an EVM pair"))));
                };
                Some(
                    with_deadline(
                        name,
                        self.timeout,
                        p.get_quote(from_chain, to_chain, src, dst, amount),
                    )
                    .await,
                )
            }
            RouteCategory::CrossProtocolBridge => {
                let p = if primary {
                    &self.providers.cross_protocol
                } else {
                    &self.providers.cross_protocol_fallback
                };
                let p = p.as_ref()?;
                let name = if primary { "cross-protocol" } else { "cross-protocol-fallback" };
                Some(with_deadline(name, self.timeout, p.get_quote(src, dst, amount)).await)
            }
            RouteCategory::Unsupported => None,
        }
    }
}

/// Reject quotes that do not answer the request that was made.
fn validate(quote: Quote, pair: &AssetPair, amount: Decimal) -> Result<Quote, ProviderError> {
    if quote.src_asset != pair.src || quote.dst_asset != pair.dst {
        return Err(ProviderError::InvalidResponse(format!(
            "quote for {}/{} does not match {pair}",
            quote.src_asset, quote.dst_asset
        )));
    }
    if quote.src_amount != amount {
        return Err(ProviderError::InvalidResponse(format!(
            "quoted amount {} does not match requested {amount}",
            quote.src_amount
        )));
    }
    if quote.dst_amount <= Decimal::ZERO {
        return Err(ProviderError::InvalidResponse(format!(
            "non-positive output {}",
            quote.dst_amount
        )));
    }
    Ok(quote)
}
