//! Normalized quotes.
//!
//! A [`Quote`] is built by a provider, normalized by the quote aggregator,
//! and then shared behind an `Arc` so that every caller joined on the same
//! in-flight request observes the same instance. It is never mutated once
//! shared; the `with_*` builders consume `self`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::asset::{Asset, AssetPair};

/// Which provider produced a quote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSource {
    /// Primary same-chain AMM/aggregator source.
    PrimaryAmm,
    /// Cross-protocol (settlement asset) bridge.
    CrossProtocolBridge,
    /// Cross-chain EVM bridge.
    CrossChainBridge,
    /// A secondary provider served the quote after the primary failed.
    Fallback,
}

/// Contract call a provider asks the wallet to sign to execute its route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCall {
    /// Target contract address.
    pub to: String,
    /// ABI-encoded call data.
    pub data: Vec<u8>,
}

/// A time-stamped price/fee/duration estimate for converting one asset into another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub src_asset: Asset,
    pub dst_asset: Asset,
    pub src_amount: Decimal,
    pub dst_amount: Decimal,
    pub network_fee: Decimal,
    pub provider_fee: Decimal,
    pub estimated_duration_secs: u64,
    pub provider_source: ProviderSource,
    pub quoted_at: DateTime<Utc>,
    pub execution: Option<ExecutionCall>,
}

impl Quote {
    /// Create a fee-free, instant quote; refine with the `with_*` builders.
    pub fn new(
        src_asset: Asset,
        dst_asset: Asset,
        src_amount: Decimal,
        dst_amount: Decimal,
        provider_source: ProviderSource,
    ) -> Self {
        Self {
            src_asset,
            dst_asset,
            src_amount,
            dst_amount,
            network_fee: Decimal::ZERO,
            provider_fee: Decimal::ZERO,
            estimated_duration_secs: 0,
            provider_source,
            quoted_at: Utc::now(),
            execution: None,
        }
    }

    pub fn with_fees(mut self, network_fee: Decimal, provider_fee: Decimal) -> Self {
        self.network_fee = network_fee;
        self.provider_fee = provider_fee;
        self
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.estimated_duration_secs = secs;
        self
    }

    pub fn with_execution(mut self, call: ExecutionCall) -> Self {
        self.execution = Some(call);
        self
    }

    pub fn with_source(mut self, source: ProviderSource) -> Self {
        self.provider_source = source;
        self
    }

    /// Mark the quote as served by a secondary provider.
    pub fn degraded(self) -> Self {
        self.with_source(ProviderSource::Fallback)
    }

    /// Whether a fallback provider produced this quote.
    pub fn is_degraded(&self) -> bool {
        self.provider_source == ProviderSource::Fallback
    }

    /// The pair this quote converts between.
    pub fn pair(&self) -> AssetPair {
        AssetPair::new(self.src_asset.clone(), self.dst_asset.clone())
    }

    /// Destination units received per source unit, or `None` for a zero source amount.
    pub fn effective_rate(&self) -> Option<Decimal> {
        self.dst_amount.checked_div(self.src_amount)
    }

    /// Network plus provider fees.
    pub fn total_fees(&self) -> Decimal {
        self.network_fee + self.provider_fee
    }
}
