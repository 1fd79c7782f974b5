//! Route classification.
//!
//! [`classify`] is a pure, total function over [`AssetPair`]: it looks only at
//! the two assets and never at provider or wallet state. Same-chain execution
//! takes priority, so a pair that is both swappable on one chain and
//! technically bridgeable always classifies as
//! [`RouteCategory::SameChainAggregator`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::asset::{AssetKind, AssetPair, ChainFamily};
use crate::quote::ProviderSource;

/// Execution backend category for an asset pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteCategory {
    /// Both assets are EVM-native on the same chain: swap through an aggregator.
    SameChainAggregator,
    /// One side is the non-EVM settlement asset: swap through a cross-protocol bridge.
    CrossProtocolBridge,
    /// Both assets are EVM-native on different chains: move through a bridge.
    CrossChainBridge,
    /// No backend can execute this pair.
    Unsupported,
}

impl RouteCategory {
    /// Categories that have an execution backend.
    pub const SUPPORTED: [RouteCategory; 3] = [
        RouteCategory::SameChainAggregator,
        RouteCategory::CrossProtocolBridge,
        RouteCategory::CrossChainBridge,
    ];

    /// Whether a backend exists for this category.
    pub fn is_supported(&self) -> bool {
        !matches!(self, RouteCategory::Unsupported)
    }

    /// Provenance stamped on quotes served by this category's primary provider.
    pub fn primary_source(&self) -> Option<ProviderSource> {
        match self {
            RouteCategory::SameChainAggregator => Some(ProviderSource::PrimaryAmm),
            RouteCategory::CrossProtocolBridge => Some(ProviderSource::CrossProtocolBridge),
            RouteCategory::CrossChainBridge => Some(ProviderSource::CrossChainBridge),
            RouteCategory::Unsupported => None,
        }
    }

    /// Wallet family that signs the outgoing leg of a pair in this category.
    pub fn signing_family(&self, pair: &AssetPair) -> Option<ChainFamily> {
        match self {
            RouteCategory::SameChainAggregator | RouteCategory::CrossChainBridge => {
                Some(ChainFamily::Evm)
            }
            RouteCategory::CrossProtocolBridge => pair.src.family(),
            RouteCategory::Unsupported => None,
        }
    }
}

impl fmt::Display for RouteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteCategory::SameChainAggregator => "same-chain-aggregator",
            RouteCategory::CrossProtocolBridge => "cross-protocol-bridge",
            RouteCategory::CrossChainBridge => "cross-chain-bridge",
            RouteCategory::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// Classify an asset pair into exactly one [`RouteCategory`].
///
/// Identical assets (after chain resolution) have nothing to route and are
/// `Unsupported`, as is settlement-to-settlement.
pub fn classify(pair: &AssetPair) -> RouteCategory {
    match (pair.src.kind(), pair.dst.kind()) {
        (AssetKind::Unknown, _) | (_, AssetKind::Unknown) => RouteCategory::Unsupported,
        (AssetKind::EvmNative { chain_id: a }, AssetKind::EvmNative { chain_id: b }) => {
            if a != b {
                RouteCategory::CrossChainBridge
            } else if pair.src.symbol() == pair.dst.symbol() {
                RouteCategory::Unsupported
            } else {
                RouteCategory::SameChainAggregator
            }
        }
        (AssetKind::Settlement, AssetKind::EvmNative { .. })
        | (AssetKind::EvmNative { .. }, AssetKind::Settlement) => {
            RouteCategory::CrossProtocolBridge
        }
        (AssetKind::Settlement, AssetKind::Settlement) => RouteCategory::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;
    use crate::constants::{EVM_TOKENS, SETTLEMENT_ASSET, SUPPORTED_EVM_CHAINS};
    use proptest::prelude::*;

    fn pair(src: &str, dst: &str) -> AssetPair {
        AssetPair::parse(src, dst).unwrap()
    }

    #[test]
    fn same_chain_pair() {
        assert_eq!(classify(&pair("ETH", "USDC")), RouteCategory::SameChainAggregator);
        assert_eq!(
            classify(&pair("DAI@137", "USDC@137")),
            RouteCategory::SameChainAggregator
        );
    }

    #[test]
    fn settlement_pair() {
        assert_eq!(classify(&pair("ETH", "BTC")), RouteCategory::CrossProtocolBridge);
        assert_eq!(classify(&pair("BTC", "USDC@8453")), RouteCategory::CrossProtocolBridge);
    }

    #[test]
    fn cross_chain_pair() {
        assert_eq!(classify(&pair("ETH@1", "USDC@137")), RouteCategory::CrossChainBridge);
        assert_eq!(classify(&pair("USDC@1", "USDC@42161")), RouteCategory::CrossChainBridge);
    }

    #[test]
    fn unknown_symbol_is_unsupported() {
        assert_eq!(classify(&pair("XYZ", "ETH")), RouteCategory::Unsupported);
        assert_eq!(classify(&pair("ETH", "XYZ")), RouteCategory::Unsupported);
    }

    #[test]
    fn degenerate_pairs_are_unsupported() {
        assert_eq!(classify(&pair("ETH", "ETH@1")), RouteCategory::Unsupported);
        assert_eq!(classify(&pair("BTC", "BTC")), RouteCategory::Unsupported);
        assert_eq!(classify(&pair("BTC@1", "ETH")), RouteCategory::Unsupported);
        assert_eq!(classify(&pair("ETH@56", "USDC")), RouteCategory::Unsupported);
    }

    #[test]
    fn stable_to_stable_same_chain_prefers_aggregator() {
        assert_eq!(classify(&pair("USDT", "USDC")), RouteCategory::SameChainAggregator);
    }

    #[test]
    fn signing_family_follows_source() {
        let p = pair("BTC", "ETH");
        assert_eq!(
            RouteCategory::CrossProtocolBridge.signing_family(&p),
            Some(ChainFamily::Utxo)
        );
        assert_eq!(
            RouteCategory::CrossProtocolBridge.signing_family(&p.reversed()),
            Some(ChainFamily::Evm)
        );
        assert_eq!(RouteCategory::Unsupported.signing_family(&p), None);
    }

    #[test]
    fn primary_sources() {
        assert_eq!(
            RouteCategory::SameChainAggregator.primary_source(),
            Some(ProviderSource::PrimaryAmm)
        );
        assert_eq!(RouteCategory::Unsupported.primary_source(), None);
    }

    fn supported_asset() -> impl Strategy<Value = Asset> {
        let evm = (
            prop::sample::select(EVM_TOKENS.to_vec()),
            prop::option::of(prop::sample::select(SUPPORTED_EVM_CHAINS.to_vec())),
        )
            .prop_map(|(symbol, chain)| match chain {
                Some(chain_id) => Asset::on_chain(symbol, chain_id),
                None => Asset::new(symbol),
            });
        prop_oneof![4 => evm, 1 => Just(Asset::new(SETTLEMENT_ASSET))]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        #[test]
        fn distinct_supported_assets_always_route(a in supported_asset(), b in supported_asset()) {
            prop_assume!(a != b);
            let both_settlement = a.symbol() == SETTLEMENT_ASSET && b.symbol() == SETTLEMENT_ASSET;
            prop_assume!(!both_settlement);
            let p = AssetPair::new(a, b);
            prop_assert!(classify(&p).is_supported(), "pair {} was unsupported", p);
        }

        #[test]
        fn classification_is_symmetric(a in supported_asset(), b in supported_asset()) {
            let p = AssetPair::new(a, b);
            prop_assert_eq!(classify(&p), classify(&p.reversed()));
        }

        #[test]
        fn unknown_symbols_never_route(symbol in "[A-Z]{2,6}", other in supported_asset()) {
            prop_assume!(!EVM_TOKENS.contains(&symbol.as_str()) && symbol != SETTLEMENT_ASSET);
            let p = AssetPair::new(Asset::new(&symbol), other);
            prop_assert_eq!(classify(&p), RouteCategory::Unsupported);
        }
    }
}
