//! Protocol constants: the supported asset universe and derivation parameters.

/// EVM-native fungible tokens the router knows how to move.
pub const EVM_TOKENS: &[&str] = &["ETH", "WETH", "USDC", "USDT", "DAI", "WBTC", "LINK", "UNI"];

/// The non-EVM settlement asset reachable only through a cross-protocol bridge.
pub const SETTLEMENT_ASSET: &str = "BTC";

/// EVM chain identifiers an asset may be pinned to.
pub const SUPPORTED_EVM_CHAINS: &[u64] = &[1, 10, 137, 8453, 42161];

/// Chain an EVM asset lives on when no chain id is pinned.
pub const DEFAULT_EVM_CHAIN_ID: u64 = 1;

/// BIP-44 purpose used for EVM accounts.
pub const EVM_PURPOSE: u32 = 44;

/// SLIP-44 coin type for Ethereum.
pub const EVM_COIN_TYPE: u32 = 60;

/// BIP-84 purpose (native segwit) used for UTXO accounts.
pub const UTXO_PURPOSE: u32 = 84;

/// SLIP-44 coin type for Bitcoin.
pub const UTXO_COIN_TYPE: u32 = 0;

/// Returns `true` if `symbol` (already upper-cased) is an EVM-native token.
pub fn is_evm_token(symbol: &str) -> bool {
    EVM_TOKENS.contains(&symbol)
}

/// Returns `true` if `chain_id` is a supported EVM chain.
pub fn is_supported_chain(chain_id: u64) -> bool {
    SUPPORTED_EVM_CHAINS.contains(&chain_id)
}
