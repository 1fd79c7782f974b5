//! Chain families, assets, and asset pairs.
//!
//! An [`Asset`] is an upper-cased ticker symbol optionally pinned to an EVM
//! chain id. The textual form is `SYMBOL` or `SYMBOL@CHAIN_ID`, e.g. `ETH`,
//! `USDC@137`. An EVM-native asset without a pinned chain lives on
//! [`DEFAULT_EVM_CHAIN_ID`], so `ETH` and `ETH@1` compare and hash equal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::constants::{is_evm_token, is_supported_chain, DEFAULT_EVM_CHAIN_ID, SETTLEMENT_ASSET};

/// Chain family a wallet or asset belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Account-based EVM chains (Ethereum and its L2s).
    Evm,
    /// UTXO chains settled in the non-EVM asset.
    Utxo,
}

impl ChainFamily {
    /// Both supported families, in derivation order.
    pub const ALL: [ChainFamily; 2] = [ChainFamily::Evm, ChainFamily::Utxo];

    /// Native asset whose balance a wallet of this family reports.
    pub fn native_symbol(&self) -> &'static str {
        match self {
            ChainFamily::Evm => "ETH",
            ChainFamily::Utxo => SETTLEMENT_ASSET,
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFamily::Evm => f.write_str("evm"),
            ChainFamily::Utxo => f.write_str("utxo"),
        }
    }
}

/// Where an asset sits in the supported universe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    /// An EVM-native fungible token on a supported chain.
    EvmNative {
        /// Resolved chain id (the default chain when unpinned).
        chain_id: u64,
    },
    /// The non-EVM settlement asset (never pinned to a chain).
    Settlement,
    /// Unknown symbol, unsupported chain, or a settlement asset pinned to a chain.
    Unknown,
}

/// A ticker symbol optionally pinned to an EVM chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Asset {
    symbol: String,
    chain_id: Option<u64>,
}

impl Asset {
    /// Create an unpinned asset. The symbol is upper-cased.
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.trim().to_ascii_uppercase(),
            chain_id: None,
        }
    }

    /// Create an asset pinned to a specific EVM chain.
    pub fn on_chain(symbol: &str, chain_id: u64) -> Self {
        Self {
            chain_id: Some(chain_id),
            ..Self::new(symbol)
        }
    }

    /// The upper-cased ticker symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The explicitly pinned chain id, if any.
    pub fn pinned_chain(&self) -> Option<u64> {
        self.chain_id
    }

    /// Classify this asset against the supported universe.
    pub fn kind(&self) -> AssetKind {
        if self.symbol == SETTLEMENT_ASSET {
            return match self.chain_id {
                None => AssetKind::Settlement,
                Some(_) => AssetKind::Unknown,
            };
        }
        if !is_evm_token(&self.symbol) {
            return AssetKind::Unknown;
        }
        let chain_id = self.chain_id.unwrap_or(DEFAULT_EVM_CHAIN_ID);
        if is_supported_chain(chain_id) {
            AssetKind::EvmNative { chain_id }
        } else {
            AssetKind::Unknown
        }
    }

    /// Resolved EVM chain id, or `None` for non-EVM and unknown assets.
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self.kind() {
            AssetKind::EvmNative { chain_id } => Some(chain_id),
            AssetKind::Settlement | AssetKind::Unknown => None,
        }
    }

    /// Wallet family that holds and signs for this asset.
    pub fn family(&self) -> Option<ChainFamily> {
        match self.kind() {
            AssetKind::EvmNative { .. } => Some(ChainFamily::Evm),
            AssetKind::Settlement => Some(ChainFamily::Utxo),
            AssetKind::Unknown => None,
        }
    }

    /// Chain id used for equality: EVM tokens resolve to the default chain.
    fn effective_chain(&self) -> Option<u64> {
        match self.chain_id {
            None if is_evm_token(&self.symbol) => Some(DEFAULT_EVM_CHAIN_ID),
            other => other,
        }
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol && self.effective_chain() == other.effective_chain()
    }
}

impl Eq for Asset {}

impl Hash for Asset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
        self.effective_chain().hash(state);
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chain_id {
            Some(chain_id) => write!(f, "{}@{}", self.symbol, chain_id),
            None => f.write_str(&self.symbol),
        }
    }
}

impl FromStr for Asset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty asset symbol".to_string());
        }
        match s.split_once('@') {
            Some((symbol, chain)) => {
                if symbol.trim().is_empty() {
                    return Err(format!("missing symbol in {s:?}"));
                }
                let chain_id = chain
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| format!("invalid chain id in {s:?}: {e}"))?;
                Ok(Asset::on_chain(symbol, chain_id))
            }
            None => Ok(Asset::new(s)),
        }
    }
}

/// An ordered (source, destination) pair of assets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    /// Asset being sold.
    pub src: Asset,
    /// Asset being bought.
    pub dst: Asset,
}

impl AssetPair {
    /// Create a pair from source and destination assets.
    pub fn new(src: Asset, dst: Asset) -> Self {
        Self { src, dst }
    }

    /// Parse both sides from their textual forms.
    pub fn parse(src: &str, dst: &str) -> Result<Self, String> {
        Ok(Self::new(src.parse()?, dst.parse()?))
    }

    /// The same pair traded in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst.clone(),
            dst: self.src.clone(),
        }
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.src, self.dst)
    }
}
