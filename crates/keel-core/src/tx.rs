//! Transaction requests, signed payloads, and protected-transaction handles.
//!
//! # Signing preimage
//!
//! Wallets sign a canonical byte preimage of a [`TxRequest`] that commits to:
//! - a domain tag and the chain family
//! - chain id and nonce (big-endian)
//! - recipient, asset, normalized value, and call data (each length-prefixed)
//!
//! The preimage is deterministic: equal requests always produce equal bytes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::asset::{Asset, ChainFamily};

/// Domain-separation tag prepended to every signing preimage.
const PREIMAGE_TAG: &[u8] = b"keel-tx-v1";

/// An unsigned, chain-family-tagged transaction request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    pub family: ChainFamily,
    /// EVM chain id; `None` for UTXO transactions.
    pub chain_id: Option<u64>,
    pub to: String,
    pub asset: Asset,
    pub value: Decimal,
    pub data: Vec<u8>,
    pub nonce: u64,
}

impl TxRequest {
    /// Create a request with nonce 0 and no call data.
    pub fn new(family: ChainFamily, chain_id: Option<u64>, to: &str, asset: Asset, value: Decimal) -> Self {
        Self {
            family,
            chain_id,
            to: to.to_string(),
            asset,
            value,
            data: Vec::new(),
            nonce: 0,
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Canonical bytes a wallet signs for this request.
    pub fn signing_preimage(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PREIMAGE_TAG.len() + 17 + self.to.len() + self.data.len() + 64);
        buf.extend_from_slice(PREIMAGE_TAG);
        buf.push(match self.family {
            ChainFamily::Evm => 0x01,
            ChainFamily::Utxo => 0x02,
        });
        buf.extend_from_slice(&self.chain_id.unwrap_or(0).to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        push_prefixed(&mut buf, self.to.as_bytes());
        push_prefixed(&mut buf, self.asset.symbol().as_bytes());
        buf.extend_from_slice(&self.asset.evm_chain_id().unwrap_or(0).to_be_bytes());
        push_prefixed(&mut buf, self.value.normalize().to_string().as_bytes());
        push_prefixed(&mut buf, &self.data);
        buf
    }
}

fn push_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// A signed transaction produced by a chain wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    pub family: ChainFamily,
    pub request: TxRequest,
    /// Signature bytes in the family's wire format.
    pub signature: Vec<u8>,
    /// Raw payload: preimage followed by the signature.
    pub raw: Vec<u8>,
    /// Transaction hash in the family's display form.
    pub hash: String,
}

/// Confirmation status of a dispatched transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    /// Whether no further status change is expected.
    pub fn is_final(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Pending => f.write_str("pending"),
            TxStatus::Confirmed => f.write_str("confirmed"),
            TxStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Handle to a transaction wrapped with anti-front-running protection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedTxHandle {
    pub hash: String,
    pub status: TxStatus,
    pub protected: bool,
}

impl ProtectedTxHandle {
    /// The same handle with an updated status.
    pub fn with_status(&self, status: TxStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// A protected transaction ready for dispatch by a broadcast service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedTx {
    pub handle: ProtectedTxHandle,
    /// JSON-RPC body sent to the private relay.
    pub body: Vec<u8>,
    /// `0x<auth address>:0x<signature>` relay authentication header.
    pub signature_header: String,
    pub signed: SignedTx,
}

/// Where and how much to deposit to start a cross-protocol swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositInstruction {
    pub deposit_address: String,
    pub amount: Decimal,
    pub memo: Option<String>,
}

/// Fee priority tier for gas estimation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Low,
    Standard,
    Fast,
}
