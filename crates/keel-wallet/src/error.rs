//! Wallet error types.

use keel_core::error::ProviderError;
use keel_core::ChainFamily;
use thiserror::Error;

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Invalid BIP-39 mnemonic phrase (unknown word, bad checksum, wrong length).
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// The seed or derivation path violates BIP-32 preconditions.
    #[error("derivation precondition violated: {0}")]
    DerivationPrecondition(String),

    /// The manager has not derived its wallets yet.
    #[error("wallet manager not initialized")]
    NotInitialized,

    /// Signing failed or the request targets the wrong chain family.
    #[error("signing: {0}")]
    Signing(String),

    /// A wallet of this family is not managed here.
    #[error("no {0} wallet")]
    MissingWallet(ChainFamily),

    /// Invalid address string.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Balance lookup failed.
    #[error("balance lookup: {0}")]
    Balance(#[from] ProviderError),
}
