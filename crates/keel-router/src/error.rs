//! Router error types.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use keel_core::{Asset, AssetPair, ProviderError, RouteCategory};
use keel_wallet::WalletError;

use crate::config::ConfigError;

/// Errors surfaced by quoting and execution.
///
/// `Clone` so one in-flight quote result can be handed to every joined caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// No execution backend exists for this pair. Never retried.
    #[error("unsupported pair {0}")]
    UnsupportedPair(AssetPair),

    /// Every provider for the category failed.
    #[error("no {category} quote available: {last_error}")]
    QuoteUnavailable {
        category: RouteCategory,
        last_error: ProviderError,
    },

    /// Execution failed after capital was restored.
    #[error("order {order_id} failed: {reason}")]
    ExecutionFailed { order_id: Uuid, reason: String },

    /// Not enough capital of the source asset to reserve.
    #[error("insufficient {asset} capital: available {available}, required {required}")]
    InsufficientCapital {
        asset: Asset,
        available: Decimal,
        required: Decimal,
    },

    /// Trade amounts must be strictly positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Protection wrapper could not be built or could not sign.
    #[error("protection: {0}")]
    Protection(String),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RouterError {
    /// Whether the failure happened before any capital was committed.
    pub fn is_pre_execution(&self) -> bool {
        !matches!(self, RouterError::ExecutionFailed { .. })
    }
}
