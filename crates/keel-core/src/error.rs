//! Errors raised at the external collaborator seam.
use thiserror::Error;

/// Failure of an external provider call (quote, price, balance, broadcast).
///
/// Every variant is treated the same way by the router: it triggers the
/// fallback chain and, when that is exhausted, is attached to the surfaced error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("no price for {0}")]
    PriceUnavailable(String),
}

impl ProviderError {
    /// Whether the failure came from the call deadline rather than the provider.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout { .. })
    }
}
