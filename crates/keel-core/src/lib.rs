//! # keel-core
//! Foundation types and traits shared by the Keel wallet and router crates.
//!
//! # Modules
//!
//! - [`asset`]: chain families, assets, and asset pairs
//! - [`classify`]: pure route classification of an asset pair
//! - [`constants`]: asset universe and derivation constants
//! - [`error`]: `ProviderError` raised at the collaborator seam
//! - [`quote`]: normalized quotes and their provenance
//! - [`record`]: append-only execution records
//! - [`traits`]: external collaborator interfaces
//! - [`tx`]: transaction requests, signed payloads, protected handles

pub mod asset;
pub mod classify;
pub mod constants;
pub mod error;
pub mod quote;
pub mod record;
pub mod traits;
pub mod tx;

pub use asset::{Asset, AssetKind, AssetPair, ChainFamily};
pub use classify::{classify, RouteCategory};
pub use error::ProviderError;
pub use quote::{ExecutionCall, ProviderSource, Quote};
pub use record::ExecutionRecord;
pub use tx::{
    DepositInstruction, PriorityTier, ProtectedTx, ProtectedTxHandle, SignedTx, TxRequest, TxStatus,
};
