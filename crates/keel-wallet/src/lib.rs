//! # keel-wallet: deterministic multi-chain wallets for trading agents.
//!
//! One BIP-39 mnemonic produces one seed; BIP-32 derives an isolated key per
//! chain family from it; each key backs a wallet adapter with its own address
//! format and signature scheme.
//!
//! # Modules
//!
//! - [`error`]: `WalletError` enum
//! - [`mnemonic`]: SeedManager for mnemonic generation, validation and seed derivation
//! - [`keys`]: Seed, DerivedKey, KeyDerivationEngine, derivation paths
//! - [`adapter`]: `ChainWallet` capability and `Wallet` snapshots
//! - [`evm`]: EVM addresses (EIP-55) and recoverable signatures
//! - [`utxo`]: P2WPKH addresses and DER signatures
//! - [`manager`]: AgentWalletManager owning both wallets

pub mod adapter;
pub mod error;
pub mod evm;
pub mod keys;
pub mod manager;
pub mod mnemonic;
pub mod utxo;

pub use adapter::{ChainWallet, Wallet};
pub use error::WalletError;
pub use evm::EvmWallet;
pub use keys::{derivation_path, path_template, DerivedKey, KeyDerivationEngine, Seed};
pub use manager::{AgentWalletManager, PortfolioValue, SecurityExport};
pub use mnemonic::{Mnemonic, SeedManager, WordCount};
pub use utxo::UtxoWallet;
