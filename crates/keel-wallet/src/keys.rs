//! Seeds and hierarchical key derivation.
//!
//! Keys are derived with BIP-32 from a BIP-39 seed. Each chain family has its
//! own purpose and coin type in the path, so keys for one family can never
//! collide with another's:
//!
//! | family | path |
//! |---|---|
//! | EVM | `m/44'/60'/{account}'/0/0` |
//! | UTXO (native segwit) | `m/84'/0'/{account}'/0/0` |

use coins_bip32::path::DerivationPath;
use coins_bip32::prelude::*;
use k256::ecdsa::SigningKey;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use keel_core::constants::{EVM_COIN_TYPE, EVM_PURPOSE, UTXO_COIN_TYPE, UTXO_PURPOSE};
use keel_core::ChainFamily;

use crate::error::WalletError;

/// Minimum seed length accepted by BIP-32.
pub const MIN_SEED_LEN: usize = 16;
/// Maximum seed length accepted by BIP-32.
pub const MAX_SEED_LEN: usize = 64;

/// Binary seed for key derivation.
///
/// Secret material is zeroized on drop to prevent leaking key material
/// in freed memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: Vec<u8>,
}

impl Seed {
    /// Create a seed from raw bytes. Fails unless `16 <= len <= 64`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&bytes.len()) {
            return Err(WalletError::DerivationPrecondition(format!(
                "seed must be {MIN_SEED_LEN}..={MAX_SEED_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub(crate) fn from_bip39(bytes: &[u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A chain-specific key pair at a derivation path.
///
/// Private bytes are zeroized on drop. The type is not `Clone`; a wallet
/// adapter takes ownership of the key it is built from.
#[derive(PartialEq, Eq)]
pub struct DerivedKey {
    family: ChainFamily,
    path: String,
    private_key: Zeroizing<[u8; 32]>,
    public_key: [u8; 33],
}

impl DerivedKey {
    pub fn family(&self) -> ChainFamily {
        self.family
    }

    pub fn derivation_path(&self) -> &str {
        &self.path
    }

    /// Compressed SEC1 public key.
    pub fn public_key_bytes(&self) -> &[u8; 33] {
        &self.public_key
    }

    /// Rebuild the secp256k1 signing key. The returned key zeroizes itself on drop.
    pub(crate) fn signing_key(&self) -> Result<SigningKey, WalletError> {
        SigningKey::from_slice(self.private_key.as_slice())
            .map_err(|e| WalletError::Signing(format!("corrupt private key: {e}")))
    }

    #[cfg(test)]
    pub(crate) fn private_key_bytes(&self) -> &[u8; 32] {
        &self.private_key
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("family", &self.family)
            .field("path", &self.path)
            .field("public_key", &hex::encode(self.public_key))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Path template for a family, with `{account}` as the account placeholder.
pub fn path_template(family: ChainFamily) -> &'static str {
    match family {
        ChainFamily::Evm => "m/44'/60'/{account}'/0/0",
        ChainFamily::Utxo => "m/84'/0'/{account}'/0/0",
    }
}

/// Concrete BIP-32 path for a family and account.
pub fn derivation_path(family: ChainFamily, account: u32) -> String {
    let (purpose, coin_type) = match family {
        ChainFamily::Evm => (EVM_PURPOSE, EVM_COIN_TYPE),
        ChainFamily::Utxo => (UTXO_PURPOSE, UTXO_COIN_TYPE),
    };
    format!("m/{purpose}'/{coin_type}'/{account}'/0/0")
}

/// Deterministic seed-to-key derivation. Stateless and side-effect free.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyDerivationEngine;

impl KeyDerivationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Derive the key for `family` at `account`.
    ///
    /// The same `(seed, family, account)` always yields the same key. The only
    /// failure is a seed outside BIP-32 length bounds.
    pub fn derive_key(
        &self,
        seed: &Seed,
        family: ChainFamily,
        account: u32,
    ) -> Result<DerivedKey, WalletError> {
        if account >= 0x8000_0000 {
            return Err(WalletError::DerivationPrecondition(format!(
                "account index {account} exceeds hardened range"
            )));
        }
        let path = derivation_path(family, account);
        let parsed = path
            .parse::<DerivationPath>()
            .map_err(|e| WalletError::DerivationPrecondition(format!("{path}: {e}")))?;

        let master = XPriv::root_from_seed(seed.as_bytes(), None)
            .map_err(|e| WalletError::DerivationPrecondition(e.to_string()))?;
        let child = master
            .derive_path(&parsed)
            .map_err(|e| WalletError::DerivationPrecondition(e.to_string()))?;

        let signing_key: &SigningKey = child.as_ref();
        let mut private_key = Zeroizing::new([0u8; 32]);
        private_key.copy_from_slice(&signing_key.to_bytes());
        let point = signing_key.verifying_key().to_encoded_point(true);
        let mut public_key = [0u8; 33];
        public_key.copy_from_slice(point.as_bytes());

        tracing::debug!(family = %family, account, path = %path, "derived key");

        Ok(DerivedKey {
            family,
            path,
            private_key,
            public_key,
        })
    }
}
