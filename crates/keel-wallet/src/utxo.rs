//! UTXO wallet: native segwit (P2WPKH) addresses and DER-encoded ECDSA.

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, PublicKey};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::Signature;
use sha2::{Digest, Sha256};

use keel_core::{ChainFamily, SignedTx, TxRequest};

use crate::adapter::{ensure_family, ChainWallet};
use crate::error::WalletError;
use crate::keys::DerivedKey;

/// Sighash flag appended to every signature.
const SIGHASH_ALL: u8 = 0x01;

/// Double SHA-256.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Whether `s` is a mainnet address.
pub fn is_valid_address(s: &str) -> bool {
    s.parse::<Address<NetworkUnchecked>>()
        .map(|a| a.is_valid_for_network(Network::Bitcoin))
        .unwrap_or(false)
}

/// Wallet for the settlement chain.
pub struct UtxoWallet {
    key: DerivedKey,
    address: String,
}

impl UtxoWallet {
    /// Build the wallet from a UTXO-family key.
    pub fn from_key(key: DerivedKey) -> Result<Self, WalletError> {
        if key.family() != ChainFamily::Utxo {
            return Err(WalletError::DerivationPrecondition(format!(
                "UTXO wallet needs a utxo key, got {}",
                key.family()
            )));
        }
        let pubkey = PublicKey::from_slice(key.public_key_bytes())
            .map_err(|e| WalletError::DerivationPrecondition(e.to_string()))?;
        let address = Address::p2wpkh(&pubkey, Network::Bitcoin)
            .map_err(|e| WalletError::DerivationPrecondition(e.to_string()))?
            .to_string();
        Ok(Self { key, address })
    }
}

impl ChainWallet for UtxoWallet {
    fn family(&self) -> ChainFamily {
        ChainFamily::Utxo
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn derivation_path(&self) -> &str {
        self.key.derivation_path()
    }

    fn is_valid_address(&self, address: &str) -> bool {
        is_valid_address(address)
    }

    fn sign(&self, tx: &TxRequest) -> Result<SignedTx, WalletError> {
        ensure_family(ChainFamily::Utxo, tx)?;
        if !is_valid_address(&tx.to) {
            return Err(WalletError::InvalidAddress(tx.to.clone()));
        }
        let preimage = tx.signing_preimage();
        let digest = sha256d(&preimage);
        let sig: Signature = self
            .key
            .signing_key()?
            .sign_prehash(&digest)
            .map_err(|e| WalletError::Signing(e.to_string()))?;

        let mut signature = sig.to_der().as_bytes().to_vec();
        signature.push(SIGHASH_ALL);

        let mut raw = preimage;
        raw.extend_from_slice(&signature);
        let mut txid = sha256d(&raw);
        txid.reverse();

        Ok(SignedTx {
            family: ChainFamily::Utxo,
            request: tx.clone(),
            signature,
            raw,
            hash: hex::encode(txid),
        })
    }
}

impl std::fmt::Debug for UtxoWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtxoWallet")
            .field("address", &self.address)
            .field("path", &self.key.derivation_path())
            .finish()
    }
}
