//! EVM wallet: Keccak-256 addresses with EIP-55 checksums and recoverable
//! secp256k1 signatures.

use k256::ecdsa::{SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use keel_core::{ChainFamily, SignedTx, TxRequest};

use crate::adapter::{ensure_family, ChainWallet};
use crate::error::WalletError;
use crate::keys::DerivedKey;

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// EIP-55 checksummed `0x` address for 20 address bytes.
pub fn to_checksum_address(addr: &[u8; 20]) -> String {
    let lower = hex::encode(addr);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Checksummed address of a secp256k1 public key: last 20 bytes of the
/// Keccak-256 hash of the uncompressed point without its `0x04` prefix.
pub fn address_of(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    to_checksum_address(&addr)
}

/// Whether `s` is a `0x` address. Mixed-case input must carry a valid checksum.
pub fn is_valid_address(s: &str) -> bool {
    let Some(body) = s.strip_prefix("0x") else {
        return false;
    };
    if body.len() != 40 {
        return false;
    }
    let mut bytes = [0u8; 20];
    if hex::decode_to_slice(body, &mut bytes).is_err() {
        return false;
    }
    let all_lower = body == body.to_ascii_lowercase();
    let all_upper = body == body.to_ascii_uppercase();
    all_lower || all_upper || to_checksum_address(&bytes) == s
}

/// Sign a 32-byte digest, returning `r || s || v` with `v = 27 + recovery id`.
///
/// Signing is RFC-6979 deterministic.
pub fn sign_digest_recoverable(key: &SigningKey, digest: &[u8; 32]) -> Result<[u8; 65], WalletError> {
    let (sig, recid) = key
        .sign_prehash_recoverable(digest)
        .map_err(|e| WalletError::Signing(e.to_string()))?;
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&sig.to_bytes());
    out[64] = 27 + recid.to_byte();
    Ok(out)
}

/// Wallet for EVM chains. One address serves every supported chain id.
pub struct EvmWallet {
    key: DerivedKey,
    address: String,
}

impl EvmWallet {
    /// Build the wallet from an EVM-family key.
    pub fn from_key(key: DerivedKey) -> Result<Self, WalletError> {
        if key.family() != ChainFamily::Evm {
            return Err(WalletError::DerivationPrecondition(format!(
                "EVM wallet needs an evm key, got {}",
                key.family()
            )));
        }
        let address = address_of(key.signing_key()?.verifying_key());
        Ok(Self { key, address })
    }
}

impl ChainWallet for EvmWallet {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
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
        ensure_family(ChainFamily::Evm, tx)?;
        if !is_valid_address(&tx.to) {
            return Err(WalletError::InvalidAddress(tx.to.clone()));
        }
        let preimage = tx.signing_preimage();
        let digest = keccak256(&preimage);
        let signature = sign_digest_recoverable(&self.key.signing_key()?, &digest)?;

        let mut raw = preimage;
        raw.extend_from_slice(&signature);
        let hash = format!("0x{}", hex::encode(keccak256(&raw)));

        Ok(SignedTx {
            family: ChainFamily::Evm,
            request: tx.clone(),
            signature: signature.to_vec(),
            raw,
            hash,
        })
    }
}

impl std::fmt::Debug for EvmWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmWallet")
            .field("address", &self.address)
            .field("path", &self.key.derivation_path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::tests::abandon_seed;
    use crate::keys::KeyDerivationEngine;
    use k256::ecdsa::{RecoveryId, Signature};
    use keel_core::Asset;
    use rust_decimal::Decimal;

    fn wallet() -> EvmWallet {
        let key = KeyDerivationEngine::new()
            .derive_key(&abandon_seed(), ChainFamily::Evm, 0)
            .unwrap();
        EvmWallet::from_key(key).unwrap()
    }

    fn request() -> TxRequest {
        TxRequest::new(
            ChainFamily::Evm,
            Some(1),
            "0x1111111254eeb25477b68fb85ed929f73a960582",
            Asset::new("ETH"),
            Decimal::ONE,
        )
    }

    #[test]
    fn known_address_vector() {
        assert_eq!(wallet().address(), "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
        assert_eq!(wallet().derivation_path(), "m/44'/60'/0'/0/0");
    }

    #[test]
    fn eip55_reference_vector() {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed", &mut bytes).unwrap();
        assert_eq!(
            to_checksum_address(&bytes),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn address_validation() {
        assert!(is_valid_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(is_valid_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        assert!(!is_valid_address("0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(!is_valid_address("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        assert!(!is_valid_address("0x1234"));
        assert!(!is_valid_address("0xzzaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
    }

    #[test]
    fn signature_recovers_wallet_address() {
        let w = wallet();
        let signed = w.sign(&request()).unwrap();
        assert_eq!(signed.signature.len(), 65);

        let digest = keccak256(&request().signing_preimage());
        let sig = Signature::from_slice(&signed.signature[..64]).unwrap();
        let recid = RecoveryId::from_byte(signed.signature[64] - 27).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(&digest, &sig, recid).unwrap();
        assert_eq!(address_of(&recovered), w.address());
    }

    #[test]
    fn signing_is_deterministic() {
        let a = wallet().sign(&request()).unwrap();
        let b = wallet().sign(&request()).unwrap();
        assert_eq!(a, b);
        assert!(a.hash.starts_with("0x"));
        assert_eq!(a.hash.len(), 66);
    }

    #[test]
    fn rejects_utxo_request() {
        let tx = TxRequest {
            family: ChainFamily::Utxo,
            ..request()
        };
        assert!(matches!(wallet().sign(&tx), Err(WalletError::Signing(_))));
    }

    #[test]
    fn rejects_malformed_recipient() {
        let tx = TxRequest {
            to: "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu".into(),
            ..request()
        };
        assert!(matches!(wallet().sign(&tx), Err(WalletError::InvalidAddress(_))));
    }

    #[test]
    fn rejects_utxo_key() {
        let key = KeyDerivationEngine::new()
            .derive_key(&abandon_seed(), ChainFamily::Utxo, 0)
            .unwrap();
        assert!(matches!(
            EvmWallet::from_key(key),
            Err(WalletError::DerivationPrecondition(_))
        ));
    }
}
