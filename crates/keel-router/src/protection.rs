//! Anti-front-running protection for signed transactions.
//!
//! EVM transactions are wrapped in an `eth_sendPrivateTransaction` JSON-RPC
//! request for a private relay. The body is authenticated the way builder
//! relays expect: Keccak-256 of the body signed by a relay auth key, sent as
//! `0x<auth address>:0x<signature>`. UTXO transactions go out as an
//! authenticated `sendrawtransaction` request. Every handle is marked
//! protected.
//!
//! Wrapping is deterministic for a given wrapper and never broadcasts.

use k256::ecdsa::SigningKey;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use keel_core::traits::BroadcastService;
use keel_core::{ChainFamily, ProtectedTx, ProtectedTxHandle, ProviderError, SignedTx, TxStatus};
use keel_wallet::evm::{address_of, keccak256, sign_digest_recoverable};

use crate::aggregator::with_deadline;
use crate::config::ProtectionConfig;
use crate::error::RouterError;

pub struct ProtectionWrapper {
    auth_key: SigningKey,
    auth_address: String,
    prefs: ProtectionConfig,
    status_timeout: Duration,
}

impl ProtectionWrapper {
    /// Wrapper using the configured auth key, or a random one when none is set.
    pub fn new(prefs: ProtectionConfig, status_timeout: Duration) -> Result<Self, RouterError> {
        let auth_key = match &prefs.auth_key {
            Some(hex_key) => {
                let bytes = hex::decode(hex_key.trim_start_matches("0x"))
                    .map_err(|e| RouterError::Protection(format!("auth key: {e}")))?;
                SigningKey::from_slice(&bytes)
                    .map_err(|e| RouterError::Protection(format!("auth key: {e}")))?
            }
            None => SigningKey::random(&mut rand::rngs::OsRng),
        };
        let auth_address = address_of(auth_key.verifying_key()).to_lowercase();
        info!(auth = %auth_address, builders = ?prefs.builders, "protection wrapper ready");
        Ok(Self {
            auth_key,
            auth_address,
            prefs,
            status_timeout,
        })
    }

    /// Lower-case `0x` address of the relay auth key.
    pub fn auth_address(&self) -> &str {
        &self.auth_address
    }

    /// Wrap a signed transaction for dispatch.
    pub fn protect(&self, signed: &SignedTx) -> Result<ProtectedTx, RouterError> {
        let raw = format!("0x{}", hex::encode(&signed.raw));
        let payload = match signed.family {
            ChainFamily::Evm => json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_sendPrivateTransaction",
                "params": [{
                    "tx": raw,
                    "maxBlockDelay": format!("0x{:x}", self.prefs.max_block_delay),
                    "preferences": {
                        "fast": self.prefs.fast,
                        "privacy": { "builders": self.prefs.builders },
                    },
                }],
            }),
            ChainFamily::Utxo => json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "sendrawtransaction",
                "params": [raw],
            }),
        };
        let body = serde_json::to_vec(&payload).map_err(|e| RouterError::Protection(e.to_string()))?;
        let digest = keccak256(&body);
        let signature = sign_digest_recoverable(&self.auth_key, &digest)
            .map_err(|e| RouterError::Protection(e.to_string()))?;
        let signature_header = format!("{}:0x{}", self.auth_address, hex::encode(signature));

        let handle = ProtectedTxHandle {
            hash: format!("0x{}", hex::encode(digest)),
            status: TxStatus::Pending,
            protected: true,
        };
        debug!(hash = %handle.hash, tx = %signed.hash, family = %signed.family, "transaction wrapped");
        Ok(ProtectedTx {
            handle,
            body,
            signature_header,
            signed: signed.clone(),
        })
    }

    /// Current status of a wrapped transaction, bounded by the status timeout.
    pub async fn check_status(
        &self,
        handle: &ProtectedTxHandle,
        broadcast: &dyn BroadcastService,
    ) -> Result<ProtectedTxHandle, ProviderError> {
        let status = with_deadline("broadcast-status", self.status_timeout, broadcast.status(&handle.hash)).await?;
        Ok(handle.with_status(status))
    }

    /// Submit a wrapped transaction, bounded by the status timeout.
    pub async fn submit(
        &self,
        tx: &ProtectedTx,
        broadcast: &dyn BroadcastService,
    ) -> Result<TxStatus, ProviderError> {
        with_deadline("broadcast-submit", self.status_timeout, broadcast.submit(tx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
    use keel_core::{Asset, TxRequest};
    use rust_decimal::Decimal;

    const AUTH_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn wrapper() -> ProtectionWrapper {
        let prefs = ProtectionConfig {
            auth_key: Some(AUTH_KEY.into()),
            ..ProtectionConfig::default()
        };
        ProtectionWrapper::new(prefs, Duration::from_millis(50)).unwrap()
    }

    fn signed(family: ChainFamily) -> SignedTx {
        let request = TxRequest::new(
            family,
            Some(1),
            "0x1111111254eeb25477b68fb85ed929f73a960582",
            Asset::new("ETH"),
            Decimal::ONE,
        );
        SignedTx {
            family,
            raw: request.signing_preimage(),
            request,
            signature: vec![0xab; 65],
            hash: "0x01".into(),
        }
    }

    struct FixedStatus {
        status: TxStatus,
        delay: Duration,
    }

    #[async_trait]
    impl BroadcastService for FixedStatus {
        async fn submit(&self, _tx: &ProtectedTx) -> Result<TxStatus, ProviderError> {
            Ok(TxStatus::Pending)
        }

        async fn status(&self, _hash: &str) -> Result<TxStatus, ProviderError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.status)
        }
    }

    #[test]
    fn evm_body_is_private_transaction() {
        let p = wrapper().protect(&signed(ChainFamily::Evm)).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&p.body).unwrap();
        assert_eq!(body["method"], "eth_sendPrivateTransaction");
        assert_eq!(body["params"][0]["preferences"]["fast"], true);
        assert_eq!(body["params"][0]["preferences"]["privacy"]["builders"][0], "flashbots");
        assert_eq!(body["params"][0]["maxBlockDelay"], "0x19");
        assert!(p.handle.protected);
        assert_eq!(p.handle.status, TxStatus::Pending);
    }

    #[test]
    fn utxo_body_is_authenticated_raw_send() {
        let w = wrapper();
        let p = w.protect(&signed(ChainFamily::Utxo)).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&p.body).unwrap();
        assert_eq!(body["method"], "sendrawtransaction");
        assert!(p.handle.protected);
        assert_eq!(p.handle.status, TxStatus::Pending);
        assert!(p.signature_header.starts_with(w.auth_address()));
    }

    #[test]
    fn protect_is_deterministic() {
        let w = wrapper();
        let a = w.protect(&signed(ChainFamily::Evm)).unwrap();
        let b = w.protect(&signed(ChainFamily::Evm)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.handle.hash, format!("0x{}", hex::encode(keccak256(&a.body))));
    }

    #[test]
    fn header_signature_recovers_auth_address() {
        let w = wrapper();
        let p = w.protect(&signed(ChainFamily::Evm)).unwrap();
        let (addr, sig_hex) = p.signature_header.split_once(':').unwrap();
        assert_eq!(addr, w.auth_address());

        let sig_bytes = hex::decode(sig_hex.trim_start_matches("0x")).unwrap();
        let sig = Signature::from_slice(&sig_bytes[..64]).unwrap();
        let recid = RecoveryId::from_byte(sig_bytes[64] - 27).unwrap();
        let key = VerifyingKey::recover_from_prehash(&keccak256(&p.body), &sig, recid).unwrap();
        assert_eq!(address_of(&key).to_lowercase(), addr);
    }

    #[test]
    fn random_key_when_unconfigured() {
        let a = ProtectionWrapper::new(ProtectionConfig::default(), Duration::from_secs(1)).unwrap();
        let b = ProtectionWrapper::new(ProtectionConfig::default(), Duration::from_secs(1)).unwrap();
        assert_ne!(a.auth_address(), b.auth_address());
    }

    #[test]
    fn malformed_auth_key_rejected() {
        let prefs = ProtectionConfig {
            auth_key: Some("zz".into()),
            ..ProtectionConfig::default()
        };
        assert!(matches!(
            ProtectionWrapper::new(prefs, Duration::from_secs(1)),
            Err(RouterError::Protection(_))
        ));
    }

    #[tokio::test]
    async fn check_status_updates_handle() {
        let w = wrapper();
        let p = w.protect(&signed(ChainFamily::Evm)).unwrap();
        let svc = FixedStatus {
            status: TxStatus::Confirmed,
            delay: Duration::ZERO,
        };
        let h = w.check_status(&p.handle, &svc).await.unwrap();
        assert_eq!(h.status, TxStatus::Confirmed);
        assert_eq!(h.hash, p.handle.hash);
    }

    #[tokio::test]
    async fn check_status_times_out() {
        let w = wrapper();
        let p = w.protect(&signed(ChainFamily::Evm)).unwrap();
        let svc = FixedStatus {
            status: TxStatus::Confirmed,
            delay: Duration::from_millis(500),
        };
        let err = w.check_status(&p.handle, &svc).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
