// src/signer.rs
//! Signing seam for the paymaster authority.
//!
//! The core never holds a key between requests: [`ScopedKeySigner`] asks its
//! [`KeySource`] for the wallet on every signature and drops it before
//! returning, on success and on failure alike.

use std::path::PathBuf;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, H256};

use crate::error::PaymasterError;

#[async_trait]
pub trait AuthoritySigner: Send + Sync {
    /// Address the produced signatures recover to.
    fn address(&self) -> Address;

    /// Signs `digest` as an EIP-191 personal message.
    async fn sign_digest(&self, digest: H256) -> Result<Signature, PaymasterError>;
}

#[async_trait]
impl AuthoritySigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign_digest(&self, digest: H256) -> Result<Signature, PaymasterError> {
        self.sign_message(digest.as_bytes())
            .await
            .map_err(|e| PaymasterError::SigningFailure(e.to_string()))
    }
}

/// Hands out key material for the duration of a single signature.
pub trait KeySource: Send + Sync {
    fn acquire(&self) -> Result<LocalWallet, PaymasterError>;
}

impl KeySource for Box<dyn KeySource> {
    fn acquire(&self) -> Result<LocalWallet, PaymasterError> {
        (**self).acquire()
    }
}

/// Hex private key read from an environment variable at signing time.
#[derive(Debug, Clone)]
pub struct EnvKeySource {
    var: String,
}

impl EnvKeySource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl KeySource for EnvKeySource {
    fn acquire(&self) -> Result<LocalWallet, PaymasterError> {
        let key = std::env::var(&self.var)
            .map_err(|_| PaymasterError::KeyUnavailable(format!("environment variable {} is not set", self.var)))?;
        parse_wallet(key.trim())
    }
}

/// Hex private key read from a file at signing time.
#[derive(Debug, Clone)]
pub struct KeyFileSource {
    path: PathBuf,
}

impl KeyFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl KeySource for KeyFileSource {
    fn acquire(&self) -> Result<LocalWallet, PaymasterError> {
        let key = std::fs::read_to_string(&self.path)
            .map_err(|e| PaymasterError::KeyUnavailable(format!("{}: {}", self.path.display(), e)))?;
        parse_wallet(key.trim())
    }
}

fn parse_wallet(hex_key: &str) -> Result<LocalWallet, PaymasterError> {
    hex_key
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .map_err(|e| PaymasterError::KeyUnavailable(format!("invalid private key: {e}")))
}

/// Signs with a key acquired per call. The signer address is resolved once at
/// construction so it can be checked without touching the key again.
pub struct ScopedKeySigner<K> {
    source: K,
    address: Address,
}

impl<K: KeySource> ScopedKeySigner<K> {
    pub fn new(source: K) -> Result<Self, PaymasterError> {
        let address = Signer::address(&source.acquire()?);
        Ok(Self { source, address })
    }
}

#[async_trait]
impl<K: KeySource> AuthoritySigner for ScopedKeySigner<K> {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_digest(&self, digest: H256) -> Result<Signature, PaymasterError> {
        let wallet = self
            .source
            .acquire()
            .map_err(|e| PaymasterError::SigningFailure(format!("signing key could not be acquired: {e}")))?;
        let acquired = Signer::address(&wallet);
        if acquired != self.address {
            return Err(PaymasterError::SigningFailure(format!(
                "key source now yields {:?}, expected {:?}",
                acquired,
                self.address
            )));
        }
        let signature = AuthoritySigner::sign_digest(&wallet, digest).await;
        drop(wallet);
        signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::core::rand::thread_rng;
    use ethers::utils::hash_message;

    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[tokio::test]
    async fn local_wallet_signs_prefixed_digest() {
        let wallet = LocalWallet::new(&mut thread_rng());
        let digest = H256::repeat_byte(0x42);
        let signature = AuthoritySigner::sign_digest(&wallet, digest).await.unwrap();

        assert!(signature.v == 27 || signature.v == 28);
        assert_eq!(signature.recover(hash_message(digest)).unwrap(), Signer::address(&wallet));
    }

    #[tokio::test]
    async fn env_source_is_read_per_signature() {
        let var = "ARKA_ZKSYNC_TEST_SIGNER_KEY";
        std::env::set_var(var, TEST_KEY);
        let signer = ScopedKeySigner::new(EnvKeySource::new(var)).unwrap();
        let expected: LocalWallet = TEST_KEY.trim_start_matches("0x").parse().unwrap();
        assert_eq!(signer.address(), Signer::address(&expected));

        assert!(signer.sign_digest(H256::zero()).await.is_ok());

        std::env::remove_var(var);
        match signer.sign_digest(H256::zero()).await {
            Err(PaymasterError::SigningFailure(reason)) => assert!(reason.contains(var), "{reason}"),
            other => panic!("expected a signing failure, got {other:?}"),
        }
        assert!(matches!(
            ScopedKeySigner::new(EnvKeySource::new(var)),
            Err(PaymasterError::KeyUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn rotated_key_is_refused() {
        let dir = std::env::temp_dir().join(format!("arka-zksync-key-{}", std::process::id()));
        std::fs::write(&dir, TEST_KEY).unwrap();
        let signer = ScopedKeySigner::new(KeyFileSource::new(&dir)).unwrap();

        let other = LocalWallet::new(&mut thread_rng());
        std::fs::write(&dir, hex::encode(other.signer().to_bytes())).unwrap();
        let result = signer.sign_digest(H256::zero()).await;
        std::fs::remove_file(&dir).unwrap();

        assert!(matches!(result, Err(PaymasterError::SigningFailure(_))));
    }

    #[test]
    fn missing_key_file_is_unavailable() {
        let source = KeyFileSource::new("/nonexistent/arka-zksync.key");
        assert!(matches!(source.acquire(), Err(PaymasterError::KeyUnavailable(_))));
    }
}
