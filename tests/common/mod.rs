#![allow(dead_code)]

use std::collections::HashMap;

use arka_zksync::config::NetworkConfig;
use arka_zksync::nonce::NonceSource;
use arka_zksync::policy::TokenMetadata;
use arka_zksync::types::TransactionIntent;
use arka_zksync::{Paymaster, PaymasterError};
use async_trait::async_trait;
use ethers::core::rand::thread_rng;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, U256};

pub const CHAIN_ID: u64 = 300;

pub const MOCK_ERC20: Address = ethers::types::H160([0x0a; 20]);
pub const MOCK_ERC20_9: Address = ethers::types::H160([0x09; 20]);

pub struct MockTokens(pub HashMap<Address, u8>);

impl Default for MockTokens {
    fn default() -> Self {
        Self(HashMap::from([(MOCK_ERC20, 18), (MOCK_ERC20_9, 9)]))
    }
}

#[async_trait]
impl TokenMetadata for MockTokens {
    async fn decimals(&self, token: Address) -> Result<u8, PaymasterError> {
        self.0.get(&token).copied().ok_or_else(|| PaymasterError::TokenQueryFailure {
            token,
            reason: "execution reverted".into(),
        })
    }
}

pub struct ZeroNonce;

#[async_trait]
impl NonceSource for ZeroNonce {
    async fn pending_nonce(&self, _account: Address) -> Result<U256, PaymasterError> {
        Ok(U256::zero())
    }
}

pub type TestPaymaster = Paymaster<MockTokens, LocalWallet, ZeroNonce>;

pub fn paymaster_with(owner: &LocalWallet, signer: LocalWallet, chain_id: u64) -> TestPaymaster {
    let config = NetworkConfig::new(chain_id, "http://127.0.0.1:8011", Address::repeat_byte(0x99), owner.address());
    Paymaster::new(config, MockTokens::default(), signer, ZeroNonce)
}

pub fn paymaster() -> (TestPaymaster, LocalWallet) {
    let owner = LocalWallet::new(&mut thread_rng());
    (paymaster_with(&owner, owner.clone(), CHAIN_ID), owner)
}

/// `mint(address)` call against a mock NFT.
pub fn mint_intent() -> TransactionIntent {
    let mut data = vec![0x6a, 0x62, 0x78, 0x4a];
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(&[0x95; 20]);
    TransactionIntent {
        from: "0x9590Ed0C18190a310f4e93CAccc4CC17270bED40".parse().unwrap(),
        to: "0x6D62c01040B51405acdF9C32577ca91FB64B8727".parse().unwrap(),
        data: Bytes::from(data),
        value: U256::zero(),
        max_fee_per_gas: U256::from(46_037_767u64),
        gas_limit: U256::from(2_219_764u64),
        nonce: U256::from(1234),
    }
}
