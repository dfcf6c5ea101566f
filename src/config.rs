// src/config.rs
//! Network configuration handed explicitly to every component that needs a
//! chain id, an RPC endpoint or a chain-specific constant.

use std::time::Duration;

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

/// `keccak256("zksyncCreate2")`, the domain prefix of zkSync's CREATE2 derivation.
pub const ZKSYNC_CREATE2_PREFIX: [u8; 32] = [
    0x20, 0x20, 0xdb, 0xa9, 0x1b, 0x30, 0xcc, 0x00, 0x06, 0x18, 0x8a, 0xf7, 0x94, 0xc2, 0xfb, 0x30,
    0xdd, 0x85, 0x20, 0xdb, 0x7e, 0x2c, 0x08, 0x8b, 0x7f, 0xc7, 0xc1, 0x03, 0xc0, 0x0c, 0xa4, 0x94,
];

pub const ZKSYNC_SEPOLIA_CHAIN_ID: u64 = 300;
pub const SOPHON_CHAIN_ID: u64 = 50104;
pub const SOPHON_TESTNET_CHAIN_ID: u64 = 531050104;

/// Bounds applied to every blocking call against the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoPolicy {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Attempts made after the first one fails with a transient error.
    pub max_retries: u32,
    /// Base delay between attempts, multiplied by the attempt number.
    pub backoff: Duration,
}

impl Default for IoPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    /// Deployed paymaster contract that receives the `paymasterInput`.
    pub paymaster: Address,
    /// Owner configured on the paymaster; the only signer it accepts.
    pub paymaster_owner: Address,
    pub create2_prefix: H256,
    /// The network's own paymaster sponsors every whitelisted account, so no
    /// authorization signature is produced.
    pub chain_sponsored: bool,
    pub io: IoPolicy,
}

impl NetworkConfig {
    pub fn new(chain_id: u64, rpc_url: impl Into<String>, paymaster: Address, paymaster_owner: Address) -> Self {
        Self {
            chain_id,
            rpc_url: rpc_url.into(),
            paymaster,
            paymaster_owner,
            create2_prefix: H256::from(ZKSYNC_CREATE2_PREFIX),
            chain_sponsored: is_chain_sponsored(chain_id),
            io: IoPolicy::default(),
        }
    }

    pub fn with_io(mut self, io: IoPolicy) -> Self {
        self.io = io;
        self
    }

    pub fn with_create2_prefix(mut self, prefix: H256) -> Self {
        self.create2_prefix = prefix;
        self
    }
}

/// Sophon whitelists accounts on deployment and sponsors them from its own paymaster.
pub fn is_chain_sponsored(chain_id: u64) -> bool {
    matches!(chain_id, SOPHON_CHAIN_ID | SOPHON_TESTNET_CHAIN_ID)
}
