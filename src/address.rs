// src/address.rs
//! zkSync CREATE2 address derivation for account proxies.
//!
//! zkSync does not use Ethereum's `0xff ‖ deployer ‖ salt ‖ keccak(initCode)`
//! preimage. Its derivation is
//! `keccak256(prefix ‖ pad32(deployer) ‖ salt ‖ bytecodeHash ‖ keccak256(constructorInput))`
//! where `prefix = keccak256("zksyncCreate2")` and `bytecodeHash` is the
//! versioned hash of the deployed bytecode (see [`hash_bytecode`]).

use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256};
use ethers::utils::{keccak256, to_checksum};
use sha2::{Digest, Sha256};

use crate::config::NetworkConfig;
use crate::error::PaymasterError;
use crate::types::DeterministicAddressRequest;

const BYTECODE_HASH_VERSION: u8 = 1;
const MAX_BYTECODE_WORDS: usize = u16::MAX as usize;

/// Computes the address `factory` deploys the proxy at.
pub fn predict(
    create2_prefix: H256,
    factory: Address,
    proxy_bytecode_hash: H256,
    salt: H256,
    constructor_input: &[u8],
) -> Address {
    let input_hash = keccak256(constructor_input);

    let mut preimage = Vec::with_capacity(32 * 5);
    preimage.extend_from_slice(create2_prefix.as_bytes());
    preimage.extend_from_slice(H256::from(factory).as_bytes());
    preimage.extend_from_slice(salt.as_bytes());
    preimage.extend_from_slice(proxy_bytecode_hash.as_bytes());
    preimage.extend_from_slice(&input_hash);

    Address::from_slice(&keccak256(&preimage)[12..])
}

/// [`predict`] for a full request, using the network's CREATE2 prefix.
pub fn predict_request(config: &NetworkConfig, request: &DeterministicAddressRequest) -> Address {
    predict(
        config.create2_prefix,
        request.factory_address,
        request.proxy_bytecode_hash,
        request.salt,
        &request.constructor_input,
    )
}

/// EIP-55 rendering of a predicted address.
pub fn checksummed(address: &Address) -> String {
    to_checksum(address, None)
}

/// Salt the account factory derives from `(admin, nonce)`: `keccak256(abi.encode(admin, nonce))`.
pub fn account_salt(admin: Address, creation_nonce: H256) -> H256 {
    let encoded = encode(&[Token::Address(admin), Token::FixedBytes(creation_nonce.as_bytes().to_vec())]);
    H256::from(keccak256(encoded))
}

/// Constructor arguments of the upgradeable proxy: `abi.encode(implementation, "")`.
pub fn proxy_constructor_input(implementation: Address) -> Bytes {
    encode(&[Token::Address(implementation), Token::Bytes(Vec::new())]).into()
}

/// zkSync versioned bytecode hash:
/// `version(1) ‖ 0x00 ‖ u16_be(words) ‖ sha256(bytecode)[4..]`.
pub fn hash_bytecode(bytecode: &[u8]) -> Result<H256, PaymasterError> {
    if bytecode.len() % 32 != 0 {
        return Err(PaymasterError::InvalidInputLength {
            field: "bytecode",
            expected: "a multiple of 32".to_string(),
            actual: bytecode.len(),
        });
    }
    let words = bytecode.len() / 32;
    if words > MAX_BYTECODE_WORDS || words % 2 == 0 {
        return Err(PaymasterError::InvalidInputLength {
            field: "bytecode",
            expected: format!("an odd number of 32-byte words below {}", MAX_BYTECODE_WORDS + 1),
            actual: bytecode.len(),
        });
    }

    let mut hash: [u8; 32] = Sha256::digest(bytecode).into();
    hash[0] = BYTECODE_HASH_VERSION;
    hash[1] = 0;
    hash[2..4].copy_from_slice(&(words as u16).to_be_bytes());
    Ok(H256::from(hash))
}

/// Fails when the factory reports a different address than the one predicted.
pub fn ensure_same_address(predicted: Address, observed: Address) -> Result<(), PaymasterError> {
    if predicted != observed {
        return Err(PaymasterError::AddressDerivationMismatch { predicted, observed });
    }
    Ok(())
}
