// src/authority.rs
use ethers::types::{Address, Signature, H256, U256};
use ethers::utils::keccak256;

use crate::error::PaymasterError;
use crate::signer::AuthoritySigner;
use crate::types::{ChargingParameters, TransactionIntent};

/// Packed encoding the paymaster contract hashes:
/// `from ‖ to ‖ data ‖ value ‖ maxFeePerGas ‖ gasLimit ‖ nonce ‖ token ‖ rate`,
/// with addresses as 20 bytes and integers as 32-byte big-endian words.
pub fn encode_authorization(intent: &TransactionIntent, params: &ChargingParameters) -> Vec<u8> {
    encode_terms(intent, params.token, params.rate)
}

/// [`encode_authorization`] from the only charging terms the contract signs over.
pub fn encode_terms(intent: &TransactionIntent, token: Address, rate: U256) -> Vec<u8> {
    let mut data = Vec::with_capacity(20 * 3 + 32 * 5 + intent.data.len());
    data.extend_from_slice(intent.from.as_bytes());
    data.extend_from_slice(intent.to.as_bytes());
    data.extend_from_slice(&intent.data);
    data.extend_from_slice(&word(intent.value));
    data.extend_from_slice(&word(intent.max_fee_per_gas));
    data.extend_from_slice(&word(intent.gas_limit));
    data.extend_from_slice(&word(intent.nonce));
    data.extend_from_slice(token.as_bytes());
    data.extend_from_slice(&word(rate));
    data
}

pub fn authorization_digest(intent: &TransactionIntent, params: &ChargingParameters) -> H256 {
    terms_digest(intent, params.token, params.rate)
}

pub fn terms_digest(intent: &TransactionIntent, token: Address, rate: U256) -> H256 {
    H256::from(keccak256(encode_terms(intent, token, rate)))
}

/// Signs the authorization digest for `intent` under `params`.
pub async fn authorize<S>(
    intent: &TransactionIntent,
    params: &ChargingParameters,
    signer: &S,
) -> Result<Signature, PaymasterError>
where
    S: AuthoritySigner + ?Sized,
{
    signer.sign_digest(authorization_digest(intent, params)).await
}

pub(crate) fn word(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}
