// src/verifier.rs
use ethers::types::{Address, Signature, U256};
use ethers::utils::hash_message;

use crate::authority::terms_digest;
use crate::error::PaymasterError;
use crate::types::{ChargingParameters, TransactionIntent};

pub(crate) const SIGNATURE_LEN: usize = 65;

/// Upper bound for `s` accepted by OpenZeppelin's `ECDSA.recover` (secp256k1 n / 2).
const HALF_CURVE_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// Parses `r ‖ s ‖ v`, accepting `v` as 0/1 or 27/28.
pub fn parse_signature(bytes: &[u8]) -> Result<Signature, PaymasterError> {
    if bytes.len() != SIGNATURE_LEN {
        return Err(PaymasterError::MalformedSignature(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let v = match bytes[64] {
        v @ (0 | 1) => v as u64 + 27,
        v @ (27 | 28) => v as u64,
        other => {
            return Err(PaymasterError::MalformedSignature(format!("invalid recovery id {other}")));
        }
    };
    Ok(Signature {
        r: U256::from_big_endian(&bytes[..32]),
        s: U256::from_big_endian(&bytes[32..64]),
        v,
    })
}

/// Checks, before submission, that the paymaster would accept `signature` for
/// this intent. A well-formed signature from another key yields `Ok(false)`.
pub fn verify(
    intent: &TransactionIntent,
    params: &ChargingParameters,
    signature: &[u8],
    expected_signer: Address,
) -> Result<bool, PaymasterError> {
    verify_terms(intent, params.token, params.rate, signature, expected_signer)
}

/// [`verify`] against the `(token, rate)` pair carried by a decoded `paymasterInput`.
pub fn verify_terms(
    intent: &TransactionIntent,
    token: Address,
    rate: U256,
    signature: &[u8],
    expected_signer: Address,
) -> Result<bool, PaymasterError> {
    let signature = parse_signature(signature)?;
    if signature.s > U256::from_big_endian(&HALF_CURVE_ORDER) {
        return Ok(false);
    }

    let message = hash_message(terms_digest(intent, token, rate));
    match signature.recover(message) {
        Ok(signer) => Ok(signer == expected_signer),
        Err(_) => Ok(false),
    }
}
