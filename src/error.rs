// src/error.rs
use ethers::types::{Address, U256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymasterError {
    #[error("Invalid length for {field}: expected {expected}, got {actual} bytes")]
    InvalidInputLength {
        field: &'static str,
        expected: String,
        actual: usize,
    },

    #[error("Policy mismatch for {variant} policy: {reason}")]
    PolicyMismatch {
        variant: &'static str,
        reason: String,
    },

    #[error("Policy for chain {policy_chain} cannot sponsor transactions on chain {target_chain}")]
    ChainMismatch { policy_chain: u64, target_chain: u64 },

    #[error("{variant} policy is disabled")]
    PolicyDisabled { variant: &'static str },

    #[error("Function selector 0x{} is not allowed by the {} policy", hex::encode(.selector), .variant)]
    FunctionNotAllowed {
        variant: &'static str,
        selector: [u8; 4],
    },

    #[error("Gas limit {gas_limit} exceeds the {variant} policy cap of {cap}")]
    GasLimitExceeded {
        variant: &'static str,
        gas_limit: U256,
        cap: U256,
    },

    #[error("Arithmetic overflow while computing {0}")]
    ArithmeticOverflow(&'static str),

    #[error("decimals() query failed for token {token:?}: {reason}")]
    TokenQueryFailure { token: Address, reason: String },

    #[error("Signing failed: {0}")]
    SigningFailure(String),

    /// Raised by key sources; a failed acquisition while signing is a `SigningFailure`.
    #[error("Signing key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Unknown sponsorship selector 0x{}", hex::encode(.0))]
    UnknownSponsorshipSelector([u8; 4]),

    #[error("Truncated paymaster input: {section} needs at least {expected} bytes, got {actual}")]
    TruncatedPayload {
        section: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Predicted address {predicted:?} does not match on-chain address {observed:?}")]
    AddressDerivationMismatch {
        predicted: Address,
        observed: Address,
    },

    #[error("{operation} timed out after {millis} ms")]
    Timeout { operation: &'static str, millis: u128 },

    #[error("Ethereum provider error: {0}")]
    EthereumProviderError(String),
}

impl PaymasterError {
    /// Whether the failure came from network flakiness and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PaymasterError::Timeout { .. } | PaymasterError::EthereumProviderError(_)
        )
    }
}
