// src/codec.rs
//! `paymasterInput` wire format shared with zkSync paymaster contracts.
//!
//! General flow: `general(bytes innerInput)`, the inner input being the
//! authority signature (or empty on chain-sponsored networks).
//! Approval flow: `approvalBased(address token, uint256 minAllowance, bytes innerInput)`
//! with `innerInput = rate(32) ‖ signature(65)`.

use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, Bytes, Signature, U256};

use crate::authority::word;
use crate::error::PaymasterError;
use crate::types::ChargingParameters;
use crate::verifier::SIGNATURE_LEN;

/// `bytes4(keccak256("general(bytes)"))`
pub const GENERAL_SELECTOR: [u8; 4] = [0x8c, 0x5a, 0x34, 0x45];
/// `bytes4(keccak256("approvalBased(address,uint256,bytes)"))`
pub const APPROVAL_SELECTOR: [u8; 4] = [0x94, 0x94, 0x31, 0xdc];

const WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationPayload {
    General {
        signature: Bytes,
    },
    ApprovalBased {
        token: Address,
        min_allowance: U256,
        rate: U256,
        signature: Bytes,
    },
}

impl AuthorizationPayload {
    /// Picks the flow from the charging parameters: native sponsorship uses the
    /// general flow, token sponsorship the approval flow.
    pub fn new(params: &ChargingParameters, signature: &Signature) -> Self {
        let signature = Bytes::from(signature.to_vec());
        if params.is_native() {
            AuthorizationPayload::General { signature }
        } else {
            AuthorizationPayload::ApprovalBased {
                token: params.token,
                min_allowance: params.min_allowance,
                rate: params.rate,
                signature,
            }
        }
    }

    /// General flow without an authority signature, for chain-sponsored networks.
    pub fn unsigned() -> Self {
        AuthorizationPayload::General {
            signature: Bytes::default(),
        }
    }

    pub fn selector(&self) -> [u8; 4] {
        match self {
            AuthorizationPayload::General { .. } => GENERAL_SELECTOR,
            AuthorizationPayload::ApprovalBased { .. } => APPROVAL_SELECTOR,
        }
    }

    pub fn signature(&self) -> &Bytes {
        match self {
            AuthorizationPayload::General { signature } | AuthorizationPayload::ApprovalBased { signature, .. } => {
                signature
            }
        }
    }

    pub fn token(&self) -> Option<Address> {
        match self {
            AuthorizationPayload::General { .. } => None,
            AuthorizationPayload::ApprovalBased { token, .. } => Some(*token),
        }
    }

    pub fn min_allowance(&self) -> Option<U256> {
        match self {
            AuthorizationPayload::General { .. } => None,
            AuthorizationPayload::ApprovalBased { min_allowance, .. } => Some(*min_allowance),
        }
    }

    /// Rate the signature covers; the general flow always signs a rate of 1.
    pub fn rate(&self) -> U256 {
        match self {
            AuthorizationPayload::General { .. } => U256::one(),
            AuthorizationPayload::ApprovalBased { rate, .. } => *rate,
        }
    }

    pub fn inner_input(&self) -> Vec<u8> {
        match self {
            AuthorizationPayload::General { signature } => signature.to_vec(),
            AuthorizationPayload::ApprovalBased { rate, signature, .. } => {
                let mut inner = Vec::with_capacity(WORD + signature.len());
                inner.extend_from_slice(&word(*rate));
                inner.extend_from_slice(signature);
                inner
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let args = match self {
            AuthorizationPayload::General { .. } => encode(&[Token::Bytes(self.inner_input())]),
            AuthorizationPayload::ApprovalBased {
                token, min_allowance, ..
            } => encode(&[
                Token::Address(*token),
                Token::Uint(*min_allowance),
                Token::Bytes(self.inner_input()),
            ]),
        };

        let mut out = Vec::with_capacity(4 + args.len());
        out.extend_from_slice(&self.selector());
        out.extend_from_slice(&args);
        out.into()
    }
}

pub fn encode_input(params: &ChargingParameters, signature: &Signature) -> Bytes {
    AuthorizationPayload::new(params, signature).to_bytes()
}

pub fn decode_input(input: &[u8]) -> Result<AuthorizationPayload, PaymasterError> {
    if input.len() < 4 {
        return Err(PaymasterError::TruncatedPayload {
            section: "selector",
            expected: 4,
            actual: input.len(),
        });
    }
    let selector = [input[0], input[1], input[2], input[3]];
    let args = &input[4..];

    match selector {
        GENERAL_SELECTOR => {
            let tokens = decode_args("general(bytes)", &[ParamType::Bytes], args, 2 * WORD)?;
            let signature = match <[Token; 1]>::try_from(tokens) {
                Ok([Token::Bytes(signature)]) => signature,
                _ => return Err(shape_mismatch("general(bytes)", 2 * WORD, args.len())),
            };
            // empty is the unsigned input of chain-sponsored networks
            if !signature.is_empty() && signature.len() != SIGNATURE_LEN {
                return Err(PaymasterError::TruncatedPayload {
                    section: "general inner input",
                    expected: SIGNATURE_LEN,
                    actual: signature.len(),
                });
            }
            Ok(AuthorizationPayload::General {
                signature: signature.into(),
            })
        }
        APPROVAL_SELECTOR => {
            let section = "approvalBased(address,uint256,bytes)";
            let params = [ParamType::Address, ParamType::Uint(256), ParamType::Bytes];
            let tokens = decode_args(section, &params, args, 4 * WORD)?;
            let (token, min_allowance, inner) = match <[Token; 3]>::try_from(tokens) {
                Ok([Token::Address(token), Token::Uint(min_allowance), Token::Bytes(inner)]) => {
                    (token, min_allowance, inner)
                }
                _ => return Err(shape_mismatch(section, 4 * WORD, args.len())),
            };

            if inner.len() < WORD + SIGNATURE_LEN {
                return Err(PaymasterError::TruncatedPayload {
                    section: "approval inner input",
                    expected: WORD + SIGNATURE_LEN,
                    actual: inner.len(),
                });
            }
            Ok(AuthorizationPayload::ApprovalBased {
                token,
                min_allowance,
                rate: U256::from_big_endian(&inner[..WORD]),
                signature: inner[WORD..].to_vec().into(),
            })
        }
        unknown => Err(PaymasterError::UnknownSponsorshipSelector(unknown)),
    }
}

/// Decoded tokens that do not have the requested ABI shape.
fn shape_mismatch(section: &'static str, expected: usize, actual: usize) -> PaymasterError {
    PaymasterError::TruncatedPayload {
        section,
        expected,
        actual,
    }
}

fn decode_args(
    section: &'static str,
    params: &[ParamType],
    args: &[u8],
    minimum: usize,
) -> Result<Vec<Token>, PaymasterError> {
    let truncated = |expected: usize| PaymasterError::TruncatedPayload {
        section,
        expected,
        actual: args.len(),
    };
    if args.len() < minimum {
        return Err(truncated(minimum));
    }
    decode(params, args).map_err(|_| truncated(declared_len(params.len(), args).unwrap_or(minimum)))
}

/// Length the trailing dynamic `bytes` argument claims to need, if readable.
fn declared_len(head_words: usize, args: &[u8]) -> Option<usize> {
    let offset_word = args.get((head_words - 1) * WORD..head_words * WORD)?;
    let offset = U256::from_big_endian(offset_word);
    if offset > U256::from(args.len()) {
        return None;
    }
    let offset = offset.as_usize();
    let len = U256::from_big_endian(args.get(offset..offset + WORD)?);
    if len > U256::from(u32::MAX) {
        return None;
    }
    let padded = (len.as_usize() + WORD - 1) / WORD * WORD;
    Some(offset + WORD + padded)
}
