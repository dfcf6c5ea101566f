// src/lib.rs
//! Off-chain support for zkSync smart-contract accounts: CREATE2 address
//! prediction for account proxies, and signed `paymasterInput` construction
//! and verification for a sponsoring paymaster.

pub mod address;
pub mod authority;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod nonce;
pub mod paymaster;
pub mod policy;
pub mod retry;
pub mod rpc;
pub mod signer;
pub mod types;
pub mod verifier;

pub use address::predict;
pub use authority::authorize;
pub use codec::{decode_input as decode, encode_input as encode, AuthorizationPayload};
pub use config::NetworkConfig;
pub use error::PaymasterError;
pub use paymaster::Paymaster;
pub use policy::PolicyEngine;
pub use verifier::verify;
