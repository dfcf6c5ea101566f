// src/domain.rs
//! Typed-data domain of a smart-contract account, used for plain message
//! signing. This is unrelated to the paymaster authorization digest in
//! [`crate::authority`]; the two hashes must never be interchanged.

use std::sync::Arc;

use ethers::abi::{decode, ParamType};
use ethers::providers::Middleware;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::transaction::eip712::EIP712Domain;
use ethers::types::{Address, TransactionRequest, H256, U256};
use ethers::utils::{id, keccak256};

use crate::config::IoPolicy;
use crate::error::PaymasterError;
use crate::retry::with_retry;

/// `eip712Domain()` from ERC-5267.
const EIP712_DOMAIN_CALL: &str = "eip712Domain()";

fn domain_return_types() -> [ParamType; 7] {
    [
        ParamType::FixedBytes(1),
        ParamType::String,
        ParamType::String,
        ParamType::Uint(256),
        ParamType::Address,
        ParamType::FixedBytes(32),
        ParamType::Array(Box::new(ParamType::Uint(256))),
    ]
}

const FIELD_NAME: u8 = 0x01;
const FIELD_VERSION: u8 = 0x02;
const FIELD_CHAIN_ID: u8 = 0x04;
const FIELD_VERIFYING_CONTRACT: u8 = 0x08;
const FIELD_SALT: u8 = 0x10;

/// Raw `eip712Domain()` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDomain {
    pub fields: u8,
    pub name: String,
    pub version: String,
    pub chain_id: U256,
    pub verifying_contract: Address,
    pub salt: [u8; 32],
}

impl AccountDomain {
    pub async fn fetch<M: Middleware + 'static>(
        client: Arc<M>,
        account: Address,
        io: &IoPolicy,
    ) -> Result<Self, PaymasterError> {
        let call: TypedTransaction = TransactionRequest::new()
            .to(account)
            .data(id(EIP712_DOMAIN_CALL).to_vec())
            .into();
        let call = &call;
        let client = &client;
        let raw = with_retry(io, "eip712Domain", || async move {
            client
                .call(call, None)
                .await
                .map_err(|e| PaymasterError::EthereumProviderError(e.to_string()))
        })
        .await?;

        Self::decode(&raw)
    }

    /// Decodes the ABI-encoded `eip712Domain()` return data.
    pub fn decode(raw: &[u8]) -> Result<Self, PaymasterError> {
        let malformed = |reason: String| PaymasterError::EthereumProviderError(format!("eip712Domain(): {reason}"));
        let mut tokens = decode(&domain_return_types(), raw)
            .map_err(|e| malformed(e.to_string()))?
            .into_iter();

        let mut next = || tokens.next().ok_or_else(|| malformed("missing return value".into()));
        let fields = next()?.into_fixed_bytes().and_then(|b| b.first().copied());
        let name = next()?.into_string();
        let version = next()?.into_string();
        let chain_id = next()?.into_uint();
        let verifying_contract = next()?.into_address();
        let salt = next()?.into_fixed_bytes().and_then(|b| <[u8; 32]>::try_from(b).ok());

        match (fields, name, version, chain_id, verifying_contract, salt) {
            (Some(fields), Some(name), Some(version), Some(chain_id), Some(verifying_contract), Some(salt)) => Ok(Self {
                fields,
                name,
                version,
                chain_id,
                verifying_contract,
                salt,
            }),
            _ => Err(malformed("unexpected return types".into())),
        }
    }

    /// Domain restricted to the fields the contract declares in its bitmap.
    pub fn to_eip712(&self) -> EIP712Domain {
        let has = |flag: u8| self.fields & flag != 0;
        EIP712Domain {
            name: has(FIELD_NAME).then(|| self.name.clone()),
            version: has(FIELD_VERSION).then(|| self.version.clone()),
            chain_id: has(FIELD_CHAIN_ID).then_some(self.chain_id),
            verifying_contract: has(FIELD_VERIFYING_CONTRACT).then_some(self.verifying_contract),
            salt: has(FIELD_SALT).then_some(self.salt),
        }
    }

    pub fn separator(&self) -> H256 {
        H256::from(self.to_eip712().separator())
    }
}

/// `keccak256(0x19 ‖ 0x01 ‖ domainSeparator ‖ structHash)`.
pub fn typed_data_digest(domain_separator: H256, struct_hash: H256) -> H256 {
    let mut preimage = [0u8; 66];
    preimage[0] = 0x19;
    preimage[1] = 0x01;
    preimage[2..34].copy_from_slice(domain_separator.as_bytes());
    preimage[34..].copy_from_slice(struct_hash.as_bytes());
    H256::from(keccak256(preimage))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(fields: u8) -> AccountDomain {
        AccountDomain {
            fields,
            name: "Openfort".into(),
            version: "0.5".into(),
            chain_id: U256::from(300),
            verifying_contract: Address::repeat_byte(0x42),
            salt: [0u8; 32],
        }
    }

    #[test]
    fn honours_field_bitmap() {
        let full = domain(0x0f).to_eip712();
        assert_eq!(full.name.as_deref(), Some("Openfort"));
        assert_eq!(full.chain_id, Some(U256::from(300)));
        assert_eq!(full.salt, None);

        let chain_only = domain(FIELD_CHAIN_ID).to_eip712();
        assert_eq!(chain_only.name, None);
        assert_eq!(chain_only.verifying_contract, None);
        assert_ne!(domain(0x0f).separator(), domain(FIELD_CHAIN_ID).separator());
    }

    #[test]
    fn separator_matches_manual_encoding() {
        let d = domain(0x0f);
        let type_hash =
            keccak256("EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)");
        let encoded = ethers::abi::encode(&[
            ethers::abi::Token::FixedBytes(type_hash.to_vec()),
            ethers::abi::Token::FixedBytes(keccak256("Openfort").to_vec()),
            ethers::abi::Token::FixedBytes(keccak256("0.5").to_vec()),
            ethers::abi::Token::Uint(U256::from(300)),
            ethers::abi::Token::Address(Address::repeat_byte(0x42)),
        ]);
        assert_eq!(d.separator(), H256::from(keccak256(encoded)));
    }

    #[test]
    fn decodes_erc5267_return_data() {
        use ethers::abi::{encode, Token};

        let raw = encode(&[
            Token::FixedBytes(vec![0x0f]),
            Token::String("Openfort".into()),
            Token::String("0.5".into()),
            Token::Uint(U256::from(300)),
            Token::Address(Address::repeat_byte(0x42)),
            Token::FixedBytes(vec![0u8; 32]),
            Token::Array(vec![]),
        ]);
        assert_eq!(AccountDomain::decode(&raw).unwrap(), domain(0x0f));
        assert!(AccountDomain::decode(&raw[..64]).is_err());
    }

    #[test]
    fn typed_digest_prefixes_domain() {
        let sep = H256::repeat_byte(0x01);
        let hash = H256::repeat_byte(0x02);
        let mut expected = vec![0x19, 0x01];
        expected.extend_from_slice(sep.as_bytes());
        expected.extend_from_slice(hash.as_bytes());
        assert_eq!(typed_data_digest(sep, hash), H256::from(keccak256(expected)));
        assert_ne!(typed_data_digest(sep, hash), typed_data_digest(hash, sep));
    }
}
