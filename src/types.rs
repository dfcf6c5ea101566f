// src/types.rs
use ethers::types::{Address, Bytes, H160, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::PaymasterError;

/// Sentinel the paymaster contract uses for the chain's native token.
pub const NATIVE_TOKEN: Address = H160([0xee; 20]);
pub const NATIVE_DECIMALS: u8 = 18;

/// First four bytes of a call's data.
pub type Selector = [u8; 4];

/// A transaction the paymaster is asked to sponsor. Every field is part of the
/// signed digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionIntent {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
    pub max_fee_per_gas: U256,
    pub gas_limit: U256,
    pub nonce: U256,
}

impl TransactionIntent {
    pub fn selector(&self) -> Option<Selector> {
        self.data.get(..4).map(|s| [s[0], s[1], s[2], s[3]])
    }

    /// Upper bound of the native fee the paymaster may pay, `maxFeePerGas * gasLimit`.
    pub fn required_native_fee(&self) -> Result<U256, PaymasterError> {
        self.max_fee_per_gas
            .checked_mul(self.gas_limit)
            .ok_or(PaymasterError::ArithmeticOverflow("required native fee"))
    }
}

/// How gas is sponsored. Token variants always carry their token and rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSponsorship", into = "RawSponsorship")]
pub enum Sponsorship {
    PayForUser,
    FixedRate {
        token: Address,
        token_amount_per_native_unit: U256,
    },
    ChargeCustomTokens {
        token: Address,
        token_amount_per_native_unit: U256,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SponsorshipKind {
    PayForUser,
    FixedRate,
    ChargeCustomTokens,
}

impl SponsorshipKind {
    pub fn name(self) -> &'static str {
        match self {
            SponsorshipKind::PayForUser => "pay_for_user",
            SponsorshipKind::FixedRate => "fixed_rate",
            SponsorshipKind::ChargeCustomTokens => "charge_custom_tokens",
        }
    }
}

/// Backend wire shape of a sponsorship, before the token fields are checked
/// against the variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSponsorship {
    sponsorship_type: SponsorshipKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_contract_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_contract_amount: Option<U256>,
}

impl TryFrom<RawSponsorship> for Sponsorship {
    type Error = PaymasterError;

    fn try_from(raw: RawSponsorship) -> Result<Self, Self::Error> {
        Sponsorship::from_parts(raw.sponsorship_type, raw.token_contract_address, raw.token_contract_amount)
    }
}

impl From<Sponsorship> for RawSponsorship {
    fn from(sponsorship: Sponsorship) -> Self {
        match sponsorship {
            Sponsorship::PayForUser => RawSponsorship {
                sponsorship_type: SponsorshipKind::PayForUser,
                token_contract_address: None,
                token_contract_amount: None,
            },
            Sponsorship::FixedRate {
                token,
                token_amount_per_native_unit,
            } => RawSponsorship {
                sponsorship_type: SponsorshipKind::FixedRate,
                token_contract_address: Some(token),
                token_contract_amount: Some(token_amount_per_native_unit),
            },
            Sponsorship::ChargeCustomTokens {
                token,
                token_amount_per_native_unit,
            } => RawSponsorship {
                sponsorship_type: SponsorshipKind::ChargeCustomTokens,
                token_contract_address: Some(token),
                token_contract_amount: Some(token_amount_per_native_unit),
            },
        }
    }
}

impl Sponsorship {
    /// Builds the variant from untyped policy fields. Token and amount must be
    /// present exactly when the variant charges a token.
    pub fn from_parts(
        kind: SponsorshipKind,
        token: Option<Address>,
        token_amount_per_native_unit: Option<U256>,
    ) -> Result<Self, PaymasterError> {
        let mismatch = |reason: &str| PaymasterError::PolicyMismatch {
            variant: kind.name(),
            reason: reason.to_string(),
        };
        match (kind, token, token_amount_per_native_unit) {
            (SponsorshipKind::PayForUser, None, None) => Ok(Sponsorship::PayForUser),
            (SponsorshipKind::PayForUser, _, _) => Err(mismatch("native sponsorship carries no token or token amount")),
            (SponsorshipKind::FixedRate, Some(token), Some(token_amount_per_native_unit)) => Ok(Sponsorship::FixedRate {
                token,
                token_amount_per_native_unit,
            }),
            (SponsorshipKind::ChargeCustomTokens, Some(token), Some(token_amount_per_native_unit)) => {
                Ok(Sponsorship::ChargeCustomTokens {
                    token,
                    token_amount_per_native_unit,
                })
            }
            (_, None, _) => Err(mismatch("token sponsorship requires tokenContractAddress")),
            (_, Some(_), None) => Err(mismatch("token sponsorship requires tokenContractAmount")),
        }
    }

    pub fn kind(&self) -> SponsorshipKind {
        match self {
            Sponsorship::PayForUser => SponsorshipKind::PayForUser,
            Sponsorship::FixedRate { .. } => SponsorshipKind::FixedRate,
            Sponsorship::ChargeCustomTokens { .. } => SponsorshipKind::ChargeCustomTokens,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn token(&self) -> Option<Address> {
        match self {
            Sponsorship::PayForUser => None,
            Sponsorship::FixedRate { token, .. } | Sponsorship::ChargeCustomTokens { token, .. } => Some(*token),
        }
    }
}

/// Operator-owned sponsorship rules, looked up per transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipPolicy {
    pub chain_id: u64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Allowed function selectors; empty allows every call.
    #[serde(default, with = "selector_list_serde")]
    pub allow_functions: Vec<Selector>,
    #[serde(default)]
    pub sponsorship_gas_limit: Option<U256>,
    #[serde(flatten)]
    pub sponsorship: Sponsorship,
}

fn enabled_by_default() -> bool {
    true
}

impl SponsorshipPolicy {
    pub fn new(chain_id: u64, sponsorship: Sponsorship) -> Self {
        Self {
            chain_id,
            enabled: true,
            allow_functions: Vec::new(),
            sponsorship_gas_limit: None,
            sponsorship,
        }
    }

    pub fn pay_for_user(chain_id: u64) -> Self {
        Self::new(chain_id, Sponsorship::PayForUser)
    }

    pub fn fixed_rate(chain_id: u64, token: Address, token_amount_per_native_unit: U256) -> Self {
        Self::new(
            chain_id,
            Sponsorship::FixedRate {
                token,
                token_amount_per_native_unit,
            },
        )
    }

    pub fn charge_custom_tokens(chain_id: u64, token: Address, token_amount_per_native_unit: U256) -> Self {
        Self::new(
            chain_id,
            Sponsorship::ChargeCustomTokens {
                token,
                token_amount_per_native_unit,
            },
        )
    }

    pub fn with_allowed_functions(mut self, selectors: Vec<Selector>) -> Self {
        self.allow_functions = selectors;
        self
    }

    pub fn with_gas_limit(mut self, cap: U256) -> Self {
        self.sponsorship_gas_limit = Some(cap);
        self
    }
}

/// What the paymaster charges for one intent under one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingParameters {
    /// [`NATIVE_TOKEN`] when the sponsor pays in the native token.
    pub token: Address,
    /// Token base units charged per 10^18 units of native fee; 1 for native sponsorship.
    pub rate: U256,
    pub token_decimals: u8,
    pub min_allowance: U256,
}

impl ChargingParameters {
    pub fn native() -> Self {
        Self {
            token: NATIVE_TOKEN,
            rate: U256::one(),
            token_decimals: NATIVE_DECIMALS,
            min_allowance: U256::zero(),
        }
    }

    pub fn is_native(&self) -> bool {
        self.token == NATIVE_TOKEN
    }
}

/// Inputs of a zkSync CREATE2 address prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeterministicAddressRequest {
    pub factory_address: Address,
    /// Versioned hash of the proxy's bytecode, not the implementation's.
    pub proxy_bytecode_hash: H256,
    pub salt: H256,
    pub constructor_input: Bytes,
}

impl DeterministicAddressRequest {
    /// Builds a request from untyped byte slices, checking every fixed-size field.
    pub fn from_slices(
        factory_address: &[u8],
        proxy_bytecode_hash: &[u8],
        salt: &[u8],
        constructor_input: &[u8],
    ) -> Result<Self, PaymasterError> {
        Ok(Self {
            factory_address: Address::from_slice(fixed::<20>("factoryAddress", factory_address)?),
            proxy_bytecode_hash: H256::from_slice(fixed::<32>("proxyBytecodeHash", proxy_bytecode_hash)?),
            salt: H256::from_slice(fixed::<32>("salt", salt)?),
            constructor_input: Bytes::from(constructor_input.to_vec()),
        })
    }
}

pub(crate) fn fixed<'a, const N: usize>(field: &'static str, bytes: &'a [u8]) -> Result<&'a [u8], PaymasterError> {
    if bytes.len() != N {
        return Err(PaymasterError::InvalidInputLength {
            field,
            expected: N.to_string(),
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorRequest {
    pub intent: TransactionIntent,
    pub policy: SponsorshipPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterResponse {
    pub paymaster: Address,
    pub paymaster_input: Bytes,
    /// Absent when the network sponsors the account without a signature.
    pub charging: Option<ChargingParameters>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyInputRequest {
    pub intent: TransactionIntent,
    pub paymaster_input: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictAccountRequest {
    pub factory: Address,
    pub implementation: Address,
    pub admin: Address,
    pub nonce: H256,
    /// Raw proxy bytecode; hashed with the zkSync bytecode hash when given.
    #[serde(default)]
    pub proxy_bytecode: Option<Bytes>,
    /// Precomputed versioned bytecode hash, used when no bytecode is given.
    #[serde(default)]
    pub proxy_bytecode_hash: Option<Bytes>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictAccountResponse {
    /// EIP-55 checksummed.
    pub address: String,
    pub salt: H256,
}

mod selector_list_serde {
    use super::Selector;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(selectors: &[Selector], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(selectors.iter().map(|s| format!("0x{}", hex::encode(s))))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Selector>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| {
                let bytes = hex::decode(s.trim_start_matches("0x")).map_err(D::Error::custom)?;
                <Selector>::try_from(bytes.as_slice())
                    .map_err(|_| D::Error::custom(format!("selector {s} is not 4 bytes")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn native_sentinel_matches_checksummed_constant() {
        let parsed: Address = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE".parse().unwrap();
        assert_eq!(parsed, NATIVE_TOKEN);
    }

    #[test]
    fn policy_deserializes_from_backend_shape() {
        let policy: SponsorshipPolicy = serde_json::from_value(json!({
            "chainId": 300,
            "enabled": true,
            "allowFunctions": ["0x40c10f19"],
            "sponsorshipType": "fixed_rate",
            "tokenContractAddress": "0x0a433954e786712354c5917d0870895c29ef7ae4",
            "tokenContractAmount": "0x20"
        }))
        .unwrap();

        assert_eq!(policy.allow_functions, vec![[0x40, 0xc1, 0x0f, 0x19]]);
        assert_eq!(policy.sponsorship.name(), "fixed_rate");
        assert_eq!(
            policy.sponsorship,
            Sponsorship::FixedRate {
                token: "0x0a433954e786712354c5917d0870895c29ef7ae4".parse().unwrap(),
                token_amount_per_native_unit: U256::from(32),
            }
        );
    }

    #[test]
    fn token_policy_without_token_is_unrepresentable() {
        let res = serde_json::from_value::<SponsorshipPolicy>(json!({
            "chainId": 300,
            "sponsorshipType": "charge_custom_tokens",
            "tokenContractAmount": "0x20"
        }));
        assert!(res.is_err());

        let pay_for_user: SponsorshipPolicy =
            serde_json::from_value(json!({ "chainId": 300, "sponsorshipType": "pay_for_user" })).unwrap();
        assert_eq!(pay_for_user.sponsorship.token(), None);
        assert!(pay_for_user.enabled);
    }

    #[test]
    fn pay_for_user_with_token_is_a_policy_mismatch() {
        let err = serde_json::from_value::<SponsorshipPolicy>(json!({
            "chainId": 300,
            "sponsorshipType": "pay_for_user",
            "tokenContractAddress": "0x0a433954e786712354c5917d0870895c29ef7ae4",
            "tokenContractAmount": "0x20"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Policy mismatch for pay_for_user"), "{err}");

        assert!(matches!(
            Sponsorship::from_parts(SponsorshipKind::PayForUser, Some(Address::repeat_byte(0x0a)), None),
            Err(PaymasterError::PolicyMismatch { variant: "pay_for_user", .. })
        ));
        assert!(matches!(
            Sponsorship::from_parts(SponsorshipKind::FixedRate, Some(Address::repeat_byte(0x0a)), None),
            Err(PaymasterError::PolicyMismatch { variant: "fixed_rate", .. })
        ));
    }

    #[test]
    fn policy_serializes_to_backend_shape() {
        let token: Address = "0x0a433954e786712354c5917d0870895c29ef7ae4".parse().unwrap();
        let value = serde_json::to_value(SponsorshipPolicy::fixed_rate(300, token, U256::from(32))).unwrap();
        assert_eq!(value["sponsorshipType"], "fixed_rate");
        assert_eq!(value["tokenContractAmount"], "0x20");

        let native = serde_json::to_value(SponsorshipPolicy::pay_for_user(300)).unwrap();
        assert!(native.get("tokenContractAddress").is_none());
    }

    #[test]
    fn required_fee_overflow_is_reported() {
        let intent = TransactionIntent {
            from: Address::zero(),
            to: Address::zero(),
            data: Bytes::default(),
            value: U256::zero(),
            max_fee_per_gas: U256::MAX,
            gas_limit: U256::from(2),
            nonce: U256::zero(),
        };
        assert!(matches!(
            intent.required_native_fee(),
            Err(PaymasterError::ArithmeticOverflow(_))
        ));
    }

    #[test]
    fn request_from_slices_rejects_short_hash() {
        let err = DeterministicAddressRequest::from_slices(&[0u8; 20], &[0u8; 31], &[0u8; 32], &[]).unwrap_err();
        assert!(matches!(
            err,
            PaymasterError::InvalidInputLength { field: "proxyBytecodeHash", actual: 31, .. }
        ));
    }
}
