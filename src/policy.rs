// src/policy.rs
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::prelude::*;
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::error::PaymasterError;
use crate::retry::with_retry;
use crate::types::{ChargingParameters, Sponsorship, SponsorshipPolicy, TransactionIntent, NATIVE_DECIMALS, NATIVE_TOKEN};

abigen!(
    IERC20Metadata,
    r#"[
        function decimals() external view returns (uint8)
    ]"#
);

/// Source of ERC-20 metadata the policy engine charges in.
#[async_trait]
pub trait TokenMetadata: Send + Sync {
    async fn decimals(&self, token: Address) -> Result<u8, PaymasterError>;
}

/// Reads `decimals()` from the token contract through any ethers middleware.
pub struct Erc20Metadata<M> {
    client: Arc<M>,
}

impl<M: Middleware> Erc20Metadata<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<M: Middleware + 'static> TokenMetadata for Erc20Metadata<M> {
    async fn decimals(&self, token: Address) -> Result<u8, PaymasterError> {
        let contract = IERC20Metadata::new(token, self.client.clone());
        contract.decimals().call().await.map_err(|e| {
            if e.is_revert() {
                PaymasterError::TokenQueryFailure {
                    token,
                    reason: e.to_string(),
                }
            } else {
                PaymasterError::EthereumProviderError(e.to_string())
            }
        })
    }
}

/// Decimals per token. The first value stored for a token is kept.
#[derive(Debug, Default)]
pub struct DecimalsCache {
    entries: DashMap<Address, u8>,
}

impl DecimalsCache {
    pub fn get(&self, token: &Address) -> Option<u8> {
        self.entries.get(token).map(|entry| *entry.value())
    }

    /// Stores `decimals` unless a value is already present; returns the cached value.
    pub fn insert(&self, token: Address, decimals: u8) -> u8 {
        *self.entries.entry(token).or_insert(decimals).value()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Turns a sponsorship policy into the charging parameters for one intent.
pub struct PolicyEngine<T> {
    config: NetworkConfig,
    tokens: T,
    cache: DecimalsCache,
}

impl<T: TokenMetadata> PolicyEngine<T> {
    pub fn new(config: NetworkConfig, tokens: T) -> Self {
        Self {
            config,
            tokens,
            cache: DecimalsCache::default(),
        }
    }

    pub fn cache(&self) -> &DecimalsCache {
        &self.cache
    }

    pub async fn resolve(
        &self,
        intent: &TransactionIntent,
        policy: &SponsorshipPolicy,
    ) -> Result<ChargingParameters, PaymasterError> {
        check_rules(self.config.chain_id, intent, policy)?;

        match &policy.sponsorship {
            Sponsorship::PayForUser => Ok(ChargingParameters::native()),
            Sponsorship::FixedRate {
                token,
                token_amount_per_native_unit,
            }
            | Sponsorship::ChargeCustomTokens {
                token,
                token_amount_per_native_unit,
            } => {
                let variant = policy.sponsorship.name();
                if token.is_zero() || *token == NATIVE_TOKEN {
                    return Err(PaymasterError::PolicyMismatch {
                        variant,
                        reason: format!("token {token:?} is not an ERC-20 contract address"),
                    });
                }

                let decimals = self.token_decimals(*token).await?;
                let rate = scaled_rate(*token_amount_per_native_unit, decimals)?;
                let min_allowance = min_allowance(intent.required_native_fee()?, rate)?;
                debug!(
                    variant,
                    token = ?token,
                    %rate,
                    %min_allowance,
                    "resolved token sponsorship"
                );

                Ok(ChargingParameters {
                    token: *token,
                    rate,
                    token_decimals: decimals,
                    min_allowance,
                })
            }
        }
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, PaymasterError> {
        if let Some(decimals) = self.cache.get(&token) {
            return Ok(decimals);
        }

        let decimals = with_retry(&self.config.io, "token decimals", || self.tokens.decimals(token))
            .await
            .map_err(|e| match e {
                PaymasterError::TokenQueryFailure { .. } => e,
                other => PaymasterError::TokenQueryFailure {
                    token,
                    reason: other.to_string(),
                },
            })?;

        info!("Cached decimals {} for token {:?}", decimals, token);
        Ok(self.cache.insert(token, decimals))
    }
}

fn check_rules(target_chain: u64, intent: &TransactionIntent, policy: &SponsorshipPolicy) -> Result<(), PaymasterError> {
    let variant = policy.sponsorship.name();

    if !policy.enabled {
        return Err(PaymasterError::PolicyDisabled { variant });
    }

    if policy.chain_id != target_chain {
        return Err(PaymasterError::ChainMismatch {
            policy_chain: policy.chain_id,
            target_chain,
        });
    }

    if !policy.allow_functions.is_empty() {
        let selector = intent.selector().unwrap_or_default();
        if !policy.allow_functions.contains(&selector) {
            return Err(PaymasterError::FunctionNotAllowed { variant, selector });
        }
    }

    if let Some(cap) = policy.sponsorship_gas_limit {
        if intent.gas_limit > cap {
            return Err(PaymasterError::GasLimitExceeded {
                variant,
                gas_limit: intent.gas_limit,
                cap,
            });
        }
    }

    Ok(())
}

/// `amount * 10^decimals`: token base units per whole native unit.
pub fn scaled_rate(token_amount_per_native_unit: U256, decimals: u8) -> Result<U256, PaymasterError> {
    token_amount_per_native_unit
        .checked_mul(U256::exp10(decimals as usize))
        .ok_or(PaymasterError::ArithmeticOverflow("scaled rate"))
}

/// `fee * rate / 10^18`, truncating.
pub fn min_allowance(required_native_fee: U256, rate: U256) -> Result<U256, PaymasterError> {
    let scaled = required_native_fee
        .checked_mul(rate)
        .ok_or(PaymasterError::ArithmeticOverflow("minimum allowance"))?;
    Ok(scaled / U256::exp10(NATIVE_DECIMALS as usize))
}
