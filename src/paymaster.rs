// src/paymaster.rs
use ethers::providers::Middleware;
use ethers::types::{Address, H256, U256};
use tracing::{debug, error, info, warn};

use crate::address::{account_salt, checksummed, ensure_same_address, hash_bytecode, predict_request, proxy_constructor_input};
use crate::authority::authorize;
use crate::codec::{decode_input, encode_input, AuthorizationPayload};
use crate::config::NetworkConfig;
use crate::error::PaymasterError;
use crate::nonce::{NonceAllocator, NonceSource};
use crate::policy::{PolicyEngine, TokenMetadata};
use crate::retry::with_retry;
use crate::signer::AuthoritySigner;
use crate::types::{
    fixed, DeterministicAddressRequest, PaymasterResponse, PredictAccountRequest, PredictAccountResponse, SponsorshipPolicy,
    TransactionIntent, ValidationResult, NATIVE_TOKEN,
};
use crate::verifier::{verify, verify_terms};

/// Sponsorship pipeline: policy resolution, authorization, self-check and
/// `paymasterInput` encoding for one network.
pub struct Paymaster<T, S, N> {
    config: NetworkConfig,
    engine: PolicyEngine<T>,
    signer: S,
    nonces: NonceAllocator<N>,
}

impl<T, S, N> Paymaster<T, S, N>
where
    T: TokenMetadata,
    S: AuthoritySigner,
    N: NonceSource,
{
    pub fn new(config: NetworkConfig, tokens: T, signer: S, nonces: N) -> Self {
        if signer.address() != config.paymaster_owner {
            warn!(
                "Signer {:?} is not the paymaster owner {:?}; every authorization will be refused",
                signer.address(),
                config.paymaster_owner
            );
        }
        info!(
            "Initialized paymaster {:?} on chain {} (chain sponsored: {})",
            config.paymaster, config.chain_id, config.chain_sponsored
        );

        let io = config.io;
        Self {
            engine: PolicyEngine::new(config.clone(), tokens),
            nonces: NonceAllocator::new(nonces, io),
            config,
            signer,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn engine(&self) -> &PolicyEngine<T> {
        &self.engine
    }

    /// Builds the `paymasterInput` sponsoring `intent` under `policy`.
    pub async fn sponsor(
        &self,
        intent: &TransactionIntent,
        policy: &SponsorshipPolicy,
    ) -> Result<PaymasterResponse, PaymasterError> {
        if self.config.chain_sponsored {
            debug!("Chain {} sponsors {:?} without authorization", self.config.chain_id, intent.from);
            return Ok(PaymasterResponse {
                paymaster: self.config.paymaster,
                paymaster_input: AuthorizationPayload::unsigned().to_bytes(),
                charging: None,
            });
        }

        let params = self.engine.resolve(intent, policy).await?;
        let signature = authorize(intent, &params, &self.signer).await?;

        // The paymaster only accepts its owner; refuse here rather than on-chain.
        if !verify(intent, &params, &signature.to_vec(), self.config.paymaster_owner)? {
            error!(
                "Authorization for {:?} nonce {} does not recover to paymaster owner {:?}",
                intent.from, intent.nonce, self.config.paymaster_owner
            );
            return Err(PaymasterError::SigningFailure(format!(
                "signer {:?} is not the paymaster owner {:?}",
                self.signer.address(),
                self.config.paymaster_owner
            )));
        }

        info!(
            "Sponsored {:?} nonce {} under {} policy",
            intent.from,
            intent.nonce,
            policy.sponsorship.name()
        );
        Ok(PaymasterResponse {
            paymaster: self.config.paymaster,
            paymaster_input: encode_input(&params, &signature),
            charging: Some(params),
        })
    }

    /// Checks an already-built `paymasterInput` the way the paymaster contract would.
    pub fn verify_input(&self, intent: &TransactionIntent, paymaster_input: &[u8]) -> Result<ValidationResult, PaymasterError> {
        let payload = decode_input(paymaster_input)?;

        if payload.signature().is_empty() {
            let reason = (!self.config.chain_sponsored)
                .then(|| format!("chain {} requires a paymaster signature", self.config.chain_id));
            return Ok(ValidationResult {
                valid: self.config.chain_sponsored,
                reason,
            });
        }

        let token = payload.token().unwrap_or(NATIVE_TOKEN);
        let valid = verify_terms(
            intent,
            token,
            payload.rate(),
            payload.signature(),
            self.config.paymaster_owner,
        )?;
        Ok(ValidationResult {
            valid,
            reason: (!valid).then(|| "signature does not recover to the paymaster owner".to_string()),
        })
    }

    /// Address the factory will deploy `request.admin`'s account proxy at.
    pub fn predict_account(&self, request: &PredictAccountRequest) -> Result<PredictAccountResponse, PaymasterError> {
        let bytecode_hash = match (&request.proxy_bytecode, &request.proxy_bytecode_hash) {
            (Some(bytecode), _) => hash_bytecode(bytecode)?,
            (None, Some(hash)) => H256::from_slice(fixed::<32>("proxyBytecodeHash", hash)?),
            (None, None) => {
                return Err(PaymasterError::InvalidInputLength {
                    field: "proxyBytecodeHash",
                    expected: "32".to_string(),
                    actual: 0,
                })
            }
        };

        let salt = account_salt(request.admin, request.nonce);
        let prediction = DeterministicAddressRequest {
            factory_address: request.factory,
            proxy_bytecode_hash: bytecode_hash,
            salt,
            constructor_input: proxy_constructor_input(request.implementation),
        };
        let address = predict_request(&self.config, &prediction);
        debug!("Predicted account {:?} for admin {:?}", address, request.admin);

        Ok(PredictAccountResponse {
            address: checksummed(&address),
            salt,
        })
    }

    /// Compares a prediction with the address the factory reported and returns
    /// whether the node already has code there.
    pub async fn confirm_account_deployment<M: Middleware>(
        &self,
        client: &M,
        predicted: Address,
        observed: Address,
    ) -> Result<bool, PaymasterError> {
        if let Err(e) = ensure_same_address(predicted, observed) {
            error!("{}", e);
            return Err(e);
        }

        let code = with_retry(&self.config.io, "account code", || async move {
            client
                .get_code(predicted, None)
                .await
                .map_err(|e| PaymasterError::EthereumProviderError(e.to_string()))
        })
        .await?;
        Ok(!code.is_empty())
    }

    /// Next nonce to authorize for `account`, serialized per account.
    pub async fn allocate_nonce(&self, account: Address) -> Result<U256, PaymasterError> {
        self.nonces.next(account).await
    }

    /// Drops the cached nonce after a submission that did not consume it.
    pub async fn release_nonce(&self, account: Address) {
        self.nonces.reset(account).await
    }
}
