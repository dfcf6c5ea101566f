// src/rpc.rs
use std::sync::Arc;

use ethers::types::{Address, U256};
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use tracing::{debug, error, info};

use crate::error::PaymasterError;
use crate::nonce::NonceSource;
use crate::paymaster::Paymaster;
use crate::policy::TokenMetadata;
use crate::signer::AuthoritySigner;
use crate::types::{
    PaymasterResponse, PredictAccountRequest, PredictAccountResponse, SponsorRequest, ValidationResult,
    VerifyInputRequest,
};

// Define the RPC interface
#[rpc(server, namespace = "pm")]
pub trait PaymasterRpc {
    /// Resolves the policy and returns a signed `paymasterInput` for the intent
    #[method(name = "sponsorTransaction")]
    async fn sponsor_transaction(&self, request: SponsorRequest) -> RpcResult<PaymasterResponse>;

    /// Checks a `paymasterInput` against the intent before submission
    #[method(name = "verifyPaymasterInput")]
    async fn verify_paymaster_input(&self, request: VerifyInputRequest) -> RpcResult<ValidationResult>;

    /// Computes the CREATE2 address of a not yet deployed account proxy
    #[method(name = "predictAccountAddress")]
    async fn predict_account_address(&self, request: PredictAccountRequest) -> RpcResult<PredictAccountResponse>;

    /// Reserves the next transaction nonce of an account
    #[method(name = "allocateNonce")]
    async fn allocate_nonce(&self, account: Address) -> RpcResult<U256>;
}

pub struct PaymasterRpcImpl<T, S, N> {
    paymaster: Arc<Paymaster<T, S, N>>,
}

impl<T, S, N> PaymasterRpcImpl<T, S, N> {
    pub fn new(paymaster: Arc<Paymaster<T, S, N>>) -> Self {
        Self { paymaster }
    }
}

fn rpc_error(e: PaymasterError) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(-32000, format!("Paymaster error: {}", e), None::<()>)
}

#[async_trait]
impl<T, S, N> PaymasterRpcServer for PaymasterRpcImpl<T, S, N>
where
    T: TokenMetadata + 'static,
    S: AuthoritySigner + 'static,
    N: NonceSource + 'static,
{
    async fn sponsor_transaction(&self, request: SponsorRequest) -> RpcResult<PaymasterResponse> {
        debug!("Received sponsor request for {:?} nonce {}", request.intent.from, request.intent.nonce);

        match self.paymaster.sponsor(&request.intent, &request.policy).await {
            Ok(response) => {
                info!("Successfully sponsored transaction for {:?}", request.intent.from);
                Ok(response)
            }
            Err(e) => {
                error!("Failed to sponsor transaction: {}", e);
                Err(rpc_error(e))
            }
        }
    }

    async fn verify_paymaster_input(&self, request: VerifyInputRequest) -> RpcResult<ValidationResult> {
        self.paymaster
            .verify_input(&request.intent, &request.paymaster_input)
            .map_err(|e| {
                debug!("Rejected paymaster input for {:?}: {}", request.intent.from, e);
                rpc_error(e)
            })
    }

    async fn predict_account_address(&self, request: PredictAccountRequest) -> RpcResult<PredictAccountResponse> {
        self.paymaster.predict_account(&request).map_err(rpc_error)
    }

    async fn allocate_nonce(&self, account: Address) -> RpcResult<U256> {
        self.paymaster.allocate_nonce(account).await.map_err(|e| {
            error!("Failed to allocate nonce for {:?}: {}", account, e);
            rpc_error(e)
        })
    }
}

pub fn register_methods<T, S, N>(module: &mut RpcModule<PaymasterRpcImpl<T, S, N>>) -> anyhow::Result<()>
where
    T: TokenMetadata + 'static,
    S: AuthoritySigner + 'static,
    N: NonceSource + 'static,
{
    module.register_async_method("pm_sponsorTransaction", |params, context| async move {
        let request = params.one::<SponsorRequest>()?;
        context.sponsor_transaction(request).await
    })?;

    module.register_async_method("pm_verifyPaymasterInput", |params, context| async move {
        let request = params.one::<VerifyInputRequest>()?;
        context.verify_paymaster_input(request).await
    })?;

    module.register_async_method("pm_predictAccountAddress", |params, context| async move {
        let request = params.one::<PredictAccountRequest>()?;
        context.predict_account_address(request).await
    })?;

    module.register_async_method("pm_allocateNonce", |params, context| async move {
        let account = params.one::<Address>()?;
        context.allocate_nonce(account).await
    })?;

    Ok(())
}
