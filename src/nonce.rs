// src/nonce.rs
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::providers::Middleware;
use ethers::types::{Address, BlockNumber, U256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::IoPolicy;
use crate::error::PaymasterError;
use crate::retry::with_retry;

/// Where the first nonce of an account comes from.
#[async_trait]
pub trait NonceSource: Send + Sync {
    async fn pending_nonce(&self, account: Address) -> Result<U256, PaymasterError>;
}

#[async_trait]
impl<M: Middleware + 'static> NonceSource for Arc<M> {
    async fn pending_nonce(&self, account: Address) -> Result<U256, PaymasterError> {
        self.get_transaction_count(account, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| PaymasterError::EthereumProviderError(e.to_string()))
    }
}

/// Hands out nonces without collision when several authorizations are issued
/// for the same account concurrently. Distinct accounts never contend.
pub struct NonceAllocator<S> {
    source: S,
    io: IoPolicy,
    nonces: DashMap<Address, Arc<Mutex<Option<U256>>>>,
}

impl<S: NonceSource> NonceAllocator<S> {
    pub fn new(source: S, io: IoPolicy) -> Self {
        Self {
            source,
            io,
            nonces: DashMap::new(),
        }
    }

    pub async fn next(&self, account: Address) -> Result<U256, PaymasterError> {
        // Clone the Arc so the map shard is not locked across the await below.
        let slot = {
            let entry = self.nonces.entry(account).or_insert_with(|| Arc::new(Mutex::new(None)));
            Arc::clone(entry.value())
        };

        let mut slot = slot.lock().await;
        let nonce = match *slot {
            Some(previous) => previous
                .checked_add(U256::one())
                .ok_or(PaymasterError::ArithmeticOverflow("account nonce"))?,
            None => {
                let fetched = with_retry(&self.io, "pending nonce", || self.source.pending_nonce(account)).await?;
                info!(account = ?account, nonce = %fetched, "initialized nonce for account");
                fetched
            }
        };
        *slot = Some(nonce);
        debug!(account = ?account, nonce = %nonce, "allocated nonce");
        Ok(nonce)
    }

    /// Forgets the cached nonce so the next allocation re-reads the node, e.g.
    /// after a submission failed and the allocated nonce was never consumed.
    pub async fn reset(&self, account: Address) {
        if let Some(slot) = self.nonces.get(&account).map(|e| Arc::clone(e.value())) {
            *slot.lock().await = None;
        }
    }
}
