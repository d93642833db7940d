//! Nonce management for back-to-back submissions
//!
//! Handles:
//! - Reading the pending nonce so mempool transactions are counted
//! - Recording the hash sent for each nonce
//! - Flagging a node that no longer reports our last submission

use crate::chain::ChainClient;
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::{Address, H256, U256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Last nonce this process got accepted
#[derive(Debug, Default)]
struct SubmittedNonce {
    nonce: Option<u64>,
    tx_hash: Option<H256>,
}

/// Hands out nonces for a single sender account
pub struct NonceManager {
    /// Wallet address
    wallet_address: Address,
    state: Mutex<SubmittedNonce>,
}

impl NonceManager {
    /// Create a new nonce manager
    pub fn new(wallet_address: Address) -> Self {
        Self {
            wallet_address,
            state: Mutex::new(SubmittedNonce::default()),
        }
    }

    /// Next nonce to use: always the node's pending count.
    ///
    /// A pending count at or below the last accepted nonce means the node has
    /// not seen that transaction or it was dropped. The slot is reused; a still
    /// pending original is replaced through the underpriced resubmission.
    pub async fn next_nonce<C>(&self, client: &C) -> SubmitterResult<u64>
    where
        C: ChainClient + ?Sized,
    {
        let pending = self.fetch_pending(client).await?;
        let state = self.state.lock().await;

        if let Some(last) = state.nonce.filter(|last| pending <= *last) {
            warn!(
                pending,
                last_submitted = last,
                last_tx = ?state.tx_hash,
                "Node does not count our last submission, reusing its pending nonce"
            );
        }

        debug!("Allocated nonce {} for chain {}", pending, client.chain_id());
        Ok(pending)
    }

    /// Record an accepted submission
    pub async fn mark_submitted(&self, nonce: u64, tx_hash: H256) {
        let mut state = self.state.lock().await;
        state.nonce = Some(nonce);
        state.tx_hash = Some(tx_hash);
    }

    #[cfg(test)]
    pub async fn last_submitted(&self) -> Option<u64> {
        self.state.lock().await.nonce
    }

    /// Fetch the pending nonce from chain
    async fn fetch_pending<C>(&self, client: &C) -> SubmitterResult<u64>
    where
        C: ChainClient + ?Sized,
    {
        let nonce = client
            .pending_nonce(self.wallet_address)
            .await
            .map_err(|e| SubmitterError::Nonce {
                chain_id: client.chain_id(),
                message: e.to_string(),
            })?;

        if nonce > U256::from(u64::MAX) {
            return Err(SubmitterError::Nonce {
                chain_id: client.chain_id(),
                message: format!("nonce {} does not fit in u64", nonce),
            });
        }

        Ok(nonce.as_u64())
    }
}
