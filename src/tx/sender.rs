//! Transaction sender for the vote() call with a single fee-bump retry

use super::fees::{FeeEstimator, FeeFields};
use super::gas::GasEstimator;
use super::nonce::NonceManager;
use crate::chain::{ChainClient, VoteCall};
use crate::config::{ChainConfig, SubmitterConfig};
use crate::error::{SubmitterError, SubmitterResult};

use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which attempt of the cycle got accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attempt {
    Fresh,
    /// Resubmitted once with doubled fees after an underpriced rejection
    Retried,
}

/// An accepted submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReceipt {
    pub tx_hash: H256,
    pub nonce: u64,
    pub gas_limit: U256,
    pub fees: FeeFields,
    pub attempt: Attempt,
}

/// Builds, signs and submits one vote per cycle
pub struct TransactionSender<C: ChainClient> {
    /// Chain access
    client: Arc<C>,
    /// Wallet for signing, bound to the chain ID
    wallet: LocalWallet,
    call: VoteCall,
    nonce_manager: NonceManager,
    fee_estimator: FeeEstimator,
    gas_estimator: GasEstimator,
}

impl<C: ChainClient> TransactionSender<C> {
    /// Create a new transaction sender
    pub fn new(
        client: Arc<C>,
        wallet: LocalWallet,
        chain: &ChainConfig,
        config: &SubmitterConfig,
    ) -> SubmitterResult<Self> {
        let wallet = wallet.with_chain_id(client.chain_id());
        let call = VoteCall::new(&chain.contract_address, U256::from(config.value_wei))?;

        info!(
            "Transaction sender initialized with wallet: {:?}",
            wallet.address()
        );
        debug!(contract = ?call.contract(), calldata = %call.data_hex(), "Vote call encoded");

        Ok(Self {
            nonce_manager: NonceManager::new(wallet.address()),
            client,
            wallet,
            call,
            fee_estimator: FeeEstimator::new(config),
            gas_estimator: GasEstimator::new(config),
        })
    }

    /// Load wallet from the environment variable named in the config
    pub fn load_wallet(private_key_env: &str) -> SubmitterResult<LocalWallet> {
        let key = std::env::var(private_key_env).map_err(|_| {
            SubmitterError::Wallet(format!("No wallet configured. Set {}", private_key_env))
        })?;

        let key = key.trim();
        key.strip_prefix("0x")
            .unwrap_or(key)
            .parse::<LocalWallet>()
            .map_err(|e| SubmitterError::Wallet(format!("Invalid private key: {}", e)))
    }

    /// Run one submission cycle
    pub async fn submit_vote(&self) -> SubmitterResult<SubmissionReceipt> {
        let nonce = self.nonce_manager.next_nonce(self.client.as_ref()).await?;
        let fees = self.fee_estimator.estimate(self.client.as_ref()).await?;

        let request = self.call.simulation_request(self.wallet_address());
        let gas_limit = self
            .gas_estimator
            .estimate_gas_limit(self.client.as_ref(), &request)
            .await?;

        let tx = self.build_vote_tx(nonce, gas_limit, &fees);
        match self.sign_and_send(&tx).await {
            Ok(tx_hash) => {
                info!(
                    ?tx_hash,
                    nonce,
                    %gas_limit,
                    ?fees,
                    max_cost_wei = %GasEstimator::calculate_cost(gas_limit, &fees),
                    "Vote submitted"
                );
                Ok(self
                    .accepted(tx_hash, nonce, gas_limit, fees, Attempt::Fresh)
                    .await)
            }
            Err(e) if e.is_underpriced() => {
                let bumped = fees.doubled();
                warn!(error = %e, nonce, ?bumped, "Vote underpriced, resubmitting with doubled fees");

                let tx = self.build_vote_tx(nonce, gas_limit, &bumped);
                let tx_hash = self.sign_and_send(&tx).await?;
                info!(?tx_hash, nonce, %gas_limit, ?bumped, "Vote resubmitted with higher fee");

                Ok(self
                    .accepted(tx_hash, nonce, gas_limit, bumped, Attempt::Retried)
                    .await)
            }
            Err(e) => Err(e),
        }
    }

    async fn accepted(
        &self,
        tx_hash: H256,
        nonce: u64,
        gas_limit: U256,
        fees: FeeFields,
        attempt: Attempt,
    ) -> SubmissionReceipt {
        self.nonce_manager.mark_submitted(nonce, tx_hash).await;
        crate::metrics::record_tx_submitted(self.client.chain_id(), attempt, nonce, gas_limit, &fees);

        SubmissionReceipt {
            tx_hash,
            nonce,
            gas_limit,
            fees,
            attempt,
        }
    }

    /// Build the priced vote() transaction
    fn build_vote_tx(&self, nonce: u64, gas_limit: U256, fees: &FeeFields) -> TypedTransaction {
        let from = self.wallet_address();
        let chain_id = self.client.chain_id();

        match *fees {
            FeeFields::Legacy { gas_price } => TransactionRequest::new()
                .from(from)
                .to(self.call.contract())
                .value(self.call.value())
                .data(self.call.data().clone())
                .nonce(nonce)
                .gas(gas_limit)
                .gas_price(gas_price)
                .chain_id(chain_id)
                .into(),
            FeeFields::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => Eip1559TransactionRequest::new()
                .from(from)
                .to(self.call.contract())
                .value(self.call.value())
                .data(self.call.data().clone())
                .nonce(nonce)
                .gas(gas_limit)
                .max_fee_per_gas(max_fee_per_gas)
                .max_priority_fee_per_gas(max_priority_fee_per_gas)
                .chain_id(chain_id)
                .into(),
        }
    }

    async fn sign_and_send(&self, tx: &TypedTransaction) -> SubmitterResult<H256> {
        let signature = self
            .wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| SubmitterError::Signing(e.to_string()))?;

        let raw = tx.rlp_signed(&signature);
        Ok(self.client.send_raw_transaction(raw).await?)
    }

    /// Get wallet address
    pub fn wallet_address(&self) -> Address {
        self.wallet.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.client.chain_id()
    }

    pub fn contract_address(&self) -> Address {
        self.call.contract()
    }
}
