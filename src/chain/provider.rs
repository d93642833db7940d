//! Chain provider with multi-RPC support and automatic failover

use crate::config::ChainConfig;
use crate::error::{RpcError, RpcErrorKind, SubmitterError, SubmitterResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// JSON-RPC operations consumed by the submission cycle.
///
/// Every failure is returned as an [`RpcError`] whose kind has already been
/// classified, so callers never inspect provider error text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain ID the client is bound to
    fn chain_id(&self) -> u64;

    /// Base fee of the latest block, `None` on chains without EIP-1559
    async fn base_fee_per_gas(&self) -> Result<Option<U256>, RpcError>;

    /// Priority-fee rewards of the last `block_count` blocks, one row per block
    async fn fee_history(
        &self,
        block_count: u64,
        percentiles: &[f64],
    ) -> Result<Vec<Vec<U256>>, RpcError>;

    /// Current legacy gas price
    async fn gas_price(&self) -> Result<U256, RpcError>;

    /// Read-only execution against the latest state
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, RpcError>;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, RpcError>;

    /// Transaction count including mempool-visible transactions
    async fn pending_nonce(&self, address: Address) -> Result<U256, RpcError>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, RpcError>;
}

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Per-request deadline
    request_timeout: Duration,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig, rpc_urls: &[String]) -> SubmitterResult<Self> {
        let mut http_providers = Vec::new();

        for url in rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(SubmitterError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        let request_timeout = Duration::from_secs(config.request_timeout_secs);

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
            request_timeout,
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        if self.http_providers.len() < 2 {
            return;
        }
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    /// Verify the node serves the configured chain
    pub async fn verify_chain_id(&self) -> SubmitterResult<()> {
        let remote = self
            .with_failover("eth_chainId", |p| async move { p.get_chainid().await })
            .await
            .map_err(|e| SubmitterError::ChainConnection {
                chain_id: self.config.chain_id,
                message: e.to_string(),
            })?;

        if remote != U256::from(self.config.chain_id) {
            return Err(SubmitterError::Config(format!(
                "RPC reports chain id {} but {} is configured",
                remote, self.config.chain_id
            )));
        }
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self
            .with_failover("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Health check failed for chain {}: {}", self.config.chain_id, e);
                false
            }
        }
    }

    /// Run a read request, moving to the next provider on transport failures.
    ///
    /// Errors the node answered with a recognised kind are returned as-is;
    /// another provider would give the same answer.
    async fn with_failover<T, F, Fut>(&self, method: &str, request: F) -> Result<T, RpcError>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for _ in 0..self.http_providers.len() {
            let err = match self.timed(method, request(self.http().clone())).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.kind != RpcErrorKind::Other {
                return Err(err);
            }

            warn!(
                "{} failed on chain {}: {}",
                method, self.config.chain_id, err
            );
            self.failover();
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| RpcError::new(format!("{method}: all providers failed"))))
    }

    async fn timed<T>(
        &self,
        method: &str,
        request: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, RpcError> {
        match timeout(self.request_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RpcError::new(e.to_string())),
            Err(_) => Err(RpcError {
                kind: RpcErrorKind::Other,
                message: format!("{method} timed out after {:?}", self.request_timeout),
            }),
        }
    }
}

#[async_trait]
impl ChainClient for ChainProvider {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn base_fee_per_gas(&self) -> Result<Option<U256>, RpcError> {
        let block = self
            .with_failover("eth_getBlockByNumber", |p| async move {
                p.get_block(BlockNumber::Latest).await
            })
            .await?
            .ok_or_else(|| RpcError::new("No latest block"))?;

        Ok(block.base_fee_per_gas)
    }

    async fn fee_history(
        &self,
        block_count: u64,
        percentiles: &[f64],
    ) -> Result<Vec<Vec<U256>>, RpcError> {
        let history = self
            .with_failover("eth_feeHistory", |p| {
                let percentiles = percentiles.to_vec();
                async move {
                    p.fee_history(block_count, BlockNumber::Latest, &percentiles)
                        .await
                }
            })
            .await?;

        Ok(history.reward)
    }

    async fn gas_price(&self) -> Result<U256, RpcError> {
        self.with_failover("eth_gasPrice", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, RpcError> {
        self.with_failover("eth_call", |p| {
            let tx = tx.clone();
            async move { p.call(&tx, Some(BlockNumber::Latest.into())).await }
        })
        .await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, RpcError> {
        self.with_failover("eth_estimateGas", |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(&tx, None).await }
        })
        .await
    }

    async fn pending_nonce(&self, address: Address) -> Result<U256, RpcError> {
        self.with_failover("eth_getTransactionCount", |p| async move {
            p.get_transaction_count(address, Some(BlockNumber::Pending.into()))
                .await
        })
        .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, RpcError> {
        // Single attempt: a transport failure here leaves it unknown whether the
        // node accepted the bytes, so only the next cycle moves providers.
        let provider = self.http().clone();
        let result = self
            .timed("eth_sendRawTransaction", async move {
                let pending = provider.send_raw_transaction(raw).await?;
                Ok::<_, ProviderError>(pending.tx_hash())
            })
            .await;

        if let Err(ref e) = result {
            if e.kind == RpcErrorKind::Other {
                self.failover();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_config() -> ChainConfig {
        ChainConfig {
            chain_id: 1868,
            name: "soneium".to_string(),
            rpc_urls: vec![],
            contract_address: "0xb0F3b3553cE518339c1B5807A392ae904fB658Ec".to_string(),
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn test_rejects_when_no_valid_urls() {
        let result = ChainProvider::new(chain_config(), &["not a url".to_string()]);
        assert!(matches!(
            result,
            Err(SubmitterError::ChainConnection { chain_id: 1868, .. })
        ));
    }

    #[test]
    fn test_failover_rotates_providers() {
        let urls = vec![
            "http://127.0.0.1:8545".to_string(),
            "http://127.0.0.1:8546".to_string(),
        ];
        let provider = ChainProvider::new(chain_config(), &urls).unwrap();
        assert_eq!(provider.chain_id(), 1868);
        assert_eq!(provider.http().url().port(), Some(8545));

        provider.failover();
        assert_eq!(provider.http().url().port(), Some(8546));

        provider.failover();
        assert_eq!(provider.http().url().port(), Some(8545));
    }
}
