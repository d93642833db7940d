//! Gas limit estimation with a preflight simulation

use super::fees::FeeFields;
use crate::chain::ChainClient;
use crate::config::SubmitterConfig;
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use tracing::debug;

const BPS_DENOMINATOR: u64 = 10_000;

/// Gas estimator for the vote transaction
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Multiplier for the node's estimate in basis points (12_000 = 1.20x)
    gas_limit_multiplier_bps: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(config: &SubmitterConfig) -> Self {
        Self::with_multiplier_bps(config.gas_limit_multiplier_bps())
    }

    pub fn with_multiplier_bps(gas_limit_multiplier_bps: u64) -> Self {
        Self {
            gas_limit_multiplier_bps: gas_limit_multiplier_bps.max(BPS_DENOMINATOR),
        }
    }

    /// Simulate, estimate and buffer.
    ///
    /// A failed simulation short-circuits: no estimate is requested.
    pub async fn estimate_gas_limit<C>(
        &self,
        client: &C,
        request: &TypedTransaction,
    ) -> SubmitterResult<U256>
    where
        C: ChainClient + ?Sized,
    {
        client
            .call(request)
            .await
            .map_err(|e| SubmitterError::PreflightRevert(e.to_string()))?;

        let estimate = client
            .estimate_gas(request)
            .await
            .map_err(|e| SubmitterError::GasEstimation(e.to_string()))?;

        if estimate.is_zero() {
            return Err(SubmitterError::GasEstimation(
                "node returned a zero gas estimate".to_string(),
            ));
        }

        let gas_limit = self.apply_buffer(estimate);
        debug!(%estimate, %gas_limit, "Gas limit set for transaction");
        Ok(gas_limit)
    }

    /// `floor(estimate * multiplier)`
    pub fn apply_buffer(&self, estimate: U256) -> U256 {
        estimate.saturating_mul(U256::from(self.gas_limit_multiplier_bps))
            / U256::from(BPS_DENOMINATOR)
    }

    /// Calculate the worst-case cost in wei
    pub fn calculate_cost(gas_limit: U256, fees: &FeeFields) -> U256 {
        gas_limit.saturating_mul(fees.max_price_per_gas())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::error::RpcError;
    use ethers::types::{Bytes, TransactionRequest};

    fn request() -> TypedTransaction {
        TransactionRequest::new().data(vec![0x63, 0x2a, 0x9a, 0x52]).into()
    }

    #[test]
    fn test_buffer_scenario() {
        let estimator = GasEstimator::with_multiplier_bps(12_000);
        assert_eq!(estimator.apply_buffer(U256::from(21_000)), U256::from(25_200));
        // floor(33_333 * 1.2) = 39_999
        assert_eq!(estimator.apply_buffer(U256::from(33_333)), U256::from(39_999));
        assert_eq!(estimator.apply_buffer(U256::from(1)), U256::from(1));
    }

    #[test]
    fn test_multiplier_from_config() {
        let estimator = GasEstimator::new(&SubmitterConfig::default());
        assert_eq!(estimator.apply_buffer(U256::from(50_000)), U256::from(60_000));
    }

    #[test]
    fn test_calculate_cost() {
        let fees = FeeFields::Eip1559 {
            max_fee_per_gas: U256::from(1_150),
            max_priority_fee_per_gas: U256::from(100),
        };
        assert_eq!(
            GasEstimator::calculate_cost(U256::from(25_200), &fees),
            U256::from(28_980_000u64)
        );
    }

    #[tokio::test]
    async fn test_simulates_then_estimates() {
        let mut client = MockChainClient::new();
        client
            .expect_call()
            .times(1)
            .returning(|_| Ok(Bytes::default()));
        client
            .expect_estimate_gas()
            .times(1)
            .returning(|_| Ok(U256::from(21_000)));

        let limit = GasEstimator::with_multiplier_bps(12_000)
            .estimate_gas_limit(&client, &request())
            .await
            .unwrap();
        assert_eq!(limit, U256::from(25_200));
    }

    #[tokio::test]
    async fn test_revert_skips_estimate() {
        let mut client = MockChainClient::new();
        client
            .expect_call()
            .times(1)
            .returning(|_| Err(RpcError::new("execution reverted: voting closed")));
        client.expect_estimate_gas().times(0);

        let err = GasEstimator::with_multiplier_bps(12_000)
            .estimate_gas_limit(&client, &request())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitterError::PreflightRevert(ref m) if m.contains("voting closed")));
    }

    #[tokio::test]
    async fn test_estimate_failure_after_simulation() {
        let mut client = MockChainClient::new();
        client.expect_call().returning(|_| Ok(Bytes::default()));
        client
            .expect_estimate_gas()
            .returning(|_| Err(RpcError::new("gas required exceeds allowance")));

        let err = GasEstimator::with_multiplier_bps(12_000)
            .estimate_gas_limit(&client, &request())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitterError::GasEstimation(_)));
    }
}
