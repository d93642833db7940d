//! Fee-market reads and fee field computation
//!
//! Legacy chains get the node's gas price. EIP-1559 chains get a tip sampled
//! from recent fee history plus a small base-fee buffer.

use crate::chain::ChainClient;
use crate::config::{SubmitterConfig, FEE_HISTORY_PERCENTILES};
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::U256;
use serde::Serialize;
use tracing::{debug, warn};

/// Number of recent blocks sampled from `eth_feeHistory`
pub const FEE_HISTORY_BLOCKS: u64 = 5;

/// Divisor for the base-fee headroom (base / 20 = 5%)
const BASE_FEE_BUFFER_DIVISOR: u64 = 20;

/// Pricing fields for one submission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeFields {
    Legacy {
        gas_price: U256,
    },
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

impl FeeFields {
    /// Scale every fee field by `percent` (200 doubles)
    pub fn scaled(&self, percent: u64) -> Self {
        let scale = |v: U256| v.saturating_mul(U256::from(percent)) / U256::from(100u64);
        match *self {
            FeeFields::Legacy { gas_price } => FeeFields::Legacy {
                gas_price: scale(gas_price),
            },
            FeeFields::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => FeeFields::Eip1559 {
                max_fee_per_gas: scale(max_fee_per_gas),
                max_priority_fee_per_gas: scale(max_priority_fee_per_gas),
            },
        }
    }

    /// Fee fields for the single underpriced resubmission
    pub fn doubled(&self) -> Self {
        self.scaled(200)
    }

    /// Highest price per gas this transaction may pay
    pub fn max_price_per_gas(&self) -> U256 {
        match *self {
            FeeFields::Legacy { gas_price } => gas_price,
            FeeFields::Eip1559 {
                max_fee_per_gas, ..
            } => max_fee_per_gas,
        }
    }
}

/// Lowest reward at `percentile_index` across the sampled blocks.
///
/// Blocks whose reward row is too short are skipped; `None` when no block
/// has an entry.
pub fn suggested_tip(rewards: &[Vec<U256>], percentile_index: usize) -> Option<U256> {
    rewards
        .iter()
        .filter_map(|row| row.get(percentile_index).copied())
        .min()
}

/// EIP-1559 fields from a base fee and a sampled tip
pub fn eip1559_fields(base_fee: U256, suggested_tip: U256, tip_floor: U256) -> FeeFields {
    let tip = tip_floor.max(suggested_tip);
    let buffer = U256::one().max(base_fee / U256::from(BASE_FEE_BUFFER_DIVISOR));

    FeeFields::Eip1559 {
        max_fee_per_gas: base_fee.saturating_add(tip).saturating_add(buffer),
        max_priority_fee_per_gas: tip,
    }
}

/// Produces fee fields from the current chain head
#[derive(Debug, Clone)]
pub struct FeeEstimator {
    percentile_index: usize,
    tip_floor: U256,
}

impl FeeEstimator {
    pub fn new(config: &SubmitterConfig) -> Self {
        Self {
            percentile_index: config.percentile_index(),
            tip_floor: U256::from(config.tip_floor_wei),
        }
    }

    pub async fn estimate<C>(&self, client: &C) -> SubmitterResult<FeeFields>
    where
        C: ChainClient + ?Sized,
    {
        let base_fee = client
            .base_fee_per_gas()
            .await
            .map_err(|e| SubmitterError::FeeEstimation(format!("latest block: {}", e)))?;

        let Some(base_fee) = base_fee else {
            let gas_price = self.gas_price(client).await?;
            debug!(%gas_price, "Latest block has no base fee, using legacy pricing");
            return Ok(FeeFields::Legacy { gas_price });
        };

        let rewards = client
            .fee_history(FEE_HISTORY_BLOCKS, &FEE_HISTORY_PERCENTILES)
            .await
            .map_err(|e| SubmitterError::FeeEstimation(format!("fee history: {}", e)))?;

        let tip = match suggested_tip(&rewards, self.percentile_index) {
            Some(tip) => tip,
            None => {
                let gas_price = self.gas_price(client).await?;
                let tip = gas_price.saturating_sub(base_fee);
                warn!(
                    %gas_price,
                    %base_fee,
                    %tip,
                    "Fee history has no reward samples, deriving tip from gas price"
                );
                tip
            }
        };

        let fees = eip1559_fields(base_fee, tip, self.tip_floor);
        debug!(%base_fee, suggested_tip = %tip, ?fees, "Computed EIP-1559 fees");
        Ok(fees)
    }

    async fn gas_price<C>(&self, client: &C) -> SubmitterResult<U256>
    where
        C: ChainClient + ?Sized,
    {
        client
            .gas_price()
            .await
            .map_err(|e| SubmitterError::FeeEstimation(format!("gas price: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::error::RpcError;

    fn wei(rows: &[&[u64]]) -> Vec<Vec<U256>> {
        rows.iter()
            .map(|row| row.iter().map(|v| U256::from(*v)).collect())
            .collect()
    }

    fn estimator(tip_floor_wei: u64) -> FeeEstimator {
        FeeEstimator::new(&SubmitterConfig {
            tip_floor_wei,
            ..SubmitterConfig::default()
        })
    }

    #[test]
    fn test_fee_scenario_floor_wins() {
        let rewards = wei(&[&[1, 50, 200], &[1, 80, 200], &[1, 60, 200], &[1, 40, 200], &[1, 90, 200]]);
        let tip = suggested_tip(&rewards, 1).unwrap();
        assert_eq!(tip, U256::from(40));

        let fees = eip1559_fields(U256::from(1000), tip, U256::from(100));
        assert_eq!(
            fees,
            FeeFields::Eip1559 {
                max_fee_per_gas: U256::from(1150),
                max_priority_fee_per_gas: U256::from(100),
            }
        );
    }

    #[test]
    fn test_sampled_tip_above_floor() {
        let fees = eip1559_fields(U256::from(2_000_000_000u64), U256::from(1_500_000u64), U256::from(100));
        assert_eq!(
            fees,
            FeeFields::Eip1559 {
                max_fee_per_gas: U256::from(2_000_000_000u64 + 1_500_000 + 100_000_000),
                max_priority_fee_per_gas: U256::from(1_500_000u64),
            }
        );
    }

    #[test]
    fn test_buffer_is_at_least_one_wei() {
        let fees = eip1559_fields(U256::from(7), U256::zero(), U256::from(3));
        assert_eq!(fees.max_price_per_gas(), U256::from(7 + 3 + 1));
    }

    #[test]
    fn test_short_reward_rows_are_skipped() {
        let rewards = wei(&[&[5], &[9, 30, 70], &[], &[9, 20, 70]]);
        assert_eq!(suggested_tip(&rewards, 1), Some(U256::from(20)));
        assert_eq!(suggested_tip(&rewards, 0), Some(U256::from(5)));
        assert_eq!(suggested_tip(&wei(&[&[5], &[]]), 2), None);
        assert_eq!(suggested_tip(&[], 1), None);
    }

    #[test]
    fn test_doubling_both_shapes() {
        let legacy = FeeFields::Legacy {
            gas_price: U256::from(1_000),
        };
        assert_eq!(
            legacy.doubled(),
            FeeFields::Legacy {
                gas_price: U256::from(2_000)
            }
        );

        let eip1559 = FeeFields::Eip1559 {
            max_fee_per_gas: U256::from(1_150),
            max_priority_fee_per_gas: U256::from(100),
        };
        assert_eq!(
            eip1559.doubled(),
            FeeFields::Eip1559 {
                max_fee_per_gas: U256::from(2_300),
                max_priority_fee_per_gas: U256::from(200),
            }
        );
    }

    #[tokio::test]
    async fn test_legacy_chain_returns_gas_price_only() {
        let mut client = MockChainClient::new();
        client.expect_base_fee_per_gas().times(1).returning(|| Ok(None));
        client
            .expect_gas_price()
            .times(1)
            .returning(|| Ok(U256::from(3_000_000_000u64)));
        client.expect_fee_history().times(0);

        let fees = estimator(100).estimate(&client).await.unwrap();
        assert_eq!(
            fees,
            FeeFields::Legacy {
                gas_price: U256::from(3_000_000_000u64)
            }
        );
    }

    #[tokio::test]
    async fn test_eip1559_chain_samples_fee_history() {
        let rewards = wei(&[&[1, 50, 200], &[1, 80, 200], &[1, 60, 200], &[1, 40, 200], &[1, 90, 200]]);

        let mut client = MockChainClient::new();
        client
            .expect_base_fee_per_gas()
            .returning(|| Ok(Some(U256::from(1000))));
        client
            .expect_fee_history()
            .withf(|count, percentiles| {
                *count == 5 && percentiles.to_vec() == FEE_HISTORY_PERCENTILES.to_vec()
            })
            .times(1)
            .returning(move |_, _| Ok(rewards.clone()));
        client.expect_gas_price().times(0);

        let fees = estimator(100).estimate(&client).await.unwrap();
        assert_eq!(
            fees,
            FeeFields::Eip1559 {
                max_fee_per_gas: U256::from(1150),
                max_priority_fee_per_gas: U256::from(100),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_history_falls_back_to_gas_price() {
        let mut client = MockChainClient::new();
        client
            .expect_base_fee_per_gas()
            .returning(|| Ok(Some(U256::from(1000))));
        client
            .expect_fee_history()
            .returning(|_, _| Ok(vec![vec![], vec![]]));
        client
            .expect_gas_price()
            .times(1)
            .returning(|| Ok(U256::from(1500)));

        let fees = estimator(100).estimate(&client).await.unwrap();
        // tip = max(100, 1500 - 1000), buffer = 50
        assert_eq!(
            fees,
            FeeFields::Eip1559 {
                max_fee_per_gas: U256::from(1550),
                max_priority_fee_per_gas: U256::from(500),
            }
        );
    }

    #[tokio::test]
    async fn test_block_read_failure_is_fee_error() {
        let mut client = MockChainClient::new();
        client
            .expect_base_fee_per_gas()
            .returning(|| Err(RpcError::new("connection refused")));

        let err = estimator(100).estimate(&client).await.unwrap_err();
        assert!(matches!(err, SubmitterError::FeeEstimation(_)));
    }
}
