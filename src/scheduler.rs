//! Interval loop driving one submission cycle at a time

use crate::chain::ChainClient;
use crate::config::SubmitterConfig;
use crate::tx::{Attempt, SubmissionReceipt, TransactionSender};

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

/// Pause between cycles, injectable so tests skip wall-clock time
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleep on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Running totals and the outcome of the latest cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleStatus {
    pub cycles: u64,
    pub submitted: u64,
    pub resubmitted: u64,
    pub failed: u64,
    pub last_receipt: Option<SubmissionReceipt>,
    pub last_error: Option<String>,
}

impl CycleStatus {
    fn record_success(&mut self, receipt: SubmissionReceipt) {
        self.cycles += 1;
        self.submitted += 1;
        if receipt.attempt == Attempt::Retried {
            self.resubmitted += 1;
        }
        self.last_receipt = Some(receipt);
        self.last_error = None;
    }

    fn record_failure(&mut self, error: String) {
        self.cycles += 1;
        self.failed += 1;
        self.last_error = Some(error);
    }
}

pub type StatusBoard = Arc<RwLock<CycleStatus>>;

/// Repeats the submission cycle until shutdown or the cycle limit
pub struct CycleScheduler<C: ChainClient, S: Sleeper> {
    sender: TransactionSender<C>,
    sleeper: S,
    interval: Duration,
    max_cycles: Option<u64>,
    status: StatusBoard,
    shutdown: watch::Receiver<bool>,
}

impl<C: ChainClient, S: Sleeper> CycleScheduler<C, S> {
    pub fn new(
        sender: TransactionSender<C>,
        sleeper: S,
        config: &SubmitterConfig,
        status: StatusBoard,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sender,
            sleeper,
            interval: Duration::from_secs(config.interval_secs),
            max_cycles: config.max_cycles,
            status,
            shutdown,
        }
    }

    /// Main loop; returns the number of cycles run.
    ///
    /// Shutdown is only observed between cycles, never inside one.
    pub async fn run(&mut self) -> u64 {
        let mut cycles = 0u64;
        info!(interval = ?self.interval, max_cycles = ?self.max_cycles, "Submission loop started");

        loop {
            if *self.shutdown.borrow() || self.limit_reached(cycles) {
                break;
            }

            self.run_cycle().await;
            cycles += 1;

            if self.limit_reached(cycles) {
                break;
            }

            let closed = tokio::select! {
                _ = self.sleeper.sleep(self.interval) => false,
                changed = self.shutdown.changed() => changed.is_err(),
            };
            if closed {
                warn!("Shutdown channel closed, stopping");
                break;
            }
        }

        info!(cycles, "Submission loop stopped");
        cycles
    }

    async fn run_cycle(&self) {
        let chain_id = self.sender.chain_id();
        let started = Instant::now();

        match self.sender.submit_vote().await {
            Ok(receipt) => {
                info!(
                    tx_hash = ?receipt.tx_hash,
                    nonce = receipt.nonce,
                    attempt = ?receipt.attempt,
                    "Cycle complete"
                );
                self.status.write().await.record_success(receipt);
            }
            Err(e) => {
                if e.should_alert() {
                    error!(alert = true, "send error: {}", e);
                } else {
                    error!("send error: {}", e);
                }
                crate::metrics::record_cycle_failure(chain_id, &e);
                self.status.write().await.record_failure(e.to_string());
            }
        }

        crate::metrics::record_cycle(chain_id, started.elapsed().as_secs_f64());
    }

    fn limit_reached(&self, cycles: u64) -> bool {
        self.max_cycles.is_some_and(|max| cycles >= max)
    }
}
