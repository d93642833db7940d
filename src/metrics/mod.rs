//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Submission cycles and their latency
//! - Accepted votes, split by fresh vs fee-bumped attempts
//! - Cycle failures by error kind
//! - Last nonce, gas limit and fee fields sent

use crate::error::{SubmitterError, SubmitterResult};
use crate::tx::{Attempt, FeeFields};

use axum::{routing::get, Router};
use ethers::types::U256;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "vote_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).expect("register vote_chain_connected");

    pub static ref CYCLES: CounterVec = register_counter_vec!(
        "vote_cycles_total",
        "Total submission cycles run",
        &["chain_id"]
    ).expect("register vote_cycles_total");

    pub static ref CYCLE_LATENCY: HistogramVec = register_histogram_vec!(
        "vote_cycle_latency_seconds",
        "Wall time of one submission cycle",
        &["chain_id"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).expect("register vote_cycle_latency_seconds");

    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "vote_transactions_submitted_total",
        "Total vote transactions accepted by the node",
        &["chain_id", "attempt"]
    ).expect("register vote_transactions_submitted_total");

    pub static ref CYCLE_FAILED: CounterVec = register_counter_vec!(
        "vote_cycle_failures_total",
        "Total failed cycles by error kind",
        &["chain_id", "kind"]
    ).expect("register vote_cycle_failures_total");

    pub static ref LAST_NONCE: GaugeVec = register_gauge_vec!(
        "vote_last_nonce",
        "Nonce of the last accepted vote",
        &["chain_id"]
    ).expect("register vote_last_nonce");

    pub static ref LAST_GAS_LIMIT: GaugeVec = register_gauge_vec!(
        "vote_last_gas_limit",
        "Gas limit of the last accepted vote",
        &["chain_id"]
    ).expect("register vote_last_gas_limit");

    pub static ref LAST_FEE: GaugeVec = register_gauge_vec!(
        "vote_last_fee_wei",
        "Fee fields of the last accepted vote",
        &["chain_id", "field"]
    ).expect("register vote_last_fee_wei");
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> SubmitterResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| SubmitterError::Internal(format!("metrics bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| SubmitterError::Internal(format!("metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

fn wei_f64(value: U256) -> f64 {
    if value > U256::from(u128::MAX) {
        f64::MAX
    } else {
        value.as_u128() as f64
    }
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_cycle(chain_id: u64, latency_secs: f64) {
    let chain = chain_id.to_string();
    CYCLES.with_label_values(&[&chain]).inc();
    CYCLE_LATENCY.with_label_values(&[&chain]).observe(latency_secs);
}

pub fn record_cycle_failure(chain_id: u64, error: &SubmitterError) {
    CYCLE_FAILED
        .with_label_values(&[&chain_id.to_string(), error.label()])
        .inc();
}

pub fn record_tx_submitted(
    chain_id: u64,
    attempt: Attempt,
    nonce: u64,
    gas_limit: U256,
    fees: &FeeFields,
) {
    let chain = chain_id.to_string();
    let attempt = match attempt {
        Attempt::Fresh => "fresh",
        Attempt::Retried => "retried",
    };

    TX_SUBMITTED.with_label_values(&[&chain, attempt]).inc();
    LAST_NONCE.with_label_values(&[&chain]).set(nonce as f64);
    LAST_GAS_LIMIT
        .with_label_values(&[&chain])
        .set(wei_f64(gas_limit));

    match *fees {
        FeeFields::Legacy { gas_price } => {
            LAST_FEE
                .with_label_values(&[&chain, "gas_price"])
                .set(wei_f64(gas_price));
        }
        FeeFields::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            LAST_FEE
                .with_label_values(&[&chain, "max_fee_per_gas"])
                .set(wei_f64(max_fee_per_gas));
            LAST_FEE
                .with_label_values(&[&chain, "max_priority_fee_per_gas"])
                .set(wei_f64(max_priority_fee_per_gas));
        }
    }
}
