//! Vote Submitter - periodic payable vote() calls against a single contract
//!
//! Each cycle reads the pending nonce, prices the transaction from the fee
//! market, simulates and estimates the call, then signs and broadcasts it.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod api;
mod chain;
mod config;
mod error;
mod metrics;
mod scheduler;
mod tx;

use chain::ChainProvider;
use config::Settings;
use metrics::MetricsServer;
use scheduler::{CycleScheduler, StatusBoard, TokioSleeper};
use tx::TransactionSender;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Vote Submitter v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for chain {} ({})",
        settings.chain.name, settings.chain.chain_id
    );

    // Connect and make sure the node serves the configured chain
    let provider = Arc::new(ChainProvider::new(
        settings.chain.clone(),
        &settings.rpc_urls(),
    )?);
    provider.verify_chain_id().await?;
    metrics::record_chain_health(settings.chain.chain_id, true);
    info!("Chain connection established");

    let wallet = TransactionSender::<ChainProvider>::load_wallet(&settings.wallet.private_key_env)?;
    let sender = TransactionSender::new(
        provider.clone(),
        wallet,
        &settings.chain,
        &settings.submitter,
    )?;

    info!("From:     {:?}", sender.wallet_address());
    info!("Contract: {:?}", sender.contract_address());
    info!("Interval: {}s", settings.submitter.interval_secs);
    info!("Value:    {} wei", settings.submitter.value_wei);

    let status = StatusBoard::default();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start API server
    let api_handle = if settings.api.enabled {
        let state = api::AppState::new(status.clone(), provider.clone());
        let config = settings.api.clone();
        info!("API server: http://{}:{}", config.host, config.port);
        Some(tokio::spawn(async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start the submission loop
    let mut scheduler = CycleScheduler::new(
        sender,
        TokioSleeper,
        &settings.submitter,
        status.clone(),
        shutdown_rx,
    );
    let mut scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    info!("Vote Submitter is running");

    let finished = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut scheduler_handle => Some(result),
    };

    let cycles = match finished {
        Some(result) => result,
        None => {
            info!("Shutdown signal received, finishing current cycle...");
            shutdown_tx.send_replace(true);
            scheduler_handle.await
        }
    };

    match cycles {
        Ok(cycles) => info!("Ran {} cycles", cycles),
        Err(e) => warn!("Submission loop ended abnormally: {}", e),
    }

    {
        let status = status.read().await;
        info!(
            submitted = status.submitted,
            resubmitted = status.resubmitted,
            failed = status.failed,
            "Final totals"
        );
    }

    // Abort background tasks
    if let Some(h) = api_handle {
        h.abort();
    }
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Vote Submitter stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vote_submitter=debug,hyper=warn"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
