use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use commitment_log::{CommitmentLog, ReqwestMemoAnchor};
use escrow_engine::EscrowEngine;
use escrow_gateway::{GatewayState, build_router};
use escrow_store::DuelStore;
use observability::init_tracing;
use platform_core::EscrowConfig;
use stealth_identity::StealthIdentity;
use tokio::sync::watch;
use tracing::info;
use transfer_client::{BulletproofGenerator, ReqwestShieldedTransferClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration failure is the only reason this process refuses to
    // start; everything downstream degrades instead of exiting.
    let config = EscrowConfig::from_env().context("loading configuration")?;
    init_tracing("duel-escrow", "info");

    let store = Arc::new(DuelStore::new());
    let stealth = Arc::new(
        StealthIdentity::new(config.wallet_pepper.as_bytes().to_vec())
            .context("initialising stealth identity")?,
    );
    let transfers = Arc::new(
        ReqwestShieldedTransferClient::new(
            &config.zk_backend_url,
            &config.escrow_wallet_secret,
            &config.treasury_wallet_secret,
            Arc::new(BulletproofGenerator),
        )
        .context("initialising transfer client")?,
    );
    let anchor = Arc::new(
        ReqwestMemoAnchor::new(&config.anchor_url, &config.server_authority_secret)
            .context("initialising ledger anchor")?,
    );
    let commitments = Arc::new(CommitmentLog::new(anchor));

    let engine = Arc::new(EscrowEngine::new(
        store.clone(),
        stealth,
        transfers,
        commitments,
        config.house_fee_percent,
        Duration::seconds(config.escrow_timeout_seconds as i64),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = tokio::spawn(store.clone().run_reaper(shutdown_rx));

    let state = GatewayState::new(
        engine,
        config.internal_api_key.clone(),
        config.env,
        config.network,
    );
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(
        addr = %config.bind_addr,
        env = config.env.as_str(),
        network = config.network.as_str(),
        house_fee_percent = config.house_fee_percent,
        escrow_timeout_seconds = config.escrow_timeout_seconds,
        "duel escrow service listening"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving http")?;

    let _ = shutdown_tx.send(true);
    let _ = reaper.await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining in-flight requests");
}
