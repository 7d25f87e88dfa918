// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trackcache API Server
//!
//! Serves the webhook surface and runs periodic index maintenance over the
//! connected cache tiers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trackcache::{config::Config, Context};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Trackcache API");

    let ctx = Arc::new(Context::connect(config.clone()).await?);

    let cancel = CancellationToken::new();
    let maintenance = tokio::spawn(run_maintenance(ctx.clone(), cancel.clone()));

    // Build router
    let app = trackcache::routes::create_router(ctx.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Err(e) = maintenance.await {
        tracing::error!(error = %e, "Maintenance task panicked");
    }
    ctx.disconnect().await;
    Ok(())
}

/// Periodic triage and purge until cancelled.
async fn run_maintenance(ctx: Arc<Context>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(ctx.config.triage_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => ctx.run_maintenance().await,
        }
    }
    tracing::debug!("Maintenance loop stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trackcache=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
