//! Daemon lifecycle: key loading, metrics endpoint, gRPC server, shutdown

use anyhow::{Context, Result};
use prometheus_client::registry::Registry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use kms_core::config::KmsConfig;
use kms_crypto::Sealer;

use crate::grpc::KmsServiceImpl;
use crate::metrics::{HealthState, Metrics};

pub async fn run(config: KmsConfig) -> Result<()> {
    info!("daemon starting");

    config.validate()?;

    let ring = crate::key_store::load_key_ring(&config.keys)?;
    info!(
        default_key = ring.has_default(),
        node_keys = ring.node_count(),
        "key ring ready"
    );
    let sealer = Sealer::new(ring);

    let mut registry = Registry::default();
    let metrics = Metrics::register(&mut registry);
    let ready = Arc::new(AtomicBool::new(false));

    // Start Prometheus metrics endpoint
    if let Some(addr) = config.server.metrics_addr.clone() {
        let state = HealthState {
            registry: Arc::new(registry),
            ready: ready.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(addr, state).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("error listening for gRPC API on {}", config.server.listen))?;

    let response_delay = Duration::from_millis(config.server.response_delay_ms);
    if !response_delay.is_zero() {
        info!(delay_ms = config.server.response_delay_ms, "response delay enabled");
    }
    let impl_ = KmsServiceImpl::new(sealer, metrics, response_delay);

    ready.store(true, Ordering::Release);
    info!(listen = %config.server.listen, "gRPC: listening");

    crate::grpc::serve(listener, impl_, shutdown_signal()).await?;

    info!("daemon stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
