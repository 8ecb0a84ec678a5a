//! Veritag verification service entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use veritag_core::alerting::{run_watch, SupplierWatch};
use veritag_core::codec::QrCodec;
use veritag_core::config::load_config;
use veritag_core::pipeline::{PipelineStores, VerificationPipeline};
use veritag_core::store::MemoryStore;

use veritag_server::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var_os("VERITAG_CONFIG").map(PathBuf::from);
    let config = load_config(config_path.as_deref()).context("loading configuration")?;

    let codec = match &config.codec.secret {
        Some(secret) => QrCodec::from_base64_secret(secret).context("loading codec secret")?,
        None => {
            warn!("no codec secret configured, issuing codes under an ephemeral key");
            QrCodec::generate()
        }
    };

    let store = Arc::new(MemoryStore::new());
    let pipeline = Arc::new(VerificationPipeline::new(
        codec,
        PipelineStores {
            products: store.clone(),
            history: store.clone(),
            features: store.clone(),
            sink: store.clone(),
        },
        None,
        config.anomaly.clone(),
    ));

    // Supplier alerting runs off the scan path: events stream from the
    // pipeline into the watcher, raised alerts collect in shared state.
    let alerts = Arc::new(Mutex::new(Vec::new()));
    let watch = Arc::new(Mutex::new(SupplierWatch::new(config.alerting.clone())));
    let (alert_tx, mut alert_rx) = mpsc::channel(64);
    tokio::spawn(run_watch(watch, pipeline.subscribe(), alert_tx));
    tokio::spawn({
        let alerts = alerts.clone();
        async move {
            while let Some(alert) = alert_rx.recv().await {
                alerts.lock().await.push(alert);
            }
        }
    });

    let state = AppState {
        pipeline,
        store,
        alerts,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "veritag server listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
