//! spectrawatch -- streaming RF spectrum anomaly monitoring.
//!
//! This crate provides the core library for sample acquisition (corpus replay
//! or an RTL-SDR over rtl_tcp), novelty scoring, anomaly emission, the
//! spectrogram view, and the HTTP surface that drives them.

pub mod api;
pub mod config;
pub mod corpus;
pub mod detect;
pub mod pipeline;
pub mod source;
pub mod spectrogram;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::corpus::Corpus;
use crate::pipeline::{Monitor, Sources};
use crate::source::live::{LiveSource, Receiver};
use crate::source::replay::ReplaySource;
use crate::source::rtl_tcp::RtlTcpReceiver;
use crate::source::SampleSource;

/// Wall-clock seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

/// Load the corpus and wire sources, monitor and hardware probe together.
pub fn assemble(cfg: &AppConfig) -> Result<AppState> {
    let corpus = Arc::new(Corpus::load_or_generate(&cfg.corpus)?);
    tracing::info!(
        path = %cfg.corpus.path.display(),
        rows = corpus.len(),
        anomalies = corpus.anomaly_count(),
        "corpus ready"
    );

    let replay = Arc::new(ReplaySource::new(corpus.clone()));
    let receiver: Arc<dyn Receiver> = Arc::new(RtlTcpReceiver::from_config(&cfg.hardware));
    let live: Arc<dyn SampleSource> = Arc::new(LiveSource::new(receiver.clone(), replay.clone()));
    let sources = Sources {
        replay,
        live: Some(live),
        prefer_live: cfg.hardware.enabled,
    };

    Ok(AppState {
        monitor: Monitor::new(corpus, sources, &cfg.pipeline),
        receiver: Some(receiver),
        dataset_path: cfg.corpus.path.clone(),
    })
}

/// Start the spectrawatch daemon: corpus, processing controller and API server.
pub async fn serve(cfg: AppConfig) -> Result<()> {
    let state = assemble(&cfg)?;
    let monitor = state.monitor.clone();
    let app = api::router(state);

    let addr: std::net::SocketAddr = cfg
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", cfg.server.bind))?;
    tracing::info!(%addr, "spectrawatch listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.stop().await;
    tracing::info!("spectrawatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
