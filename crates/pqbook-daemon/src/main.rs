//! pqbook daemon -- post-quantum signed guestbook server.
//!
//! Usage:
//!
//!   pqbook-daemon [OPTIONS]
//!
//! Options:
//!
//!   --listen <IP>            Listen address (default: 0.0.0.0)
//!   --port <PORT>            Listen port (default: 8080, env PORT)
//!   --config <PATH>          Load config from JSON file
//!   --static-dir <PATH>      Static frontend directory (default: static)
//!   --allowed-origin <URL>   CORS origin for the API routes
//!
//! Environment:
//!
//!   RATE_LIMIT_SECRET        Hex-encoded 32-byte device secret (required)
//!   RUST_LOG                 Log level filter (default: info)
//!
//! The daemon runs until interrupted with Ctrl+C.

use std::sync::Arc;

use axum::http::HeaderValue;
use clap::Parser;
use pqbook_node::ledger::MessageLedger;
use pqbook_node::maintenance::spawn_sweeper;
use pqbook_node::pipeline::SubmissionPipeline;
use pqbook_node::rate_limiter::AdmissionLimiter;
use pqbook_protocol::replay::ReplayGuard;
use tokio::net::TcpListener;
use tokio::sync::watch;

mod config;
mod http;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // Tracing / logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = config::CliArgs::parse();

    // Load or merge config file if provided.
    let daemon_config = match &cli.config {
        Some(path) => match config::DaemonConfig::load(path) {
            Ok(cfg) => cfg.merge_cli(&cli),
            Err(e) => {
                tracing::error!("failed to load config file: {e}");
                std::process::exit(1);
            }
        },
        None => config::DaemonConfig::from_cli(&cli),
    };

    if let Err(e) = run_daemon(daemon_config).await {
        tracing::error!("daemon error: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Daemon main logic
// ---------------------------------------------------------------------------

async fn run_daemon(cfg: config::DaemonConfig) -> Result<(), String> {
    // -----------------------------------------------------------------------
    // 1. Secret and admission policy
    // -----------------------------------------------------------------------

    let secret = config::load_secret()?;

    cfg.admission
        .validate()
        .map_err(|e| format!("invalid admission config: {e}"))?;

    tracing::info!(
        burst = cfg.admission.burst_capacity,
        refill_per_sec = cfg.admission.refill_per_sec,
        window_ms = cfg.admission.freshness_window_ms,
        hint_policy = ?cfg.admission.algorithm_hint_policy,
        "admission policy loaded"
    );

    // -----------------------------------------------------------------------
    // 2. Tracking tables and pipeline
    // -----------------------------------------------------------------------

    let replay = Arc::new(ReplayGuard::new(cfg.admission.replay_retention_ms));
    let limiter = Arc::new(
        AdmissionLimiter::new(secret, &cfg.admission)
            .map_err(|e| format!("rate limiter setup failed: {e}"))?,
    );
    let ledger = Arc::new(MessageLedger::new());

    let pipeline = Arc::new(
        SubmissionPipeline::new(cfg.admission.clone(), replay, limiter, ledger)
            .map_err(|e| format!("pipeline setup failed: {e}"))?,
    );

    // -----------------------------------------------------------------------
    // 3. Maintenance sweeper
    // -----------------------------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(Arc::clone(&pipeline), shutdown_rx);

    // -----------------------------------------------------------------------
    // 4. HTTP server
    // -----------------------------------------------------------------------

    let allowed_origin = HeaderValue::from_str(&cfg.allowed_origin)
        .map_err(|e| format!("invalid allowed origin '{}': {e}", cfg.allowed_origin))?;

    let state = http::AppState {
        pipeline,
        allowed_origin,
    };
    let app = http::router(state, &cfg.static_dir);

    let addr = cfg.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("failed to bind {addr}: {e}"))?;

    tracing::info!(
        %addr,
        static_dir = %cfg.static_dir.display(),
        origin = %cfg.allowed_origin,
        "pqbook daemon listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("server error: {e}"))?;

    // -----------------------------------------------------------------------
    // 5. Shutdown
    // -----------------------------------------------------------------------

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::warn!(%e, "maintenance sweeper did not stop cleanly");
    }

    tracing::info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C, shutting down..."),
        Err(e) => {
            tracing::error!(%e, "cannot listen for Ctrl+C -- running until killed");
            std::future::pending::<()>().await;
        }
    }
}
