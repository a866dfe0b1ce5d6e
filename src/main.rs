//! Voice Cache server binary
//!
//! Loads configuration from the environment, starts session housekeeping and
//! serves the HTTP API until SIGINT/SIGTERM.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voicecache::api::{create_router, AppState};
use voicecache::{spawn_housekeeping_task, Config};

/// Main entry point for the voice cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache store, model client and worker pools
/// 4. Start background session housekeeping
/// 5. Serve the router until a shutdown signal arrives
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicecache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Voice Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: backend={:?}, root={}, max_entries={}, isolation={}, port={}",
        config.backend,
        config.cache_root.display(),
        config.max_entries,
        config.session_isolation,
        config.server_port
    );

    let state = AppState::from_config(&config);
    info!(
        "Worker pools ready: cpu={}, gpu={}",
        config.cpu_workers, config.gpu_workers
    );

    let housekeeping_handle = spawn_housekeeping_task(
        state.pipeline.store().clone(),
        config.housekeeping_interval,
        config.session_max_age,
    );
    info!("Background housekeeping task started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(housekeeping_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the housekeeping task and allows graceful shutdown.
async fn shutdown_signal(housekeeping_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    housekeeping_handle.abort();
    warn!("Housekeeping task aborted");
}
