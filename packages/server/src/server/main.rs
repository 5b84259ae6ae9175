// Main entry point for the job monitor API server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use monitor_engine::{
    ChromiumLauncher, Collaborators, ListingExtractor, Monitor, TelegramNotifier,
};
use monitor_server::{
    server::{build_app, middleware::RateLimiter, AppState, HttpSettings},
    Config,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,monitor_engine=debug,monitor_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting job monitor API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(target_url = %config.target_url, "Configuration loaded");

    // Assemble the engine
    let launcher = Arc::new(ChromiumLauncher::new(config.chromium_config()));
    let extractor = Arc::new(ListingExtractor::new());
    let collaborators = match config.telegram() {
        Some((token, chat_id)) => {
            tracing::info!("Telegram notifications enabled");
            Collaborators::builder()
                .launcher(launcher)
                .extractor(extractor)
                .notifier(Arc::new(TelegramNotifier::new(token, chat_id)))
                .build()
        }
        None => Collaborators::builder()
            .launcher(launcher)
            .extractor(extractor)
            .build(),
    };
    let monitor = Arc::new(Monitor::new(config.monitor_config(), collaborators));

    if config.auto_start {
        monitor.start(None);
    }

    // HTTP state
    let limiter = RateLimiter::new(
        config.rate_limit_requests,
        Duration::from_secs(config.rate_limit_window_seconds),
    );
    let state = AppState::new(monitor.clone(), limiter, HttpSettings::from_config(&config));

    let shutdown = CancellationToken::new();
    let prune_limiter = state.limiter.clone();
    let prune_stop = shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            tokio::select! {
                _ = prune_stop.cancelled() => break,
                _ = ticker.tick() => {
                    let dropped = prune_limiter.prune();
                    if dropped > 0 {
                        tracing::debug!(dropped, "pruned idle rate limit windows");
                    }
                }
            }
        }
    });

    let app = build_app(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let fatal = monitor.fatal_token();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(fatal.clone()))
    .await
    .context("Server error")?;

    shutdown.cancel();
    monitor.shutdown().await;

    if fatal.is_cancelled() {
        bail!("Monitor halted after an unrecoverable error");
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, SIGTERM, or when the engine halts.
async fn shutdown_signal(fatal: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
        _ = fatal.cancelled() => tracing::error!("Monitor halted, shutting down"),
    }
}
