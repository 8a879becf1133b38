//! noncepool server binary.
//!
//! Startup order: configuration → tracing → database pool + migrations →
//! metrics recorder → ticket API and healthcheck servers → signal-driven
//! graceful shutdown with a bounded drain window.

use noncepool_postgres::{run_migrations, run_migrations_from_dir, PostgresTicketStore};
use noncepool_server::config::{BackendKind, LoggerKind};
use noncepool_server::health::{health_router, HealthState};
use noncepool_server::metrics::{install_recorder, metrics_router};
use noncepool_server::{build_router, AppState, Config};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_default()?;
    init_tracing(&config);

    info!(
        backend = ?config.backend_kind,
        api_port = config.api_port,
        healthcheck_port = config.healthcheck_port,
        "starting noncepool service"
    );

    let store = match config.backend_kind {
        BackendKind::Postgres => {
            let store =
                PostgresTicketStore::new(&config.backend_config.connection_url()).await?;
            match &config.backend_config.migrations_dir {
                Some(dir) => run_migrations_from_dir(store.pool(), dir).await?,
                None => run_migrations(store.pool()).await?,
            }
            Arc::new(store)
        }
    };
    info!("storage backend connected and migrated");

    let prometheus_handle = install_recorder()?;

    let app_state = AppState::new(store.clone());
    let api = build_router(app_state).merge(metrics_router(prometheus_handle));
    let health = health_router(HealthState {
        pool: Some(store.pool().clone()),
    });

    let api_listener = TcpListener::bind(("0.0.0.0", config.api_port)).await?;
    let health_listener = TcpListener::bind(("0.0.0.0", config.healthcheck_port)).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let api_handle = tokio::spawn(serve(api_listener, api, shutdown_rx.clone()));
    let health_handle = tokio::spawn(serve(health_listener, health, shutdown_rx));

    info!("noncepool service started");

    shutdown_signal().await;
    info!("stopping noncepool service");
    let _ = shutdown_tx.send(true);

    let drain = async {
        let _ = api_handle.await;
        let _ = health_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        warn!("drain window elapsed before all connections closed");
    }

    info!("stopped noncepool service");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logger.level.clone()));

    match config.logger.kind {
        LoggerKind::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LoggerKind::Console => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

async fn serve(
    listener: TcpListener,
    router: axum::Router,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let shutdown = async move {
        let _ = shutdown_rx.changed().await;
    };
    if let Err(err) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!(error = %err, "server error");
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down gracefully"),
        () = terminate => info!("received SIGTERM, shutting down gracefully"),
    }
}
