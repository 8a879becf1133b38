//! Healthcheck side channel.
//!
//! Served on its own port so probes and the ticket API never compete:
//!
//! - `GET /health` — liveness; succeeds whenever the process runs
//! - `GET /ready` — readiness; pings the database with a bounded timeout

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;

/// Upper bound on a single readiness probe.
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// State of the healthcheck router.
#[derive(Clone, Default)]
pub struct HealthState {
    /// Database pool to ping from the readiness probe, when the backend
    /// has one.
    pub pool: Option<PgPool>,
}

/// Build the healthcheck router.
#[must_use]
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(state)
}

/// Liveness response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness.
    pub ready: bool,
    /// Database connectivity.
    pub database: bool,
}

async fn readiness_check(
    State(state): State<HealthState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let database = match &state.pool {
        Some(pool) => ping_database(pool).await,
        None => true,
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready: database,
            database,
        }),
    )
}

async fn ping_database(pool: &PgPool) -> bool {
    let ping = sqlx::query("SELECT 1").execute(pool);
    match tokio::time::timeout(CHECK_TIMEOUT, ping).await {
        Ok(Ok(_)) => true,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "database readiness check failed");
            false
        }
        Err(_) => {
            tracing::warn!("database readiness check timed out");
            false
        }
    }
}
