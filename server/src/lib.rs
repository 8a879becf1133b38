//! HTTP service for the noncepool nonce lease engine.
//!
//! The server is a thin adapter: handlers translate request DTOs into
//! engine operations and map the engine error taxonomy onto HTTP status
//! codes and `{code, message}` error bodies. The interesting behavior
//! (lease assignment, recycling, optimistic-concurrency retries) all
//! lives in `noncepool-core`.
//!
//! Two routers are served on separate ports:
//!
//! - the ticket API (`/lineages`, `/lineages/:id/tickets`, `/metrics`)
//! - the healthcheck side channel (`/health`, `/ready`)

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::Config;
pub use routes::build_router;
pub use state::AppState;
