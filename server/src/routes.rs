//! Router configuration for the ticket API.

use crate::api::{lineages, tickets};
use crate::middleware::request_id_layer;
use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};

/// Build the ticket API router.
///
/// The `/metrics` route is attached separately in the binary so tests
/// can exercise the API without a Prometheus recorder installed.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/lineages", post(lineages::create_lineage))
        .route("/lineages", get(lineages::get_lineage))
        .route("/lineages/:lineage_id/tickets", post(tickets::lease_tickets))
        .route("/lineages/:lineage_id/tickets", get(tickets::get_tickets))
        .route(
            "/lineages/:lineage_id/tickets/:ticket_ext_id",
            get(tickets::get_ticket),
        )
        .route(
            "/lineages/:lineage_id/tickets/:ticket_ext_id",
            patch(tickets::update_ticket),
        )
        .layer(request_id_layer())
        .with_state(state)
}
