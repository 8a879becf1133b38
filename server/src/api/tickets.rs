//! Ticket endpoints.
//!
//! - `POST /lineages/:lineage_id/tickets` — lease tickets (single or
//!   bulk shape)
//! - `GET /lineages/:lineage_id/tickets/:ticket_ext_id` — read one
//!   ticket
//! - `GET /lineages/:lineage_id/tickets?ticketExtIds=a,b` — read many
//! - `PATCH /lineages/:lineage_id/tickets/:ticket_ext_id` — release or
//!   close

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use noncepool_core::ids::ParseExtIdError;
use noncepool_core::{ExtId, LineageId, TicketLease, TicketServiceError, TicketState};
use serde::{Deserialize, Serialize};

/// Request to lease tickets. Callers send either the single-id or the
/// bulk shape; the handler canonicalizes to bulk.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketLeaseRequest {
    /// Single-ticket shape.
    #[serde(default)]
    pub ext_id: Option<String>,
    /// Bulk shape.
    #[serde(default)]
    pub ext_ids: Option<Vec<String>>,
}

impl TicketLeaseRequest {
    /// Canonicalize to the bulk form.
    fn into_ext_ids(self) -> Result<Vec<ExtId>, ApiError> {
        let raw = match (self.ext_ids, self.ext_id) {
            (Some(ids), _) if !ids.is_empty() => ids,
            (_, Some(id)) => vec![id],
            _ => {
                return Err(ApiError::bad_request(
                    "either extId or a non-empty extIds is required",
                ))
            }
        };
        raw.into_iter()
            .map(|id| {
                id.parse()
                    .map_err(|e: ParseExtIdError| ApiError::bad_request(e.to_string()))
            })
            .collect()
    }
}

/// One lease on the wire.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketLeaseDto {
    /// Owning lineage.
    pub lineage_id: LineageId,
    /// Caller-supplied identifier.
    pub ext_id: ExtId,
    /// The bound nonce.
    pub nonce: i64,
    /// Current lease state.
    pub state: TicketState,
}

impl From<TicketLease> for TicketLeaseDto {
    fn from(lease: TicketLease) -> Self {
        Self {
            lineage_id: lease.lineage_id,
            ext_id: lease.ext_id,
            nonce: lease.nonce.value(),
            state: lease.state,
        }
    }
}

/// Response carrying one or more leases.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketLeaseResponse {
    /// Leases in request order.
    pub leases: Vec<TicketLeaseDto>,
}

impl TicketLeaseResponse {
    fn new(leases: Vec<TicketLease>) -> Self {
        Self {
            leases: leases.into_iter().map(TicketLeaseDto::from).collect(),
        }
    }
}

/// Request to update a ticket's state.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketUpdateRequest {
    /// Target state: `released` or `closed`.
    pub state: String,
}

/// Query parameters of the bulk ticket lookup.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTicketsParams {
    /// Comma-separated external ids.
    pub ticket_ext_ids: String,
}

fn parse_lineage_id(raw: &str) -> Result<LineageId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("malformed lineage id"))
}

fn parse_ext_id(raw: &str) -> Result<ExtId, ApiError> {
    raw.parse()
        .map_err(|e: ParseExtIdError| ApiError::bad_request(e.to_string()))
}

/// `POST /lineages/:lineage_id/tickets`
pub async fn lease_tickets(
    State(state): State<AppState>,
    Path(lineage_id): Path<String>,
    Json(request): Json<TicketLeaseRequest>,
) -> Result<Json<TicketLeaseResponse>, ApiError> {
    let lineage_id = parse_lineage_id(&lineage_id)?;
    let ext_ids = request.into_ext_ids()?;

    let leases = state
        .tickets
        .lease_tickets(lineage_id, ext_ids)
        .await
        .map_err(|err| match err {
            TicketServiceError::InvalidRequest(_) | TicketServiceError::NoSuchLineage => {
                ApiError::bad_request(err.to_string())
            }
            TicketServiceError::TooManyLeasedTickets => {
                ApiError::too_many_leased_tickets(err.to_string())
            }
            TicketServiceError::TooManyConcurrentRequests => {
                ApiError::too_many_concurrent_requests(err.to_string())
            }
            other => ApiError::unexpected(&other),
        })?;

    Ok(Json(TicketLeaseResponse::new(leases)))
}

/// `GET /lineages/:lineage_id/tickets/:ticket_ext_id`
pub async fn get_ticket(
    State(state): State<AppState>,
    Path((lineage_id, ticket_ext_id)): Path<(String, String)>,
) -> Result<Json<TicketLeaseResponse>, ApiError> {
    let lineage_id = parse_lineage_id(&lineage_id)?;
    let ext_id = parse_ext_id(&ticket_ext_id)?;

    let lease = state
        .tickets
        .ticket(lineage_id, ext_id)
        .await
        .map_err(|err| match err {
            TicketServiceError::NoSuchTicket | TicketServiceError::NoSuchLineage => {
                ApiError::not_found(err.to_string())
            }
            TicketServiceError::InvalidRequest(_) => ApiError::bad_request(err.to_string()),
            other => ApiError::unexpected(&other),
        })?;

    Ok(Json(TicketLeaseResponse::new(vec![lease])))
}

/// `GET /lineages/:lineage_id/tickets?ticketExtIds=a,b,c`
pub async fn get_tickets(
    State(state): State<AppState>,
    Path(lineage_id): Path<String>,
    Query(params): Query<GetTicketsParams>,
) -> Result<Json<TicketLeaseResponse>, ApiError> {
    let lineage_id = parse_lineage_id(&lineage_id)?;
    let ext_ids: Vec<ExtId> = params
        .ticket_ext_ids
        .split(',')
        .filter(|s| !s.is_empty())
        .map(parse_ext_id)
        .collect::<Result<_, _>>()?;

    let leases = state
        .tickets
        .tickets(lineage_id, ext_ids)
        .await
        .map_err(|err| match err {
            TicketServiceError::NoSuchTicket | TicketServiceError::NoSuchLineage => {
                ApiError::not_found(err.to_string())
            }
            TicketServiceError::InvalidRequest(_) => ApiError::bad_request(err.to_string()),
            other => ApiError::unexpected(&other),
        })?;

    Ok(Json(TicketLeaseResponse::new(leases)))
}

/// `PATCH /lineages/:lineage_id/tickets/:ticket_ext_id`
pub async fn update_ticket(
    State(state): State<AppState>,
    Path((lineage_id, ticket_ext_id)): Path<(String, String)>,
    Json(request): Json<TicketUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let lineage_id = parse_lineage_id(&lineage_id)?;
    let ext_id = parse_ext_id(&ticket_ext_id)?;

    let result = match request.state.as_str() {
        "released" => state.tickets.release_ticket(lineage_id, ext_id).await,
        "closed" => state.tickets.close_ticket(lineage_id, ext_id).await,
        _ => {
            return Err(ApiError::bad_request(
                "state must be one of: released, closed",
            ))
        }
    };

    result.map_err(|err| match err {
        TicketServiceError::InvalidRequest(_) | TicketServiceError::NoSuchLineage => {
            ApiError::bad_request(err.to_string())
        }
        TicketServiceError::NoSuchTicket => ApiError::not_found(err.to_string()),
        TicketServiceError::TooManyConcurrentRequests => {
            ApiError::too_many_concurrent_requests(err.to_string())
        }
        other => ApiError::unexpected(&other),
    })?;

    Ok(StatusCode::NO_CONTENT)
}
