//! Lineage endpoints.
//!
//! - `POST /lineages` — create a lineage
//! - `GET /lineages?extId=` — look a lineage up by its external id

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use noncepool_core::{ExtId, Lineage, LineageId, NewLineage, Nonce, TicketServiceError};
use serde::{Deserialize, Serialize};

/// Request to create a lineage.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageCreationRequest {
    /// Caller-supplied identifier, unique across all lineages.
    pub ext_id: String,
    /// Cap on concurrently leased tickets.
    pub max_leased_nonce_count: i64,
    /// First nonce to issue; defaults to 0.
    #[serde(default)]
    pub start_leasing_from: Option<i64>,
    /// Cap on any issued nonce; defaults to the largest representable
    /// value.
    #[serde(default)]
    pub max_nonce_value: Option<i64>,
}

/// Response after creating a lineage.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageCreationResponse {
    /// Internal lineage id; addresses all ticket operations.
    pub id: LineageId,
    /// The caller-supplied identifier, echoed back.
    pub ext_id: ExtId,
}

/// Full lineage representation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageResponse {
    /// Internal lineage id.
    pub id: LineageId,
    /// Caller-supplied identifier.
    pub ext_id: ExtId,
    /// Smallest nonce never yet leased.
    pub next_nonce: i64,
    /// Tickets currently leased.
    pub leased_nonce_count: i64,
    /// Tickets currently released.
    pub released_nonce_count: i64,
    /// Cap on concurrently leased tickets.
    pub max_leased_nonce_count: i64,
    /// Cap on any issued nonce.
    pub max_nonce_value: i64,
}

impl From<Lineage> for LineageResponse {
    fn from(lineage: Lineage) -> Self {
        Self {
            id: lineage.id,
            ext_id: lineage.ext_id,
            next_nonce: lineage.next_nonce.value(),
            leased_nonce_count: lineage.leased_nonce_count,
            released_nonce_count: lineage.released_nonce_count,
            max_leased_nonce_count: lineage.max_leased_nonce_count,
            max_nonce_value: lineage.max_nonce_value.value(),
        }
    }
}

/// Query parameters of the lineage lookup.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLineageParams {
    /// External id to resolve.
    pub ext_id: String,
}

/// `POST /lineages`
pub async fn create_lineage(
    State(state): State<AppState>,
    Json(request): Json<LineageCreationRequest>,
) -> Result<Json<LineageCreationResponse>, ApiError> {
    let ext_id: ExtId = request
        .ext_id
        .parse()
        .map_err(|e: noncepool_core::ids::ParseExtIdError| ApiError::bad_request(e.to_string()))?;

    let lineage = state
        .lineages
        .create_lineage(NewLineage {
            ext_id,
            max_leased_nonce_count: request.max_leased_nonce_count,
            start_leasing_from: request.start_leasing_from.map(Nonce::new),
            max_nonce_value: request.max_nonce_value.map(Nonce::new),
        })
        .await
        .map_err(|err| match err {
            TicketServiceError::InvalidRequest(_) => ApiError::bad_request(err.to_string()),
            other => ApiError::unexpected(&other),
        })?;

    Ok(Json(LineageCreationResponse {
        id: lineage.id,
        ext_id: lineage.ext_id,
    }))
}

/// `GET /lineages?extId=`
pub async fn get_lineage(
    State(state): State<AppState>,
    Query(params): Query<GetLineageParams>,
) -> Result<Json<LineageResponse>, ApiError> {
    let ext_id: ExtId = params
        .ext_id
        .parse()
        .map_err(|e: noncepool_core::ids::ParseExtIdError| ApiError::bad_request(e.to_string()))?;

    let lineage = state.lineages.lineage(ext_id).await.map_err(|err| match err {
        TicketServiceError::NoSuchLineage => ApiError::not_found(err.to_string()),
        other => ApiError::unexpected(&other),
    })?;

    Ok(Json(lineage.into()))
}
