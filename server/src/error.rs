//! HTTP error responses.
//!
//! [`ApiError`] bridges the engine error taxonomy and HTTP: every error
//! becomes a status code plus a `{code, message}` JSON body. The
//! engine-to-HTTP mapping differs per operation (a missing lineage is a
//! 404 on lookup but a 400 on lease), so handlers build the `ApiError`
//! themselves from the variants they can observe.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use noncepool_core::TicketServiceError;
use serde::Serialize;

/// Error code for malformed or unsatisfiable requests.
pub const CODE_BAD_REQUEST: &str = "bad_request";
/// Error code for missing lineages and tickets.
pub const CODE_NOT_FOUND: &str = "not_found";
/// Error code for lease-cap rejections.
pub const CODE_TOO_MANY_LEASED_TICKETS: &str = "too_many_leased_tickets";
/// Error code for optimistic-lock retry exhaustion.
pub const CODE_TOO_MANY_CONCURRENT_REQUESTS: &str = "too_many_concurrent_requests";
/// Error code for unexpected server-side failures.
pub const CODE_INTERNAL_ERROR: &str = "internal_error";

/// An HTTP-facing error: status code, stable error code, message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// 400 with `bad_request`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: CODE_BAD_REQUEST,
            message: message.into(),
        }
    }

    /// 404 with `not_found`.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: CODE_NOT_FOUND,
            message: message.into(),
        }
    }

    /// 429 with `too_many_leased_tickets`.
    #[must_use]
    pub fn too_many_leased_tickets(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: CODE_TOO_MANY_LEASED_TICKETS,
            message: message.into(),
        }
    }

    /// 409 with `too_many_concurrent_requests`.
    #[must_use]
    pub fn too_many_concurrent_requests(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: CODE_TOO_MANY_CONCURRENT_REQUESTS,
            message: message.into(),
        }
    }

    /// 500 with `internal_error`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: CODE_INTERNAL_ERROR,
            message: message.into(),
        }
    }

    /// Fallback mapping for engine errors a handler does not expect on
    /// its happy path: storage failures become 500s, everything else a
    /// conservative 400.
    #[must_use]
    pub fn unexpected(err: &TicketServiceError) -> Self {
        match err {
            TicketServiceError::StorageUnavailable(_) => Self::internal(err.to_string()),
            _ => Self::bad_request(err.to_string()),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = self.code,
                message = %self.message,
                "request failed"
            );
        }

        (
            self.status,
            Json(ErrorBody {
                code: self.code,
                message: self.message,
            }),
        )
            .into_response()
    }
}
