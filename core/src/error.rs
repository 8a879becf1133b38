//! Caller-facing error taxonomy of the lease engines.

use crate::store::TicketStoreError;
use thiserror::Error;

/// Errors returned by [`crate::LineageService`] and
/// [`crate::TicketService`].
///
/// The taxonomy is transport-independent; the HTTP adapter maps each
/// variant onto a status code and error body. Storage signals are
/// translated into these variants at the persistence-port boundary, with
/// one exception: optimistic-lock conflicts are absorbed by the retry
/// loop and only surface as [`TooManyConcurrentRequests`] once the
/// attempt budget is exhausted.
///
/// [`TooManyConcurrentRequests`]: TicketServiceError::TooManyConcurrentRequests
#[derive(Error, Debug)]
pub enum TicketServiceError {
    /// Malformed external id, duplicate lineage external id, a lease
    /// attempt against a closed external id, or a storage-side validation
    /// failure. Not retriable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Lookup against an unknown lineage id or external id. Not
    /// retriable.
    #[error("no such lineage")]
    NoSuchLineage,

    /// Lookup or mutation against an unknown ticket, or release/close of
    /// a ticket that is not currently leased. Not retriable.
    #[error("no such ticket")]
    NoSuchTicket,

    /// The lease would exceed the lineage's `max_leased_nonce_count`.
    /// The caller must release or close tickets first.
    #[error("too many leased tickets")]
    TooManyLeasedTickets,

    /// Optimistic-lock retries exhausted under contention. Retriable by
    /// the caller at a higher level.
    #[error("too many concurrent requests")]
    TooManyConcurrentRequests,

    /// Transport failure or unexpected storage error.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<TicketStoreError> for TicketServiceError {
    fn from(err: TicketStoreError) -> Self {
        match err {
            TicketStoreError::LineageExists => {
                Self::InvalidRequest("lineage with this external id already exists".to_string())
            }
            TicketStoreError::Validation(reason) => Self::InvalidRequest(reason),
            TicketStoreError::AlreadyClosed => {
                Self::InvalidRequest("ticket already closed".to_string())
            }
            TicketStoreError::NoSuchLineage => Self::NoSuchLineage,
            TicketStoreError::NoSuchTicket => Self::NoSuchTicket,
            TicketStoreError::MaxLeasedExceeded => Self::TooManyLeasedTickets,
            // An optimistic-lock signal reaching this conversion means the
            // retry budget is spent.
            TicketStoreError::OptimisticLock => Self::TooManyConcurrentRequests,
            TicketStoreError::Backend(reason) => Self::StorageUnavailable(reason),
        }
    }
}
