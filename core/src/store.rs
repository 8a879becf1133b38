//! Persistence port for lineages and tickets.
//!
//! This module defines the storage abstraction the engines operate
//! against. The contract is deliberately narrow: a handful of atomic
//! operations, each of which either commits a consistent lineage state or
//! fails without side effects.
//!
//! # Contract
//!
//! Every implementation must guarantee:
//!
//! 1. **Version compare-and-swap.** Each mutating operation takes the
//!    lineage [`Version`] the caller last read and fails with
//!    [`TicketStoreError::OptimisticLock`] if the stored version differs.
//!    On success the version is bumped exactly once.
//! 2. **Atomic bulk assignment.** [`TicketStore::create_tickets`] applies
//!    the whole lease-assignment algorithm across all requested external
//!    ids in one transaction: either every id receives a nonce or none
//!    do.
//! 3. **Durability.** A successful return implies the mutation is
//!    committed.
//!
//! Embedding the transition rules in the store (rather than
//! read-modify-write from the engine) is what keeps the gap-free
//! `[0, next_nonce)` invariant and the smallest-released-first rule safe
//! under concurrency: the engines never observe an inconsistent lineage.
//!
//! # Implementations
//!
//! - `PostgresTicketStore` (in `noncepool-postgres`): production
//!   implementation backed by server-side routines
//! - `InMemoryTicketStore` (in `noncepool-testing`): fast, deterministic
//!   testing

use crate::ids::{ExtId, LineageId};
use crate::lineage::{Lineage, Version};
use crate::ticket::{Nonce, TicketRecord};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`TicketStore`] methods.
///
/// Explicit `Pin<Box<dyn Future>>` returns (instead of `async fn`) keep
/// the trait dyn-compatible so the engines can hold `Arc<dyn TicketStore>`.
pub type StoreFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TicketStoreError>> + Send + 'a>>;

/// Errors surfaced by a [`TicketStore`] implementation.
///
/// These are storage-level signals; the engines translate them into the
/// caller-facing [`crate::TicketServiceError`] taxonomy at the port
/// boundary.
#[derive(Error, Debug)]
pub enum TicketStoreError {
    /// The lineage version advanced since the caller's read. The only
    /// retriable signal.
    #[error("optimistic lock conflict on lineage version")]
    OptimisticLock,

    /// A lineage with the requested external id already exists.
    #[error("lineage with this external id already exists")]
    LineageExists,

    /// No lineage matches the given id or external id.
    #[error("no such lineage")]
    NoSuchLineage,

    /// No ticket matches the given external id, or the ticket is not in
    /// the state the operation requires (release and close act on leased
    /// tickets only).
    #[error("no such ticket")]
    NoSuchTicket,

    /// The ticket is already closed. Raised by `close_ticket`; the engine
    /// swallows it to make close idempotent for callers.
    #[error("ticket already closed")]
    AlreadyClosed,

    /// The storage routine rejected the request: a lease against a closed
    /// external id, or nonce space exhaustion.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Granting the lease would push the leased-ticket count over the
    /// lineage cap.
    #[error("max leased nonce count exceeded")]
    MaxLeasedExceeded,

    /// Transport failure or an unexpected storage error.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Storage abstraction over lineages and tickets.
///
/// # Thread safety
///
/// Implementations must be `Send + Sync`; a single store handle (a
/// connection pool in production) is shared across all request workers.
pub trait TicketStore: Send + Sync {
    /// Persist a freshly created lineage row.
    ///
    /// The engine constructs the full row (id, zeroed counters, resolved
    /// defaults, initial version); the store persists it verbatim.
    ///
    /// # Errors
    ///
    /// - [`TicketStoreError::LineageExists`]: the external id is taken
    /// - [`TicketStoreError::Backend`]: storage failure
    fn insert_lineage(&self, lineage: Lineage) -> StoreFuture<'_, LineageId>;

    /// Read the full lineage row by its external id.
    ///
    /// # Errors
    ///
    /// - [`TicketStoreError::NoSuchLineage`]: unknown external id
    fn lineage_by_ext_id(&self, ext_id: ExtId) -> StoreFuture<'_, Lineage>;

    /// Read the current version of a lineage.
    ///
    /// This is the read half of every optimistic-concurrency attempt.
    ///
    /// # Errors
    ///
    /// - [`TicketStoreError::NoSuchLineage`]: unknown lineage id
    fn lineage_version(&self, lineage_id: LineageId) -> StoreFuture<'_, Version>;

    /// Atomically lease one nonce per requested external id.
    ///
    /// For each external id in order: an existing `leased` ticket returns
    /// its nonce unchanged (idempotency); an existing `released` ticket
    /// transitions back to `leased`; a fresh id is assigned the smallest
    /// `released` nonce if one exists, otherwise `next_nonce`. The
    /// returned vector is positionally aligned with `ext_ids`.
    ///
    /// # Errors
    ///
    /// - [`TicketStoreError::OptimisticLock`]: version mismatch
    /// - [`TicketStoreError::Validation`]: an id is bound to a `closed`
    ///   ticket, or the nonce space is exhausted
    /// - [`TicketStoreError::MaxLeasedExceeded`]: lineage cap reached
    fn create_tickets(
        &self,
        lineage_id: LineageId,
        version: Version,
        ext_ids: Vec<ExtId>,
    ) -> StoreFuture<'_, Vec<Nonce>>;

    /// Transition a `leased` ticket to `released` and return its nonce.
    ///
    /// # Errors
    ///
    /// - [`TicketStoreError::OptimisticLock`]: version mismatch
    /// - [`TicketStoreError::NoSuchTicket`]: the ticket does not exist or
    ///   is not currently leased
    fn release_ticket(
        &self,
        lineage_id: LineageId,
        version: Version,
        ext_id: ExtId,
    ) -> StoreFuture<'_, Nonce>;

    /// Transition a `leased` ticket to `closed`.
    ///
    /// # Errors
    ///
    /// - [`TicketStoreError::OptimisticLock`]: version mismatch
    /// - [`TicketStoreError::NoSuchTicket`]: the ticket does not exist or
    ///   is currently released
    /// - [`TicketStoreError::AlreadyClosed`]: the ticket is closed
    fn close_ticket(
        &self,
        lineage_id: LineageId,
        version: Version,
        ext_id: ExtId,
    ) -> StoreFuture<'_, ()>;

    /// Read a single ticket.
    ///
    /// # Errors
    ///
    /// - [`TicketStoreError::NoSuchTicket`]: unknown external id
    fn ticket(&self, lineage_id: LineageId, ext_id: ExtId) -> StoreFuture<'_, TicketRecord>;

    /// Read all tickets matching the given external ids.
    ///
    /// Unknown ids are silently omitted from the result; resolving zero
    /// tickets is not an error at this layer.
    fn tickets(
        &self,
        lineage_id: LineageId,
        ext_ids: Vec<ExtId>,
    ) -> StoreFuture<'_, Vec<TicketRecord>>;
}
