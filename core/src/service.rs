//! The lease engines: lineage creation/lookup and the ticket
//! lease/release/close protocol.
//!
//! Engines are thin, stateless coordinators over a [`TicketStore`]. A
//! mutating call is composed of: a short read of the lineage version, a
//! short atomic storage call carrying that version, and possibly a
//! jittered sleep before the next attempt when the store reports an
//! optimistic-lock conflict. Everything else — nonce assignment,
//! counter updates, state transitions — happens atomically inside the
//! store.

use crate::error::TicketServiceError;
use crate::ids::{ExtId, LineageId};
use crate::lineage::{Lineage, Version};
use crate::retry::RetryPolicy;
use crate::store::{TicketStore, TicketStoreError};
use crate::ticket::{Nonce, TicketLease, TicketRecord, TicketState};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;

/// Parameters for creating a lineage.
#[derive(Clone, Debug)]
pub struct NewLineage {
    /// Caller-supplied identifier, unique across all lineages.
    pub ext_id: ExtId,
    /// Cap on concurrently leased tickets.
    pub max_leased_nonce_count: i64,
    /// First nonce to issue; defaults to 0.
    pub start_leasing_from: Option<Nonce>,
    /// Cap on any issued nonce; defaults to [`Nonce::MAX`].
    pub max_nonce_value: Option<Nonce>,
}

/// Creates and reads lineages.
///
/// # Examples
///
/// ```no_run
/// use noncepool_core::{LineageService, NewLineage, TicketStore};
/// use std::sync::Arc;
///
/// async fn example(store: Arc<dyn TicketStore>) -> Result<(), Box<dyn std::error::Error>> {
///     let lineages = LineageService::new(store);
///     let lineage = lineages
///         .create_lineage(NewLineage {
///             ext_id: "account-0xabc".parse()?,
///             max_leased_nonce_count: 64,
///             start_leasing_from: None,
///             max_nonce_value: None,
///         })
///         .await?;
///     println!("created lineage {}", lineage.id);
///     Ok(())
/// }
/// ```
pub struct LineageService {
    store: Arc<dyn TicketStore>,
}

impl LineageService {
    /// Create a lineage service over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Create a new lineage.
    ///
    /// Generates a fresh internal id, resolves defaults
    /// (`start_leasing_from` 0, `max_nonce_value` [`Nonce::MAX`]) and
    /// persists the row with zeroed counters at [`Version::initial`].
    ///
    /// # Errors
    ///
    /// - [`TicketServiceError::InvalidRequest`]: duplicate external id,
    ///   non-positive lease cap, or a negative starting nonce
    /// - [`TicketServiceError::StorageUnavailable`]: storage failure
    pub async fn create_lineage(&self, new: NewLineage) -> Result<Lineage, TicketServiceError> {
        if new.max_leased_nonce_count < 1 {
            return Err(TicketServiceError::InvalidRequest(
                "max leased nonce count must be at least 1".to_string(),
            ));
        }
        let next_nonce = new.start_leasing_from.unwrap_or(Nonce::new(0));
        if next_nonce.value() < 0 {
            return Err(TicketServiceError::InvalidRequest(
                "starting nonce cannot be negative".to_string(),
            ));
        }
        let max_nonce_value = new.max_nonce_value.unwrap_or(Nonce::MAX);
        if max_nonce_value < next_nonce {
            return Err(TicketServiceError::InvalidRequest(
                "max nonce value cannot be below the starting nonce".to_string(),
            ));
        }

        let lineage = Lineage {
            id: LineageId::random(),
            ext_id: new.ext_id,
            next_nonce,
            leased_nonce_count: 0,
            released_nonce_count: 0,
            max_leased_nonce_count: new.max_leased_nonce_count,
            max_nonce_value,
            version: Version::initial(),
        };

        let id = self.store.insert_lineage(lineage.clone()).await?;

        tracing::info!(
            lineage_id = %id,
            ext_id = %lineage.ext_id,
            "created lineage"
        );
        metrics::counter!("noncepool_lineages_created_total").increment(1);

        Ok(lineage)
    }

    /// Read the full lineage row by its external id.
    ///
    /// # Errors
    ///
    /// - [`TicketServiceError::NoSuchLineage`]: unknown external id
    pub async fn lineage(&self, ext_id: ExtId) -> Result<Lineage, TicketServiceError> {
        let lineage = self.store.lineage_by_ext_id(ext_id.clone()).await?;

        tracing::debug!(
            lineage_id = %lineage.id,
            ext_id = %ext_id,
            version = %lineage.version,
            "retrieved lineage"
        );

        Ok(lineage)
    }
}

/// Leases, releases, closes and reads tickets.
///
/// All mutating operations run the bounded optimistic-concurrency retry
/// loop: read the lineage version, invoke the atomic storage routine with
/// it, and on a version conflict sleep with jittered exponential backoff
/// before trying again. After the attempt budget is spent the operation
/// fails with [`TicketServiceError::TooManyConcurrentRequests`]; every
/// other error aborts immediately.
pub struct TicketService {
    store: Arc<dyn TicketStore>,
    retry: RetryPolicy,
}

impl TicketService {
    /// Create a ticket service with the default [`RetryPolicy`].
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self::with_retry_policy(store, RetryPolicy::default())
    }

    /// Create a ticket service with an explicit retry policy.
    #[must_use]
    pub fn with_retry_policy(store: Arc<dyn TicketStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Lease one nonce per requested external id.
    ///
    /// This is the bulk primitive; a single-ticket lease is a one-element
    /// request. The returned leases are in input order. Re-leasing an
    /// already-leased external id returns its existing nonce, so the call
    /// is idempotent as long as no intervening release or close changed
    /// the state.
    ///
    /// # Errors
    ///
    /// - [`TicketServiceError::InvalidRequest`]: empty request, or an id
    ///   bound to a closed ticket
    /// - [`TicketServiceError::NoSuchLineage`]: unknown lineage
    /// - [`TicketServiceError::TooManyLeasedTickets`]: lineage cap
    ///   reached
    /// - [`TicketServiceError::TooManyConcurrentRequests`]: retry budget
    ///   exhausted under contention
    pub async fn lease_tickets(
        &self,
        lineage_id: LineageId,
        ext_ids: Vec<ExtId>,
    ) -> Result<Vec<TicketLease>, TicketServiceError> {
        if ext_ids.is_empty() {
            return Err(TicketServiceError::InvalidRequest(
                "at least one external id is required".to_string(),
            ));
        }

        let start = Instant::now();
        let store = Arc::clone(&self.store);
        let request_ids = ext_ids.clone();
        let nonces = self
            .retry_on_conflict(lineage_id, "lease", move |version| {
                let store = Arc::clone(&store);
                let ext_ids = request_ids.clone();
                async move { store.create_tickets(lineage_id, version, ext_ids).await }
            })
            .await?;

        let leases: Vec<TicketLease> = ext_ids
            .into_iter()
            .zip(nonces)
            .map(|(ext_id, nonce)| TicketLease {
                lineage_id,
                ext_id,
                nonce,
                state: TicketState::Leased,
            })
            .collect();

        tracing::info!(
            lineage_id = %lineage_id,
            count = leases.len(),
            nonces = ?leases.iter().map(|l| l.nonce.value()).collect::<Vec<_>>(),
            "leased tickets"
        );
        metrics::histogram!("noncepool_lease_duration_seconds").record(start.elapsed().as_secs_f64());

        Ok(leases)
    }

    /// Return a leased nonce to the recyclable pool.
    ///
    /// # Errors
    ///
    /// - [`TicketServiceError::NoSuchLineage`]: unknown lineage
    /// - [`TicketServiceError::NoSuchTicket`]: the ticket does not exist
    ///   or is not currently leased
    /// - [`TicketServiceError::TooManyConcurrentRequests`]: retry budget
    ///   exhausted under contention
    pub async fn release_ticket(
        &self,
        lineage_id: LineageId,
        ext_id: ExtId,
    ) -> Result<(), TicketServiceError> {
        let start = Instant::now();
        let store = Arc::clone(&self.store);
        let release_id = ext_id.clone();
        let nonce = self
            .retry_on_conflict(lineage_id, "release", move |version| {
                let store = Arc::clone(&store);
                let ext_id = release_id.clone();
                async move { store.release_ticket(lineage_id, version, ext_id).await }
            })
            .await?;

        tracing::info!(
            lineage_id = %lineage_id,
            ext_id = %ext_id,
            nonce = nonce.value(),
            "released ticket"
        );
        metrics::histogram!("noncepool_release_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        Ok(())
    }

    /// Permanently consume a leased nonce.
    ///
    /// Idempotent for callers: closing an already-closed ticket succeeds
    /// with no state change.
    ///
    /// # Errors
    ///
    /// - [`TicketServiceError::NoSuchLineage`]: unknown lineage
    /// - [`TicketServiceError::NoSuchTicket`]: the ticket does not exist
    ///   or is currently released
    /// - [`TicketServiceError::TooManyConcurrentRequests`]: retry budget
    ///   exhausted under contention
    pub async fn close_ticket(
        &self,
        lineage_id: LineageId,
        ext_id: ExtId,
    ) -> Result<(), TicketServiceError> {
        let start = Instant::now();
        let store = Arc::clone(&self.store);
        let close_id = ext_id.clone();
        self.retry_on_conflict(lineage_id, "close", move |version| {
            let store = Arc::clone(&store);
            let ext_id = close_id.clone();
            async move {
                match store.close_ticket(lineage_id, version, ext_id.clone()).await {
                    Err(TicketStoreError::AlreadyClosed) => {
                        tracing::info!(
                            lineage_id = %lineage_id,
                            ext_id = %ext_id,
                            "not closing ticket, was already closed"
                        );
                        Ok(())
                    }
                    other => other,
                }
            }
        })
        .await?;

        tracing::info!(
            lineage_id = %lineage_id,
            ext_id = %ext_id,
            "closed ticket"
        );
        metrics::histogram!("noncepool_close_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        Ok(())
    }

    /// Read a single ticket.
    ///
    /// # Errors
    ///
    /// - [`TicketServiceError::NoSuchTicket`]: unknown external id
    pub async fn ticket(
        &self,
        lineage_id: LineageId,
        ext_id: ExtId,
    ) -> Result<TicketLease, TicketServiceError> {
        let record = self.store.ticket(lineage_id, ext_id.clone()).await?;

        tracing::debug!(
            lineage_id = %lineage_id,
            ext_id = %ext_id,
            "retrieved ticket"
        );

        Ok(TicketLease::from_record(lineage_id, record))
    }

    /// Read all tickets matching the given external ids.
    ///
    /// Unknown ids are omitted from the result; only when *no* requested
    /// id resolves does the call fail.
    ///
    /// # Errors
    ///
    /// - [`TicketServiceError::InvalidRequest`]: empty request
    /// - [`TicketServiceError::NoSuchTicket`]: none of the ids resolve
    pub async fn tickets(
        &self,
        lineage_id: LineageId,
        ext_ids: Vec<ExtId>,
    ) -> Result<Vec<TicketLease>, TicketServiceError> {
        if ext_ids.is_empty() {
            return Err(TicketServiceError::InvalidRequest(
                "at least one external id is required".to_string(),
            ));
        }

        let records: Vec<TicketRecord> = self.store.tickets(lineage_id, ext_ids.clone()).await?;
        if records.is_empty() {
            return Err(TicketServiceError::NoSuchTicket);
        }

        tracing::debug!(
            lineage_id = %lineage_id,
            requested = ext_ids.len(),
            resolved = records.len(),
            "retrieved tickets"
        );

        Ok(records
            .into_iter()
            .map(|record| TicketLease::from_record(lineage_id, record))
            .collect())
    }

    /// Run one mutating operation under the bounded retry protocol.
    ///
    /// Each attempt re-reads the lineage version so the storage routine
    /// always receives a fresh witness. Only
    /// [`TicketStoreError::OptimisticLock`] triggers another attempt.
    async fn retry_on_conflict<T, Op, Fut>(
        &self,
        lineage_id: LineageId,
        operation: &'static str,
        mut op: Op,
    ) -> Result<T, TicketServiceError>
    where
        Op: FnMut(Version) -> Fut,
        Fut: Future<Output = Result<T, TicketStoreError>>,
    {
        let mut attempt = 1u32;
        loop {
            let version = self.store.lineage_version(lineage_id).await?;
            match op(version).await {
                Err(TicketStoreError::OptimisticLock) => {
                    metrics::counter!(
                        "noncepool_optimistic_lock_conflicts_total",
                        "operation" => operation
                    )
                    .increment(1);

                    if attempt >= self.retry.max_attempts() {
                        tracing::warn!(
                            lineage_id = %lineage_id,
                            operation,
                            attempts = attempt,
                            "optimistic lock retries exhausted"
                        );
                        return Err(TicketServiceError::TooManyConcurrentRequests);
                    }

                    tracing::debug!(
                        lineage_id = %lineage_id,
                        operation,
                        attempt,
                        "optimistic lock conflict, retrying"
                    );
                    sleep(self.retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::info!(
                        lineage_id = %lineage_id,
                        operation,
                        error = %err,
                        "operation rejected by storage"
                    );
                    return Err(err.into());
                }
            }
        }
    }
}
