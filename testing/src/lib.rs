//! Testing utilities for the noncepool nonce lease service.
//!
//! This crate provides:
//! - [`InMemoryTicketStore`]: a complete, deterministic implementation of
//!   the persistence port, running the same atomic lease-assignment
//!   algorithm as the production PostgreSQL routines
//! - [`ConflictInjectingStore`]: a wrapper that fails a configured number
//!   of mutating calls with optimistic-lock conflicts, for exercising the
//!   engines' retry protocol
//!
//! The in-memory store honors the full port contract — version
//! compare-and-swap, all-or-nothing bulk assignment, state-transition
//! rules — so engine-level tests and the HTTP test suite run at memory
//! speed with no database.
//!
//! # Example
//!
//! ```
//! use noncepool_core::{NewLineage, LineageService, TicketService};
//! use noncepool_testing::InMemoryTicketStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryTicketStore::new());
//! let lineages = LineageService::new(store.clone());
//! let tickets = TicketService::new(store);
//!
//! let lineage = lineages
//!     .create_lineage(NewLineage {
//!         ext_id: "account-1".parse()?,
//!         max_leased_nonce_count: 64,
//!         start_leasing_from: None,
//!         max_nonce_value: None,
//!     })
//!     .await?;
//!
//! let leases = tickets.lease_tickets(lineage.id, vec!["tx1".parse()?]).await?;
//! assert_eq!(leases[0].nonce.value(), 0);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use noncepool_core::store::StoreFuture;
use noncepool_core::{
    ExtId, Lineage, LineageId, Nonce, TicketRecord, TicketState, TicketStore, TicketStoreError,
    Version,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
struct TicketEntry {
    ext_id: ExtId,
    state: TicketState,
}

/// One lineage with its tickets, indexed by nonce (ordered, so the
/// smallest released nonce is the first released entry in iteration
/// order) and by external id.
#[derive(Clone, Debug)]
struct LineageState {
    row: Lineage,
    by_nonce: BTreeMap<i64, TicketEntry>,
    nonce_by_ext_id: HashMap<ExtId, i64>,
}

impl LineageState {
    fn new(row: Lineage) -> Self {
        Self {
            row,
            by_nonce: BTreeMap::new(),
            nonce_by_ext_id: HashMap::new(),
        }
    }

    fn smallest_released_nonce(&self) -> Option<i64> {
        self.by_nonce
            .iter()
            .find(|(_, entry)| entry.state == TicketState::Released)
            .map(|(&nonce, _)| nonce)
    }

    /// Move one ticket to `leased` or mint a new one, per the assignment
    /// rules. Returns the assigned nonce.
    fn lease_one(&mut self, ext_id: &ExtId) -> Result<i64, TicketStoreError> {
        if let Some(&nonce) = self.nonce_by_ext_id.get(ext_id) {
            let entry = self
                .by_nonce
                .get_mut(&nonce)
                .ok_or_else(|| TicketStoreError::Backend("dangling ext id index".to_string()))?;
            return match entry.state {
                TicketState::Leased => Ok(nonce),
                TicketState::Released => {
                    entry.state = TicketState::Leased;
                    self.row.released_nonce_count -= 1;
                    self.row.leased_nonce_count += 1;
                    self.check_lease_cap()?;
                    Ok(nonce)
                }
                TicketState::Closed => Err(TicketStoreError::Validation(
                    "ext id is bound to a closed ticket".to_string(),
                )),
            };
        }

        let nonce = if let Some(nonce) = self.smallest_released_nonce() {
            let entry = self
                .by_nonce
                .get_mut(&nonce)
                .ok_or_else(|| TicketStoreError::Backend("dangling released nonce".to_string()))?;
            self.nonce_by_ext_id.remove(&entry.ext_id);
            entry.ext_id = ext_id.clone();
            entry.state = TicketState::Leased;
            self.nonce_by_ext_id.insert(ext_id.clone(), nonce);
            self.row.released_nonce_count -= 1;
            self.row.leased_nonce_count += 1;
            nonce
        } else {
            if self.row.next_nonce > self.row.max_nonce_value {
                return Err(TicketStoreError::Validation(
                    "nonce space exhausted".to_string(),
                ));
            }
            let nonce = self.row.next_nonce.value();
            self.by_nonce.insert(
                nonce,
                TicketEntry {
                    ext_id: ext_id.clone(),
                    state: TicketState::Leased,
                },
            );
            self.nonce_by_ext_id.insert(ext_id.clone(), nonce);
            self.row.next_nonce = self.row.next_nonce.next();
            self.row.leased_nonce_count += 1;
            nonce
        };

        self.check_lease_cap()?;
        Ok(nonce)
    }

    fn check_lease_cap(&self) -> Result<(), TicketStoreError> {
        if self.row.leased_nonce_count > self.row.max_leased_nonce_count {
            return Err(TicketStoreError::MaxLeasedExceeded);
        }
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    lineages: HashMap<LineageId, LineageState>,
    id_by_ext_id: HashMap<ExtId, LineageId>,
}

impl Inner {
    fn lineage(&self, id: LineageId) -> Result<&LineageState, TicketStoreError> {
        self.lineages.get(&id).ok_or(TicketStoreError::NoSuchLineage)
    }

    /// Version CAS + bump, the entry point of every mutating routine.
    /// Works on a clone of the lineage so a failed routine leaves no
    /// trace, mirroring transaction rollback in the SQL adapter.
    fn begin_mutation(
        &self,
        id: LineageId,
        version: Version,
    ) -> Result<LineageState, TicketStoreError> {
        let state = self.lineage(id)?;
        if state.row.version != version {
            return Err(TicketStoreError::OptimisticLock);
        }
        let mut working = state.clone();
        working.row.version = version.next();
        Ok(working)
    }

    fn commit(&mut self, id: LineageId, state: LineageState) {
        self.lineages.insert(id, state);
    }
}

/// In-memory [`TicketStore`] with full port semantics.
///
/// A single mutex guards the whole store; every operation is atomic and
/// the version compare-and-swap behaves exactly as in the SQL adapter.
#[derive(Default)]
pub struct InMemoryTicketStore {
    inner: Mutex<Inner>,
}

impl InMemoryTicketStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::unwrap_used)] // a poisoned store mutex is unrecoverable in tests
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

impl TicketStore for InMemoryTicketStore {
    fn insert_lineage(&self, lineage: Lineage) -> StoreFuture<'_, LineageId> {
        Box::pin(async move {
            let mut inner = self.lock();
            if inner.id_by_ext_id.contains_key(&lineage.ext_id) {
                return Err(TicketStoreError::LineageExists);
            }
            let id = lineage.id;
            inner.id_by_ext_id.insert(lineage.ext_id.clone(), id);
            inner.lineages.insert(id, LineageState::new(lineage));
            Ok(id)
        })
    }

    fn lineage_by_ext_id(&self, ext_id: ExtId) -> StoreFuture<'_, Lineage> {
        Box::pin(async move {
            let inner = self.lock();
            let id = *inner
                .id_by_ext_id
                .get(&ext_id)
                .ok_or(TicketStoreError::NoSuchLineage)?;
            Ok(inner.lineage(id)?.row.clone())
        })
    }

    fn lineage_version(&self, lineage_id: LineageId) -> StoreFuture<'_, Version> {
        Box::pin(async move { Ok(self.lock().lineage(lineage_id)?.row.version) })
    }

    fn create_tickets(
        &self,
        lineage_id: LineageId,
        version: Version,
        ext_ids: Vec<ExtId>,
    ) -> StoreFuture<'_, Vec<Nonce>> {
        Box::pin(async move {
            let mut inner = self.lock();
            let mut working = inner.begin_mutation(lineage_id, version)?;

            let mut nonces = Vec::with_capacity(ext_ids.len());
            for ext_id in &ext_ids {
                nonces.push(Nonce::new(working.lease_one(ext_id)?));
            }

            inner.commit(lineage_id, working);
            Ok(nonces)
        })
    }

    fn release_ticket(
        &self,
        lineage_id: LineageId,
        version: Version,
        ext_id: ExtId,
    ) -> StoreFuture<'_, Nonce> {
        Box::pin(async move {
            let mut inner = self.lock();
            let mut working = inner.begin_mutation(lineage_id, version)?;

            let nonce = *working
                .nonce_by_ext_id
                .get(&ext_id)
                .ok_or(TicketStoreError::NoSuchTicket)?;
            let entry = working
                .by_nonce
                .get_mut(&nonce)
                .ok_or_else(|| TicketStoreError::Backend("dangling ext id index".to_string()))?;
            if entry.state != TicketState::Leased {
                return Err(TicketStoreError::NoSuchTicket);
            }
            entry.state = TicketState::Released;
            working.row.leased_nonce_count -= 1;
            working.row.released_nonce_count += 1;

            inner.commit(lineage_id, working);
            Ok(Nonce::new(nonce))
        })
    }

    fn close_ticket(
        &self,
        lineage_id: LineageId,
        version: Version,
        ext_id: ExtId,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.lock();
            let mut working = inner.begin_mutation(lineage_id, version)?;

            let nonce = *working
                .nonce_by_ext_id
                .get(&ext_id)
                .ok_or(TicketStoreError::NoSuchTicket)?;
            let entry = working
                .by_nonce
                .get_mut(&nonce)
                .ok_or_else(|| TicketStoreError::Backend("dangling ext id index".to_string()))?;
            match entry.state {
                TicketState::Closed => return Err(TicketStoreError::AlreadyClosed),
                // A released ticket is not closable; it has to be leased
                // again first.
                TicketState::Released => return Err(TicketStoreError::NoSuchTicket),
                TicketState::Leased => {}
            }
            entry.state = TicketState::Closed;
            working.row.leased_nonce_count -= 1;

            inner.commit(lineage_id, working);
            Ok(())
        })
    }

    fn ticket(&self, lineage_id: LineageId, ext_id: ExtId) -> StoreFuture<'_, TicketRecord> {
        Box::pin(async move {
            let inner = self.lock();
            let state = inner.lineage(lineage_id)?;
            let nonce = *state
                .nonce_by_ext_id
                .get(&ext_id)
                .ok_or(TicketStoreError::NoSuchTicket)?;
            let entry = state
                .by_nonce
                .get(&nonce)
                .ok_or(TicketStoreError::NoSuchTicket)?;
            Ok(TicketRecord {
                ext_id,
                nonce: Nonce::new(nonce),
                state: entry.state,
            })
        })
    }

    fn tickets(
        &self,
        lineage_id: LineageId,
        ext_ids: Vec<ExtId>,
    ) -> StoreFuture<'_, Vec<TicketRecord>> {
        Box::pin(async move {
            let inner = self.lock();
            let state = inner.lineage(lineage_id)?;
            let mut records = Vec::new();
            for ext_id in ext_ids {
                if let Some(&nonce) = state.nonce_by_ext_id.get(&ext_id) {
                    if let Some(entry) = state.by_nonce.get(&nonce) {
                        records.push(TicketRecord {
                            ext_id,
                            nonce: Nonce::new(nonce),
                            state: entry.state,
                        });
                    }
                }
            }
            Ok(records)
        })
    }
}

/// Wrapper store that fails the first `n` mutating calls with
/// [`TicketStoreError::OptimisticLock`] before delegating.
///
/// Reads always pass through. Useful for driving the engines' retry
/// protocol deterministically.
pub struct ConflictInjectingStore<S> {
    inner: Arc<S>,
    conflicts_remaining: AtomicU32,
}

impl<S: TicketStore> ConflictInjectingStore<S> {
    /// Wrap `inner`, injecting `conflicts` optimistic-lock failures.
    pub fn new(inner: Arc<S>, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts_remaining: AtomicU32::new(conflicts),
        }
    }

    fn take_conflict(&self) -> bool {
        self.conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<S: TicketStore> TicketStore for ConflictInjectingStore<S> {
    fn insert_lineage(&self, lineage: Lineage) -> StoreFuture<'_, LineageId> {
        self.inner.insert_lineage(lineage)
    }

    fn lineage_by_ext_id(&self, ext_id: ExtId) -> StoreFuture<'_, Lineage> {
        self.inner.lineage_by_ext_id(ext_id)
    }

    fn lineage_version(&self, lineage_id: LineageId) -> StoreFuture<'_, Version> {
        self.inner.lineage_version(lineage_id)
    }

    fn create_tickets(
        &self,
        lineage_id: LineageId,
        version: Version,
        ext_ids: Vec<ExtId>,
    ) -> StoreFuture<'_, Vec<Nonce>> {
        if self.take_conflict() {
            return Box::pin(async { Err(TicketStoreError::OptimisticLock) });
        }
        self.inner.create_tickets(lineage_id, version, ext_ids)
    }

    fn release_ticket(
        &self,
        lineage_id: LineageId,
        version: Version,
        ext_id: ExtId,
    ) -> StoreFuture<'_, Nonce> {
        if self.take_conflict() {
            return Box::pin(async { Err(TicketStoreError::OptimisticLock) });
        }
        self.inner.release_ticket(lineage_id, version, ext_id)
    }

    fn close_ticket(
        &self,
        lineage_id: LineageId,
        version: Version,
        ext_id: ExtId,
    ) -> StoreFuture<'_, ()> {
        if self.take_conflict() {
            return Box::pin(async { Err(TicketStoreError::OptimisticLock) });
        }
        self.inner.close_ticket(lineage_id, version, ext_id)
    }

    fn ticket(&self, lineage_id: LineageId, ext_id: ExtId) -> StoreFuture<'_, TicketRecord> {
        self.inner.ticket(lineage_id, ext_id)
    }

    fn tickets(
        &self,
        lineage_id: LineageId,
        ext_ids: Vec<ExtId>,
    ) -> StoreFuture<'_, Vec<TicketRecord>> {
        self.inner.tickets(lineage_id, ext_ids)
    }
}
