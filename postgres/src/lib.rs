//! `PostgreSQL` persistence adapter for the noncepool nonce lease service.
//!
//! This crate implements the [`TicketStore`] port from `noncepool-core`
//! on top of `PostgreSQL`. The three mutating operations delegate to
//! server-side routines (`create_ticket`, `release_ticket`,
//! `close_ticket`) that perform the version compare-and-swap, the ticket
//! transition and the lineage counter updates in one atomic statement,
//! so the engines never observe a half-applied mutation.
//!
//! Storage signals travel back as raised exception messages
//! (`optimistic_lock`, `validation_error`, `max_unused_limit_exceeded`,
//! `no_such_ticket`, `already_closed`) and are translated into
//! [`TicketStoreError`] variants at this boundary.
//!
//! # Example
//!
//! ```no_run
//! use noncepool_postgres::PostgresTicketStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresTicketStore::new("postgres://localhost/noncepool").await?;
//!     noncepool_postgres::run_migrations(store.pool()).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use noncepool_core::store::StoreFuture;
use noncepool_core::{
    ExtId, Lineage, LineageId, Nonce, TicketRecord, TicketState, TicketStore, TicketStoreError,
    Version,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use uuid::Uuid;

// Raised exception messages forming the routine error contract.
const ERR_OPTIMISTIC_LOCK: &str = "optimistic_lock";
const ERR_VALIDATION: &str = "validation_error";
const ERR_MAX_UNUSED_LIMIT_EXCEEDED: &str = "max_unused_limit_exceeded";
const ERR_NO_SUCH_TICKET: &str = "no_such_ticket";
const ERR_ALREADY_CLOSED: &str = "already_closed";

// Unique-violation constraint guarding lineage external ids.
const LINEAGES_EXT_ID_IDX: &str = "lineages_ext_id_idx";

// PostgreSQL error codes.
const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_INVALID_TEXT_REPRESENTATION: &str = "22P02";

const QUERY_INSERT_LINEAGE: &str = "INSERT INTO lineages (id, ext_id, next_nonce, \
     leased_nonce_count, released_nonce_count, max_leased_nonce_count, max_nonce_value, version) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id";

const QUERY_SELECT_LINEAGE_BY_EXT_ID: &str = "SELECT id, ext_id, next_nonce, \
     leased_nonce_count, released_nonce_count, max_leased_nonce_count, max_nonce_value, version \
     FROM lineages WHERE ext_id = $1";

const QUERY_SELECT_LINEAGE_VERSION: &str = "SELECT version FROM lineages WHERE id = $1";

const QUERY_CREATE_TICKET: &str = "SELECT create_ticket($1, $2, $3)";

const QUERY_RELEASE_TICKET: &str = "SELECT release_ticket($1, $2, $3)";

const QUERY_CLOSE_TICKET: &str = "SELECT close_ticket($1, $2, $3)";

const QUERY_SELECT_TICKET: &str =
    "SELECT ext_id, nonce, lease_status FROM tickets WHERE lineage_id = $1 AND ext_id = $2";

const QUERY_SELECT_TICKETS: &str =
    "SELECT ext_id, nonce, lease_status FROM tickets WHERE lineage_id = $1 AND ext_id = ANY($2)";

/// Apply the embedded migrations (schema plus lease routines).
///
/// Call during application startup, before the first store operation.
///
/// # Errors
///
/// Returns [`TicketStoreError::Backend`] if a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), TicketStoreError> {
    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .map_err(|e| TicketStoreError::Backend(format!("migration failed: {e}")))?;

    tracing::info!("database migrations completed");
    Ok(())
}

/// Apply migrations from a directory on disk instead of the embedded
/// set.
///
/// Supports deployments that ship migrations separately from the
/// binary (the `migrationsDir` configuration key).
///
/// # Errors
///
/// Returns [`TicketStoreError::Backend`] if the directory cannot be read
/// or a migration fails to apply.
pub async fn run_migrations_from_dir(
    pool: &PgPool,
    dir: impl AsRef<Path>,
) -> Result<(), TicketStoreError> {
    let dir = dir.as_ref();
    let migrator = sqlx::migrate::Migrator::new(dir)
        .await
        .map_err(|e| TicketStoreError::Backend(format!("cannot load migrations: {e}")))?;
    migrator
        .run(pool)
        .await
        .map_err(|e| TicketStoreError::Backend(format!("migration failed: {e}")))?;

    tracing::info!(dir = %dir.display(), "database migrations completed");
    Ok(())
}

/// `PostgreSQL`-backed [`TicketStore`].
///
/// Holds a connection pool; clone-free sharing happens through
/// `Arc<dyn TicketStore>` in the engines.
pub struct PostgresTicketStore {
    pool: PgPool,
}

impl PostgresTicketStore {
    /// Connect to the database and build a store with default pool
    /// settings (max 10 connections).
    ///
    /// # Errors
    ///
    /// Returns [`TicketStoreError::Backend`] if the URL is invalid or the
    /// database is unreachable.
    pub async fn new(database_url: &str) -> Result<Self, TicketStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| TicketStoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Build a store from an existing connection pool.
    ///
    /// Useful for sharing one pool between the store and side channels
    /// such as the readiness probe.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Row shape shared by the lineage queries.
#[derive(sqlx::FromRow)]
struct LineageRow {
    id: Uuid,
    ext_id: String,
    next_nonce: i64,
    leased_nonce_count: i64,
    released_nonce_count: i64,
    max_leased_nonce_count: i64,
    max_nonce_value: i64,
    version: i64,
}

impl From<LineageRow> for Lineage {
    fn from(row: LineageRow) -> Self {
        Self {
            id: LineageId::new(row.id),
            ext_id: ExtId::new(row.ext_id),
            next_nonce: Nonce::new(row.next_nonce),
            leased_nonce_count: row.leased_nonce_count,
            released_nonce_count: row.released_nonce_count,
            max_leased_nonce_count: row.max_leased_nonce_count,
            max_nonce_value: Nonce::new(row.max_nonce_value),
            version: Version::new(row.version),
        }
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    ext_id: String,
    nonce: i64,
    lease_status: String,
}

impl TryFrom<TicketRow> for TicketRecord {
    type Error = TicketStoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let state: TicketState = row
            .lease_status
            .parse()
            .map_err(|_| TicketStoreError::Backend(format!(
                "unknown lease status in storage: {}",
                row.lease_status
            )))?;
        Ok(Self {
            ext_id: ExtId::new(row.ext_id),
            nonce: Nonce::new(row.nonce),
            state,
        })
    }
}

/// Translate a sqlx error into the port's error contract.
fn translate(err: sqlx::Error) -> TicketStoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION)
            && db.constraint() == Some(LINEAGES_EXT_ID_IDX)
        {
            return TicketStoreError::LineageExists;
        }
        if db.code().as_deref() == Some(PG_INVALID_TEXT_REPRESENTATION) {
            return TicketStoreError::Validation("malformed identifier".to_string());
        }
        match db.message() {
            ERR_OPTIMISTIC_LOCK => return TicketStoreError::OptimisticLock,
            ERR_VALIDATION => {
                return TicketStoreError::Validation(
                    "lease rejected by storage validation".to_string(),
                )
            }
            ERR_MAX_UNUSED_LIMIT_EXCEEDED => return TicketStoreError::MaxLeasedExceeded,
            ERR_NO_SUCH_TICKET => return TicketStoreError::NoSuchTicket,
            ERR_ALREADY_CLOSED => return TicketStoreError::AlreadyClosed,
            _ => {}
        }
    }
    TicketStoreError::Backend(err.to_string())
}

impl TicketStore for PostgresTicketStore {
    fn insert_lineage(&self, lineage: Lineage) -> StoreFuture<'_, LineageId> {
        Box::pin(async move {
            let id: Uuid = sqlx::query_scalar(QUERY_INSERT_LINEAGE)
                .bind(lineage.id.as_uuid())
                .bind(lineage.ext_id.as_str())
                .bind(lineage.next_nonce.value())
                .bind(lineage.leased_nonce_count)
                .bind(lineage.released_nonce_count)
                .bind(lineage.max_leased_nonce_count)
                .bind(lineage.max_nonce_value.value())
                .bind(lineage.version.value())
                .fetch_one(&self.pool)
                .await
                .map_err(translate)?;

            Ok(LineageId::new(id))
        })
    }

    fn lineage_by_ext_id(&self, ext_id: ExtId) -> StoreFuture<'_, Lineage> {
        Box::pin(async move {
            let row: Option<LineageRow> = sqlx::query_as(QUERY_SELECT_LINEAGE_BY_EXT_ID)
                .bind(ext_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(translate)?;

            row.map(Lineage::from).ok_or(TicketStoreError::NoSuchLineage)
        })
    }

    fn lineage_version(&self, lineage_id: LineageId) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let version: Option<i64> = sqlx::query_scalar(QUERY_SELECT_LINEAGE_VERSION)
                .bind(lineage_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(translate)?;

            version.map(Version::new).ok_or(TicketStoreError::NoSuchLineage)
        })
    }

    fn create_tickets(
        &self,
        lineage_id: LineageId,
        version: Version,
        ext_ids: Vec<ExtId>,
    ) -> StoreFuture<'_, Vec<Nonce>> {
        Box::pin(async move {
            let ids: Vec<String> = ext_ids.into_iter().map(ExtId::into_inner).collect();
            let nonces: Vec<i64> = sqlx::query_scalar(QUERY_CREATE_TICKET)
                .bind(lineage_id.as_uuid())
                .bind(version.value())
                .bind(&ids)
                .fetch_one(&self.pool)
                .await
                .map_err(translate)?;

            tracing::debug!(
                lineage_id = %lineage_id,
                count = nonces.len(),
                "storage assigned nonces"
            );

            Ok(nonces.into_iter().map(Nonce::new).collect())
        })
    }

    fn release_ticket(
        &self,
        lineage_id: LineageId,
        version: Version,
        ext_id: ExtId,
    ) -> StoreFuture<'_, Nonce> {
        Box::pin(async move {
            let nonce: i64 = sqlx::query_scalar(QUERY_RELEASE_TICKET)
                .bind(lineage_id.as_uuid())
                .bind(version.value())
                .bind(ext_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(translate)?;

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
            sqlx::query(QUERY_CLOSE_TICKET)
                .bind(lineage_id.as_uuid())
                .bind(version.value())
                .bind(ext_id.as_str())
                .execute(&self.pool)
                .await
                .map_err(translate)?;

            Ok(())
        })
    }

    fn ticket(&self, lineage_id: LineageId, ext_id: ExtId) -> StoreFuture<'_, TicketRecord> {
        Box::pin(async move {
            let row: Option<TicketRow> = sqlx::query_as(QUERY_SELECT_TICKET)
                .bind(lineage_id.as_uuid())
                .bind(ext_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(translate)?;

            row.ok_or(TicketStoreError::NoSuchTicket)?.try_into()
        })
    }

    fn tickets(
        &self,
        lineage_id: LineageId,
        ext_ids: Vec<ExtId>,
    ) -> StoreFuture<'_, Vec<TicketRecord>> {
        Box::pin(async move {
            let ids: Vec<String> = ext_ids.into_iter().map(ExtId::into_inner).collect();
            let rows: Vec<TicketRow> = sqlx::query_as(QUERY_SELECT_TICKETS)
                .bind(lineage_id.as_uuid())
                .bind(&ids)
                .fetch_all(&self.pool)
                .await
                .map_err(translate)?;

            rows.into_iter().map(TicketRecord::try_from).collect()
        })
    }
}
