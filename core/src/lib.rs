//! Core engine of the noncepool nonce lease service.
//!
//! This crate contains everything that is independent of transport and
//! storage technology:
//!
//! - The domain model: [`Lineage`], tickets, and their strong identifier
//!   types ([`LineageId`], [`ExtId`], [`Nonce`], [`Version`])
//! - The persistence port: the [`TicketStore`] trait every storage
//!   adapter implements
//! - The engines: [`LineageService`] and [`TicketService`], which run
//!   the lease/release/close protocol with optimistic-concurrency
//!   retries
//! - The error taxonomy callers program against
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          Transport adapter (HTTP)            │ ← noncepool-server
//! ├──────────────────────────────────────────────┤
//! │    LineageService        TicketService       │
//! │    (create/read)         (lease/release/     │ ← this crate
//! │                           close/read)        │
//! ├──────────────────────────────────────────────┤
//! │          TicketStore (port trait)            │ ← this crate
//! ├──────────────────────────────────────────────┤
//! │ PostgresTicketStore    InMemoryTicketStore   │ ← noncepool-postgres /
//! └──────────────────────────────────────────────┘   noncepool-testing
//! ```
//!
//! All mutual exclusion lives in the store behind a per-lineage version
//! counter; the engines hold no mutable state and never lock in-process.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod ids;
pub mod lineage;
pub mod retry;
pub mod service;
pub mod store;
pub mod ticket;

// Re-export key types for convenience
pub use error::TicketServiceError;
pub use ids::{ExtId, LineageId};
pub use lineage::{Lineage, Version};
pub use retry::RetryPolicy;
pub use service::{LineageService, NewLineage, TicketService};
pub use store::{TicketStore, TicketStoreError};
pub use ticket::{Nonce, TicketLease, TicketRecord, TicketState};
