//! Shared application state for the HTTP handlers.

use noncepool_core::{LineageService, TicketService, TicketStore};
use std::sync::Arc;

/// State shared across all HTTP handlers.
///
/// The engines are stateless over an `Arc<dyn TicketStore>`, so cloning
/// the state per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Lineage creation and lookup.
    pub lineages: Arc<LineageService>,
    /// Ticket lease/release/close and lookup.
    pub tickets: Arc<TicketService>,
}

impl AppState {
    /// Build the state over any store implementation.
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self {
            lineages: Arc::new(LineageService::new(store.clone())),
            tickets: Arc::new(TicketService::new(store)),
        }
    }
}
