//! Request handlers and wire DTOs for the ticket API.

pub mod lineages;
pub mod tickets;
