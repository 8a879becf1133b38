//! Tickets: the lease records binding external ids to nonces.

use crate::ids::{ExtId, LineageId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for [`TicketState`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid ticket state: {0}")]
pub struct ParseTicketStateError(String);

/// A nonce: a non-negative integer unique within its lineage.
///
/// Nonces are issued gap-free from 0 upward and are intended to be used as
/// a strictly increasing sequence number by an external system. The wire
/// and storage representation is a signed 64-bit integer, so the largest
/// issuable nonce is `i64::MAX`.
///
/// # Examples
///
/// ```
/// use noncepool_core::ticket::Nonce;
///
/// let n = Nonce::new(0);
/// assert_eq!(n.next(), Nonce::new(1));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(i64);

impl Nonce {
    /// The largest nonce representable on the wire.
    pub const MAX: Self = Self(i64::MAX);

    /// Create a nonce from a raw value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// The successor nonce.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Nonce {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Lease state of a ticket.
///
/// Tickets move strictly along `leased → released → leased → … → closed`;
/// `closed` is terminal. The lowercase string form is shared between the
/// JSON API and the storage layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketState {
    /// The nonce is reserved for an in-flight external operation.
    Leased,
    /// The external operation was abandoned; the nonce is back in the
    /// recyclable pool.
    Released,
    /// The external operation succeeded; the nonce is permanently
    /// consumed.
    Closed,
}

impl TicketState {
    /// The lowercase string form used on the wire and in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Leased => "leased",
            Self::Released => "released",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketState {
    type Err = ParseTicketStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leased" => Ok(Self::Leased),
            "released" => Ok(Self::Released),
            "closed" => Ok(Self::Closed),
            other => Err(ParseTicketStateError(other.to_string())),
        }
    }
}

/// A ticket as read from the store: the binding of an external id to a
/// nonce, plus its lease state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    /// Caller-supplied identifier, unique within the lineage.
    pub ext_id: ExtId,
    /// The nonce bound to this ticket.
    pub nonce: Nonce,
    /// Current lease state.
    pub state: TicketState,
}

/// A ticket as returned to callers, qualified with its owning lineage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLease {
    /// The owning lineage.
    pub lineage_id: LineageId,
    /// Caller-supplied identifier, unique within the lineage.
    pub ext_id: ExtId,
    /// The nonce bound to this ticket.
    pub nonce: Nonce,
    /// Current lease state.
    pub state: TicketState,
}

impl TicketLease {
    /// Qualify a store-level record with its owning lineage.
    #[must_use]
    pub fn from_record(lineage_id: LineageId, record: TicketRecord) -> Self {
        Self {
            lineage_id,
            ext_id: record.ext_id,
            nonce: record.nonce,
            state: record.state,
        }
    }
}
