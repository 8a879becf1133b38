//! Lineages and their optimistic-concurrency version counter.
//!
//! A lineage is a disjoint universe of nonces, typically one per external
//! counter (e.g. per blockchain account). All tickets of a lineage are
//! serialized through the lineage [`Version`].

use crate::ids::{ExtId, LineageId};
use crate::ticket::Nonce;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lineage version counter for optimistic concurrency control.
///
/// The version starts at 0 when the lineage is created and is bumped by
/// every committed mutation of the lineage or any of its tickets. Mutating
/// storage routines take the version the caller read and fail when the
/// stored value has advanced in the meantime, which is the only form of
/// mutual exclusion in the system.
///
/// # Examples
///
/// ```
/// use noncepool_core::lineage::Version;
///
/// let v = Version::new(0);
/// assert_eq!(v.next(), Version::new(1));
/// assert_eq!(v.value(), 0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Create a version from a raw counter value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// The version of a freshly created lineage.
    #[must_use]
    pub const fn initial() -> Self {
        Self(0)
    }

    /// Get the raw counter value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// The version after one successful mutation.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lineage row as held by the store.
///
/// Counter semantics:
///
/// - `next_nonce` is the smallest nonce never yet leased; every nonce in
///   `[0, next_nonce)` has exactly one ticket.
/// - `leased_nonce_count` and `released_nonce_count` track tickets in the
///   corresponding states; closed tickets are the remainder.
/// - `leased_nonce_count` never exceeds `max_leased_nonce_count`.
/// - No issued nonce exceeds `max_nonce_value`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    /// Opaque internal identifier, globally unique.
    pub id: LineageId,
    /// Caller-supplied identifier, unique across all lineages.
    pub ext_id: ExtId,
    /// Smallest nonce never yet leased (high-water mark).
    pub next_nonce: Nonce,
    /// Count of tickets currently in the `leased` state.
    pub leased_nonce_count: i64,
    /// Count of tickets currently in the `released` state.
    pub released_nonce_count: i64,
    /// Cap on `leased_nonce_count`, configured at creation.
    pub max_leased_nonce_count: i64,
    /// Cap on any issued nonce.
    pub max_nonce_value: Nonce,
    /// Optimistic-concurrency witness.
    pub version: Version,
}
