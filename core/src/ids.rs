//! Identifier types for lineages and tickets.
//!
//! This module defines strong types for the two identifiers that appear on
//! every operation: the internal [`LineageId`] and the caller-supplied
//! [`ExtId`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Upper bound on the byte length of an external identifier.
pub const MAX_EXT_ID_LEN: usize = 256;

/// Error type for [`ExtId`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid external id: {0}")]
pub struct ParseExtIdError(String);

/// Opaque internal identifier of a lineage.
///
/// Generated by the engine as a v4 UUID at lineage creation and globally
/// unique. Callers receive it in the creation response and address all
/// ticket operations with it.
///
/// # Examples
///
/// ```
/// use noncepool_core::ids::LineageId;
///
/// let id = LineageId::random();
/// let parsed: LineageId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineageId(Uuid);

impl LineageId {
    /// Wrap an existing UUID.
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh random lineage id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for LineageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LineageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for LineageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Caller-supplied symbolic reference for a lineage or a ticket.
///
/// For lineages the external id is unique across the whole service; for
/// tickets it is unique within the owning lineage. A typical value is a
/// transaction hash or an account address — whatever the external system
/// uses to name the operation being sequenced.
///
/// # Validation
///
/// - `FromStr::from_str()`: validates input (rejects empty and oversized
///   values)
/// - `From::from()` and `new()`: no validation (for internal use with
///   trusted input)
///
/// Use `FromStr` when parsing external/user input. Use `new()` or `From`
/// when constructing external ids from application-controlled data.
///
/// # Examples
///
/// ```
/// use noncepool_core::ids::ExtId;
///
/// let ext_id: ExtId = "tx-0xabc123".parse().unwrap();
/// assert_eq!(ext_id.as_str(), "tx-0xabc123");
///
/// assert!("".parse::<ExtId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtId(String);

impl ExtId {
    /// Create a new `ExtId` from a string without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the external id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `ExtId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ExtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExtId {
    type Err = ParseExtIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseExtIdError("external id cannot be empty".to_string()));
        }
        if s.len() > MAX_EXT_ID_LEN {
            return Err(ParseExtIdError(format!(
                "external id exceeds {MAX_EXT_ID_LEN} bytes"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for ExtId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExtId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ExtId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
