//! Type-safe identifiers.
//!
//! Newtype wrappers keep peer ids, transport instance ids and RPC call ids
//! from being mixed up.
//!
//! | Type | Wraps | Description |
//! |------|-------|-------------|
//! | [`PeerId`] | `String` | Counterpart of a channel |
//! | [`TransportId`] | `Uuid` | One transport instance (log correlation) |
//! | [`CallId`] | `u64` | RPC callback correlation, `0` = none |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Peer id the embedded side uses for its embedding (host) context.
const PARENT_PEER: &str = "parent";

// ============================================================================
// PeerId
// ============================================================================

/// Identifier of the context on the other side of a channel.
///
/// On the embedded side the only peer is [`PeerId::parent()`]. On the host
/// side each embedded document is addressed by the id it was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Creates a peer id.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The embedding context, as seen from an embedded document.
    #[inline]
    #[must_use]
    pub fn parent() -> Self {
        Self(PARENT_PEER.to_string())
    }

    /// Returns `true` if this id names the embedding context.
    #[inline]
    #[must_use]
    pub fn is_parent(&self) -> bool {
        self.0 == PARENT_PEER
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    #[inline]
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    #[inline]
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&PeerId> for PeerId {
    #[inline]
    fn from(id: &PeerId) -> Self {
        id.clone()
    }
}

// ============================================================================
// TransportId
// ============================================================================

/// Unique identifier of one transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(Uuid);

impl TransportId {
    /// Generates a new random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[inline]
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TransportId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CallId
// ============================================================================

/// RPC callback correlation id.
///
/// `0` means "no callback requested".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(u64);

impl CallId {
    /// The "no callback" id.
    pub const NONE: Self = Self(0);

    /// Creates a call id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns `true` if a callback was requested.
    #[inline]
    #[must_use]
    pub const fn is_some(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for CallId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
