//! Which side of the embedding a channel sits on.
//!
//! The role decides relay naming, where the counterpart is looked up, and
//! who signals first during the handshake.

// ============================================================================
// Imports
// ============================================================================

use crate::environment::CounterpartLookup;
use crate::error::{Error, Result};
use crate::identifiers::PeerId;

// ============================================================================
// Constants
// ============================================================================

/// Prefix of every relay frame name.
const RELAY_FRAME_PREFIX: &str = "relay-";

// ============================================================================
// Role
// ============================================================================

/// Side of the isolation boundary a channel runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// This document is embedded; the peer is the host page.
    Embedded {
        /// Id the host assigned to this document.
        self_id: PeerId,
    },
    /// This document is the host; the peer is one embedded document.
    Host {
        /// The embedded document.
        child: PeerId,
    },
}

impl Role {
    /// Derives the role for a channel to `peer_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the peer is the parent but this side has
    /// no assigned id.
    pub fn for_peer(peer_id: &PeerId, self_id: Option<&PeerId>) -> Result<Self> {
        if !peer_id.is_parent() {
            return Ok(Self::Host {
                child: peer_id.clone(),
            });
        }

        let self_id = self_id.ok_or_else(|| {
            Error::config(
                "Embedded side needs its assigned id to reach the parent.\n\
                 Example: Transport::builder().self_id(\"gadget-1\")",
            )
        })?;

        Ok(Self::Embedded {
            self_id: self_id.clone(),
        })
    }

    /// Name of the relay frame this side creates.
    ///
    /// Named after the peer, so the host keeps one relay per child.
    #[must_use]
    pub fn relay_frame_name(&self) -> String {
        match self {
            Self::Embedded { .. } => relay_frame_name(&PeerId::parent()),
            Self::Host { child } => relay_frame_name(child),
        }
    }

    /// Where the counterpart's relay is found.
    #[must_use]
    pub fn counterpart_lookup(&self) -> CounterpartLookup {
        match self {
            Self::Embedded { self_id } => CounterpartLookup::InEmbedder {
                frame_name: relay_frame_name(self_id),
            },
            Self::Host { child } => CounterpartLookup::InEmbedded {
                child: child.clone(),
                frame_name: relay_frame_name(&PeerId::parent()),
            },
        }
    }

    /// Returns `true` if this side writes its relay only after discovery.
    ///
    /// The embedded side always signals first; the host writes at setup.
    #[inline]
    #[must_use]
    pub fn signals_after_discovery(&self) -> bool {
        matches!(self, Self::Embedded { .. })
    }

    /// Value for the `from` field of outbound RPC packets.
    #[must_use]
    pub fn sender_name(&self) -> &str {
        match self {
            Self::Embedded { self_id } => self_id.as_str(),
            Self::Host { .. } => "..",
        }
    }
}

/// Frame name of the relay addressed to `peer_id`.
#[inline]
#[must_use]
pub fn relay_frame_name(peer_id: &PeerId) -> String {
    format!("{RELAY_FRAME_PREFIX}{peer_id}")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_role_for_child() {
        let role = Role::for_peer(&PeerId::new("g1"), None).expect("role");
        assert_eq!(role, Role::Host { child: PeerId::new("g1") });
        assert_eq!(role.relay_frame_name(), "relay-g1");
        assert_eq!(
            role.counterpart_lookup(),
            CounterpartLookup::InEmbedded {
                child: PeerId::new("g1"),
                frame_name: "relay-parent".into(),
            }
        );
        assert!(!role.signals_after_discovery());
        assert_eq!(role.sender_name(), "..");
    }

    #[test]
    fn test_embedded_role_for_parent() {
        let self_id = PeerId::new("g1");
        let role = Role::for_peer(&PeerId::parent(), Some(&self_id)).expect("role");
        assert_eq!(role.relay_frame_name(), "relay-parent");
        assert_eq!(
            role.counterpart_lookup(),
            CounterpartLookup::InEmbedder {
                frame_name: "relay-g1".into(),
            }
        );
        assert!(role.signals_after_discovery());
        assert_eq!(role.sender_name(), "g1");
    }

    #[test]
    fn test_embedded_role_requires_self_id() {
        let err = Role::for_peer(&PeerId::parent(), None).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
