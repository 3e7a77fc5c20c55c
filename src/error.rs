//! Error types for frame-relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use frame_relay::{PeerId, Result};
//!
//! fn example(transport: &Transport) -> Result<()> {
//!     transport.setup(PeerId::parent())?;
//!     transport.send(&PeerId::parent(), serde_json::json!({"greet": "hi"}))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Channel | [`Error::UnknownPeer`], [`Error::DiscoveryFailed`] |
//! | Protocol | [`Error::InvalidArgument`], [`Error::MalformedBatch`] |
//! | Relay | [`Error::RelayCreation`], [`Error::RelayWrite`], [`Error::AccessDenied`] |
//! | RPC | [`Error::ReservedService`], [`Error::InvalidAuthToken`] |
//! | Runtime | [`Error::NoRuntime`] |
//! | External | [`Error::Json`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::PeerId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when transport configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Channel Errors
    // ========================================================================
    /// No channel has been set up for this peer.
    #[error("Unknown peer: {peer_id}")]
    UnknownPeer {
        /// The peer without a channel.
        peer_id: PeerId,
    },

    /// Discovery exhausted its attempts without finding the peer.
    ///
    /// The caller is expected to switch to another transport.
    #[error("Discovery failed for {peer_id} after {attempts} attempts")]
    DiscoveryFailed {
        /// The peer that never appeared.
        peer_id: PeerId,
        /// Attempts made before giving up.
        attempts: u32,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Invalid argument passed to the transport.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Relay fragment does not decode as a batch envelope.
    #[error("Malformed batch: {message}")]
    MalformedBatch {
        /// Description of the decode failure.
        message: String,
    },

    // ========================================================================
    // Relay Errors
    // ========================================================================
    /// The environment could not create the relay document.
    #[error("Relay creation failed: {message}")]
    RelayCreation {
        /// Description of the failure.
        message: String,
    },

    /// Navigating or resizing the relay document failed.
    ///
    /// Transient: the batch is retried on the next send opportunity.
    #[error("Relay write failed: {message}")]
    RelayWrite {
        /// Description of the failure.
        message: String,
    },

    /// The counterpart document is not readable from this context.
    #[error("Access denied to counterpart relay")]
    AccessDenied,

    // ========================================================================
    // RPC Errors
    // ========================================================================
    /// Service name reserved for the RPC layer itself.
    #[error("Reserved service name: {service:?}")]
    ReservedService {
        /// The rejected service name.
        service: String,
    },

    /// Inbound RPC packet carried the wrong auth token.
    #[error("Invalid auth token from {peer_id}")]
    InvalidAuthToken {
        /// Sender of the packet.
        peer_id: PeerId,
    },

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// No tokio runtime available to run discovery.
    #[error("No async runtime available")]
    NoRuntime,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an unknown peer error.
    #[inline]
    pub fn unknown_peer(peer_id: PeerId) -> Self {
        Self::UnknownPeer { peer_id }
    }

    /// Creates a discovery failed error.
    #[inline]
    pub fn discovery_failed(peer_id: PeerId, attempts: u32) -> Self {
        Self::DiscoveryFailed { peer_id, attempts }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a malformed batch error.
    #[inline]
    pub fn malformed_batch(message: impl Into<String>) -> Self {
        Self::MalformedBatch {
            message: message.into(),
        }
    }

    /// Creates a relay creation error.
    #[inline]
    pub fn relay_creation(message: impl Into<String>) -> Self {
        Self::RelayCreation {
            message: message.into(),
        }
    }

    /// Creates a relay write error.
    #[inline]
    pub fn relay_write(message: impl Into<String>) -> Self {
        Self::RelayWrite {
            message: message.into(),
        }
    }

    /// Creates a reserved service error.
    #[inline]
    pub fn reserved_service(service: impl Into<String>) -> Self {
        Self::ReservedService {
            service: service.into(),
        }
    }

    /// Creates an invalid auth token error.
    #[inline]
    pub fn invalid_auth_token(peer_id: PeerId) -> Self {
        Self::InvalidAuthToken { peer_id }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a discovery error.
    #[inline]
    #[must_use]
    pub fn is_discovery_error(&self) -> bool {
        matches!(self, Self::DiscoveryFailed { .. } | Self::AccessDenied)
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AccessDenied | Self::RelayWrite { .. } | Self::MalformedBatch { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
