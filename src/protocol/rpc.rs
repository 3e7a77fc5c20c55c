//! RPC packet carried as an application message.
//!
//! # Format
//!
//! ```json
//! {
//!   "s": "set_title",
//!   "f": "gadget-1",
//!   "c": 4,
//!   "a": ["My gadget"],
//!   "t": "8812"
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::CallId;

// ============================================================================
// Constants
// ============================================================================

/// Service answering callbacks: args are `[callId, result]`.
pub const CALLBACK_SERVICE: &str = "__cb";

/// Service name reserved for readiness acknowledgement.
pub const ACK_SERVICE: &str = "__ack";

/// Name of the default (fallback) service.
pub const DEFAULT_SERVICE: &str = "";

// ============================================================================
// RpcPacket
// ============================================================================

/// One RPC request or callback response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcPacket {
    /// Target service name.
    #[serde(rename = "s")]
    pub service: String,

    /// Sender as named by the receiver's addressing (`".."` for the host).
    #[serde(rename = "f")]
    pub from: String,

    /// Callback id, [`CallId::NONE`] if no result is expected.
    #[serde(rename = "c", default)]
    pub callback: CallId,

    /// Positional arguments.
    #[serde(rename = "a", default)]
    pub args: Vec<Value>,

    /// Auth token configured for the sender.
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl RpcPacket {
    /// Creates a request packet.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        from: impl Into<String>,
        callback: CallId,
        args: Vec<Value>,
    ) -> Self {
        Self {
            service: service.into(),
            from: from.into(),
            callback,
            args,
            token: None,
        }
    }

    /// Sets the auth token.
    #[inline]
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Returns `true` if this packet answers an earlier call.
    #[inline]
    #[must_use]
    pub fn is_callback(&self) -> bool {
        self.service == CALLBACK_SERVICE
    }
}

// ============================================================================
// Tests
// ============================================================================
