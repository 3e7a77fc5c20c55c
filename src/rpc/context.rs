//! Per-call context handed to service handlers.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{CallId, PeerId};

use super::endpoint::EndpointInner;

// ============================================================================
// RpcContext
// ============================================================================

/// Who called a service and how to answer.
///
/// Cloneable and `'static`, so a handler may keep it and reply later.
#[derive(Debug, Clone)]
pub struct RpcContext {
    /// Peer the packet arrived from.
    peer_id: PeerId,
    /// Sender name carried in the packet.
    sender: String,
    /// Service that was invoked.
    service: String,
    /// Callback the caller is waiting on.
    callback: CallId,
    /// Endpoint that received the call.
    endpoint: Weak<EndpointInner>,
}

impl RpcContext {
    pub(crate) fn new(
        peer_id: PeerId,
        sender: String,
        service: String,
        callback: CallId,
        endpoint: Weak<EndpointInner>,
    ) -> Self {
        Self {
            peer_id,
            sender,
            service,
            callback,
            endpoint,
        }
    }

    /// Returns the peer the call came from.
    #[inline]
    #[must_use]
    pub fn from(&self) -> &PeerId {
        &self.peer_id
    }

    /// Returns the sender name as written by the caller (`".."` for the host).
    #[inline]
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Returns the invoked service name.
    #[inline]
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the caller's callback id.
    #[inline]
    #[must_use]
    pub fn callback(&self) -> CallId {
        self.callback
    }

    /// Returns `true` if the caller expects a result.
    #[inline]
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        self.callback.is_some()
    }

    /// Sends `result` back to the caller.
    ///
    /// Does nothing if the caller registered no callback.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the reply cannot be queued.
    pub fn reply(&self, result: Value) -> Result<()> {
        if !self.expects_reply() {
            debug!(peer = %self.peer_id, service = %self.service, "Reply without callback ignored");
            return Ok(());
        }

        let endpoint = self.endpoint.upgrade().ok_or_else(|| {
            Error::invalid_argument("RPC endpoint dropped before the reply was sent")
        })?;

        endpoint.send_callback(&self.peer_id, self.callback, result)
    }
}
