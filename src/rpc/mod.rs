//! Remote procedure calls between host and embedded documents.
//!
//! Packets travel as ordinary application messages, so calls inherit the
//! transport's ordering and at-least-once delivery.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RpcEndpoint`] | Service registry, caller, callback correlation |
//! | [`RpcContext`] | Caller identity and reply handle for a service |
//! | [`crate::protocol::RpcPacket`] | Wire packet |

// ============================================================================
// Submodules
// ============================================================================

/// Per-call context.
pub mod context;

/// Service registry and dispatch.
pub mod endpoint;

// ============================================================================
// Re-exports
// ============================================================================

pub use context::RpcContext;
pub use endpoint::{CallbackHandler, RpcEndpoint, ServiceHandler};
