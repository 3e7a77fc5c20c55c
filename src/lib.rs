//! Frame Relay - Ordered messaging between cross-origin frames.
//!
//! A host page and the cross-origin documents it embeds cannot call each
//! other. This library moves messages between them anyway, with in-order,
//! at-least-once delivery, using two primitives that cross the isolation
//! boundary:
//!
//! - rewriting the location fragment of a hidden relay document, which the
//!   other side reads once the relay is on its origin;
//! - resizing that relay, which fires a layout event in the other context.
//!
//! # Architecture
//!
//! Key design principles:
//!
//! - Each [`Transport`] owns one channel per peer, behind a single lock
//! - At most one batch is in flight per direction; the next waits for an ACK
//! - Every batch carries all unacknowledged messages plus an ACK, so a lost
//!   signal is repaired by the next one and duplicates are skipped by count
//! - The DOM is reached only through the [`Environment`] traits
//!
//! # Quick Start
//!
//! ```ignore
//! use frame_relay::{PeerId, Result, Transport};
//!
//! # async fn example(env: std::sync::Arc<dyn frame_relay::Environment>) -> Result<()> {
//! // Inside the embedded document
//! let transport = Transport::builder()
//!     .environment(env)
//!     .self_id("gadget-1")
//!     .parent_url("https://host.example/portal/")
//!     .on_ready(|peer, ready| println!("{peer} ready: {ready}"))
//!     .on_message(|peer, message| println!("{peer}: {message}"))
//!     .build()?;
//!
//! transport.setup(PeerId::parent())?;
//! transport.send(PeerId::parent(), serde_json::json!({"greet": "hi"}))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`environment`] | Browser seam, capability probes, in-memory page |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Batch envelope, fragment codec, relay URLs, RPC packet |
//! | [`rpc`] | Services and callbacks over a transport |
//! | [`transport`] | Channels, discovery, send and dispatch |

// ============================================================================
// Modules
// ============================================================================

/// Browser environment seam.
///
/// Implement [`Environment`] for the host runtime, or use
/// [`environment::simulated::SimulatedPage`] in tests.
pub mod environment;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire formats.
pub mod protocol;

/// RPC layer.
pub mod rpc;

/// Relay transport.
///
/// Use [`Transport::builder()`] to create a configured instance.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Environment types
pub use environment::{
    AccessibleFrame, CounterpartFrame, CounterpartLookup, Environment, ObserverId, RelayElement,
    RelaySpec, SignalHandler, try_access,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallId, PeerId, TransportId};

// Protocol types
pub use protocol::{AckRecord, Batch, Record, RpcPacket};

// RPC types
pub use rpc::{RpcContext, RpcEndpoint};

// Transport types
pub use transport::{ChannelPhase, Transport, TransportBuilder, TransportOptions};
