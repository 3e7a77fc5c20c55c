//! Relay transport.
//!
//! Ordered, at-least-once delivery between a host page and its embedded
//! documents using only relay-fragment writes and layout signals.
//!
//! # Architecture
//!
//! ```text
//! ┌──────── host ────────┐                       ┌────── embedded ──────┐
//! │  Transport           │   relay-<child>       │  Transport           │
//! │   Channel(child) ────┼──── #batch ──────────►│   Channel(parent)    │
//! │                      │   resize signal       │                      │
//! │                      │◄────────── #batch ────┼──── relay-parent     │
//! └──────────────────────┘                       └──────────────────────┘
//! ```
//!
//! # Channel Lifecycle
//!
//! 1. `Transport::setup` - create relay, host writes its first batch
//! 2. Discovery - poll the counterpart relay until it is readable
//! 3. Embedded side writes, host discovers it, first ACKs mark both ready
//! 4. `Transport::send` - queue, flush one batch at a time, wait for ACK
//! 5. `Transport::teardown` - discard channel, cancel discovery
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent transport configuration |
//! | `channel` | Per-peer state and send/receive rules |
//! | `core` | [`Transport`] facade and dispatch |
//! | `discovery` | Counterpart polling |
//! | `options` | Tuning and addressing options |
//! | `relay` | Relay document writes |
//! | `role` | Host/embedded asymmetry |
//! | `store` | Channel state store |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for transport configuration.
pub mod builder;

/// Per-peer channel state.
pub mod channel;

/// Transport facade.
pub mod core;

/// Counterpart discovery loop.
mod discovery;

/// Transport options.
pub mod options;

/// Relay document manager.
pub mod relay;

/// Which side of the embedding a channel runs on.
pub mod role;

/// Channel state store.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::TransportBuilder;
pub use channel::{Applied, Channel, ChannelPhase, FlushMode, FlushOutcome};
pub use core::{MessageHandler, ReadyHandler, Transport};
pub use options::TransportOptions;
pub use relay::RelayDocument;
pub use role::Role;
pub use store::ChannelStore;
