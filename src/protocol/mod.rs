//! Wire formats.
//!
//! Everything that crosses the isolation boundary is a percent-encoded JSON
//! [`Batch`] in the fragment of a relay document location.
//!
//! # Protocol Overview
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | `Batch` | Both | Pending messages + trailing ACK |
//! | `AckRecord` | Both | `{"s":"ack","id":n}` control record |
//! | `RpcPacket` | Both | Optional RPC layer payload |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `batch` | Envelope and record types |
//! | `fragment` | Fragment encoding/decoding |
//! | `relay_url` | Origin canonicalization, relay URL resolution |
//! | `rpc` | RPC packet |

// ============================================================================
// Submodules
// ============================================================================

/// Batch envelope and records.
pub mod batch;

/// Fragment codec.
pub mod fragment;

/// Relay URL helpers.
pub mod relay_url;

/// RPC packet type.
pub mod rpc;

// ============================================================================
// Re-exports
// ============================================================================

pub use batch::{AckRecord, Batch, Record};
pub use fragment::{decode_fragment, decode_location, encode_fragment, fragment_of};
pub use relay_url::{origin, resolve_relay_url, same_origin};
pub use rpc::RpcPacket;
