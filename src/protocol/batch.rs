//! Batch envelope carried in the relay fragment.
//!
//! # Format
//!
//! ```json
//! {
//!   "id": 3,
//!   "d": [ {"greet": "hi"}, {"n": 2}, {"s": "ack", "id": 5} ]
//! }
//! ```
//!
//! - `id` is the sender's count of its own messages the peer already
//!   acknowledged. The receiver uses it to skip entries it has delivered.
//! - `d` holds the unacknowledged application messages in enqueue order,
//!   followed by exactly one ACK record reporting how many of the peer's
//!   messages the sender has processed.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Batch
// ============================================================================

/// One envelope written atomically to a relay document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Sender's acknowledged-send count (skip offset for the receiver).
    #[serde(rename = "id")]
    pub ack_id: u64,

    /// Application messages followed by the trailing ACK record.
    #[serde(rename = "d")]
    pub records: Vec<Record>,
}

impl Batch {
    /// Builds a batch from pending messages plus the trailing ACK.
    #[must_use]
    pub fn new<'a>(
        send_id: u64,
        pending: impl IntoIterator<Item = &'a Value>,
        recv_id: u64,
    ) -> Self {
        let mut records: Vec<Record> = pending
            .into_iter()
            .map(|message| Record::Message(message.clone()))
            .collect();
        records.push(Record::Ack(AckRecord::new(recv_id)));

        Self {
            ack_id: send_id,
            records,
        }
    }

    /// Returns the number of application messages in the batch.
    #[inline]
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| matches!(record, Record::Message(_)))
            .count()
    }

    /// Returns `true` if the batch ends with an ACK record.
    #[inline]
    #[must_use]
    pub fn has_trailing_ack(&self) -> bool {
        matches!(self.records.last(), Some(Record::Ack(_)))
    }
}

// ============================================================================
// Record
// ============================================================================

/// Entry of a batch: either the control ACK or an application message.
///
/// The ACK shape is tried first and is strict (no extra fields), so only an
/// exact `{"s":"ack","id":n}` object is treated as control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    /// Control record acknowledging the peer's messages.
    Ack(AckRecord),
    /// Opaque application payload.
    Message(Value),
}

// ============================================================================
// AckRecord
// ============================================================================

/// Control record: `{"s": "ack", "id": <recvId>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AckRecord {
    /// Service marker, always `"ack"`.
    s: AckMarker,

    /// Count of the peer's messages the sender has processed.
    pub id: u64,
}

impl AckRecord {
    /// Creates an ACK for `recv_id` processed messages.
    #[inline]
    #[must_use]
    pub const fn new(recv_id: u64) -> Self {
        Self {
            s: AckMarker::Ack,
            id: recv_id,
        }
    }

    /// Returns `true` if `value` has the exact shape of an ACK record.
    ///
    /// Such payloads cannot be sent as application messages.
    #[must_use]
    pub fn matches(value: &Value) -> bool {
        Self::deserialize(value).is_ok()
    }
}

/// The literal `"ack"` service marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum AckMarker {
    #[serde(rename = "ack")]
    Ack,
}

// ============================================================================
// Tests
// ============================================================================
