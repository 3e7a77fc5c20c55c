//! Per-peer channel state and the send/receive rules.
//!
//! # Invariants
//!
//! - `recv_id` grows by exactly the number of new messages in a batch.
//! - The outbound queue only shrinks when an ACK covers its head.
//! - At most one batch is in flight: a flush while waiting for an ACK is a
//!   no-op.
//!
//! # Lifecycle
//!
//! ```text
//! Undiscovered ──setup──► Discovering ──first ACK──► Ready
//!                              │
//!                              └──attempt cap──► Failed
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::environment::{AccessibleFrame, ObserverId};
use crate::identifiers::PeerId;
use crate::protocol::{Batch, Record, encode_fragment};

use super::relay::RelayDocument;
use super::role::Role;

// ============================================================================
// ChannelPhase
// ============================================================================

/// Readiness state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    /// Created, discovery not started.
    Undiscovered,
    /// Looking for the counterpart or waiting for its first ACK.
    Discovering,
    /// An ACK from the counterpart has been processed.
    Ready,
    /// Discovery gave up.
    Failed,
}

// ============================================================================
// Flush Types
// ============================================================================

/// Why a flush is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// New outbound message; writes only if idle and something is queued.
    Normal,
    /// Messages were received; an ACK must go out even with an empty queue.
    AckOwed,
    /// Initial write that lets the counterpart discover this side.
    ///
    /// Bypasses the single-flight gate and leaves it unchanged.
    Handshake,
}

/// Result of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// A batch was written.
    Written {
        /// Application messages in the batch.
        messages: usize,
    },
    /// A batch is already in flight.
    Waiting,
    /// Nothing to send and no ACK owed.
    Idle,
    /// The write failed; the queue is unchanged and the next flush, or the
    /// stall monitor, retries.
    Failed,
}

// ============================================================================
// Applied
// ============================================================================

/// What processing one inbound batch produced.
#[derive(Debug, Default, PartialEq)]
pub struct Applied {
    /// New messages, in batch order, to hand upstream.
    pub delivered: Vec<Value>,
    /// Duplicates skipped because they were delivered before.
    pub skipped: usize,
    /// Outbound messages released by the ACK.
    pub acknowledged: usize,
    /// The channel entered `Ready` during this batch.
    pub became_ready: bool,
    /// An ACK or queued work should be flushed now.
    pub needs_flush: bool,
}

// ============================================================================
// Channel
// ============================================================================

/// State of the link to one peer.
#[derive(Debug)]
pub struct Channel {
    /// The peer.
    peer_id: PeerId,
    /// Which side this channel runs on.
    role: Role,
    /// Readiness.
    phase: ChannelPhase,
    /// Relay this side writes to.
    relay: RelayDocument,
    /// Counterpart relay, once discovered.
    counterpart: Option<AccessibleFrame>,
    /// Layout listener registered on the counterpart.
    observer: Option<ObserverId>,
    /// Own messages acknowledged by the peer.
    send_id: u64,
    /// Peer messages delivered upstream.
    recv_id: u64,
    /// Unacknowledged outbound messages, oldest first.
    queue: VecDeque<Value>,
    /// A batch is in flight (or the handshake has not completed).
    waiting_for_ack: bool,
    /// When the in-flight batch was written.
    in_flight_since: Option<Instant>,
    /// When the oldest relay write that has not been redone was refused.
    write_failed_at: Option<Instant>,
    /// Discovery attempts made so far.
    discovery_attempts: u32,
    /// Running discovery task.
    discovery_task: Option<JoinHandle<()>>,
}

impl Channel {
    /// Creates a channel around its relay.
    ///
    /// The single-flight gate starts closed: nothing but the handshake write
    /// goes out until the counterpart's first ACK arrives.
    #[must_use]
    pub fn new(peer_id: PeerId, role: Role, relay: RelayDocument) -> Self {
        Self {
            peer_id,
            role,
            phase: ChannelPhase::Undiscovered,
            relay,
            counterpart: None,
            observer: None,
            send_id: 0,
            recv_id: 0,
            queue: VecDeque::new(),
            waiting_for_ack: true,
            in_flight_since: None,
            write_failed_at: None,
            discovery_attempts: 0,
            discovery_task: None,
        }
    }
}

// ============================================================================
// Channel - Accessors
// ============================================================================

impl Channel {
    /// Returns the peer id.
    #[inline]
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Returns the role.
    #[inline]
    #[must_use]
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Returns the phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> ChannelPhase {
        self.phase
    }

    /// Returns the relay document.
    #[inline]
    #[must_use]
    pub fn relay(&self) -> &RelayDocument {
        &self.relay
    }

    /// Returns the discovered counterpart.
    #[inline]
    #[must_use]
    pub fn counterpart(&self) -> Option<&AccessibleFrame> {
        self.counterpart.as_ref()
    }

    /// Returns the acknowledged-send count.
    #[inline]
    #[must_use]
    pub fn send_id(&self) -> u64 {
        self.send_id
    }

    /// Returns the delivered-receive count.
    #[inline]
    #[must_use]
    pub fn recv_id(&self) -> u64 {
        self.recv_id
    }

    /// Returns the number of unacknowledged outbound messages.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` while a batch awaits its ACK.
    #[inline]
    #[must_use]
    pub fn is_waiting_for_ack(&self) -> bool {
        self.waiting_for_ack
    }

    /// Returns the number of discovery attempts made.
    #[inline]
    #[must_use]
    pub fn discovery_attempts(&self) -> u32 {
        self.discovery_attempts
    }
}

// ============================================================================
// Channel - Discovery Bookkeeping
// ============================================================================

impl Channel {
    /// Marks discovery as started and keeps its task handle.
    pub fn start_discovery(&mut self, task: JoinHandle<()>) {
        self.phase = ChannelPhase::Discovering;
        self.discovery_task = Some(task);
    }

    /// Counts one discovery attempt and returns the new total.
    pub fn record_attempt(&mut self) -> u32 {
        self.discovery_attempts += 1;
        self.discovery_attempts
    }

    /// Stores the counterpart found by discovery and its layout listener.
    ///
    /// The listener is removed again when the channel is dropped.
    pub fn link(&mut self, counterpart: AccessibleFrame, observer: ObserverId) {
        self.counterpart = Some(counterpart);
        self.observer = Some(observer);
        self.discovery_task = None;
    }

    /// Marks discovery as failed.
    pub fn fail(&mut self) {
        self.phase = ChannelPhase::Failed;
        self.discovery_task = None;
    }
}

// ============================================================================
// Channel - Send Path
// ============================================================================

impl Channel {
    /// Appends an application message to the outbound queue.
    pub fn enqueue(&mut self, message: Value) {
        self.queue.push_back(message);
    }

    /// Writes pending messages plus the ACK if the flush rule allows.
    pub fn flush(&mut self, mode: FlushMode) -> FlushOutcome {
        if mode != FlushMode::Handshake {
            if self.waiting_for_ack {
                trace!(peer = %self.peer_id, pending = self.queue.len(), "Flush deferred: waiting for ACK");
                return FlushOutcome::Waiting;
            }

            if self.queue.is_empty() && mode != FlushMode::AckOwed {
                return FlushOutcome::Idle;
            }
        }

        let batch = Batch::new(self.send_id, &self.queue, self.recv_id);
        let fragment = match encode_fragment(&batch) {
            Ok(fragment) => fragment,
            Err(e) => {
                warn!(peer = %self.peer_id, error = %e, "Failed to encode batch");
                return FlushOutcome::Failed;
            }
        };

        if let Err(e) = self.relay.write_batch(&fragment) {
            warn!(peer = %self.peer_id, error = %e, "Relay write failed, will retry");
            self.write_failed_at.get_or_insert_with(Instant::now);
            return FlushOutcome::Failed;
        }

        self.write_failed_at = None;

        let messages = self.queue.len();
        if messages > 0 {
            if mode != FlushMode::Handshake {
                self.waiting_for_ack = true;
            }
            self.in_flight_since = Some(Instant::now());
        }

        debug!(
            peer = %self.peer_id,
            ?mode,
            messages,
            send_id = self.send_id,
            recv_id = self.recv_id,
            "Batch written"
        );

        FlushOutcome::Written { messages }
    }

    /// Returns `true` if the in-flight batch is older than `timeout`.
    #[must_use]
    pub fn is_stalled(&self, now: Instant, timeout: Duration) -> bool {
        self.waiting_for_ack
            && self
                .in_flight_since
                .is_some_and(|since| now.saturating_duration_since(since) >= timeout)
    }

    /// Returns the mode to redo a refused write with, once the refusal is
    /// older than `timeout`.
    ///
    /// Every successful write clears the refusal, so a closed gate here can
    /// only be the initial one and the redo is a handshake.
    #[must_use]
    pub fn retry_due(&self, now: Instant, timeout: Duration) -> Option<FlushMode> {
        let failed_at = self.write_failed_at?;
        if now.saturating_duration_since(failed_at) < timeout {
            return None;
        }

        Some(if self.waiting_for_ack {
            FlushMode::Handshake
        } else {
            FlushMode::AckOwed
        })
    }

    /// Reopens the single-flight gate so the next flush re-emits the batch.
    pub fn reopen_gate(&mut self) {
        self.waiting_for_ack = false;
        self.in_flight_since = None;
    }
}

// ============================================================================
// Channel - Receive Path
// ============================================================================

impl Channel {
    /// Applies one inbound batch.
    ///
    /// ACK records release outbound messages; application records beyond
    /// the already-delivered prefix are returned for delivery in order.
    pub fn apply_batch(&mut self, batch: Batch) -> Applied {
        let mut applied = Applied::default();

        if !batch.has_trailing_ack() {
            debug!(peer = %self.peer_id, "Batch without trailing ACK");
        }

        if batch.ack_id > self.recv_id {
            warn!(
                peer = %self.peer_id,
                ack_id = batch.ack_id,
                recv_id = self.recv_id,
                "Peer skipped past undelivered messages"
            );
        }

        let to_skip = self.recv_id.saturating_sub(batch.ack_id);
        let mut seen_messages = 0u64;
        let mut saw_message = false;
        let mut no_longer_waiting = false;

        for record in batch.records {
            match record {
                Record::Ack(ack) => {
                    if self.phase != ChannelPhase::Ready {
                        self.phase = ChannelPhase::Ready;
                        applied.became_ready = true;
                    }

                    if self.waiting_for_ack {
                        no_longer_waiting = true;
                    }
                    self.waiting_for_ack = false;
                    self.in_flight_since = None;

                    applied.acknowledged += self.release(ack.id);
                }

                Record::Message(message) => {
                    saw_message = true;
                    seen_messages += 1;

                    if seen_messages <= to_skip {
                        applied.skipped += 1;
                        continue;
                    }

                    self.recv_id += 1;
                    applied.delivered.push(message);
                }
            }
        }

        applied.needs_flush = saw_message || (no_longer_waiting && !self.queue.is_empty());

        trace!(
            peer = %self.peer_id,
            delivered = applied.delivered.len(),
            skipped = applied.skipped,
            acknowledged = applied.acknowledged,
            send_id = self.send_id,
            recv_id = self.recv_id,
            "Batch applied"
        );

        applied
    }

    /// Drops queue entries covered by `ack_id` and advances `send_id`.
    fn release(&mut self, ack_id: u64) -> usize {
        let newly_acked = ack_id.saturating_sub(self.send_id);
        let released = usize::try_from(newly_acked)
            .unwrap_or(usize::MAX)
            .min(self.queue.len());

        if (released as u64) < newly_acked {
            warn!(
                peer = %self.peer_id,
                ack_id,
                send_id = self.send_id,
                pending = self.queue.len(),
                "ACK covers more messages than were sent"
            );
        }

        self.queue.drain(..released);
        self.send_id = self.send_id.max(ack_id);
        released
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(task) = self.discovery_task.take() {
            task.abort();
        }

        if let (Some(counterpart), Some(observer)) = (&self.counterpart, self.observer.take()) {
            counterpart.unobserve_resize(observer);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;
    use url::Url;

    use crate::environment::{
        CounterpartFrame, CounterpartLookup, Environment, RelayElement, RelaySpec,
    };
    use crate::error::{Error, Result};
    use crate::protocol::{AckRecord, decode_location};
    use crate::transport::options::TransportOptions;

    /// Relay that remembers its last location.
    #[derive(Default)]
    struct Wire {
        location: Option<String>,
        writes: usize,
        fail: bool,
    }

    struct WireRelay(Arc<Mutex<Wire>>);

    impl RelayElement for WireRelay {
        fn navigate(&self, url: &str) -> Result<()> {
            let mut wire = self.0.lock();
            if wire.fail {
                return Err(Error::relay_write("detached"));
            }
            wire.location = Some(url.to_string());
            wire.writes += 1;
            Ok(())
        }

        fn set_width(&self, _px: u32) -> Result<()> {
            Ok(())
        }
    }

    struct WireEnv(Arc<Mutex<Wire>>);

    impl Environment for WireEnv {
        fn create_relay(&self, _spec: &RelaySpec<'_>) -> Result<Box<dyn RelayElement>> {
            Ok(Box::new(WireRelay(Arc::clone(&self.0))))
        }

        fn lookup_counterpart(
            &self,
            _lookup: &CounterpartLookup,
        ) -> Option<Arc<dyn CounterpartFrame>> {
            None
        }
    }

    fn channel() -> (Channel, Arc<Mutex<Wire>>) {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let env = WireEnv(Arc::clone(&wire));
        let url = Url::parse("https://gadget.example/robots.txt").expect("url");
        let relay = RelayDocument::create(&env, "relay-g1".into(), url, &TransportOptions::new())
            .expect("relay");
        let peer = PeerId::new("g1");
        let role = Role::Host { child: peer.clone() };
        (Channel::new(peer, role, relay), wire)
    }

    fn last_batch(wire: &Arc<Mutex<Wire>>) -> Batch {
        let location = wire.lock().location.clone().expect("written");
        decode_location(&location).expect("decode").expect("batch")
    }

    fn ack(id: u64, send_id: u64) -> Batch {
        Batch::new(send_id, [].iter(), id)
    }

    #[test]
    fn test_gate_starts_closed() {
        let (mut channel, wire) = channel();
        channel.enqueue(json!(1));

        assert_eq!(channel.flush(FlushMode::Normal), FlushOutcome::Waiting);
        assert_eq!(wire.lock().writes, 0);
    }

    #[test]
    fn test_handshake_write_bypasses_gate() {
        let (mut channel, wire) = channel();
        channel.enqueue(json!("early"));

        assert_eq!(
            channel.flush(FlushMode::Handshake),
            FlushOutcome::Written { messages: 1 }
        );
        assert!(channel.is_waiting_for_ack());
        assert_eq!(wire.lock().writes, 1);

        let batch = last_batch(&wire);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[1], Record::Ack(AckRecord::new(0)));
    }

    #[test]
    fn test_first_ack_makes_ready_once() {
        let (mut channel, _wire) = channel();

        let first = channel.apply_batch(ack(0, 0));
        assert!(first.became_ready);
        assert_eq!(channel.phase(), ChannelPhase::Ready);
        assert!(!channel.is_waiting_for_ack());

        let second = channel.apply_batch(ack(0, 0));
        assert!(!second.became_ready);
    }

    #[test]
    fn test_single_flight() {
        let (mut channel, wire) = channel();
        channel.apply_batch(ack(0, 0));

        channel.enqueue(json!("a"));
        assert_eq!(
            channel.flush(FlushMode::Normal),
            FlushOutcome::Written { messages: 1 }
        );

        channel.enqueue(json!("b"));
        assert_eq!(channel.flush(FlushMode::Normal), FlushOutcome::Waiting);
        assert_eq!(channel.flush(FlushMode::AckOwed), FlushOutcome::Waiting);

        assert_eq!(wire.lock().writes, 1);
        assert_eq!(channel.send_id(), 0);
        assert_eq!(channel.pending_count(), 2);
    }

    #[test]
    fn test_backpressure_sends_everything_queued() {
        let (mut channel, wire) = channel();
        for i in 0..5 {
            channel.enqueue(json!(i));
            assert_eq!(channel.flush(FlushMode::Normal), FlushOutcome::Waiting);
        }

        let applied = channel.apply_batch(ack(0, 0));
        assert!(applied.needs_flush);
        assert_eq!(
            channel.flush(FlushMode::AckOwed),
            FlushOutcome::Written { messages: 5 }
        );

        let batch = last_batch(&wire);
        let messages: Vec<_> = batch
            .records
            .iter()
            .filter_map(|r| match r {
                Record::Message(v) => Some(v.clone()),
                Record::Ack(_) => None,
            })
            .collect();
        assert_eq!(messages, (0..5).map(|i| json!(i)).collect::<Vec<_>>());
    }

    #[test]
    fn test_ack_releases_queue_head() {
        let (mut channel, _wire) = channel();
        channel.apply_batch(ack(0, 0));
        for i in 0..3 {
            channel.enqueue(json!(i));
        }
        channel.flush(FlushMode::Normal);

        let applied = channel.apply_batch(ack(2, 0));
        assert_eq!(applied.acknowledged, 2);
        assert_eq!(channel.send_id(), 2);
        assert_eq!(channel.pending_count(), 1);
        assert!(applied.needs_flush);

        // Stale ACK never moves send_id backwards.
        let applied = channel.apply_batch(ack(1, 0));
        assert_eq!(applied.acknowledged, 0);
        assert_eq!(channel.send_id(), 2);
    }

    #[test]
    fn test_duplicate_batch_is_delivered_once() {
        let (mut channel, _wire) = channel();
        let pending = [json!("x"), json!("y")];
        let batch = Batch::new(0, pending.iter(), 0);

        let first = channel.apply_batch(batch.clone());
        assert_eq!(first.delivered, vec![json!("x"), json!("y")]);

        let second = channel.apply_batch(batch);
        assert!(second.delivered.is_empty());
        assert_eq!(second.skipped, 2);
        assert!(second.needs_flush);
        assert_eq!(channel.recv_id(), 2);
    }

    #[test]
    fn test_partial_overlap_skips_prefix() {
        let (mut channel, _wire) = channel();
        let first = [json!(1), json!(2)];
        channel.apply_batch(Batch::new(0, first.iter(), 0));

        // Peer saw our ACK for 1 message only, resends from its 2nd message.
        let resent = [json!(2), json!(3)];
        let applied = channel.apply_batch(Batch::new(1, resent.iter(), 0));

        assert_eq!(applied.delivered, vec![json!(3)]);
        assert_eq!(applied.skipped, 1);
        assert_eq!(channel.recv_id(), 3);
    }

    #[test]
    fn test_ack_only_batch_needs_no_flush_when_drained() {
        let (mut channel, _wire) = channel();
        channel.apply_batch(ack(0, 0));
        channel.enqueue(json!("a"));
        channel.flush(FlushMode::Normal);

        let applied = channel.apply_batch(ack(1, 0));
        assert!(!applied.needs_flush);
        assert_eq!(channel.pending_count(), 0);
    }

    #[test]
    fn test_failed_write_leaves_state() {
        let (mut channel, wire) = channel();
        channel.apply_batch(ack(0, 0));
        wire.lock().fail = true;

        channel.enqueue(json!("a"));
        assert_eq!(channel.flush(FlushMode::Normal), FlushOutcome::Failed);
        assert!(!channel.is_waiting_for_ack());
        assert_eq!(channel.pending_count(), 1);

        wire.lock().fail = false;
        channel.enqueue(json!("b"));
        assert_eq!(
            channel.flush(FlushMode::Normal),
            FlushOutcome::Written { messages: 2 }
        );
    }

    #[test]
    fn test_overreaching_ack_is_clamped() {
        let (mut channel, _wire) = channel();
        channel.apply_batch(ack(0, 0));
        channel.enqueue(json!("a"));

        let applied = channel.apply_batch(ack(5, 0));
        assert_eq!(applied.acknowledged, 1);
        assert_eq!(channel.send_id(), 5);
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_detection() {
        let (mut channel, _wire) = channel();
        channel.apply_batch(ack(0, 0));
        channel.enqueue(json!("a"));
        channel.flush(FlushMode::Normal);

        let timeout = Duration::from_secs(2);
        assert!(!channel.is_stalled(Instant::now(), timeout));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(channel.is_stalled(Instant::now(), timeout));

        channel.reopen_gate();
        assert!(!channel.is_stalled(Instant::now(), timeout));
        assert_eq!(
            channel.flush(FlushMode::Normal),
            FlushOutcome::Written { messages: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_write_becomes_due_for_retry() {
        let (mut channel, wire) = channel();
        channel.apply_batch(ack(0, 0));
        wire.lock().fail = true;

        channel.enqueue(json!("last"));
        assert_eq!(channel.flush(FlushMode::Normal), FlushOutcome::Failed);
        assert!(!channel.is_stalled(Instant::now(), Duration::ZERO));

        let timeout = Duration::from_secs(2);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(channel.retry_due(Instant::now(), timeout), None);

        // A second refusal keeps the original timestamp.
        assert_eq!(channel.flush(FlushMode::AckOwed), FlushOutcome::Failed);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(
            channel.retry_due(Instant::now(), timeout),
            Some(FlushMode::AckOwed)
        );

        wire.lock().fail = false;
        assert_eq!(
            channel.flush(FlushMode::AckOwed),
            FlushOutcome::Written { messages: 1 }
        );
        assert_eq!(channel.retry_due(Instant::now(), Duration::ZERO), None);
        assert_eq!(last_batch(&wire).message_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_handshake_is_redone_as_handshake() {
        let (mut channel, wire) = channel();
        wire.lock().fail = true;

        assert_eq!(channel.flush(FlushMode::Handshake), FlushOutcome::Failed);
        assert_eq!(
            channel.retry_due(Instant::now(), Duration::ZERO),
            Some(FlushMode::Handshake)
        );

        wire.lock().fail = false;
        assert_eq!(
            channel.flush(FlushMode::Handshake),
            FlushOutcome::Written { messages: 0 }
        );
        assert!(channel.is_waiting_for_ack());
        assert_eq!(channel.retry_due(Instant::now(), Duration::ZERO), None);
    }
}
