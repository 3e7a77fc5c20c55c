//! Peer discovery.
//!
//! Polls for the counterpart's relay until it passes the capability probes
//! or the attempt cap is reached. The first attempt runs immediately.
//!
//! | Outcome | Effect |
//! |---------|--------|
//! | Linked | Listener registered, embedded side writes, current batch dispatched |
//! | Pending | Sleep one interval and retry |
//! | Exhausted | Channel marked `Failed`, `on_ready(peer, false)` fired once |
//! | Gone | Channel or transport dropped; stop quietly |

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::environment::{AccessibleFrame, ObserverId, try_access};
use crate::identifiers::PeerId;

use super::channel::FlushMode;
use super::core::TransportInner;

// ============================================================================
// Attempt
// ============================================================================

/// Result of one discovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    /// Counterpart found and listener registered.
    Linked,
    /// Not reachable yet.
    Pending,
    /// Attempt cap reached.
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
    /// Nothing left to discover for.
    Gone,
}

// ============================================================================
// Discovery Task
// ============================================================================

/// Runs discovery for `peer_id` until it links, fails, or is cancelled.
///
/// Holds only a weak reference so a dropped transport ends the loop.
pub(crate) async fn run(inner: Weak<TransportInner>, peer_id: PeerId) {
    loop {
        let Some(transport) = inner.upgrade() else {
            return;
        };

        match transport.attempt_discovery(&peer_id) {
            Attempt::Linked => {
                transport.handle_signal(&peer_id);
                return;
            }
            Attempt::Exhausted { attempts } => {
                warn!(
                    transport = %transport.id,
                    peer = %peer_id,
                    attempts,
                    "Discovery failed, counterpart never became reachable"
                );
                transport.notify_ready(&peer_id, false);
                return;
            }
            Attempt::Gone => return,
            Attempt::Pending => {}
        }

        let interval = transport.options.discovery_interval;
        drop(transport);
        sleep(interval).await;
    }
}

// ============================================================================
// TransportInner - Discovery
// ============================================================================

impl TransportInner {
    /// Performs one lookup-and-probe attempt.
    pub(crate) fn attempt_discovery(self: &Arc<Self>, peer_id: &PeerId) -> Attempt {
        let mut store = self.store.lock();
        let Some(channel) = store.get_mut(peer_id) else {
            return Attempt::Gone;
        };

        let attempt = channel.record_attempt();
        let lookup = channel.role().counterpart_lookup();

        let accessible = self
            .env
            .lookup_counterpart(&lookup)
            .and_then(|frame| try_access(&frame, &self.options.placeholder_url));

        if let Some(counterpart) = accessible
            && let Some(observer) = self.register_listener(&counterpart, peer_id)
        {
            channel.link(counterpart, observer);
            debug!(transport = %self.id, peer = %peer_id, attempt, "Counterpart discovered");

            if channel.role().signals_after_discovery() {
                channel.flush(FlushMode::Handshake);
            }

            return Attempt::Linked;
        }

        trace!(transport = %self.id, peer = %peer_id, attempt, "Counterpart not reachable yet");

        if attempt >= self.options.max_discovery_attempts {
            channel.fail();
            return Attempt::Exhausted { attempts: attempt };
        }

        Attempt::Pending
    }

    /// Registers the layout listener that wakes the receive path.
    fn register_listener(
        self: &Arc<Self>,
        counterpart: &AccessibleFrame,
        peer_id: &PeerId,
    ) -> Option<ObserverId> {
        let weak = Arc::downgrade(self);
        let peer = peer_id.clone();

        let handler = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_signal(&peer);
            }
        });

        match counterpart.observe_resize(handler) {
            Ok(observer) => Some(observer),
            Err(e) => {
                debug!(peer = %peer_id, error = %e, "Listener registration refused");
                None
            }
        }
    }
}
