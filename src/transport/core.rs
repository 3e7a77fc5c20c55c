//! Transport facade.
//!
//! The [`Transport`] owns every channel of one browsing context and exposes
//! the upstream contract: `setup`, `send`, and the `on_ready`/`on_message`
//! callbacks.
//!
//! # Example
//!
//! ```ignore
//! use frame_relay::{PeerId, Transport};
//!
//! # async fn example(env: std::sync::Arc<dyn frame_relay::Environment>) -> frame_relay::Result<()> {
//! let transport = Transport::builder()
//!     .environment(env)
//!     .self_id("gadget-1")
//!     .parent_url("https://host.example/portal/")
//!     .on_message(|peer, message| println!("{peer}: {message}"))
//!     .build()?;
//!
//! transport.setup(PeerId::parent())?;
//! transport.send(PeerId::parent(), serde_json::json!({"greet": "hi"}))?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, trace, warn};

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::identifiers::{PeerId, TransportId};
use crate::protocol::{AckRecord, decode_location};

use super::builder::TransportBuilder;
use super::channel::{Channel, ChannelPhase, FlushMode, FlushOutcome};
use super::discovery;
use super::options::TransportOptions;
use super::relay::RelayDocument;
use super::role::Role;
use super::store::ChannelStore;

// ============================================================================
// Types
// ============================================================================

/// Upstream callback for delivered application messages.
pub type MessageHandler = Arc<dyn Fn(&PeerId, Value) + Send + Sync>;

/// Upstream callback for readiness (`true`) or discovery failure (`false`).
pub type ReadyHandler = Arc<dyn Fn(&PeerId, bool) + Send + Sync>;

// ============================================================================
// TransportInner
// ============================================================================

/// Shared state behind every [`Transport`] clone.
pub(crate) struct TransportInner {
    /// Instance id for log correlation.
    pub id: TransportId,
    /// Browsing context the transport runs in.
    pub env: Arc<dyn Environment>,
    /// Configuration.
    pub options: TransportOptions,
    /// All channels, behind one lock.
    pub store: Mutex<ChannelStore>,
    /// Message callback.
    on_message: RwLock<Option<MessageHandler>>,
    /// Readiness callback.
    on_ready: RwLock<Option<ReadyHandler>>,
    /// Background stall monitor, started on first setup.
    stall_monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for TransportInner {
    fn drop(&mut self) {
        if let Some(task) = self.stall_monitor.get_mut().take() {
            task.abort();
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Ordered, at-least-once message transport between a host page and the
/// documents it embeds.
///
/// Cheap to clone; clones share channels and callbacks.
#[derive(Clone)]
pub struct Transport {
    pub(crate) inner: Arc<TransportInner>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.inner.id)
            .field("peers", &self.peers())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Transport - Constructors
// ============================================================================

impl Transport {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    /// Creates a transport over `env`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the options are invalid.
    pub fn new(env: Arc<dyn Environment>, options: TransportOptions) -> Result<Self> {
        options.validate()?;

        let inner = Arc::new(TransportInner {
            id: TransportId::generate(),
            env,
            options,
            store: Mutex::new(ChannelStore::new()),
            on_message: RwLock::new(None),
            on_ready: RwLock::new(None),
            stall_monitor: Mutex::new(None),
        });

        debug!(transport = %inner.id, "Transport created");

        Ok(Self { inner })
    }
}

// ============================================================================
// Transport - Callbacks
// ============================================================================

impl Transport {
    /// Sets the callback for delivered messages, replacing any previous one.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&PeerId, Value) + Send + Sync + 'static,
    {
        self.set_message_handler(Some(Arc::new(handler)));
    }

    /// Sets the readiness callback, replacing any previous one.
    pub fn on_ready<F>(&self, handler: F)
    where
        F: Fn(&PeerId, bool) + Send + Sync + 'static,
    {
        self.set_ready_handler(Some(Arc::new(handler)));
    }

    /// Replaces or clears the message callback.
    pub fn set_message_handler(&self, handler: Option<MessageHandler>) {
        *self.inner.on_message.write() = handler;
    }

    /// Replaces or clears the readiness callback.
    pub fn set_ready_handler(&self, handler: Option<ReadyHandler>) {
        *self.inner.on_ready.write() = handler;
    }
}

// ============================================================================
// Transport - Public API
// ============================================================================

impl Transport {
    /// Prepares the channel to `peer_id` and starts discovery.
    ///
    /// Idempotent: a second call for the same peer does nothing. Readiness
    /// and discovery failure are reported later through `on_ready`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoRuntime`] if called outside a tokio runtime
    /// - [`Error::Config`] if no relay location or self id is configured
    /// - [`Error::RelayCreation`] if the environment refuses the relay
    pub fn setup(&self, peer_id: impl Into<PeerId>) -> Result<()> {
        let peer_id = peer_id.into();
        let inner = &self.inner;

        let mut store = inner.store.lock();
        if store.contains(&peer_id) {
            trace!(transport = %inner.id, peer = %peer_id, "Channel already set up");
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let role = Role::for_peer(&peer_id, inner.options.self_id.as_ref())?;
        let url = inner.options.relay_url_for(&peer_id)?;
        if !inner.options.relay_readable_by(&peer_id, &url) {
            warn!(
                transport = %inner.id,
                peer = %peer_id,
                relay = %url,
                "Relay is not on the parent's origin; the parent will never read it"
            );
        }
        let relay = RelayDocument::create(
            inner.env.as_ref(),
            role.relay_frame_name(),
            url,
            &inner.options,
        )?;

        let mut channel = Channel::new(peer_id.clone(), role, relay);

        // The host's relay must show its origin before the embedded side can
        // read it; the embedded side waits until it has found the host.
        if !channel.role().signals_after_discovery() {
            channel.flush(FlushMode::Handshake);
        }

        let task = runtime.spawn(discovery::run(Arc::downgrade(inner), peer_id.clone()));
        channel.start_discovery(task);
        store.insert(channel);
        drop(store);

        self.ensure_stall_monitor(&runtime);

        info!(transport = %inner.id, peer = %peer_id, "Channel set up, discovering counterpart");
        Ok(())
    }

    /// Queues `message` for `peer_id` and flushes if the channel is idle.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `message` has the shape of an ACK record
    /// - [`Error::UnknownPeer`] if `setup` was never called for the peer
    /// - [`Error::DiscoveryFailed`] if the counterpart never became reachable
    pub fn send(&self, peer_id: impl Into<PeerId>, message: Value) -> Result<()> {
        let peer_id = peer_id.into();

        if AckRecord::matches(&message) {
            return Err(Error::invalid_argument(
                "Message has the shape of an ACK record and would be read as control",
            ));
        }

        let mut store = self.inner.store.lock();
        let channel = store
            .get_mut(&peer_id)
            .ok_or_else(|| Error::unknown_peer(peer_id.clone()))?;

        if channel.phase() == ChannelPhase::Failed {
            return Err(Error::discovery_failed(
                peer_id,
                channel.discovery_attempts(),
            ));
        }

        channel.enqueue(message);
        let outcome = channel.flush(FlushMode::Normal);

        trace!(
            transport = %self.inner.id,
            peer = %peer_id,
            ?outcome,
            pending = channel.pending_count(),
            "Message queued"
        );
        Ok(())
    }

    /// Discards the channel to `peer_id`, cancels its discovery and removes
    /// its layout listener from the counterpart.
    ///
    /// Returns `true` if a channel existed.
    pub fn teardown(&self, peer_id: &PeerId) -> bool {
        let removed = self.inner.store.lock().remove(peer_id);
        if removed.is_some() {
            debug!(transport = %self.inner.id, peer = %peer_id, "Channel torn down");
        }
        removed.is_some()
    }

    /// Re-emits batches that have waited longer than the stall timeout and
    /// retries relay writes that were refused before it.
    ///
    /// Returns the number of channels rewritten. Always `0` without a
    /// configured stall timeout.
    pub fn resend_stalled(&self) -> usize {
        self.inner.resend_stalled()
    }
}

// ============================================================================
// Transport - Introspection
// ============================================================================

impl Transport {
    /// Returns the instance id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.inner.id
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &TransportOptions {
        &self.inner.options
    }

    /// Returns the phase of the channel to `peer_id`.
    #[must_use]
    pub fn phase(&self, peer_id: &PeerId) -> Option<ChannelPhase> {
        self.inner.store.lock().get(peer_id).map(Channel::phase)
    }

    /// Returns `true` once the counterpart's first ACK was processed.
    #[must_use]
    pub fn is_ready(&self, peer_id: &PeerId) -> bool {
        self.phase(peer_id) == Some(ChannelPhase::Ready)
    }

    /// Returns the number of unacknowledged outbound messages.
    #[must_use]
    pub fn pending_count(&self, peer_id: &PeerId) -> Option<usize> {
        self.inner.store.lock().get(peer_id).map(Channel::pending_count)
    }

    /// Returns the peers with a channel, sorted.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerId> {
        self.inner.store.lock().peers()
    }
}

// ============================================================================
// Transport - Internal
// ============================================================================

impl Transport {
    /// Starts the stall monitor once, if a stall timeout is configured.
    fn ensure_stall_monitor(&self, runtime: &Handle) {
        let Some(timeout) = self.inner.options.stall_timeout else {
            return;
        };

        let mut monitor = self.inner.stall_monitor.lock();
        if monitor.is_some() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        *monitor = Some(runtime.spawn(async move {
            loop {
                sleep(timeout).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                inner.resend_stalled();
            }
        }));

        debug!(transport = %self.inner.id, ?timeout, "Stall monitor started");
    }
}

// ============================================================================
// TransportInner - Receive / Dispatch
// ============================================================================

impl TransportInner {
    /// Reads the counterpart's current batch and dispatches it.
    ///
    /// Runs on every layout signal from the counterpart relay. Channel state
    /// is updated under the store lock; callbacks fire after it is released,
    /// readiness first, then messages in batch order.
    pub(crate) fn handle_signal(&self, peer_id: &PeerId) {
        let applied = {
            let mut store = self.store.lock();
            let Some(channel) = store.get_mut(peer_id) else {
                trace!(transport = %self.id, peer = %peer_id, "Signal for unknown channel");
                return;
            };

            let Some(counterpart) = channel.counterpart() else {
                trace!(transport = %self.id, peer = %peer_id, "Signal before discovery");
                return;
            };

            let location = match counterpart.location() {
                Ok(location) => location,
                Err(e) => {
                    debug!(transport = %self.id, peer = %peer_id, error = %e, "Counterpart unreadable");
                    return;
                }
            };

            let batch = match decode_location(&location) {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    trace!(transport = %self.id, peer = %peer_id, "Counterpart relay carries no batch");
                    return;
                }
                Err(e) => {
                    warn!(transport = %self.id, peer = %peer_id, error = %e, "Dropping malformed batch");
                    return;
                }
            };

            let applied = channel.apply_batch(batch);
            if applied.needs_flush {
                channel.flush(FlushMode::AckOwed);
            }
            applied
        };

        if applied.became_ready {
            info!(transport = %self.id, peer = %peer_id, "Channel ready");
            self.notify_ready(peer_id, true);
        }

        if applied.delivered.is_empty() {
            return;
        }

        let handler = self.on_message.read().clone();
        match handler {
            Some(handler) => {
                for message in applied.delivered {
                    handler(peer_id, message);
                }
            }
            None => {
                warn!(
                    transport = %self.id,
                    peer = %peer_id,
                    count = applied.delivered.len(),
                    "No message handler, messages dropped"
                );
            }
        }
    }

    /// Invokes the readiness callback, if set.
    pub(crate) fn notify_ready(&self, peer_id: &PeerId, ready: bool) {
        let handler = self.on_ready.read().clone();
        if let Some(handler) = handler {
            handler(peer_id, ready);
        }
    }

    /// Rewrites every batch that has waited past the stall timeout, and
    /// redoes relay writes refused longer ago than the timeout.
    pub(crate) fn resend_stalled(&self) -> usize {
        let Some(timeout) = self.options.stall_timeout else {
            return 0;
        };

        let now = Instant::now();
        let mut resent = 0;

        let mut store = self.store.lock();
        for channel in store.iter_mut() {
            let mode = if let Some(mode) = channel.retry_due(now, timeout) {
                warn!(
                    transport = %self.id,
                    peer = %channel.peer_id(),
                    pending = channel.pending_count(),
                    ?mode,
                    "Relay write still refused after stall timeout, retrying"
                );
                mode
            } else if channel.is_stalled(now, timeout) {
                warn!(
                    transport = %self.id,
                    peer = %channel.peer_id(),
                    pending = channel.pending_count(),
                    "No ACK within stall timeout, re-emitting batch"
                );
                channel.reopen_gate();
                FlushMode::Normal
            } else {
                continue;
            };

            if matches!(channel.flush(mode), FlushOutcome::Written { .. }) {
                resent += 1;
            }
        }

        resent
    }
}

// ============================================================================
// Tests
// ============================================================================
