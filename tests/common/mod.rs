//! Shared fixtures for integration tests.
//!
//! Provides a host page with one embedded gadget, a transport on each side,
//! and recorders for what each side observed.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use frame_relay::environment::simulated::SimulatedPage;
use frame_relay::{PeerId, Transport, TransportBuilder};
use parking_lot::Mutex;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

pub const HOST_ORIGIN: &str = "https://host.example";
pub const GADGET_ORIGIN: &str = "https://gadget.example";
pub const GADGET_ID: &str = "gadget-1";
pub const GADGET_RELAY: &str = "https://gadget.example/robots.txt";
pub const HOST_PAGE: &str = "https://host.example/portal/index.html";

// ============================================================================
// Logging
// ============================================================================

/// Initialize tracing once per test binary.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("frame_relay=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Recorder
// ============================================================================

/// Everything one transport reported upstream.
#[derive(Clone, Default)]
pub struct Recorder {
    messages: Arc<Mutex<Vec<(PeerId, Value)>>>,
    ready: Arc<Mutex<Vec<(PeerId, bool)>>>,
}

impl Recorder {
    /// Installs both callbacks on `transport`.
    pub fn attach(&self, transport: &Transport) {
        let messages = Arc::clone(&self.messages);
        transport.on_message(move |peer, message| messages.lock().push((peer.clone(), message)));

        let ready = Arc::clone(&self.ready);
        transport.on_ready(move |peer, ok| ready.lock().push((peer.clone(), ok)));
    }

    /// Delivered messages, in order.
    pub fn messages(&self) -> Vec<(PeerId, Value)> {
        self.messages.lock().clone()
    }

    /// Delivered payloads, in order.
    pub fn payloads(&self) -> Vec<Value> {
        self.messages.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    /// Readiness events, in order.
    pub fn ready_events(&self) -> Vec<(PeerId, bool)> {
        self.ready.lock().clone()
    }
}

// ============================================================================
// Pair
// ============================================================================

/// Host page plus one embedded gadget, each with a transport.
pub struct Pair {
    pub page: SimulatedPage,
    pub host: Transport,
    pub gadget: Transport,
    pub host_log: Recorder,
    pub gadget_log: Recorder,
}

impl Pair {
    /// Creates the pair with default options.
    pub fn new() -> Self {
        Self::with(|builder| builder)
    }

    /// Creates the pair, applying `configure` to both builders.
    pub fn with(configure: impl Fn(TransportBuilder) -> TransportBuilder) -> Self {
        init_logging();

        let page = SimulatedPage::new(HOST_ORIGIN);
        page.embed(GADGET_ID, GADGET_ORIGIN);

        let host = configure(
            Transport::builder()
                .environment(page.host())
                .relay_url(GADGET_ID, GADGET_RELAY),
        )
        .build()
        .expect("host transport");

        let gadget = configure(
            Transport::builder()
                .environment(page.embedded(GADGET_ID))
                .self_id(GADGET_ID)
                .parent_url(HOST_PAGE),
        )
        .build()
        .expect("gadget transport");

        let host_log = Recorder::default();
        host_log.attach(&host);
        let gadget_log = Recorder::default();
        gadget_log.attach(&gadget);

        Self {
            page,
            host,
            gadget,
            host_log,
            gadget_log,
        }
    }

    /// Sets up both channels.
    pub fn setup(&self) {
        self.host.setup(GADGET_ID).expect("host setup");
        self.gadget.setup(PeerId::parent()).expect("gadget setup");
    }

    /// Sets up both channels and waits until both are ready.
    pub async fn connect(&self) {
        self.setup();
        settle(&self.page).await;
        assert!(self.host.is_ready(&gadget()), "host not ready");
        assert!(self.gadget.is_ready(&PeerId::parent()), "gadget not ready");
    }
}

/// The gadget's peer id, as the host addresses it.
pub fn gadget() -> PeerId {
    PeerId::new(GADGET_ID)
}

// ============================================================================
// Time
// ============================================================================

/// Lets discovery run and pumps signals until both sides go quiet.
///
/// Intended for paused-time tests.
pub async fn settle(page: &SimulatedPage) {
    for _ in 0..3 {
        page.run_until_idle();
        tokio::time::sleep(Duration::from_millis(600)).await;
        page.run_until_idle();
    }
}

/// Advances paused time by `ms` milliseconds, letting spawned tasks run.
pub async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
