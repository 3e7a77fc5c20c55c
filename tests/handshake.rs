//! Handshake between a host page and an embedded gadget.

mod common;

use std::sync::Arc;

use frame_relay::environment::simulated::{FrameKey, SimulatedPage};
use frame_relay::protocol::decode_location;
use frame_relay::{
    ChannelPhase, CounterpartFrame, CounterpartLookup, Environment, ObserverId, PeerId,
    RelayElement, RelaySpec, Result, SignalHandler, Transport,
};
use serde_json::json;

use common::{
    GADGET_ID, GADGET_ORIGIN, GADGET_RELAY, HOST_ORIGIN, HOST_PAGE, Pair, Recorder, advance_ms,
    gadget, init_logging, settle,
};

// ============================================================================
// Fixtures
// ============================================================================

/// Environment that wraps every lookup in a new handle and keeps none.
struct FreshHandles(Arc<dyn Environment>);

struct Forward(Arc<dyn CounterpartFrame>);

impl CounterpartFrame for Forward {
    fn has_document(&self) -> bool {
        self.0.has_document()
    }

    fn document_is_object(&self) -> bool {
        self.0.document_is_object()
    }

    fn location(&self) -> Result<String> {
        self.0.location()
    }

    fn observe_resize(&self, handler: SignalHandler) -> Result<ObserverId> {
        self.0.observe_resize(handler)
    }

    fn unobserve_resize(&self, id: ObserverId) {
        self.0.unobserve_resize(id);
    }
}

impl Environment for FreshHandles {
    fn create_relay(&self, spec: &RelaySpec<'_>) -> Result<Box<dyn RelayElement>> {
        self.0.create_relay(spec)
    }

    fn lookup_counterpart(&self, lookup: &CounterpartLookup) -> Option<Arc<dyn CounterpartFrame>> {
        let frame = self.0.lookup_counterpart(lookup)?;
        Some(Arc::new(Forward(frame)))
    }
}

#[tokio::test(start_paused = true)]
async fn test_greeting_arrives_once_and_both_sides_ready() {
    let pair = Pair::new();
    pair.setup();

    pair.gadget
        .send(PeerId::parent(), json!({"greet": "hi"}))
        .expect("send");

    settle(&pair.page).await;

    assert_eq!(
        pair.host_log.messages(),
        vec![(gadget(), json!({"greet": "hi"}))]
    );
    assert_eq!(
        pair.gadget_log.ready_events(),
        vec![(PeerId::parent(), true)]
    );
    assert_eq!(pair.host_log.ready_events(), vec![(gadget(), true)]);
    assert!(pair.gadget_log.messages().is_empty());

    assert_eq!(pair.gadget.pending_count(&PeerId::parent()), Some(0));
    assert_eq!(pair.host.pending_count(&gadget()), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_host_writes_at_setup_gadget_waits_for_discovery() {
    let pair = Pair::new();

    pair.host.setup(GADGET_ID).expect("host setup");
    let host_relay = pair
        .page
        .location(&FrameKey::host_relay(GADGET_ID))
        .expect("host relay");
    assert!(host_relay.starts_with(&format!("{GADGET_RELAY}#")));

    let batch = decode_location(&host_relay).expect("decode").expect("batch");
    assert_eq!(batch.message_count(), 0);
    assert!(batch.has_trailing_ack());

    pair.gadget.setup(PeerId::parent()).expect("gadget setup");
    assert_eq!(
        pair.page.location(&FrameKey::embedded_relay(GADGET_ID)),
        Some("about:blank".to_string())
    );

    // First discovery attempts run immediately.
    advance_ms(1).await;

    let gadget_relay = pair
        .page
        .location(&FrameKey::embedded_relay(GADGET_ID))
        .expect("gadget relay");
    assert!(gadget_relay.starts_with("https://host.example/robots.txt#"));
    assert_eq!(
        pair.gadget.phase(&PeerId::parent()),
        Some(ChannelPhase::Ready)
    );
}

#[tokio::test(start_paused = true)]
async fn test_gadget_set_up_before_host() {
    let pair = Pair::new();

    pair.gadget.setup(PeerId::parent()).expect("gadget setup");
    advance_ms(1_200).await;
    assert_eq!(
        pair.gadget.phase(&PeerId::parent()),
        Some(ChannelPhase::Discovering)
    );

    pair.host.setup(GADGET_ID).expect("host setup");
    pair.host.send(gadget(), json!("welcome")).expect("send");
    settle(&pair.page).await;

    assert!(pair.host.is_ready(&gadget()));
    assert!(pair.gadget.is_ready(&PeerId::parent()));
    assert_eq!(pair.gadget_log.payloads(), vec![json!("welcome")]);
}

#[tokio::test(start_paused = true)]
async fn test_ready_fires_before_first_message() {
    let pair = Pair::new();
    pair.setup();
    pair.host.send(gadget(), json!("early")).expect("send");

    let order = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let on_ready = std::sync::Arc::clone(&order);
    pair.gadget
        .on_ready(move |_, ready| on_ready.lock().push(format!("ready:{ready}")));
    let on_message = std::sync::Arc::clone(&order);
    pair.gadget
        .on_message(move |_, message| on_message.lock().push(format!("message:{message}")));

    settle(&pair.page).await;

    assert_eq!(
        order.lock().clone(),
        vec!["ready:true".to_string(), "message:\"early\"".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_lookup_handles_need_not_be_retained_by_environment() {
    init_logging();

    let page = SimulatedPage::new(HOST_ORIGIN);
    page.embed(GADGET_ID, GADGET_ORIGIN);

    let host = Transport::builder()
        .environment(Arc::new(FreshHandles(page.host())))
        .relay_url(GADGET_ID, GADGET_RELAY)
        .build()
        .expect("host");
    let gadget_side = Transport::builder()
        .environment(Arc::new(FreshHandles(page.embedded(GADGET_ID))))
        .self_id(GADGET_ID)
        .parent_url(HOST_PAGE)
        .build()
        .expect("gadget");

    let host_log = Recorder::default();
    host_log.attach(&host);

    host.setup(GADGET_ID).expect("host setup");
    gadget_side.setup(PeerId::parent()).expect("gadget setup");
    gadget_side
        .send(PeerId::parent(), json!({"greet": "hi"}))
        .expect("send");

    settle(&page).await;
    settle(&page).await;

    assert!(host.is_ready(&gadget()));
    assert!(gadget_side.is_ready(&PeerId::parent()));
    assert_eq!(host_log.payloads(), vec![json!({"greet": "hi"})]);
    assert_eq!(gadget_side.pending_count(&PeerId::parent()), Some(0));
}
