//! In-memory browsing contexts.
//!
//! A [`SimulatedPage`] models one host page and the cross-origin documents
//! it embeds. It enforces the two rules the transport depends on:
//!
//! - a relay is readable only by a context whose origin matches the relay's
//!   content origin (the creator's origin while at the placeholder, the
//!   navigated URL's origin afterwards);
//! - resizing a relay queues one layout signal for whoever observes it.
//!
//! Signals are never delivered from inside a write. Tests pump them with
//! [`SimulatedPage::run_until_idle`].
//!
//! # Example
//!
//! ```ignore
//! let page = SimulatedPage::new("https://host.example");
//! page.embed("g1", "https://gadget.example");
//!
//! let host_env = page.host();
//! let gadget_env = page.embedded("g1");
//! // ... build transports, advance time ...
//! page.run_until_idle();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::PeerId;

use super::{
    CounterpartFrame, CounterpartLookup, Environment, ObserverId, RelayElement, RelaySpec,
    SignalHandler,
};

// ============================================================================
// Constants
// ============================================================================

/// Signals pumped by one `run_until_idle` call before it gives up.
const MAX_SIGNALS_PER_RUN: usize = 10_000;

// ============================================================================
// Types
// ============================================================================

type SharedHandler = Arc<dyn Fn() + Send + Sync>;

/// A browsing context on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Context {
    /// The host page.
    Host,
    /// An embedded document.
    Embedded(PeerId),
}

/// Address of a relay frame: the document it lives in plus its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameKey {
    /// Document the frame is attached to.
    pub context: Context,
    /// Frame name.
    pub name: String,
}

impl FrameKey {
    /// The host's relay addressed to `child`.
    #[must_use]
    pub fn host_relay(child: impl Into<PeerId>) -> Self {
        Self {
            context: Context::Host,
            name: format!("relay-{}", child.into()),
        }
    }

    /// The relay `child` created for its parent.
    #[must_use]
    pub fn embedded_relay(child: impl Into<PeerId>) -> Self {
        Self {
            context: Context::Embedded(child.into()),
            name: "relay-parent".to_string(),
        }
    }
}

// ============================================================================
// PageState
// ============================================================================

#[derive(Debug)]
struct Frame {
    creator_origin: String,
    location: String,
    width: u32,
}

impl Frame {
    /// Origin of the document currently loaded in the frame.
    fn content_origin(&self) -> String {
        match Url::parse(&self.location) {
            Ok(url) if url.origin().is_tuple() => url.origin().ascii_serialization(),
            _ => self.creator_origin.clone(),
        }
    }
}

#[derive(Default)]
struct PageState {
    host_origin: String,
    children: FxHashMap<PeerId, String>,
    frames: FxHashMap<FrameKey, Frame>,
    handlers: FxHashMap<FrameKey, Vec<(ObserverId, SharedHandler)>>,
    next_observer: u64,
    signals: VecDeque<FrameKey>,
    fail_writes: usize,
    lookups: u64,
    writes: u64,
}

impl PageState {
    fn origin_of(&self, context: &Context) -> Option<&str> {
        match context {
            Context::Host => Some(&self.host_origin),
            Context::Embedded(child) => self.children.get(child).map(String::as_str),
        }
    }

    fn readable_by(&self, key: &FrameKey, reader: &Context) -> bool {
        let Some(frame) = self.frames.get(key) else {
            return false;
        };
        self.origin_of(reader)
            .is_some_and(|origin| frame.content_origin() == origin)
    }
}

// ============================================================================
// SimulatedPage
// ============================================================================

/// A host page with embedded documents, all in memory.
///
/// Cheap to clone; clones share the page.
#[derive(Clone)]
pub struct SimulatedPage {
    state: Arc<Mutex<PageState>>,
}

impl SimulatedPage {
    /// Creates a page served from `host_origin`.
    #[must_use]
    pub fn new(host_origin: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PageState {
                host_origin: host_origin.into(),
                ..PageState::default()
            })),
        }
    }

    /// Embeds a document with id `child` served from `origin`.
    pub fn embed(&self, child: impl Into<PeerId>, origin: impl Into<String>) {
        self.state.lock().children.insert(child.into(), origin.into());
    }

    /// Environment of the host page.
    #[must_use]
    pub fn host(&self) -> Arc<dyn Environment> {
        self.context(Context::Host)
    }

    /// Environment of the embedded document `child`.
    #[must_use]
    pub fn embedded(&self, child: impl Into<PeerId>) -> Arc<dyn Environment> {
        self.context(Context::Embedded(child.into()))
    }

    fn context(&self, context: Context) -> Arc<dyn Environment> {
        Arc::new(SimulatedContext {
            page: Arc::downgrade(&self.state),
            context,
        })
    }
}

// ============================================================================
// SimulatedPage - Event Loop
// ============================================================================

impl SimulatedPage {
    /// Delivers queued layout signals until none are left.
    ///
    /// Returns the number of signals delivered.
    pub fn run_until_idle(&self) -> usize {
        let mut delivered = 0;

        while delivered < MAX_SIGNALS_PER_RUN {
            let (key, handlers) = {
                let mut state = self.state.lock();
                let Some(key) = state.signals.pop_front() else {
                    return delivered;
                };
                let handlers: Vec<SharedHandler> = state
                    .handlers
                    .get(&key)
                    .map(|observers| observers.iter().map(|(_, h)| Arc::clone(h)).collect())
                    .unwrap_or_default();
                (key, handlers)
            };

            trace!(frame = %key.name, observers = handlers.len(), "Layout signal");
            for handler in handlers {
                handler();
            }
            delivered += 1;
        }

        warn!(delivered, "Signal pump stopped without going idle");
        delivered
    }

    /// Queues a signal for `key` without changing it, replaying its batch.
    pub fn replay_signal(&self, key: &FrameKey) {
        self.state.lock().signals.push_back(key.clone());
    }

    /// Drops every queued signal, as if the layout events were lost.
    ///
    /// Returns the number of signals dropped.
    pub fn discard_signals(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.signals.len();
        state.signals.clear();
        dropped
    }

    /// Returns the number of signals waiting to be delivered.
    #[must_use]
    pub fn pending_signals(&self) -> usize {
        self.state.lock().signals.len()
    }
}

// ============================================================================
// SimulatedPage - Inspection & Fault Injection
// ============================================================================

impl SimulatedPage {
    /// Makes the next `count` relay navigations fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().fail_writes = count;
    }

    /// Returns the current location of a relay.
    #[must_use]
    pub fn location(&self, key: &FrameKey) -> Option<String> {
        self.state
            .lock()
            .frames
            .get(key)
            .map(|frame| frame.location.clone())
    }

    /// Overwrites a relay's location without signalling.
    pub fn set_location(&self, key: &FrameKey, location: impl Into<String>) {
        if let Some(frame) = self.state.lock().frames.get_mut(key) {
            frame.location = location.into();
        }
    }

    /// Returns the current width of a relay.
    #[must_use]
    pub fn width(&self, key: &FrameKey) -> Option<u32> {
        self.state.lock().frames.get(key).map(|frame| frame.width)
    }

    /// Returns the number of relays created.
    #[must_use]
    pub fn relay_count(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Returns the number of counterpart lookups performed.
    #[must_use]
    pub fn lookup_count(&self) -> u64 {
        self.state.lock().lookups
    }

    /// Returns the number of successful relay navigations.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.state.lock().writes
    }

    /// Returns the number of layout listeners registered on a relay.
    #[must_use]
    pub fn observer_count(&self, key: &FrameKey) -> usize {
        self.state.lock().handlers.get(key).map_or(0, Vec::len)
    }
}

impl fmt::Debug for SimulatedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedPage")
            .field("host_origin", &state.host_origin)
            .field("children", &state.children.len())
            .field("frames", &state.frames.len())
            .field("pending_signals", &state.signals.len())
            .finish()
    }
}

// ============================================================================
// SimulatedContext
// ============================================================================

/// One browsing context of a [`SimulatedPage`].
struct SimulatedContext {
    page: Weak<Mutex<PageState>>,
    context: Context,
}

impl SimulatedContext {
    fn page(&self) -> Result<Arc<Mutex<PageState>>> {
        self.page
            .upgrade()
            .ok_or_else(|| Error::relay_creation("Page has been unloaded"))
    }
}

impl Environment for SimulatedContext {
    fn create_relay(&self, spec: &RelaySpec<'_>) -> Result<Box<dyn RelayElement>> {
        let page = self.page()?;
        let mut state = page.lock();

        let creator_origin = state
            .origin_of(&self.context)
            .map(str::to_string)
            .ok_or_else(|| Error::relay_creation(format!("{:?} is not embedded", self.context)))?;

        let key = FrameKey {
            context: self.context.clone(),
            name: spec.name.to_string(),
        };

        state.frames.insert(
            key.clone(),
            Frame {
                creator_origin,
                location: spec.placeholder.to_string(),
                width: spec.width,
            },
        );

        Ok(Box::new(SimulatedRelay {
            page: Arc::downgrade(&page),
            key,
        }))
    }

    fn lookup_counterpart(&self, lookup: &CounterpartLookup) -> Option<Arc<dyn CounterpartFrame>> {
        let page = self.page.upgrade()?;
        let mut state = page.lock();
        state.lookups += 1;

        let key = match (lookup, &self.context) {
            (CounterpartLookup::InEmbedder { frame_name }, Context::Embedded(_)) => FrameKey {
                context: Context::Host,
                name: frame_name.clone(),
            },
            (CounterpartLookup::InEmbedded { child, frame_name }, Context::Host) => FrameKey {
                context: Context::Embedded(child.clone()),
                name: frame_name.clone(),
            },
            _ => return None,
        };

        if !state.frames.contains_key(&key) {
            return None;
        }

        // Fresh handle per lookup; nothing here retains it.
        Some(Arc::new(SimulatedWindow {
            page: Arc::downgrade(&page),
            key,
            reader: self.context.clone(),
        }))
    }
}

// ============================================================================
// SimulatedRelay
// ============================================================================

/// Relay element owned by one context.
struct SimulatedRelay {
    page: Weak<Mutex<PageState>>,
    key: FrameKey,
}

impl SimulatedRelay {
    fn with_frame<T>(&self, f: impl FnOnce(&mut PageState) -> Result<T>) -> Result<T> {
        let page = self
            .page
            .upgrade()
            .ok_or_else(|| Error::relay_write("Page has been unloaded"))?;
        let mut state = page.lock();
        if !state.frames.contains_key(&self.key) {
            return Err(Error::relay_write("Relay detached"));
        }
        f(&mut state)
    }
}

impl RelayElement for SimulatedRelay {
    fn navigate(&self, url: &str) -> Result<()> {
        self.with_frame(|state| {
            if state.fail_writes > 0 {
                state.fail_writes -= 1;
                return Err(Error::relay_write("Navigation refused"));
            }

            if let Some(frame) = state.frames.get_mut(&self.key) {
                frame.location = url.to_string();
            }
            state.writes += 1;
            Ok(())
        })
    }

    fn set_width(&self, px: u32) -> Result<()> {
        self.with_frame(|state| {
            let changed = state
                .frames
                .get_mut(&self.key)
                .is_some_and(|frame| std::mem::replace(&mut frame.width, px) != px);

            if changed {
                state.signals.push_back(self.key.clone());
            }
            Ok(())
        })
    }
}

// ============================================================================
// SimulatedWindow
// ============================================================================

/// A context's view of another context's relay.
struct SimulatedWindow {
    page: Weak<Mutex<PageState>>,
    key: FrameKey,
    reader: Context,
}

impl SimulatedWindow {
    fn readable(&self) -> bool {
        let Some(page) = self.page.upgrade() else {
            return false;
        };
        let state = page.lock();
        state.readable_by(&self.key, &self.reader)
    }
}

impl CounterpartFrame for SimulatedWindow {
    fn has_document(&self) -> bool {
        self.readable()
    }

    fn document_is_object(&self) -> bool {
        self.readable()
    }

    fn location(&self) -> Result<String> {
        let page = self.page.upgrade().ok_or(Error::AccessDenied)?;
        let state = page.lock();
        if !state.readable_by(&self.key, &self.reader) {
            return Err(Error::AccessDenied);
        }
        state
            .frames
            .get(&self.key)
            .map(|frame| frame.location.clone())
            .ok_or(Error::AccessDenied)
    }

    fn observe_resize(&self, handler: SignalHandler) -> Result<ObserverId> {
        let page = self.page.upgrade().ok_or(Error::AccessDenied)?;
        let mut state = page.lock();
        if !state.readable_by(&self.key, &self.reader) {
            return Err(Error::AccessDenied);
        }

        state.next_observer += 1;
        let id = ObserverId::new(state.next_observer);
        state
            .handlers
            .entry(self.key.clone())
            .or_default()
            .push((id, Arc::from(handler)));
        Ok(id)
    }

    fn unobserve_resize(&self, id: ObserverId) {
        let Some(page) = self.page.upgrade() else {
            return;
        };
        let mut state = page.lock();
        if let Some(observers) = state.handlers.get_mut(&self.key) {
            observers.retain(|(observer, _)| *observer != id);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
