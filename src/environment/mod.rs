//! Browser environment seam.
//!
//! The transport never touches a DOM directly. A host runtime (a wasm
//! binding, or [`simulated::SimulatedPage`] in tests) implements these
//! traits for one browsing context.
//!
//! # Primitives
//!
//! ```text
//! ┌──────────────── host page ───────────────┐
//! │  relay-gadget (iframe, host-controlled)  │──► read by embedded side
//! │  ┌──────────── gadget (cross-origin) ──┐ │
//! │  │  relay-parent (iframe)              │─┼──► read by host side
//! │  └─────────────────────────────────────┘ │
//! └──────────────────────────────────────────┘
//! ```
//!
//! - [`RelayElement`]: the hidden relay this side owns. Navigating it carries
//!   data in the fragment; resizing it fires a layout event in whichever
//!   context the relay's document belongs to.
//! - [`CounterpartFrame`]: a lookup-only handle to the other side's relay,
//!   readable only once it has navigated to this side's origin. The
//!   transport keeps the handle a successful lookup returned for as long as
//!   the channel lives, so an implementation may hand out a fresh handle per
//!   lookup.
//!
//! # Contract
//!
//! Implementations must not call a [`SignalHandler`] synchronously from inside
//! [`RelayElement::navigate`] or [`RelayElement::set_width`]; layout events are
//! delivered later by the host event loop. A listener removed with
//! [`CounterpartFrame::unobserve_resize`] must not be called afterwards.

// ============================================================================
// Submodules
// ============================================================================

/// Escalating capability probes.
pub mod access;

/// In-memory page for tests and benches.
pub mod simulated;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::error::Result;
use crate::identifiers::PeerId;

// ============================================================================
// Re-exports
// ============================================================================

pub use access::{AccessibleFrame, try_access};

// ============================================================================
// Types
// ============================================================================

/// Layout-change callback registered on a counterpart relay.
pub type SignalHandler = Box<dyn Fn() + Send + Sync>;

/// Registration token returned by [`CounterpartFrame::observe_resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Wraps a raw registration number.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw registration number.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Parameters for creating a relay element.
///
/// The element is invisible and absolutely positioned; only its width ever
/// changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySpec<'a> {
    /// Frame name the counterpart looks the relay up by.
    pub name: &'a str,
    /// Neutral location the relay starts at.
    pub placeholder: &'a str,
    /// Initial width in pixels.
    pub width: u32,
    /// Fixed height in pixels.
    pub height: u32,
}

/// Where to look for the counterpart's relay document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterpartLookup {
    /// A named frame of the embedding (host) context.
    InEmbedder {
        /// Frame name.
        frame_name: String,
    },
    /// A named sub-frame of an embedded document.
    InEmbedded {
        /// The embedded document.
        child: PeerId,
        /// Sub-frame name.
        frame_name: String,
    },
}

// ============================================================================
// Traits
// ============================================================================

/// Hidden relay document owned by this side.
pub trait RelayElement: Send + Sync {
    /// Points the relay at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RelayWrite`] if navigation is refused.
    fn navigate(&self, url: &str) -> Result<()>;

    /// Sets the relay width, firing a layout event when it changes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RelayWrite`] if the element is gone.
    fn set_width(&self, px: u32) -> Result<()>;
}

/// Handle to the counterpart's relay window.
///
/// Every method must tolerate cross-origin denial: probes return `false`
/// and reads return [`crate::Error::AccessDenied`] instead of panicking.
pub trait CounterpartFrame: Send + Sync {
    /// Property-existence probe (`'document' in window`).
    fn has_document(&self) -> bool;

    /// Property-type probe (`typeof window.document == 'object'`).
    fn document_is_object(&self) -> bool;

    /// Reads the full current location, fragment included.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AccessDenied`] if the window is not readable.
    fn location(&self) -> Result<String>;

    /// Registers a layout-change listener on the window.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AccessDenied`] if the window is not readable.
    fn observe_resize(&self, handler: SignalHandler) -> Result<ObserverId>;

    /// Removes a listener registered by [`Self::observe_resize`].
    ///
    /// Unknown ids are ignored.
    fn unobserve_resize(&self, id: ObserverId);
}

/// One browsing context as seen by the transport.
pub trait Environment: Send + Sync {
    /// Creates and attaches a relay element at `spec.placeholder`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RelayCreation`] if the document cannot host it.
    fn create_relay(&self, spec: &RelaySpec<'_>) -> Result<Box<dyn RelayElement>>;

    /// Looks up the counterpart relay, if a frame by that name exists.
    ///
    /// Returning a handle says nothing about readability; the caller probes it.
    fn lookup_counterpart(&self, lookup: &CounterpartLookup) -> Option<Arc<dyn CounterpartFrame>>;
}
