//! Transport tuning and addressing options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use frame_relay::TransportOptions;
//!
//! let options = TransportOptions::new()
//!     .with_self_id("gadget-1")
//!     .with_discovery_interval(Duration::from_millis(250))
//!     .with_stall_timeout(Duration::from_secs(5));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rustc_hash::FxHashMap;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::PeerId;
use crate::protocol::{resolve_relay_url, same_origin};

// ============================================================================
// Constants
// ============================================================================

/// Interval between discovery attempts.
pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_millis(500);

/// Discovery attempts before the peer is reported missing.
pub const DEFAULT_MAX_DISCOVERY_ATTEMPTS: u32 = 10;

/// Neutral location relays start at.
pub const DEFAULT_PLACEHOLDER_URL: &str = "about:blank";

/// Same-site path whose response is irrelevant.
pub const DEFAULT_RELAY_PATH: &str = "/robots.txt";

/// The two widths a relay alternates between.
pub const DEFAULT_SIGNAL_WIDTHS: (u32, u32) = (10, 20);

/// Fixed relay height.
pub const DEFAULT_RELAY_HEIGHT: u32 = 1;

// ============================================================================
// TransportOptions
// ============================================================================

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Id the host assigned to this document (embedded side only).
    pub self_id: Option<PeerId>,

    /// URL of the host page, used to resolve relative relay paths.
    pub parent_url: Option<Url>,

    /// Relay path on the reader's origin, used when no explicit URL is set.
    pub relay_path: String,

    /// Explicit relay locations per peer (absolute or relative).
    pub relay_urls: FxHashMap<PeerId, String>,

    /// Neutral location relays start at.
    pub placeholder_url: String,

    /// Interval between discovery attempts.
    pub discovery_interval: Duration,

    /// Discovery attempts before failure is reported.
    pub max_discovery_attempts: u32,

    /// Widths the relay alternates between to force a layout event.
    pub signal_widths: (u32, u32),

    /// Relay height in pixels.
    pub relay_height: u32,

    /// Re-emit an unacknowledged batch after this long. `None` waits forever.
    pub stall_timeout: Option<Duration>,
}

// ============================================================================
// Constructors
// ============================================================================

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            self_id: None,
            parent_url: None,
            relay_path: DEFAULT_RELAY_PATH.to_string(),
            relay_urls: FxHashMap::default(),
            placeholder_url: DEFAULT_PLACEHOLDER_URL.to_string(),
            discovery_interval: DEFAULT_DISCOVERY_INTERVAL,
            max_discovery_attempts: DEFAULT_MAX_DISCOVERY_ATTEMPTS,
            signal_widths: DEFAULT_SIGNAL_WIDTHS,
            relay_height: DEFAULT_RELAY_HEIGHT,
            stall_timeout: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TransportOptions {
    /// Sets the id the host assigned to this document.
    #[inline]
    #[must_use]
    pub fn with_self_id(mut self, id: impl Into<PeerId>) -> Self {
        self.self_id = Some(id.into());
        self
    }

    /// Sets the host page URL.
    #[inline]
    #[must_use]
    pub fn with_parent_url(mut self, url: Url) -> Self {
        self.parent_url = Some(url);
        self
    }

    /// Sets the default relay path.
    #[inline]
    #[must_use]
    pub fn with_relay_path(mut self, path: impl Into<String>) -> Self {
        self.relay_path = path.into();
        self
    }

    /// Sets the relay location used to reach `peer_id`.
    ///
    /// The relay must live on the peer's origin.
    #[inline]
    #[must_use]
    pub fn with_relay_url(mut self, peer_id: impl Into<PeerId>, url: impl Into<String>) -> Self {
        self.relay_urls.insert(peer_id.into(), url.into());
        self
    }

    /// Sets the placeholder location.
    #[inline]
    #[must_use]
    pub fn with_placeholder_url(mut self, url: impl Into<String>) -> Self {
        self.placeholder_url = url.into();
        self
    }

    /// Sets the discovery polling interval.
    #[inline]
    #[must_use]
    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    /// Sets the discovery attempt cap.
    #[inline]
    #[must_use]
    pub fn with_max_discovery_attempts(mut self, attempts: u32) -> Self {
        self.max_discovery_attempts = attempts;
        self
    }

    /// Sets the two signal widths.
    #[inline]
    #[must_use]
    pub fn with_signal_widths(mut self, first: u32, second: u32) -> Self {
        self.signal_widths = (first, second);
        self
    }

    /// Enables re-emission of stalled batches.
    #[inline]
    #[must_use]
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }
}

// ============================================================================
// Resolution & Validation
// ============================================================================

impl TransportOptions {
    /// Resolves the relay URL this side writes to when talking to `peer_id`.
    ///
    /// An explicit per-peer URL wins. Otherwise the relay path resolves
    /// against the parent URL, which only makes sense for the parent itself.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no relay location can be derived
    /// - [`Error::Url`] if the location is not a valid URL
    pub fn relay_url_for(&self, peer_id: &PeerId) -> Result<Url> {
        if let Some(relay) = self.relay_urls.get(peer_id) {
            return resolve_relay_url(relay, self.parent_url.as_ref());
        }

        if peer_id.is_parent() {
            return resolve_relay_url(&self.relay_path, self.parent_url.as_ref());
        }

        Err(Error::config(format!(
            "No relay URL for embedded document {peer_id}.\n\
             Use .relay_url(\"{peer_id}\", \"https://gadget.example/robots.txt\")"
        )))
    }

    /// Returns `false` if `relay` can never be read by `peer_id`.
    ///
    /// Only the parent's origin is known (from `parent_url`), so relays for
    /// embedded documents always pass.
    #[must_use]
    pub fn relay_readable_by(&self, peer_id: &PeerId, relay: &Url) -> bool {
        match &self.parent_url {
            Some(parent) if peer_id.is_parent() => same_origin(relay.as_str(), parent.as_str()),
            _ => true,
        }
    }

    /// Checks the options for values the transport cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.max_discovery_attempts == 0 {
            return Err(Error::config("Discovery needs at least one attempt"));
        }

        if self.discovery_interval.is_zero() {
            return Err(Error::config("Discovery interval must be non-zero"));
        }

        if self.signal_widths.0 == self.signal_widths.1 {
            return Err(Error::config(
                "Signal widths must differ or no layout event fires",
            ));
        }

        if self.stall_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::config("Stall timeout must be non-zero"));
        }

        if self.placeholder_url.is_empty() {
            return Err(Error::config("Placeholder URL must not be empty"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
