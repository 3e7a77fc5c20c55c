//! Builder pattern for transport configuration.
//!
//! Provides a fluent API for configuring and creating [`Transport`] instances.
//!
//! # Example
//!
//! ```ignore
//! use frame_relay::Transport;
//!
//! # fn example(env: std::sync::Arc<dyn frame_relay::Environment>) -> frame_relay::Result<()> {
//! let transport = Transport::builder()
//!     .environment(env)
//!     .relay_url("gadget-1", "https://gadget.example/robots.txt")
//!     .on_ready(|peer, ready| println!("{peer} ready: {ready}"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::identifiers::PeerId;

use super::core::{MessageHandler, ReadyHandler, Transport};
use super::options::TransportOptions;

// ============================================================================
// TransportBuilder
// ============================================================================

/// Builder for configuring a [`Transport`] instance.
///
/// Use [`Transport::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct TransportBuilder {
    /// Browsing context to run in.
    env: Option<Arc<dyn Environment>>,
    /// Host page URL, parsed at build time.
    parent_url: Option<String>,
    /// Remaining options.
    options: TransportOptions,
    /// Message callback.
    on_message: Option<MessageHandler>,
    /// Readiness callback.
    on_ready: Option<ReadyHandler>,
}

// ============================================================================
// TransportBuilder Implementation
// ============================================================================

impl TransportBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the browsing context the transport runs in.
    #[inline]
    #[must_use]
    pub fn environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = Some(env);
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the id the host assigned to this document.
    ///
    /// Required on the embedded side.
    #[inline]
    #[must_use]
    pub fn self_id(mut self, id: impl Into<PeerId>) -> Self {
        self.options.self_id = Some(id.into());
        self
    }

    /// Sets the host page URL used to resolve relative relay paths.
    #[inline]
    #[must_use]
    pub fn parent_url(mut self, url: impl Into<String>) -> Self {
        self.parent_url = Some(url.into());
        self
    }

    /// Sets the relay path on the host's origin.
    #[inline]
    #[must_use]
    pub fn relay_path(mut self, path: impl Into<String>) -> Self {
        self.options.relay_path = path.into();
        self
    }

    /// Sets the relay location used to reach `peer_id`.
    #[inline]
    #[must_use]
    pub fn relay_url(mut self, peer_id: impl Into<PeerId>, url: impl Into<String>) -> Self {
        self.options.relay_urls.insert(peer_id.into(), url.into());
        self
    }

    /// Sets the placeholder location relays start at.
    #[inline]
    #[must_use]
    pub fn placeholder_url(mut self, url: impl Into<String>) -> Self {
        self.options.placeholder_url = url.into();
        self
    }

    /// Sets the discovery polling interval.
    #[inline]
    #[must_use]
    pub fn discovery_interval(mut self, interval: Duration) -> Self {
        self.options.discovery_interval = interval;
        self
    }

    /// Sets the discovery attempt cap.
    #[inline]
    #[must_use]
    pub fn max_discovery_attempts(mut self, attempts: u32) -> Self {
        self.options.max_discovery_attempts = attempts;
        self
    }

    /// Sets the two widths the relay alternates between.
    #[inline]
    #[must_use]
    pub fn signal_widths(mut self, first: u32, second: u32) -> Self {
        self.options.signal_widths = (first, second);
        self
    }

    /// Re-emits unacknowledged batches after `timeout`.
    #[inline]
    #[must_use]
    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.options.stall_timeout = Some(timeout);
        self
    }

    /// Sets the callback for delivered messages.
    #[inline]
    #[must_use]
    pub fn on_message<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PeerId, Value) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(handler));
        self
    }

    /// Sets the readiness callback.
    #[inline]
    #[must_use]
    pub fn on_ready<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PeerId, bool) + Send + Sync + 'static,
    {
        self.on_ready = Some(Arc::new(handler));
        self
    }

    /// Builds the transport with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no environment is set or an option is invalid
    /// - [`Error::Url`] if the parent URL does not parse
    pub fn build(self) -> Result<Transport> {
        let env = self.validate_environment()?;
        let mut options = self.options;

        if let Some(parent_url) = self.parent_url {
            options.parent_url = Some(Url::parse(&parent_url)?);
        }

        let transport = Transport::new(env, options)?;
        transport.set_message_handler(self.on_message);
        transport.set_ready_handler(self.on_ready);
        Ok(transport)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl TransportBuilder {
    /// Validates the environment configuration.
    fn validate_environment(&self) -> Result<Arc<dyn Environment>> {
        self.env.clone().ok_or_else(|| {
            Error::config(
                "Environment is required. Use .environment() to set it.\n\
                 Example: Transport::builder().environment(page.host())",
            )
        })
    }
}

impl fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("has_environment", &self.env.is_some())
            .field("parent_url", &self.parent_url)
            .field("options", &self.options)
            .field("has_on_message", &self.on_message.is_some())
            .field("has_on_ready", &self.on_ready.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::environment::simulated::SimulatedPage;

    #[test]
    fn test_new_creates_default_builder() {
        let builder = TransportBuilder::new();
        assert!(builder.env.is_none());
        assert!(builder.parent_url.is_none());
        assert_eq!(builder.options, TransportOptions::default());
    }

    #[test]
    fn test_setters_update_options() {
        let builder = TransportBuilder::new()
            .self_id("g1")
            .relay_path("/relay.html")
            .relay_url("g2", "https://other.example/robots.txt")
            .discovery_interval(Duration::from_millis(100))
            .max_discovery_attempts(4)
            .signal_widths(2, 3)
            .stall_timeout(Duration::from_secs(1));

        assert_eq!(builder.options.self_id, Some(PeerId::new("g1")));
        assert_eq!(builder.options.relay_path, "/relay.html");
        assert!(builder.options.relay_urls.contains_key(&PeerId::new("g2")));
        assert_eq!(builder.options.discovery_interval, Duration::from_millis(100));
        assert_eq!(builder.options.max_discovery_attempts, 4);
        assert_eq!(builder.options.signal_widths, (2, 3));
        assert_eq!(builder.options.stall_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_build_without_environment_fails() {
        let err = TransportBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_build_with_bad_parent_url_fails() {
        let page = SimulatedPage::new("https://host.example");
        let err = TransportBuilder::new()
            .environment(page.host())
            .parent_url("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }

    #[test]
    fn test_build_parses_parent_url() {
        let page = SimulatedPage::new("https://host.example");
        let transport = TransportBuilder::new()
            .environment(page.embedded("g1"))
            .self_id("g1")
            .parent_url("https://host.example/portal/")
            .build()
            .expect("build");

        assert_eq!(
            transport.options().parent_url.as_ref().map(Url::as_str),
            Some("https://host.example/portal/")
        );
    }

    #[test]
    fn test_build_rejects_invalid_options() {
        let page = SimulatedPage::new("https://host.example");
        let err = TransportBuilder::new()
            .environment(page.host())
            .signal_widths(5, 5)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
