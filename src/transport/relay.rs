//! Relay document manager.
//!
//! Owns the hidden relay this side writes batches into. A write navigates
//! the relay to `relay-url#<batch>` and flips its width, which fires one
//! layout event in the context that owns the relay's document.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::trace;
use url::Url;

use crate::environment::{Environment, RelayElement, RelaySpec};
use crate::error::Result;

use super::options::TransportOptions;

// ============================================================================
// RelayDocument
// ============================================================================

/// The relay element this side controls for one channel.
pub struct RelayDocument {
    /// Environment handle to the element.
    element: Box<dyn RelayElement>,
    /// Frame name the counterpart finds it by.
    name: String,
    /// Location written batches are appended to.
    url: Url,
    /// Widths to alternate between.
    widths: (u32, u32),
    /// Last width written.
    signal_width: u32,
    /// Successful writes so far.
    writes: u64,
}

impl RelayDocument {
    /// Creates the relay at the placeholder location.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RelayCreation`] if the environment refuses.
    pub fn create(
        env: &dyn Environment,
        name: String,
        url: Url,
        options: &TransportOptions,
    ) -> Result<Self> {
        let (initial_width, _) = options.signal_widths;

        let element = env.create_relay(&RelaySpec {
            name: &name,
            placeholder: &options.placeholder_url,
            width: initial_width,
            height: options.relay_height,
        })?;

        trace!(name = %name, url = %url, "Relay created");

        Ok(Self {
            element,
            name,
            url,
            widths: options.signal_widths,
            signal_width: initial_width,
            writes: 0,
        })
    }

    /// Writes an encoded batch and emits the layout signal.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RelayWrite`] if navigation or resizing fails.
    /// The signal width is only advanced once the resize succeeds.
    pub fn write_batch(&mut self, fragment: &str) -> Result<()> {
        let mut target = self.url.clone();
        target.set_fragment(Some(fragment));

        self.element.navigate(target.as_str())?;

        let next_width = self.next_width();
        self.element.set_width(next_width)?;
        self.signal_width = next_width;
        self.writes += 1;

        trace!(name = %self.name, width = next_width, bytes = fragment.len(), "Relay written");
        Ok(())
    }

    /// Returns the frame name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the relay base URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the last emitted width.
    #[inline]
    #[must_use]
    pub fn signal_width(&self) -> u32 {
        self.signal_width
    }

    /// Returns the number of successful writes.
    #[inline]
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn next_width(&self) -> u32 {
        if self.signal_width == self.widths.0 {
            self.widths.1
        } else {
            self.widths.0
        }
    }
}

impl fmt::Debug for RelayDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayDocument")
            .field("name", &self.name)
            .field("url", &self.url.as_str())
            .field("signal_width", &self.signal_width)
            .field("writes", &self.writes)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
