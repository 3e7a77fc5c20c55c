//! Capability probes for counterpart relays.
//!
//! A counterpart handle is trusted only after three escalating probes pass:
//!
//! 1. property existence (`has_document`), which is silent under denial;
//! 2. property type (`document_is_object`);
//! 3. the location is readable and no longer the placeholder.
//!
//! Any failure means "peer not ready yet", never an error.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::Result;

use super::{CounterpartFrame, ObserverId, SignalHandler};

// ============================================================================
// AccessibleFrame
// ============================================================================

/// A counterpart relay that passed every capability probe.
///
/// Owns the lookup handle. Owning the handle does not keep the counterpart's
/// document readable; every read goes back through the window.
#[derive(Clone)]
pub struct AccessibleFrame {
    frame: Arc<dyn CounterpartFrame>,
}

impl AccessibleFrame {
    /// Reads the counterpart's current location.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AccessDenied`] if the window is no longer readable.
    pub fn location(&self) -> Result<String> {
        self.frame.location()
    }

    /// Registers the layout-change listener that wakes the receive path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AccessDenied`] if the window is no longer readable.
    pub fn observe_resize(&self, handler: SignalHandler) -> Result<ObserverId> {
        self.frame.observe_resize(handler)
    }

    /// Removes a listener registered through [`Self::observe_resize`].
    pub fn unobserve_resize(&self, id: ObserverId) {
        self.frame.unobserve_resize(id);
    }
}

impl fmt::Debug for AccessibleFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessibleFrame").finish_non_exhaustive()
    }
}

// ============================================================================
// try_access
// ============================================================================

/// Runs the capability probes against a looked-up counterpart.
///
/// Returns `None` if any probe fails.
#[must_use]
pub fn try_access(frame: &Arc<dyn CounterpartFrame>, placeholder: &str) -> Option<AccessibleFrame> {
    if !frame.has_document() {
        trace!("Counterpart probe failed: no document property");
        return None;
    }

    if !frame.document_is_object() {
        trace!("Counterpart probe failed: document is not an object");
        return None;
    }

    let location = match frame.location() {
        Ok(location) => location,
        Err(e) => {
            trace!(error = %e, "Counterpart probe failed: location unreadable");
            return None;
        }
    };

    let without_fragment = location.split('#').next().unwrap_or_default();
    if without_fragment == placeholder {
        trace!("Counterpart probe failed: still at placeholder");
        return None;
    }

    Some(AccessibleFrame {
        frame: Arc::clone(frame),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;

    struct FakeFrame {
        has_document: bool,
        is_object: bool,
        location: Option<&'static str>,
    }

    impl CounterpartFrame for FakeFrame {
        fn has_document(&self) -> bool {
            self.has_document
        }

        fn document_is_object(&self) -> bool {
            self.is_object
        }

        fn location(&self) -> Result<String> {
            self.location.map(str::to_string).ok_or(Error::AccessDenied)
        }

        fn observe_resize(&self, _handler: SignalHandler) -> Result<ObserverId> {
            Ok(ObserverId::new(1))
        }

        fn unobserve_resize(&self, _id: ObserverId) {}
    }

    fn frame(
        has_document: bool,
        is_object: bool,
        location: Option<&'static str>,
    ) -> Arc<dyn CounterpartFrame> {
        Arc::new(FakeFrame {
            has_document,
            is_object,
            location,
        })
    }

    #[test]
    fn test_all_probes_pass() {
        let f = frame(true, true, Some("https://h/robots.txt#x"));
        let accessible = try_access(&f, "about:blank").expect("accessible");
        assert_eq!(accessible.location().expect("location"), "https://h/robots.txt#x");
    }

    #[test]
    fn test_denied_existence_probe() {
        let f = frame(false, true, Some("https://h/"));
        assert!(try_access(&f, "about:blank").is_none());
    }

    #[test]
    fn test_wrong_type_probe() {
        let f = frame(true, false, Some("https://h/"));
        assert!(try_access(&f, "about:blank").is_none());
    }

    #[test]
    fn test_unreadable_location() {
        let f = frame(true, true, None);
        assert!(try_access(&f, "about:blank").is_none());
    }

    #[test]
    fn test_still_at_placeholder() {
        let f = frame(true, true, Some("about:blank"));
        assert!(try_access(&f, "about:blank").is_none());
    }

    #[test]
    fn test_handle_outlives_the_lookup_result() {
        let f = frame(true, true, Some("https://h/robots.txt#x"));
        let accessible = try_access(&f, "about:blank").expect("accessible");
        drop(f);

        assert_eq!(accessible.location().expect("location"), "https://h/robots.txt#x");
        assert_eq!(
            accessible
                .observe_resize(Box::new(|| {}))
                .expect("observe"),
            ObserverId::new(1)
        );
    }
}
