//! Relay URL helpers.
//!
//! The relay a side writes to must live on the *reader's* origin, so the
//! embedded side usually learns it from the host page's URL (the `parent`
//! parameter it was rendered with).

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Scheme assumed for scheme-relative and schemeless inputs.
pub const DEFAULT_SCHEME: &str = "https";

// ============================================================================
// Origin
// ============================================================================

/// Returns the canonical `scheme://host[:port]` of a URL.
///
/// Input is lower-cased. Scheme-relative (`//host/...`) and schemeless
/// (`host/...`) inputs take `current_scheme`. Default ports are dropped.
/// An empty input yields an empty origin.
///
/// # Errors
///
/// Returns [`Error::Url`] if the input cannot be parsed.
pub fn origin(input: &str, current_scheme: &str) -> Result<String> {
    if input.is_empty() {
        return Ok(String::new());
    }

    let input = input.to_lowercase();
    let absolute = if input.starts_with("//") {
        format!("{current_scheme}:{input}")
    } else if !input.contains("://") {
        format!("{current_scheme}://{input}")
    } else {
        input
    };

    let url = Url::parse(&absolute)?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::invalid_argument(format!("URL has no host: {absolute}")))?;

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Returns `true` if both URLs share an origin.
///
/// Unparseable inputs never match.
#[must_use]
pub fn same_origin(a: &str, b: &str) -> bool {
    match (origin(a, DEFAULT_SCHEME), origin(b, DEFAULT_SCHEME)) {
        (Ok(a), Ok(b)) => !a.is_empty() && a == b,
        _ => false,
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolves a configured relay location against the parent page URL.
///
/// - absolute (`https://...`) and scheme-relative (`//...`) values are used
///   as given;
/// - host-relative values (`/rpc_relay.html`) resolve against the parent's
///   origin;
/// - path-relative values (`rpc_relay.html`) resolve against the parent's
///   directory.
///
/// # Errors
///
/// - [`Error::Config`] if the relay is relative and no parent is known
/// - [`Error::Url`] if the result is not a valid URL
pub fn resolve_relay_url(relay: &str, parent: Option<&Url>) -> Result<Url> {
    if relay.starts_with("http://") || relay.starts_with("https://") {
        return Ok(Url::parse(relay)?);
    }

    if relay.starts_with("//") {
        let scheme = parent.map_or(DEFAULT_SCHEME, Url::scheme);
        return Ok(Url::parse(&format!("{scheme}:{relay}"))?);
    }

    let parent = parent.ok_or_else(|| {
        Error::config(format!(
            "Relay URL {relay:?} is relative but no parent URL is configured.\n\
             Use .parent_url() or pass an absolute relay URL."
        ))
    })?;

    Ok(parent.join(relay)?)
}

// ============================================================================
// Tests
// ============================================================================
