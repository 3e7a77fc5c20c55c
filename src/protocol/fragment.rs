//! Fragment codec for relay locations.
//!
//! A batch travels as `relay-url#<percent-encoded JSON>`. Only the fragment
//! is significant; the path itself is never fetched for its content.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{from_str, to_string};

use crate::error::{Error, Result};

use super::Batch;

// ============================================================================
// Encoding
// ============================================================================

/// Serializes a batch into fragment text (without the leading `#`).
///
/// # Errors
///
/// Returns [`Error::Json`] if the batch cannot be serialized.
pub fn encode_fragment(batch: &Batch) -> Result<String> {
    let json = to_string(batch)?;
    Ok(urlencoding::encode(&json).into_owned())
}

// ============================================================================
// Decoding
// ============================================================================

/// Returns the fragment of a location, without the `#`.
///
/// Returns `None` when the location has no fragment or it is empty.
#[must_use]
pub fn fragment_of(location: &str) -> Option<&str> {
    location
        .split_once('#')
        .map(|(_, fragment)| fragment)
        .filter(|fragment| !fragment.is_empty())
}

/// Decodes fragment text into a batch.
///
/// # Errors
///
/// Returns [`Error::MalformedBatch`] if the fragment is not valid
/// percent-encoded UTF-8 or not a batch envelope.
pub fn decode_fragment(fragment: &str) -> Result<Batch> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);

    let json = urlencoding::decode(fragment)
        .map_err(|e| Error::malformed_batch(format!("bad percent-encoding: {e}")))?;

    from_str::<Batch>(&json).map_err(|e| Error::malformed_batch(e.to_string()))
}

/// Decodes the batch carried by a full relay location.
///
/// # Errors
///
/// Returns [`Error::MalformedBatch`] if a fragment is present but invalid.
pub fn decode_location(location: &str) -> Result<Option<Batch>> {
    fragment_of(location).map(decode_fragment).transpose()
}

// ============================================================================
// Tests
// ============================================================================
