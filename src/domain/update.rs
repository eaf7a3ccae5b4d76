//! Inbound value delivered to subscribers.

use serde::Serialize;
use serde_json::Value;

/// Type tag the server uses to say the last value is no longer current.
pub const STALE_TAG: char = 'D';

/// One `(type, payload)` pair as pushed by the server for a subject.
///
/// The tag is passed through untouched; only [`STALE_TAG`] has meaning to
/// the core. An empty payload on the wire decodes to [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    /// Single-character message type from the wire.
    pub tag: char,
    /// Decoded JSON payload.
    pub payload: Value,
}

impl Update {
    /// Creates an update.
    #[must_use]
    pub const fn new(tag: char, payload: Value) -> Self {
        Self { tag, payload }
    }

    /// Returns `true` if this update marks the subject's data as stale
    /// rather than carrying a new value.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.tag == STALE_TAG
    }
}
