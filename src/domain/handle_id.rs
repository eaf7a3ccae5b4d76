//! Type-safe facade handle identifier.
//!
//! [`HandleId`] is a newtype around [`uuid::Uuid`] (v4). Each
//! [`crate::client::Handle`] carries one so that its open/close listeners
//! can be detached on `stop()` without touching other handles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a facade handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(uuid::Uuid);

impl HandleId {
    /// Creates a new random `HandleId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
