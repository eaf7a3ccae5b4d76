//! Session token persistence.
//!
//! The overlay reads the token once at startup and rewrites it on every
//! grant or denial. Stores are synchronous: the payload is a few dozen
//! bytes and writes happen at most once per authorization round-trip.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::CommError;

/// A persisted session token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    /// Opaque server-issued token.
    pub token: String,
    /// Point after which the token is ignored.
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    /// Creates a token valid for `ttl_days` from `now`. A lifetime past
    /// the representable range saturates at the latest instant.
    #[must_use]
    pub fn new(token: impl Into<String>, ttl_days: i64, now: DateTime<Utc>) -> Self {
        let expires_at = TimeDelta::try_days(ttl_days)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Returns `true` once `now` has reached the expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Key/value slot holding at most one session token.
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Reads the stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::TokenStore`] if the backing store is unreadable.
    fn load(&self) -> Result<Option<StoredToken>, CommError>;

    /// Replaces the stored token.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::TokenStore`] if the write fails.
    fn save(&self, token: &StoredToken) -> Result<(), CommError>;

    /// Removes the stored token. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::TokenStore`] if the removal fails.
    fn clear(&self) -> Result<(), CommError>;
}

/// Process-local store; the token is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<StoredToken>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with `token`.
    #[must_use]
    pub fn with_token(token: StoredToken) -> Self {
        Self {
            slot: Mutex::new(Some(token)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<StoredToken>, CommError> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, token: &StoredToken) -> Result<(), CommError> {
        *self.slot.lock() = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CommError> {
        *self.slot.lock() = None;
        Ok(())
    }
}

/// JSON file holding `{"token": .., "expires_at": ..}`.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Uses `path` as the backing file. The file need not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<StoredToken>, CommError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "ignoring corrupt token file");
                Ok(None)
            }
        }
    }

    fn save(&self, token: &StoredToken) -> Result<(), CommError> {
        let json = serde_json::to_string(token)
            .map_err(|e| CommError::TokenStore(e.to_string()))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CommError> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_ttl_days_out() {
        let now = Utc::now();
        let token = StoredToken::new("abc", 30, now);
        assert!(!token.is_expired(now + TimeDelta::days(29)));
        assert!(token.is_expired(now + TimeDelta::days(30)));
    }

    #[test]
    fn oversized_ttl_saturates() {
        let now = Utc::now();
        let token = StoredToken::new("abc", 100_000_000, now);
        assert_eq!(token.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(!token.is_expired(now));

        let token = StoredToken::new("abc", i64::MAX, now);
        assert_eq!(token.expires_at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert!(matches!(store.load(), Ok(None)));

        let token = StoredToken::new("abc", 30, Utc::now());
        assert!(store.save(&token).is_ok());
        assert!(matches!(store.load(), Ok(Some(t)) if t == token));

        assert!(store.clear().is_ok());
        assert!(matches!(store.load(), Ok(None)));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let path = dir.path().join("nested").join("session.json");
        let token = StoredToken::new("abc", 30, Utc::now());

        let store = FileTokenStore::new(&path);
        assert!(matches!(store.load(), Ok(None)));
        assert!(store.save(&token).is_ok());

        let reopened = FileTokenStore::new(&path);
        assert!(matches!(reopened.load(), Ok(Some(t)) if t == token));

        assert!(reopened.clear().is_ok());
        assert!(!path.exists());
        assert!(reopened.clear().is_ok());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let path = dir.path().join("session.json");
        assert!(fs::write(&path, "not json").is_ok());
        assert!(matches!(FileTokenStore::new(&path).load(), Ok(None)));
    }
}
