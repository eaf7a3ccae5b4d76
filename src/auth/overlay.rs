//! Authentication state machine.
//!
//! ```text
//! NoSession --handshake, token stored--> Authenticating(Token)
//! NoSession --login(credentials)-------> Authenticating(Credentials)
//! Authenticating --grant--> Authorized
//! Authenticating --deny---> Denied
//! ```
//!
//! The overlay never touches the wire. Each input returns an
//! [`AuthAction`] the session turns into codec sends and events.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::permissions::PermissionSet;
use super::token_store::{StoredToken, TokenStore};
use crate::error::ProtocolError;

/// How the in-flight authentication was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Replaying a stored session token.
    Token,
    /// User-supplied credentials.
    Credentials,
}

/// Overlay state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No authentication attempted on this connection.
    NoSession,
    /// A request is in flight.
    Authenticating(AuthMethod),
    /// The server granted access.
    Authorized,
    /// The server, or local validation, denied access.
    Denied,
}

/// User name and SHA-256 password hash.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password_hash: String,
}

impl Credentials {
    /// Wraps an already hashed password.
    #[must_use]
    pub fn new(user: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password_hash: password_hash.into(),
        }
    }

    /// Hashes `password` to lowercase hex SHA-256. An empty password stays
    /// empty so that it is still rejected locally.
    #[must_use]
    pub fn from_password(user: impl Into<String>, password: &str) -> Self {
        let password_hash = if password.is_empty() {
            String::new()
        } else {
            format!("{:x}", Sha256::digest(password.as_bytes()))
        };
        Self::new(user, password_hash)
    }

    /// User name.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Hex password hash.
    #[must_use]
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    /// Both fields present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.user.is_empty() && !self.password_hash.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

/// What the session must do after an overlay input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    /// Send `T<token>` and announce a pending login.
    SendToken(String),
    /// Send `X<user>\x01<hash>` and announce a pending login.
    SendCredentials(Credentials),
    /// No token stored; the user must log in.
    LoginRequired,
    /// Access granted; permissions were replaced.
    Allowed,
    /// Access denied.
    Denied,
}

#[derive(Debug, Deserialize)]
struct AuthorizationPayload {
    allow: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    permissions: Value,
}

/// Session token lifecycle and permission set.
#[derive(Debug)]
pub struct AuthOverlay {
    store: Arc<dyn TokenStore>,
    token_ttl_days: i64,
    token: Option<String>,
    valid_token: bool,
    state: AuthState,
    permissions: Arc<PermissionSet>,
}

impl AuthOverlay {
    /// Reads the stored token once. Expired or unreadable tokens are
    /// treated as absent.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, token_ttl_days: i64) -> Self {
        let token = match store.load() {
            Ok(Some(stored)) if stored.is_expired(Utc::now()) => {
                tracing::info!("stored session token expired");
                if let Err(err) = store.clear() {
                    tracing::warn!(error = %err, "failed to clear expired token");
                }
                None
            }
            Ok(stored) => stored.map(|s| s.token),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read session token");
                None
            }
        };
        Self {
            store,
            token_ttl_days,
            token,
            valid_token: false,
            state: AuthState::NoSession,
            permissions: Arc::new(PermissionSet::default()),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// `true` once a grant was received on this connection.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.valid_token
    }

    /// `true` if a token is available for replay.
    #[must_use]
    pub const fn has_stored_token(&self) -> bool {
        self.token.is_some()
    }

    /// Current permission set.
    #[must_use]
    pub fn permissions(&self) -> &Arc<PermissionSet> {
        &self.permissions
    }

    /// Handshake completed: replay the stored token or ask for a login.
    pub fn on_handshake(&mut self) -> AuthAction {
        self.valid_token = false;
        match &self.token {
            Some(token) => {
                tracing::info!("authenticating with stored token");
                self.state = AuthState::Authenticating(AuthMethod::Token);
                AuthAction::SendToken(token.clone())
            }
            None => {
                tracing::info!("login required");
                self.state = AuthState::NoSession;
                AuthAction::LoginRequired
            }
        }
    }

    /// Credential login. Drops the stored token first; incomplete
    /// credentials are denied without contacting the server.
    pub fn login(&mut self, credentials: Credentials) -> AuthAction {
        self.forget_token();
        tracing::info!(user = %credentials.user(), "authenticating with credentials");
        if credentials.is_complete() {
            self.state = AuthState::Authenticating(AuthMethod::Credentials);
            AuthAction::SendCredentials(credentials)
        } else {
            self.state = AuthState::Denied;
            AuthAction::Denied
        }
    }

    /// Applies a raw authorization result.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidAuthorization`] if the payload is not
    /// the expected JSON object; state is left untouched.
    pub fn on_authorization(&mut self, raw: &str) -> Result<AuthAction, ProtocolError> {
        let payload: AuthorizationPayload = serde_json::from_str(raw)
            .map_err(|e| ProtocolError::InvalidAuthorization(e.to_string()))?;

        if !payload.allow {
            tracing::info!("access denied");
            self.forget_token();
            self.permissions = Arc::new(PermissionSet::default());
            self.state = AuthState::Denied;
            return Ok(AuthAction::Denied);
        }

        match payload.token.filter(|t| !t.is_empty()) {
            Some(token) => {
                let stored = StoredToken::new(token.as_str(), self.token_ttl_days, Utc::now());
                if let Err(err) = self.store.save(&stored) {
                    tracing::warn!(error = %err, "failed to persist session token");
                }
                self.token = Some(token);
            }
            None => tracing::debug!(
                kept = self.token.is_some(),
                "grant carried no token"
            ),
        }
        self.valid_token = true;
        self.permissions = Arc::new(PermissionSet::from_value(&payload.permissions));
        self.state = AuthState::Authorized;
        tracing::info!(
            domains = ?self.permissions.domains(),
            rules = self.permissions.rule_count(),
            "access granted"
        );
        Ok(AuthAction::Allowed)
    }

    /// Explicit logout: token and permissions are dropped.
    pub fn logout(&mut self) {
        tracing::info!("logout");
        self.forget_token();
        self.permissions = Arc::new(PermissionSet::default());
        self.state = AuthState::NoSession;
    }

    /// Established connection lost. The token survives for replay on the
    /// next handshake; everything derived from the session does not.
    pub fn reset(&mut self) {
        self.valid_token = false;
        self.permissions = Arc::new(PermissionSet::default());
        self.state = AuthState::NoSession;
    }

    fn forget_token(&mut self) {
        self.token = None;
        self.valid_token = false;
        if let Err(err) = self.store.clear() {
            tracing::warn!(error = %err, "failed to clear session token");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::auth::token_store::MemoryTokenStore;

    fn overlay_with(store: &Arc<MemoryTokenStore>) -> AuthOverlay {
        let dyn_store: Arc<dyn TokenStore> = Arc::clone(store) as Arc<dyn TokenStore>;
        AuthOverlay::new(dyn_store, 30)
    }

    const GRANT: &str = r#"{"allow":true,"token":"tok-1","permissions":[{"p":[{"d":{"id":"gates"},"p":[{"t":"gates#.*"}]}]}]}"#;

    #[test]
    fn handshake_without_token_requires_login() {
        let store = Arc::new(MemoryTokenStore::new());
        let mut auth = overlay_with(&store);
        assert_eq!(auth.on_handshake(), AuthAction::LoginRequired);
        assert_eq!(auth.state(), AuthState::NoSession);
    }

    #[test]
    fn handshake_replays_stored_token() {
        let store = Arc::new(MemoryTokenStore::with_token(StoredToken::new(
            "abc",
            30,
            Utc::now(),
        )));
        let mut auth = overlay_with(&store);
        assert_eq!(auth.on_handshake(), AuthAction::SendToken("abc".to_string()));
        assert_eq!(auth.state(), AuthState::Authenticating(AuthMethod::Token));
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn expired_token_is_discarded() {
        let store = Arc::new(MemoryTokenStore::with_token(StoredToken::new(
            "abc",
            -1,
            Utc::now(),
        )));
        let mut auth = overlay_with(&store);
        assert_eq!(auth.on_handshake(), AuthAction::LoginRequired);
        assert!(matches!(store.load(), Ok(None)));
    }

    #[test]
    fn incomplete_credentials_are_denied_locally() {
        let store = Arc::new(MemoryTokenStore::new());
        let mut auth = overlay_with(&store);
        assert_eq!(auth.login(Credentials::new("admin", "")), AuthAction::Denied);
        assert_eq!(auth.login(Credentials::from_password("", "pw")), AuthAction::Denied);
        assert_eq!(auth.state(), AuthState::Denied);
    }

    #[test]
    fn password_is_hashed_to_hex() {
        let creds = Credentials::from_password("admin", "admin");
        assert_eq!(
            creds.password_hash(),
            "8c6976e5b5410415bde908bd4dee15dfb167a9c873fc4bb8a81f6f2ab448a918"
        );
        assert!(!format!("{creds:?}").contains("8c69"));
    }

    #[test]
    fn grant_stores_token_and_permissions() {
        let store = Arc::new(MemoryTokenStore::new());
        let mut auth = overlay_with(&store);
        let creds = Credentials::from_password("admin", "admin");
        assert!(matches!(auth.login(creds), AuthAction::SendCredentials(_)));

        assert_eq!(auth.on_authorization(GRANT), Ok(AuthAction::Allowed));
        assert!(auth.is_authenticated());
        assert_eq!(auth.state(), AuthState::Authorized);
        assert!(auth.permissions().has_topic_permission("gates", "list"));
        assert!(matches!(store.load(), Ok(Some(t)) if t.token == "tok-1"));
    }

    #[test]
    fn denial_clears_token() {
        let store = Arc::new(MemoryTokenStore::with_token(StoredToken::new(
            "abc",
            30,
            Utc::now(),
        )));
        let mut auth = overlay_with(&store);
        let _ = auth.on_handshake();
        assert_eq!(
            auth.on_authorization(r#"{"allow":false}"#),
            Ok(AuthAction::Denied)
        );
        assert!(!auth.has_stored_token());
        assert!(matches!(store.load(), Ok(None)));
        assert_eq!(auth.on_handshake(), AuthAction::LoginRequired);
    }

    #[test]
    fn malformed_authorization_is_an_error() {
        let store = Arc::new(MemoryTokenStore::new());
        let mut auth = overlay_with(&store);
        assert!(matches!(
            auth.on_authorization("{oops"),
            Err(ProtocolError::InvalidAuthorization(_))
        ));
        assert_eq!(auth.state(), AuthState::NoSession);
    }

    #[test]
    fn reset_keeps_token_but_drops_session() {
        let store = Arc::new(MemoryTokenStore::new());
        let mut auth = overlay_with(&store);
        let _ = auth.on_authorization(GRANT);
        auth.reset();
        assert!(!auth.is_authenticated());
        assert!(auth.permissions().is_empty());
        assert_eq!(auth.on_handshake(), AuthAction::SendToken("tok-1".to_string()));
    }

    #[test]
    fn logout_forgets_everything() {
        let store = Arc::new(MemoryTokenStore::new());
        let mut auth = overlay_with(&store);
        let _ = auth.on_authorization(GRANT);
        auth.logout();
        assert!(!auth.has_stored_token());
        assert!(auth.permissions().is_empty());
        assert!(matches!(store.load(), Ok(None)));
    }

    #[test]
    fn grant_without_token_authenticates_and_keeps_replay_token() {
        let store = Arc::new(MemoryTokenStore::with_token(StoredToken::new(
            "abc",
            30,
            Utc::now(),
        )));
        let mut auth = overlay_with(&store);
        let _ = auth.on_handshake();
        assert_eq!(
            auth.on_authorization(r#"{"allow":true,"permissions":[]}"#),
            Ok(AuthAction::Allowed)
        );
        assert!(auth.is_authenticated());
        assert!(matches!(store.load(), Ok(Some(t)) if t.token == "abc"));
        assert_eq!(auth.on_handshake(), AuthAction::SendToken("abc".to_string()));
    }

    #[test]
    fn huge_ttl_grant_does_not_panic() {
        let store = Arc::new(MemoryTokenStore::new());
        let dyn_store: Arc<dyn TokenStore> = Arc::clone(&store) as Arc<dyn TokenStore>;
        let mut auth = AuthOverlay::new(dyn_store, 100_000_000);
        assert_eq!(auth.on_authorization(GRANT), Ok(AuthAction::Allowed));
        assert!(matches!(store.load(), Ok(Some(t)) if t.token == "tok-1" && !t.is_expired(Utc::now())));
    }
}
