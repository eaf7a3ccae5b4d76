//! Session: one logical server connection's worth of state.
//!
//! [`Session`] composes the codec, the auth overlay and the subscription
//! registry, and is the single place where their resets are ordered. It
//! is sans-IO: the transport driver feeds it socket events, frames,
//! facade requests and the current time, then drains
//! [`Session::poll_transmit`] and sleeps until [`Session::poll_timeout`].
//!
//! Facade handles live on other tasks. They read connectivity through
//! [`SessionShared`] and talk to the session with [`Request`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;

use crate::auth::{AuthAction, AuthOverlay, Credentials, PermissionSet, TokenStore};
use crate::config::ClientConfig;
use crate::domain::{EventBus, HandleId, SessionEvent, Subject};
use crate::protocol::{Codec, CodecSettings, InboundEvent, Operation};
use crate::registry::{Callback, Listener, RegistrySettings, SubscriptionRegistry};

/// Connectivity and permissions readable from any thread.
#[derive(Debug)]
pub struct SessionShared {
    handshaked: AtomicBool,
    authenticated: AtomicBool,
    permissions: watch::Sender<Arc<PermissionSet>>,
}

impl SessionShared {
    fn new() -> Self {
        let (permissions, _) = watch::channel(Arc::new(PermissionSet::default()));
        Self {
            handshaked: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
            permissions,
        }
    }

    /// Socket open and local address assigned.
    #[must_use]
    pub fn is_handshaked(&self) -> bool {
        self.handshaked.load(Ordering::Acquire)
    }

    /// Handshaked and authorized.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.is_handshaked() && self.authenticated.load(Ordering::Acquire)
    }

    /// Snapshot of the current permission set.
    #[must_use]
    pub fn permissions(&self) -> Arc<PermissionSet> {
        Arc::clone(&self.permissions.borrow())
    }

    /// Watches permission set replacements.
    #[must_use]
    pub fn watch_permissions(&self) -> watch::Receiver<Arc<PermissionSet>> {
        self.permissions.subscribe()
    }
}

/// A facade call routed to the session.
#[derive(Debug)]
pub enum Request {
    /// Register a callback for a subject.
    Subscribe {
        /// Subject, possibly on the `"local"` address.
        subject: Subject,
        /// Receiver of updates.
        callback: Callback,
    },
    /// Remove a callback from a subject.
    Unsubscribe {
        /// Subject, possibly on the `"local"` address.
        subject: Subject,
        /// The callback passed to `Subscribe`.
        callback: Callback,
    },
    /// Fire-and-forget command.
    Command {
        /// Target subject.
        subject: Subject,
        /// Optional JSON body.
        data: Option<Value>,
    },
    /// Credential login.
    Login(Credentials),
    /// Drop the session token and reconnect.
    Logout,
    /// Register an access-granted listener.
    AddOpenListener {
        /// Owning handle.
        handle: HandleId,
        /// Listener.
        listener: Listener,
    },
    /// Register a session-lost listener.
    AddCloseListener {
        /// Owning handle.
        handle: HandleId,
        /// Listener.
        listener: Listener,
    },
    /// Detach every listener a handle registered.
    RemoveListeners(HandleId),
    /// Stop the driver.
    Shutdown,
}

/// Codec, auth overlay and registry for one logical connection.
#[derive(Debug)]
pub struct Session {
    codec: Codec,
    auth: AuthOverlay,
    registry: SubscriptionRegistry,
    events: EventBus,
    shared: Arc<SessionShared>,
    open_listeners: Vec<(HandleId, Listener)>,
    close_listeners: Vec<(HandleId, Listener)>,
    transport_open: bool,
    reconnect_requested: bool,
}

impl Session {
    /// Builds a session; the stored token is read here.
    #[must_use]
    pub fn new(config: &ClientConfig, store: Arc<dyn TokenStore>, events: EventBus) -> Self {
        Self {
            codec: Codec::new(CodecSettings::from(config)),
            auth: AuthOverlay::new(store, config.token_ttl_days),
            registry: SubscriptionRegistry::new(RegistrySettings::from(config)),
            events,
            shared: Arc::new(SessionShared::new()),
            open_listeners: Vec::new(),
            close_listeners: Vec::new(),
            transport_open: false,
            reconnect_requested: false,
        }
    }

    /// State shared with facade handles.
    #[must_use]
    pub fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    /// Lifecycle event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Wire codec.
    #[must_use]
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Auth overlay.
    #[must_use]
    pub fn auth(&self) -> &AuthOverlay {
        &self.auth
    }

    /// Subscription registry.
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    // --- transport inputs ---

    /// A connection attempt started.
    pub fn on_connecting(&mut self, attempt: u32) {
        self.events.publish(SessionEvent::Connecting {
            attempt,
            timestamp: Utc::now(),
        });
    }

    /// The socket opened; the handshake goes out immediately.
    pub fn on_connected(&mut self) {
        self.transport_open = true;
        self.codec.on_connected();
        self.events.publish(SessionEvent::Connected {
            timestamp: Utc::now(),
        });
    }

    /// The socket closed. Codec state is always connection-scoped; auth
    /// and registry state are only dropped if the session had been open.
    pub fn on_disconnected(&mut self, was_open: bool) {
        self.transport_open = false;
        self.reconnect_requested = false;
        self.codec.on_disconnected();
        if was_open {
            self.auth.reset();
            self.registry.reset();
        }
        self.sync_shared();
        self.events.publish(SessionEvent::Disconnected {
            was_open,
            timestamp: Utc::now(),
        });
        if was_open {
            for (_, listener) in &self.close_listeners {
                listener.call();
            }
        }
    }

    /// A text frame arrived.
    pub fn on_frame(&mut self, raw: &str, now: Instant) {
        let inbound = match self.codec.decode_frame(raw) {
            Ok(inbound) => inbound,
            Err(err) => {
                tracing::warn!(error = %err, "dropping inbound frame");
                return;
            }
        };
        for event in inbound {
            self.on_inbound(event, now);
        }
    }

    fn on_inbound(&mut self, event: InboundEvent, now: Instant) {
        match event {
            InboundEvent::HandshakeCompleted { local_address } => {
                tracing::info!(%local_address, "handshake completed");
                self.sync_shared();
                self.events.publish(SessionEvent::HandshakeCompleted {
                    local_address,
                    timestamp: Utc::now(),
                });
                let action = self.auth.on_handshake();
                self.apply_auth(action, now);
            }
            InboundEvent::Authorization(raw) => match self.auth.on_authorization(&raw) {
                Ok(action) => self.apply_auth(action, now),
                Err(err) => tracing::warn!(error = %err, "dropping authorization message"),
            },
            InboundEvent::Data { subject, update } => self.registry.dispatch(&subject, update),
        }
    }

    fn apply_auth(&mut self, action: AuthAction, now: Instant) {
        match action {
            AuthAction::SendToken(token) => {
                self.codec.send_token_auth(&token, now);
                self.events.publish(SessionEvent::LoginPending {
                    timestamp: Utc::now(),
                });
            }
            AuthAction::SendCredentials(credentials) => {
                self.codec.send_credentials_auth(
                    credentials.user(),
                    credentials.password_hash(),
                    now,
                );
                self.events.publish(SessionEvent::LoginPending {
                    timestamp: Utc::now(),
                });
            }
            AuthAction::LoginRequired => {
                self.sync_shared();
                self.events.publish(SessionEvent::LoginRequired {
                    timestamp: Utc::now(),
                });
            }
            AuthAction::Allowed => {
                self.sync_shared();
                self.events.publish(SessionEvent::PermissionsChanged {
                    domains: self.auth.permissions().domains().to_vec(),
                    timestamp: Utc::now(),
                });
                self.events.publish(SessionEvent::AccessAllowed {
                    timestamp: Utc::now(),
                });
                for (_, listener) in &self.open_listeners {
                    listener.call();
                }
            }
            AuthAction::Denied => {
                self.sync_shared();
                self.events.publish(SessionEvent::AccessDenied {
                    timestamp: Utc::now(),
                });
            }
        }
    }

    fn sync_shared(&self) {
        self.shared
            .handshaked
            .store(self.codec.is_handshaked(), Ordering::Release);
        self.shared
            .authenticated
            .store(self.auth.is_authenticated(), Ordering::Release);
        let next = self.auth.permissions();
        self.shared.permissions.send_if_modified(|current| {
            if Arc::ptr_eq(current, next) {
                false
            } else {
                *current = Arc::clone(next);
                true
            }
        });
    }

    // --- facade inputs ---

    /// Applies a facade request. `Shutdown` is the driver's business and
    /// is ignored here.
    pub fn apply(&mut self, request: Request, now: Instant) {
        match request {
            Request::Subscribe { subject, callback } => {
                let _ = self.subscribe(&subject, callback, now);
            }
            Request::Unsubscribe { subject, callback } => {
                self.unsubscribe(&subject, &callback, now);
            }
            Request::Command { subject, data } => {
                let _ = self.command(&subject, data, now);
            }
            Request::Login(credentials) => self.login(credentials, now),
            Request::Logout => self.logout(),
            Request::AddOpenListener { handle, listener } => {
                self.open_listeners.push((handle, listener));
            }
            Request::AddCloseListener { handle, listener } => {
                self.close_listeners.push((handle, listener));
            }
            Request::RemoveListeners(handle) => self.remove_listeners(handle),
            Request::Shutdown => {}
        }
    }

    /// Registers interest. Ignored (returns `false`) before the handshake,
    /// since `"local"` cannot be resolved yet and handles re-subscribe on
    /// access granted.
    pub fn subscribe(&mut self, subject: &Subject, callback: Callback, now: Instant) -> bool {
        if !self.codec.is_handshaked() {
            tracing::debug!(%subject, "subscribe before handshake ignored");
            return false;
        }
        let Some(resolved) = self.codec.resolve(subject) else {
            return false;
        };
        if self.registry.subscribe(&resolved, callback) {
            let _ = self.codec.send(&resolved, Operation::Subscribe, now);
        }
        true
    }

    /// Withdraws interest; the server is told only after the grace window.
    pub fn unsubscribe(&mut self, subject: &Subject, callback: &Callback, now: Instant) {
        let Some(resolved) = self.codec.resolve(subject) else {
            return;
        };
        self.registry.unsubscribe(&resolved, callback, now);
    }

    /// Sends a command. Returns `false` before the handshake.
    pub fn command(&mut self, subject: &Subject, data: Option<Value>, now: Instant) -> bool {
        let sent = self.codec.send(subject, Operation::Command(data), now);
        if !sent {
            tracing::debug!(%subject, "command dropped, connection not handshaked");
        }
        sent
    }

    /// Starts a credential login.
    pub fn login(&mut self, credentials: Credentials, now: Instant) {
        let action = self.auth.login(credentials);
        self.apply_auth(action, now);
    }

    /// Drops token and permissions. An open socket is recycled so that the
    /// server forgets the session too.
    pub fn logout(&mut self) {
        self.auth.logout();
        self.sync_shared();
        self.events.publish(SessionEvent::PermissionsChanged {
            domains: Vec::new(),
            timestamp: Utc::now(),
        });
        if self.transport_open {
            self.reconnect_requested = true;
        }
    }

    /// Returns `true` once after a logout asked for the socket to be
    /// recycled.
    pub fn take_reconnect_request(&mut self) -> bool {
        std::mem::take(&mut self.reconnect_requested)
    }

    /// Detaches all listeners of `handle`.
    pub fn remove_listeners(&mut self, handle: HandleId) {
        self.open_listeners.retain(|(id, _)| *id != handle);
        self.close_listeners.retain(|(id, _)| *id != handle);
    }

    // --- timers ---

    /// Earliest pending deadline across batching and sweeping.
    #[must_use]
    pub fn poll_timeout(&self) -> Option<Instant> {
        match (self.codec.poll_timeout(), self.registry.poll_timeout()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Runs whatever is due at `now`.
    pub fn handle_timeout(&mut self, now: Instant) {
        for subject in self.registry.handle_timeout(now) {
            let _ = self.codec.send(&subject, Operation::Unsubscribe, now);
        }
        self.codec.handle_timeout(now);
    }

    /// Next frame for the socket.
    pub fn poll_transmit(&mut self) -> Option<String> {
        self.codec.poll_transmit()
    }
}
