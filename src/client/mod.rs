//! Component binding facade.
//!
//! [`Client`] starts the transport driver and hands out [`Handle`]s;
//! [`SubscriptionSet`] layers declarative reconciliation on top of a
//! handle.

pub mod binding;
pub mod handle;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

pub use binding::{BindingSink, SubscriptionSet};
pub use handle::Handle;

use crate::auth::{Credentials, FileTokenStore, MemoryTokenStore, PermissionSet, TokenStore};
use crate::config::ClientConfig;
use crate::domain::{EventBus, SessionEvent};
use crate::error::CommError;
use crate::session::{Request, Session, SessionShared};
use crate::ws::run_driver;

/// Owner of the driver task for one server connection.
#[derive(Debug)]
pub struct Client {
    requests: mpsc::UnboundedSender<Request>,
    shared: Arc<SessionShared>,
    events: EventBus,
    driver: JoinHandle<()>,
}

impl Client {
    /// Spawns the driver on the current tokio runtime and starts
    /// connecting.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn connect(config: ClientConfig, store: Arc<dyn TokenStore>) -> Self {
        install_crypto_provider();
        let events = EventBus::new(config.event_bus_capacity);
        let session = Session::new(&config, store, events.clone());
        let shared = Arc::clone(session.shared());
        let (requests, rx) = mpsc::unbounded_channel();

        tracing::info!(endpoint = %config.endpoint, "starting client");
        let driver = tokio::spawn(run_driver(config, session, rx));

        Self {
            requests,
            shared,
            events,
            driver,
        }
    }

    /// Like [`Client::connect`], picking the token store from the config:
    /// a file when `token_file` is set, memory otherwise.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn from_config(config: ClientConfig) -> Self {
        let store: Arc<dyn TokenStore> = match &config.token_file {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        Self::connect(config, store)
    }

    /// A new facade handle.
    #[must_use]
    pub fn handle(&self) -> Handle {
        Handle::new(self.requests.clone(), Arc::clone(&self.shared))
    }

    /// Binds `sink` to a fresh handle.
    #[must_use]
    pub fn bind(&self, sink: Arc<dyn BindingSink>) -> SubscriptionSet {
        SubscriptionSet::new(self.handle(), sink)
    }

    /// Subscribes to lifecycle events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Watches permission set replacements.
    #[must_use]
    pub fn watch_permissions(&self) -> watch::Receiver<Arc<PermissionSet>> {
        self.shared.watch_permissions()
    }

    /// Handshaked and authorized.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Current permission set.
    #[must_use]
    pub fn permissions(&self) -> Arc<PermissionSet> {
        self.shared.permissions()
    }

    /// Starts a credential login; the outcome arrives as an
    /// `AccessAllowed` or `AccessDenied` event.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Closed`] if the driver has stopped.
    pub fn login(&self, credentials: Credentials) -> Result<(), CommError> {
        self.send(Request::Login(credentials))
    }

    /// Drops the session token and recycles the connection.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Closed`] if the driver has stopped.
    pub fn logout(&self) -> Result<(), CommError> {
        self.send(Request::Logout)
    }

    fn send(&self, request: Request) -> Result<(), CommError> {
        self.requests.send(request).map_err(|_| CommError::Closed)
    }

    /// Stops the driver and waits for the socket to close.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Closed`] if the driver task panicked or was
    /// already gone.
    pub async fn shutdown(self) -> Result<(), CommError> {
        let _ = self.requests.send(Request::Shutdown);
        self.driver.await.map_err(|_| CommError::Closed)
    }
}

/// Makes ring the process-wide rustls provider for `wss://` endpoints.
/// A provider installed earlier by the host application wins.
fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
