//! Per-component facade handle.
//!
//! A [`Handle`] remembers what it subscribed so that [`Handle::stop`] can
//! withdraw every callback before detaching its listeners. All calls are
//! non-blocking: they enqueue a [`Request`] for the driver task. Calls on a
//! stopped handle, or after the client shut down, are ignored.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::auth::PermissionSet;
use crate::domain::{HandleId, Subject};
use crate::registry::{Callback, Listener};
use crate::session::{Request, SessionShared};

/// The interface surface a UI component holds.
#[derive(Debug)]
pub struct Handle {
    id: HandleId,
    requests: mpsc::UnboundedSender<Request>,
    shared: Arc<SessionShared>,
    active: Mutex<Vec<(Subject, Callback)>>,
    stopped: AtomicBool,
}

impl Handle {
    pub(crate) fn new(requests: mpsc::UnboundedSender<Request>, shared: Arc<SessionShared>) -> Self {
        Self {
            id: HandleId::new(),
            requests,
            shared,
            active: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// This handle's identifier.
    #[must_use]
    pub const fn id(&self) -> HandleId {
        self.id
    }

    fn enqueue(&self, request: Request) -> bool {
        if self.requests.send(request).is_err() {
            tracing::debug!(handle = %self.id, "client stopped, request dropped");
            return false;
        }
        true
    }

    /// Registers `callback` for `subject`. Before the handshake the
    /// session ignores the call; open listeners are the place to re-issue.
    pub fn subscribe(&self, subject: &Subject, callback: &Callback) {
        if self.is_stopped() {
            return;
        }
        {
            let mut active = self.active.lock();
            if !active.iter().any(|(s, c)| s == subject && c == callback) {
                active.push((subject.clone(), callback.clone()));
            }
        }
        let _ = self.enqueue(Request::Subscribe {
            subject: subject.clone(),
            callback: callback.clone(),
        });
    }

    /// Withdraws `callback` from `subject`.
    pub fn unsubscribe(&self, subject: &Subject, callback: &Callback) {
        self.active
            .lock()
            .retain(|(s, c)| !(s == subject && c == callback));
        let _ = self.enqueue(Request::Unsubscribe {
            subject: subject.clone(),
            callback: callback.clone(),
        });
    }

    /// Sends a command. Returns `false` if the session is not handshaked.
    pub fn command(&self, subject: &Subject, data: Option<Value>) -> bool {
        if self.is_stopped() || !self.shared.is_handshaked() {
            return false;
        }
        self.enqueue(Request::Command {
            subject: subject.clone(),
            data,
        })
    }

    /// Handshaked and authorized.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Runs `f` every time access is granted.
    pub fn add_open_listener(&self, f: impl Fn() + Send + Sync + 'static) {
        if self.is_stopped() {
            return;
        }
        let _ = self.enqueue(Request::AddOpenListener {
            handle: self.id,
            listener: Listener::new(f),
        });
    }

    /// Runs `f` every time an established session is lost.
    pub fn add_close_listener(&self, f: impl Fn() + Send + Sync + 'static) {
        if self.is_stopped() {
            return;
        }
        let _ = self.enqueue(Request::AddCloseListener {
            handle: self.id,
            listener: Listener::new(f),
        });
    }

    /// Unsubscribes everything still active and detaches listeners.
    /// Further calls are no-ops.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let active = std::mem::take(&mut *self.active.lock());
        tracing::debug!(handle = %self.id, subscriptions = active.len(), "stopping handle");
        for (subject, callback) in active {
            let _ = self.enqueue(Request::Unsubscribe { subject, callback });
        }
        let _ = self.enqueue(Request::RemoveListeners(self.id));
    }

    /// `true` after [`Handle::stop`].
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Number of `(subject, callback)` pairs currently held.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.active.lock().len()
    }

    /// See [`PermissionSet::has_topic_permission`].
    #[must_use]
    pub fn has_topic_permission(&self, route: &str, topic: &str) -> bool {
        self.shared.permissions().has_topic_permission(route, topic)
    }

    /// See [`PermissionSet::has_subject_permission`].
    #[must_use]
    pub fn has_subject_permission(&self, subject: &Subject) -> bool {
        self.shared.permissions().has_subject_permission(subject)
    }

    /// See [`PermissionSet::has_domain_permission`].
    #[must_use]
    pub fn has_domain_permission(&self, domain: &str) -> bool {
        self.shared.permissions().has_domain_permission(domain)
    }

    /// Current permission set.
    #[must_use]
    pub fn permissions(&self) -> Arc<PermissionSet> {
        self.shared.permissions()
    }
}
