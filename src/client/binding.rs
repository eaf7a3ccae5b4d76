//! Declarative subscription lists for components.
//!
//! A component recomputes the subjects it wants from its inputs and hands
//! them to [`SubscriptionSet::reconcile`]; only the symmetric difference
//! turns into `subscribe`/`unsubscribe` calls. The set re-issues its whole
//! list when access is granted (the registry was wiped by the disconnect)
//! and tracks a stale flag per subject for the sink.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::Handle;
use crate::domain::{Subject, Update};
use crate::registry::Callback;

/// Receiver of everything a bound component renders.
pub trait BindingSink: Send + Sync + 'static {
    /// A non-stale update arrived for `subject`.
    fn on_data(&self, subject: &Subject, update: &Update);

    /// The stale flag of `subject` flipped.
    fn on_stale_changed(&self, _subject: &Subject, _stale: bool) {}

    /// Access was granted (`true`) or the session was lost (`false`).
    fn on_connectivity_changed(&self, _connected: bool) {}
}

#[derive(Debug)]
struct Bound {
    callback: Callback,
    stale: Arc<Mutex<bool>>,
}

#[derive(Debug, Default)]
struct BindingState {
    active: Vec<(Subject, Bound)>,
    connected: bool,
    stopped: bool,
}

/// A component's reconciled subscription list.
pub struct SubscriptionSet {
    handle: Arc<Handle>,
    state: Arc<Mutex<BindingState>>,
    sink: Arc<dyn BindingSink>,
}

impl std::fmt::Debug for SubscriptionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSet")
            .field("handle", &self.handle.id())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SubscriptionSet {
    /// Binds `sink` to `handle` and wires the lifecycle listeners.
    pub fn new(handle: Handle, sink: Arc<dyn BindingSink>) -> Self {
        let handle = Arc::new(handle);
        let state = Arc::new(Mutex::new(BindingState {
            connected: handle.connected(),
            ..BindingState::default()
        }));

        {
            let handle_ref = Arc::clone(&handle);
            let state_ref = Arc::clone(&state);
            let sink_ref = Arc::clone(&sink);
            handle.add_open_listener(move || {
                let subscriptions: Vec<(Subject, Callback)> = {
                    let mut st = state_ref.lock();
                    st.connected = true;
                    st.active
                        .iter()
                        .map(|(s, b)| (s.clone(), b.callback.clone()))
                        .collect()
                };
                tracing::debug!(count = subscriptions.len(), "re-issuing subscriptions");
                for (subject, callback) in &subscriptions {
                    handle_ref.subscribe(subject, callback);
                }
                sink_ref.on_connectivity_changed(true);
            });
        }
        {
            let state_ref = Arc::clone(&state);
            let sink_ref = Arc::clone(&sink);
            handle.add_close_listener(move || {
                state_ref.lock().connected = false;
                sink_ref.on_connectivity_changed(false);
            });
        }

        Self {
            handle,
            state,
            sink,
        }
    }

    /// Brings the active list to `desired`, issuing only the difference.
    /// Duplicates in `desired` are ignored.
    pub fn reconcile(&self, desired: &[Subject]) {
        let mut st = self.state.lock();
        if st.stopped {
            return;
        }

        let mut removed = Vec::new();
        st.active.retain(|(subject, bound)| {
            let keep = desired.contains(subject);
            if !keep {
                removed.push((subject.clone(), bound.callback.clone()));
            }
            keep
        });

        let mut added = Vec::new();
        for subject in desired {
            if st.active.iter().any(|(s, _)| s == subject) {
                continue;
            }
            let bound = self.bind(subject);
            added.push((subject.clone(), bound.callback.clone()));
            st.active.push((subject.clone(), bound));
        }
        drop(st);

        if !removed.is_empty() || !added.is_empty() {
            tracing::debug!(
                handle = %self.handle.id(),
                removed = removed.len(),
                added = added.len(),
                "reconciling subscriptions"
            );
        }
        for (subject, callback) in &removed {
            self.handle.unsubscribe(subject, callback);
        }
        for (subject, callback) in &added {
            self.handle.subscribe(subject, callback);
        }
    }

    fn bind(&self, subject: &Subject) -> Bound {
        let stale = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&stale);
        let sink = Arc::clone(&self.sink);
        let key = subject.clone();
        let callback = Callback::new(move |update: &Update| {
            let became = update.is_stale();
            let changed = {
                let mut current = flag.lock();
                let changed = *current != became;
                *current = became;
                changed
            };
            if changed {
                sink.on_stale_changed(&key, became);
            }
            if !became {
                sink.on_data(&key, update);
            }
        });
        Bound { callback, stale }
    }

    /// Subjects currently bound, in bind order.
    #[must_use]
    pub fn subjects(&self) -> Vec<Subject> {
        self.state.lock().active.iter().map(|(s, _)| s.clone()).collect()
    }

    /// Stale flag for `subject`; `false` if it is not bound.
    #[must_use]
    pub fn is_stale(&self, subject: &Subject) -> bool {
        self.state
            .lock()
            .active
            .iter()
            .find(|(s, _)| s == subject)
            .is_some_and(|(_, b)| *b.stale.lock())
    }

    /// Local connectivity flag, driven by open/close listeners.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// The underlying handle, e.g. for commands.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Snapshot of stale flags keyed by subject.
    #[must_use]
    pub fn stale_flags(&self) -> HashMap<Subject, bool> {
        self.state
            .lock()
            .active
            .iter()
            .map(|(s, b)| (s.clone(), *b.stale.lock()))
            .collect()
    }

    /// Unsubscribes every bound subject and detaches. Idempotent.
    pub fn stop(&self) {
        {
            let mut st = self.state.lock();
            if st.stopped {
                return;
            }
            st.stopped = true;
            st.active.clear();
            st.connected = false;
        }
        self.handle.stop();
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.stop();
    }
}
