//! Subscriber and lifecycle callbacks.
//!
//! Both wrappers compare by pointer identity: cloning a [`Callback`] yields
//! the same subscriber, two separately built closures never are.

use std::fmt;
use std::sync::Arc;

use crate::domain::Update;

type UpdateFn = dyn Fn(&Update) + Send + Sync;
type ListenerFn = dyn Fn() + Send + Sync;

/// Receives `(type, payload)` updates for one subject.
#[derive(Clone)]
pub struct Callback(Arc<UpdateFn>);

impl Callback {
    /// Wraps a closure.
    pub fn new(f: impl Fn(&Update) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invokes the callback.
    pub fn call(&self, update: &Update) {
        (self.0)(update);
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl Eq for Callback {}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Arc::as_ptr(&self.0))
    }
}

/// Fires on access granted (open) or session lost (close).
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    /// Wraps a closure.
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invokes the listener.
    pub fn call(&self) {
        (self.0)();
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::Value;

    use super::*;

    #[test]
    fn clones_are_equal_distinct_closures_are_not() {
        let a = Callback::new(|_| {});
        let b = Callback::new(|_| {});
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn call_forwards_update() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let cb = Callback::new(move |u| {
            if u.tag == 'U' {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        cb.call(&Update::new('U', Value::Null));
        cb.call(&Update::new('D', Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
