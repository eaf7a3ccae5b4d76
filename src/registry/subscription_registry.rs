//! Reference-counted subscription registry.
//!
//! One entry per [`Subject`] of interest. The first callback for a subject
//! creates the entry (the caller then sends `Subscribe`); an entry whose
//! last callback leaves is parked in a pending-removal set and only
//! dropped by a later sweep if it is still empty after the grace window.
//! The last update per subject is cached for late joiners.
//!
//! Subjects handed to the registry are already resolved: `"local"` never
//! appears here.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::callback::Callback;
use crate::config::ClientConfig;
use crate::domain::{Subject, Update};

/// Sweep timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Delay between sweeps while removals are pending.
    pub sweep_interval: Duration,
    /// Minimum time an entry stays empty before it is dropped.
    pub unsubscribe_grace: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for RegistrySettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            sweep_interval: config.sweep_interval,
            unsubscribe_grace: config.unsubscribe_grace,
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    callbacks: Vec<Callback>,
    last: Option<Update>,
}

/// Subject to callbacks map with cache and deferred removal.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    settings: RegistrySettings,
    entries: HashMap<Subject, Entry>,
    pending_removal: HashMap<Subject, Instant>,
    sweep_at: Option<Instant>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            settings,
            entries: HashMap::new(),
            pending_removal: HashMap::new(),
            sweep_at: None,
        }
    }

    /// Registers `callback` for `subject`, replaying the cached value to
    /// it synchronously. Returns `true` if the entry was newly created and
    /// a `Subscribe` must go out.
    pub fn subscribe(&mut self, subject: &Subject, callback: Callback) -> bool {
        let newly_created = !self.entries.contains_key(subject);
        let entry = self.entries.entry(subject.clone()).or_default();
        if newly_created {
            tracing::debug!(%subject, "server subscription");
        }
        if self.pending_removal.remove(subject).is_some() {
            tracing::debug!(%subject, "live again, removal cancelled");
        }

        let cached = entry.last.clone();
        if !entry.callbacks.contains(&callback) {
            entry.callbacks.push(callback.clone());
            tracing::debug!(%subject, listeners = entry.callbacks.len(), "new interest");
        }
        if let Some(update) = cached {
            tracing::debug!(%subject, tag = %update.tag, "replaying cached update");
            callback.call(&update);
        }
        newly_created
    }

    /// Removes `callback` from `subject`. An entry left empty is scheduled
    /// for removal rather than dropped.
    pub fn unsubscribe(&mut self, subject: &Subject, callback: &Callback, now: Instant) {
        let Some(entry) = self.entries.get_mut(subject) else {
            return;
        };
        entry.callbacks.retain(|c| c != callback);
        tracing::debug!(%subject, remaining = entry.callbacks.len(), "listener gone");

        if entry.callbacks.is_empty() {
            tracing::debug!(%subject, "scheduled for removal");
            self.pending_removal.entry(subject.clone()).or_insert(now);
            if self.sweep_at.is_none() {
                self.sweep_at = Some(now + self.settings.sweep_interval);
            }
        }
    }

    /// Caches `update` and fans it out to every callback for `subject`, in
    /// registration order. Updates for subjects with no entry are dropped.
    pub fn dispatch(&mut self, subject: &Subject, update: Update) {
        let Some(entry) = self.entries.get_mut(subject) else {
            tracing::debug!(%subject, "update for subject without interest");
            return;
        };
        for callback in &entry.callbacks {
            callback.call(&update);
        }
        entry.last = Some(update);
    }

    /// Drops every pending entry that has been empty for at least the
    /// grace window, returning the subjects that need `Unsubscribe`.
    pub fn sweep(&mut self, now: Instant) -> Vec<Subject> {
        let grace = self.settings.unsubscribe_grace;
        let mut expired = Vec::new();
        let mut remainder = HashMap::new();

        for (subject, since) in self.pending_removal.drain() {
            if now.saturating_duration_since(since) < grace {
                remainder.insert(subject, since);
                continue;
            }
            let still_empty = self
                .entries
                .get(&subject)
                .is_none_or(|e| e.callbacks.is_empty());
            if still_empty && self.entries.remove(&subject).is_some() {
                tracing::debug!(%subject, "unsubscribing from server");
                expired.push(subject);
            }
        }

        self.sweep_at = if remainder.is_empty() {
            None
        } else {
            Some(now + self.settings.sweep_interval)
        };
        self.pending_removal = remainder;
        expired.sort();
        expired
    }

    /// When the next sweep is due.
    #[must_use]
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.sweep_at
    }

    /// Runs the sweep if it is due.
    pub fn handle_timeout(&mut self, now: Instant) -> Vec<Subject> {
        match self.sweep_at {
            Some(due) if now >= due => self.sweep(now),
            _ => Vec::new(),
        }
    }

    /// Forgets all entries, caches and pending removals.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.pending_removal.clear();
        self.sweep_at = None;
    }

    /// Number of live entries, including ones pending removal.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of callbacks registered for `subject`.
    #[must_use]
    pub fn listener_count(&self, subject: &Subject) -> usize {
        self.entries.get(subject).map_or(0, |e| e.callbacks.len())
    }

    /// Last update cached for `subject`.
    #[must_use]
    pub fn cached(&self, subject: &Subject) -> Option<&Update> {
        self.entries.get(subject).and_then(|e| e.last.as_ref())
    }

    /// Returns `true` if `subject` is waiting for a sweep.
    #[must_use]
    pub fn is_pending_removal(&self, subject: &Subject) -> bool {
        self.pending_removal.contains_key(subject)
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}
