//! Subscription registry: reference-counted interest per subject, cached
//! last values and deferred unsubscription.

pub mod callback;
pub mod subscription_registry;

pub use callback::{Callback, Listener};
pub use subscription_registry::{RegistrySettings, SubscriptionRegistry};
