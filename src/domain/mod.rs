//! Domain layer: subjects, updates, and the session event system.
//!
//! These types are shared by every layer above the transport: the codec
//! resolves aliases into [`Subject`]s, the registry caches [`Update`]s per
//! subject, and lifecycle transitions are broadcast as [`SessionEvent`]s.

pub mod event_bus;
pub mod handle_id;
pub mod session_event;
pub mod subject;
pub mod update;

pub use event_bus::EventBus;
pub use handle_id::HandleId;
pub use session_event::SessionEvent;
pub use subject::{LOCAL_ADDRESS, Subject};
pub use update::{STALE_TAG, Update};
