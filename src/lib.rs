//! # eventstreams-comm
//!
//! Realtime messaging core for the event-streaming console: a reconnecting
//! WebSocket transport, a framed multiplexing protocol with alias
//! compression, a reference-counted subscription registry with deferred
//! unsubscription, and an authentication overlay gating what a subscriber
//! may see or do.
//!
//! ## Architecture
//!
//! ```text
//! UI components
//!     │
//!     ├── Client / Handle / SubscriptionSet (client/)
//!     │        │ Request (mpsc)
//!     ├── Transport driver (ws/)
//!     │
//!     ├── Session (session)
//!     │     ├── AuthOverlay (auth/)
//!     │     ├── SubscriptionRegistry (registry/)
//!     │     └── Codec (protocol/)
//!     │
//!     └── EventBus (domain/)
//! ```
//!
//! Everything below the driver is sans-IO: inputs carry an explicit
//! `Instant`, timers are exposed through `poll_timeout`/`handle_timeout`
//! and outbound frames through `poll_transmit`.

pub mod auth;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod ws;

pub use client::{BindingSink, Client, Handle, SubscriptionSet};
pub use config::ClientConfig;
pub use domain::{SessionEvent, Subject, Update};
pub use error::{CommError, ProtocolError};
pub use registry::Callback;
