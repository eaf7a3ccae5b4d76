//! Session lifecycle events.
//!
//! Every transport, handshake and authorization transition emits a
//! [`SessionEvent`] through the [`super::EventBus`]. Connectivity
//! indicators, the login screen and notifications consume these.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle event published by the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A connection attempt started.
    Connecting {
        /// 1-based attempt counter since the last successful open.
        attempt: u32,
        /// Time the attempt started.
        timestamp: DateTime<Utc>,
    },

    /// The socket reached the open state; the handshake has been sent.
    Connected {
        /// Time the socket opened.
        timestamp: DateTime<Utc>,
    },

    /// The socket closed.
    Disconnected {
        /// `true` if an established session was lost, `false` if the
        /// attempt never opened.
        was_open: bool,
        /// Time of the close.
        timestamp: DateTime<Utc>,
    },

    /// The server assigned this client its local address.
    HandshakeCompleted {
        /// Address `"local"` now resolves to.
        local_address: String,
        /// Time of the assignment.
        timestamp: DateTime<Utc>,
    },

    /// An authentication request is in flight.
    LoginPending {
        /// Time the request was queued.
        timestamp: DateTime<Utc>,
    },

    /// No stored token exists; credentials are needed.
    LoginRequired {
        /// Time the requirement was detected.
        timestamp: DateTime<Utc>,
    },

    /// The server granted access.
    AccessAllowed {
        /// Time of the grant.
        timestamp: DateTime<Utc>,
    },

    /// The server (or local validation) denied access.
    AccessDenied {
        /// Time of the denial.
        timestamp: DateTime<Utc>,
    },

    /// A new permission set was ingested.
    PermissionsChanged {
        /// Domains now allowed.
        domains: Vec<String>,
        /// Time of the change.
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::Connecting { .. } => "connecting",
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::HandshakeCompleted { .. } => "handshake_completed",
            Self::LoginPending { .. } => "login_pending",
            Self::LoginRequired { .. } => "login_required",
            Self::AccessAllowed { .. } => "access_allowed",
            Self::AccessDenied { .. } => "access_denied",
            Self::PermissionsChanged { .. } => "permissions_changed",
        }
    }

    /// Returns the timestamp carried by every variant.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Connecting { timestamp, .. }
            | Self::Connected { timestamp }
            | Self::Disconnected { timestamp, .. }
            | Self::HandshakeCompleted { timestamp, .. }
            | Self::LoginPending { timestamp }
            | Self::LoginRequired { timestamp }
            | Self::AccessAllowed { timestamp }
            | Self::AccessDenied { timestamp }
            | Self::PermissionsChanged { timestamp, .. } => *timestamp,
        }
    }
}
