//! Error types for the messaging core.
//!
//! [`CommError`] is the crate-level error. Each variant carries a numeric
//! category code so UI consumers can decide how loudly to surface it.
//! [`ProtocolError`] covers a single undecodable frame or message; those are
//! logged and dropped by the session and never reach subscribers.

/// Crate-level error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category              |
/// |-----------|-----------------------|
/// | 1000–1999 | Configuration / input |
/// | 2000–2999 | Transport             |
/// | 3000–3999 | Protocol              |
/// | 4000–4999 | Auth / token store    |
#[derive(Debug, thiserror::Error)]
pub enum CommError {
    /// Configuration value is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A subject component is empty or contains a wire separator.
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    /// The WebSocket could not be opened or failed while open.
    #[error("transport error: {0}")]
    Transport(String),

    /// A connection attempt did not reach the open state in time.
    #[error("connection attempt timed out after {timeout_ms} ms")]
    ConnectTimeout {
        /// Configured connect timeout.
        timeout_ms: u64,
    },

    /// Inbound data could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The session token could not be read or written.
    #[error("token store error: {0}")]
    TokenStore(String),

    /// The client driver has stopped and no longer accepts requests.
    #[error("client is shut down")]
    Closed,
}

impl CommError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Config(_) => 1001,
            Self::InvalidSubject(_) => 1002,
            Self::Transport(_) => 2001,
            Self::ConnectTimeout { .. } => 2002,
            Self::Closed => 2003,
            Self::Protocol(_) => 3001,
            Self::TokenStore(_) => 4001,
        }
    }

    /// Returns `true` when the condition clears on its own through the
    /// reconnect loop.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ConnectTimeout { .. } | Self::Protocol(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CommError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<std::io::Error> for CommError {
    fn from(err: std::io::Error) -> Self {
        Self::TokenStore(err.to_string())
    }
}

/// Decode failure for an inbound frame or a single message inside it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The frame carried no encoding flag.
    #[error("empty frame")]
    EmptyFrame,

    /// The encoding flag is neither flat nor compressed.
    #[error("unknown encoding flag {0:?}")]
    UnknownEncoding(char),

    /// The compressed payload could not be expanded.
    #[error("compressed payload could not be decoded")]
    Decompression,

    /// A message inside the frame had no type tag.
    #[error("empty message")]
    EmptyMessage,

    /// The server referenced an alias this connection never minted.
    #[error("unknown alias {0:?}")]
    UnknownAlias(String),

    /// An alias resolved to a key that is not `location|route|topic`.
    #[error("malformed operation key {0:?}")]
    MalformedKey(String),

    /// The JSON payload of a data message did not parse.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The authorization result did not have the expected shape.
    #[error("invalid authorization result: {0}")]
    InvalidAuthorization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_category_ranges() {
        assert_eq!(CommError::Config("x".to_string()).error_code() / 1000, 1);
        assert_eq!(CommError::Transport("x".to_string()).error_code() / 1000, 2);
        assert_eq!(
            CommError::Protocol(ProtocolError::EmptyFrame).error_code() / 1000,
            3
        );
        assert_eq!(CommError::TokenStore("x".to_string()).error_code() / 1000, 4);
    }

    #[test]
    fn transient_only_for_network_and_protocol() {
        assert!(CommError::ConnectTimeout { timeout_ms: 5000 }.is_transient());
        assert!(CommError::Protocol(ProtocolError::Decompression).is_transient());
        assert!(!CommError::InvalidSubject("x".to_string()).is_transient());
        assert!(!CommError::Closed.is_transient());
    }

    #[test]
    fn protocol_error_converts() {
        let err: CommError = ProtocolError::UnknownAlias("7".to_string()).into();
        assert!(err.to_string().contains("unknown alias"));
    }
}
