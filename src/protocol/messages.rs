//! Wire message shapes: outbound requests and raw inbound messages.

use serde_json::Value;

use super::frame::FIELD_SEPARATOR;
use crate::error::ProtocolError;

/// Outbound: handshake request.
pub const TAG_HANDSHAKE: char = 'H';
/// Outbound: define an operation alias.
pub const TAG_OPERATION_ALIAS: char = 'A';
/// Outbound: define a location alias.
pub const TAG_LOCATION_ALIAS: char = 'B';
/// Outbound: subscribe to an aliased subject.
pub const TAG_SUBSCRIBE: char = 'S';
/// Outbound: unsubscribe from an aliased subject.
pub const TAG_UNSUBSCRIBE: char = 'U';
/// Outbound: fire-and-forget command.
pub const TAG_COMMAND: char = 'C';
/// Outbound: authenticate with a session token.
pub const TAG_TOKEN_AUTH: char = 'T';
/// Outbound: authenticate with user name and password hash.
pub const TAG_CREDENTIALS_AUTH: char = 'X';

/// Inbound: server-assigned local address.
pub const TAG_LOCAL_ADDRESS: char = 'L';
/// Inbound: authorization result.
pub const TAG_AUTHORIZATION: char = 'A';

/// Operation on an aliased subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Start receiving updates.
    Subscribe,
    /// Stop receiving updates.
    Unsubscribe,
    /// Send a command with an optional JSON body.
    Command(Option<Value>),
}

impl Operation {
    /// Wire tag for this operation.
    #[must_use]
    pub const fn tag(&self) -> char {
        match self {
            Self::Subscribe => TAG_SUBSCRIBE,
            Self::Unsubscribe => TAG_UNSUBSCRIBE,
            Self::Command(_) => TAG_COMMAND,
        }
    }
}

/// A single outbound message before batching.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// First message on every new connection.
    Handshake,
    /// Binds an operation token to its composite key.
    DefineOperationAlias {
        /// Newly minted token.
        token: String,
        /// `location\x01route\x01topic`.
        key: String,
    },
    /// Binds a location token to a full node address.
    DefineLocationAlias {
        /// Newly minted token.
        token: String,
        /// Full node address.
        address: String,
    },
    /// Operation on an aliased subject.
    Aliased {
        /// Operation token.
        token: String,
        /// What to do with the subject.
        operation: Operation,
    },
    /// Re-authenticate with a stored token.
    TokenAuth {
        /// Session token from the store.
        token: String,
    },
    /// Authenticate with credentials.
    CredentialsAuth {
        /// User name.
        user: String,
        /// Lowercase hex SHA-256 of the password.
        password_hash: String,
    },
}

impl Outbound {
    /// Wire tag for this message.
    #[must_use]
    pub const fn tag(&self) -> char {
        match self {
            Self::Handshake => TAG_HANDSHAKE,
            Self::DefineOperationAlias { .. } => TAG_OPERATION_ALIAS,
            Self::DefineLocationAlias { .. } => TAG_LOCATION_ALIAS,
            Self::Aliased { operation, .. } => operation.tag(),
            Self::TokenAuth { .. } => TAG_TOKEN_AUTH,
            Self::CredentialsAuth { .. } => TAG_CREDENTIALS_AUTH,
        }
    }

    /// Encodes the message as `tag key \x01 body`.
    #[must_use]
    pub fn encode(&self) -> String {
        let (key, body): (&str, String) = match self {
            Self::Handshake => return TAG_HANDSHAKE.to_string(),
            Self::DefineOperationAlias { token, key } => (token.as_str(), key.clone()),
            Self::DefineLocationAlias { token, address } => (token.as_str(), address.clone()),
            Self::Aliased {
                token,
                operation: Operation::Command(Some(payload)),
            } => (token.as_str(), payload.to_string()),
            Self::Aliased { token, .. } | Self::TokenAuth { token } => {
                (token.as_str(), String::new())
            }
            Self::CredentialsAuth {
                user,
                password_hash,
            } => (user.as_str(), password_hash.clone()),
        };
        format!("{}{key}{FIELD_SEPARATOR}{body}", self.tag())
    }
}

/// An inbound message as parsed off the wire, aliases still unresolved.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The server assigned the local address; completes the handshake.
    LocalAddress(String),
    /// Authorization result, raw JSON for the auth overlay.
    Authorization(String),
    /// Data for an aliased subject.
    Data {
        /// Server type tag.
        tag: char,
        /// Operation token minted by this client.
        alias: String,
        /// Decoded payload, `null` when empty.
        payload: Value,
    },
}

impl InboundMessage {
    /// Parses one message (without the frame flag).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EmptyMessage`] for an empty message and
    /// [`ProtocolError::InvalidPayload`] if a data payload is not JSON.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let mut chars = raw.chars();
        let tag = chars.next().ok_or(ProtocolError::EmptyMessage)?;
        let body = chars.as_str();

        match tag {
            TAG_LOCAL_ADDRESS => Ok(Self::LocalAddress(body.to_string())),
            TAG_AUTHORIZATION => Ok(Self::Authorization(body.to_string())),
            _ => {
                let (alias, data) = body.split_once(FIELD_SEPARATOR).unwrap_or((body, ""));
                let payload = if data.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(data)
                        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?
                };
                Ok(Self::Data {
                    tag,
                    alias: alias.to_string(),
                    payload,
                })
            }
        }
    }
}
