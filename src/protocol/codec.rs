//! Stateful codec: alias bookkeeping, outbound batching, inbound decoding.
//!
//! The codec is sans-IO. Outbound messages are queued with the caller's
//! `now`; [`Codec::poll_timeout`] tells the driver when the batch is due,
//! [`Codec::handle_timeout`] flushes it into a frame, and
//! [`Codec::poll_transmit`] hands frames to the transport in order.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::alias::AliasTable;
use super::frame::{self, FIELD_SEPARATOR};
use super::messages::{InboundMessage, Operation, Outbound};
use crate::config::ClientConfig;
use crate::domain::{Subject, Update};
use crate::error::ProtocolError;

/// Timing and size knobs for batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecSettings {
    /// Delay between the first queued message and the flush.
    pub flush_delay: Duration,
    /// Reschedule delay when the flush fires before the handshake.
    pub handshake_retry_delay: Duration,
    /// Batches longer than this are compressed.
    pub compression_threshold: usize,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for CodecSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            flush_delay: config.flush_delay,
            handshake_retry_delay: config.handshake_retry_delay,
            compression_threshold: config.compression_threshold,
        }
    }
}

/// A decoded inbound message, aliases resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// The server assigned the local address.
    HandshakeCompleted {
        /// The assigned address.
        local_address: String,
    },
    /// Raw authorization result JSON.
    Authorization(String),
    /// A value for a subject.
    Data {
        /// Fully resolved subject.
        subject: Subject,
        /// Type tag and payload.
        update: Update,
    },
}

/// Wire codec for one logical server connection.
#[derive(Debug)]
pub struct Codec {
    settings: CodecSettings,
    aliases: AliasTable,
    local_address: Option<String>,
    connected: bool,
    pending: Vec<String>,
    flush_at: Option<Instant>,
    outbox: VecDeque<String>,
}

impl Codec {
    /// Creates a codec in the disconnected state.
    #[must_use]
    pub fn new(settings: CodecSettings) -> Self {
        Self {
            settings,
            aliases: AliasTable::new(),
            local_address: None,
            connected: false,
            pending: Vec::new(),
            flush_at: None,
            outbox: VecDeque::new(),
        }
    }

    /// The transport opened: write the handshake request straight out.
    pub fn on_connected(&mut self) {
        self.connected = true;
        self.outbox
            .push_back(frame::flat(&Outbound::Handshake.encode()));
    }

    /// The transport closed: forget every connection-scoped fact.
    pub fn on_disconnected(&mut self) {
        self.connected = false;
        self.local_address = None;
        self.aliases.reset();
        self.pending.clear();
        self.flush_at = None;
        self.outbox.clear();
    }

    /// Returns `true` once the socket is open and the local address known.
    #[must_use]
    pub fn is_handshaked(&self) -> bool {
        self.connected && self.local_address.is_some()
    }

    /// The server-assigned local address, if the handshake completed.
    #[must_use]
    pub fn local_address(&self) -> Option<&str> {
        self.local_address.as_deref()
    }

    /// Rewrites the `"local"` placeholder to the assigned address.
    ///
    /// Returns `None` for a local subject before the handshake.
    #[must_use]
    pub fn resolve(&self, subject: &Subject) -> Option<Subject> {
        if subject.is_local() {
            self.local_address
                .as_deref()
                .map(|addr| subject.with_address(addr))
        } else {
            Some(subject.clone())
        }
    }

    /// Read access to the alias tables.
    #[must_use]
    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Queues an operation on `subject`, defining any aliases it needs
    /// first. Returns `false` (and queues nothing) before the handshake.
    pub fn send(&mut self, subject: &Subject, operation: Operation, now: Instant) -> bool {
        if !self.is_handshaked() {
            tracing::debug!(%subject, "not handshaked, operation dropped");
            return false;
        }
        let Some(subject) = self.resolve(subject) else {
            return false;
        };

        let location = self.aliases.location(subject.address());
        if location.is_new {
            self.queue(
                Outbound::DefineLocationAlias {
                    token: location.token.clone(),
                    address: subject.address().to_string(),
                },
                now,
            );
        }

        let (op, key) = self
            .aliases
            .operation(&location.token, subject.route(), subject.topic());
        if op.is_new {
            self.queue(
                Outbound::DefineOperationAlias {
                    token: op.token.clone(),
                    key,
                },
                now,
            );
        }

        self.queue(
            Outbound::Aliased {
                token: op.token,
                operation,
            },
            now,
        );
        true
    }

    /// Queues a token authentication request.
    pub fn send_token_auth(&mut self, token: &str, now: Instant) {
        self.queue(
            Outbound::TokenAuth {
                token: token.to_string(),
            },
            now,
        );
    }

    /// Queues a credentials authentication request.
    pub fn send_credentials_auth(&mut self, user: &str, password_hash: &str, now: Instant) {
        self.queue(
            Outbound::CredentialsAuth {
                user: user.to_string(),
                password_hash: password_hash.to_string(),
            },
            now,
        );
    }

    fn queue(&mut self, message: Outbound, now: Instant) {
        let encoded = message.encode();
        if !self.pending.contains(&encoded) {
            self.pending.push(encoded);
        }
        if self.flush_at.is_none() {
            self.flush_at = Some(now + self.settings.flush_delay);
        }
    }

    /// Number of messages waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// When the pending batch is due, if any.
    #[must_use]
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.flush_at
    }

    /// Flushes the batch if it is due. Before the handshake the flush is
    /// rescheduled rather than dropped.
    pub fn handle_timeout(&mut self, now: Instant) {
        let Some(due) = self.flush_at else {
            return;
        };
        if now < due {
            return;
        }
        if !self.is_handshaked() {
            tracing::debug!(
                pending = self.pending.len(),
                "flush before handshake, rescheduling"
            );
            self.flush_at = Some(now + self.settings.handshake_retry_delay);
            return;
        }
        self.flush_at = None;
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        self.outbox
            .push_back(frame::encode_batch(&batch, self.settings.compression_threshold));
    }

    /// Next frame ready for the socket.
    pub fn poll_transmit(&mut self) -> Option<String> {
        self.outbox.pop_front()
    }

    /// Decodes a whole frame. Messages that fail to decode are logged and
    /// skipped; the rest are returned in wire order.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the frame itself cannot be decoded.
    pub fn decode_frame(&mut self, raw: &str) -> Result<Vec<InboundEvent>, ProtocolError> {
        let payload = frame::decode_frame(raw)?;
        let mut events = Vec::new();
        for message in frame::split_messages(&payload) {
            match self.decode_message(message) {
                Ok(event) => events.push(event),
                Err(err) => tracing::warn!(error = %err, "dropping inbound message"),
            }
        }
        Ok(events)
    }

    /// Decodes one message, applying handshake state as a side effect.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownAlias`] for an alias this connection
    /// never minted, [`ProtocolError::MalformedKey`] for a corrupt key, or
    /// a parse error from [`InboundMessage::parse`].
    pub fn decode_message(&mut self, raw: &str) -> Result<InboundEvent, ProtocolError> {
        match InboundMessage::parse(raw)? {
            InboundMessage::LocalAddress(address) => {
                tracing::debug!(local_address = %address, "local address assigned");
                self.local_address = Some(address.clone());
                Ok(InboundEvent::HandshakeCompleted {
                    local_address: address,
                })
            }
            InboundMessage::Authorization(payload) => Ok(InboundEvent::Authorization(payload)),
            InboundMessage::Data {
                tag,
                alias,
                payload,
            } => {
                let subject = self.resolve_alias(&alias)?;
                tracing::debug!(%alias, %subject, tag = %tag, "alias conversion");
                Ok(InboundEvent::Data {
                    subject,
                    update: Update::new(tag, payload),
                })
            }
        }
    }

    fn resolve_alias(&self, alias: &str) -> Result<Subject, ProtocolError> {
        let key = self
            .aliases
            .resolve_operation(alias)
            .ok_or_else(|| ProtocolError::UnknownAlias(alias.to_string()))?;
        let mut parts = key.splitn(3, FIELD_SEPARATOR);
        let (Some(location), Some(route), Some(topic)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ProtocolError::MalformedKey(key.to_string()));
        };
        let address = self.aliases.resolve_location(location).unwrap_or(location);
        Ok(Subject::from_wire(address, route, topic))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(CodecSettings::default())
    }
}
