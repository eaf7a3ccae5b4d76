//! Subscription key: the `(address, route, topic)` triple.
//!
//! [`Subject`] is the join key between registry entries and the wire
//! protocol. Components are validated once at construction so that the
//! codec can splice them into frames without escaping.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CommError;

/// Pseudo-address naming the node the client is attached to. Rewritten to
/// the server-assigned local address before it reaches alias bookkeeping.
pub const LOCAL_ADDRESS: &str = "local";

/// Identifies one data stream or command channel on a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Subject {
    address: String,
    route: String,
    topic: String,
}

impl Subject {
    /// Creates a subject after validating every component.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::InvalidSubject`] if a component is empty or
    /// contains one of the protocol control characters (`\x01`, `\x02`).
    pub fn new(
        address: impl Into<String>,
        route: impl Into<String>,
        topic: impl Into<String>,
    ) -> Result<Self, CommError> {
        let subject = Self {
            address: address.into(),
            route: route.into(),
            topic: topic.into(),
        };
        for (name, value) in [
            ("address", &subject.address),
            ("route", &subject.route),
            ("topic", &subject.topic),
        ] {
            if value.is_empty() {
                return Err(CommError::InvalidSubject(format!("{name} is empty")));
            }
            if value.contains(['\u{1}', '\u{2}']) {
                return Err(CommError::InvalidSubject(format!(
                    "{name} {value:?} contains a protocol separator"
                )));
            }
        }
        Ok(subject)
    }

    /// Shorthand for a subject on the local node.
    ///
    /// # Errors
    ///
    /// Same as [`Subject::new`].
    pub fn local(route: impl Into<String>, topic: impl Into<String>) -> Result<Self, CommError> {
        Self::new(LOCAL_ADDRESS, route, topic)
    }

    /// Node address, possibly the [`LOCAL_ADDRESS`] placeholder.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Component within the node.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Stream or channel within the route.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns `true` if the address is the local placeholder.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.address == LOCAL_ADDRESS
    }

    /// Returns the same route and topic on another node. The address has
    /// already been validated as a server-assigned value.
    #[must_use]
    pub(crate) fn with_address(&self, address: &str) -> Self {
        Self {
            address: address.to_string(),
            route: self.route.clone(),
            topic: self.topic.clone(),
        }
    }

    /// Builds a subject from components decoded off the wire.
    pub(crate) fn from_wire(address: &str, route: &str, topic: &str) -> Self {
        Self {
            address: address.to_string(),
            route: route.to_string(),
            topic: topic.to_string(),
        }
    }

    /// The `route#topic` string permission patterns are matched against.
    #[must_use]
    pub fn permission_key(&self) -> String {
        format!("{}#{}", self.route, self.topic)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.route, self.topic, self.address)
    }
}

/// Parses `address/route/topic`. The address may itself contain slashes.
impl FromStr for Subject {
    type Err = CommError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(topic), Some(route), Some(address)) => Self::new(address, route, topic),
            _ => Err(CommError::InvalidSubject(format!(
                "expected address/route/topic, got {s:?}"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn valid_subject_exposes_components() {
        let Ok(s) = Subject::new("nodeA", "gates", "list") else {
            panic!("valid subject");
        };
        assert_eq!(s.address(), "nodeA");
        assert_eq!(s.route(), "gates");
        assert_eq!(s.topic(), "list");
        assert!(!s.is_local());
        assert_eq!(s.permission_key(), "gates#list");
        assert_eq!(s.to_string(), "gates#list@nodeA");
    }

    #[test]
    fn empty_component_rejected() {
        assert!(Subject::new("", "gates", "list").is_err());
        assert!(Subject::new("a", "", "list").is_err());
        assert!(Subject::new("a", "gates", "").is_err());
    }

    #[test]
    fn separator_rejected() {
        assert!(Subject::new("a\u{1}b", "gates", "list").is_err());
        assert!(Subject::new("a", "gates", "li\u{2}st").is_err());
    }

    #[test]
    fn local_placeholder() {
        let Ok(s) = Subject::local("gates", "info") else {
            panic!("valid subject");
        };
        assert!(s.is_local());
        let resolved = s.with_address("akka.tcp://cluster@host:2552");
        assert!(!resolved.is_local());
        assert_eq!(resolved.route(), "gates");
    }

    #[test]
    fn parses_slash_form() {
        let Ok(s) = "nodeA/gates/list".parse::<Subject>() else {
            panic!("valid subject string");
        };
        assert_eq!(s.topic(), "list");
        assert!("nodeA/gates".parse::<Subject>().is_err());

        let Ok(remote) = "akka.tcp://es@10.0.0.1:2552/gates/stats".parse::<Subject>() else {
            panic!("address with slashes");
        };
        assert_eq!(remote.address(), "akka.tcp://es@10.0.0.1:2552");
        assert_eq!(remote.route(), "gates");
    }
}
