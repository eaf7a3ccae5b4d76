//! Connection-scoped alias tables.
//!
//! Two independent bidirectional maps shrink wire messages: location
//! aliases stand in for full node addresses, operation aliases for the
//! composite `location\x01route\x01topic` key. Tokens are minted lazily on
//! first outbound reference and only forgotten by a full [`AliasTable::reset`].

use std::collections::HashMap;

use super::frame::FIELD_SEPARATOR;

/// Digits of the base-32 token alphabet, lowercase.
const RADIX_DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Formats `n` in lowercase base 32.
#[must_use]
pub fn to_base32(mut n: u64) -> String {
    let mut digits = Vec::new();
    loop {
        let idx = usize::try_from(n % 32).unwrap_or(0);
        digits.push(RADIX_DIGITS.get(idx).copied().unwrap_or(b'0'));
        n /= 32;
        if n == 0 {
            break;
        }
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// A token minted (or reused) for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minted {
    /// Short token referencing the key.
    pub token: String,
    /// `true` if the token did not exist before this call and must be
    /// defined on the wire ahead of its first use.
    pub is_new: bool,
}

/// One bidirectional `key <-> token` map with its own counter.
#[derive(Debug)]
struct AliasMap {
    by_key: HashMap<String, String>,
    by_token: HashMap<String, String>,
    counter: u64,
}

impl AliasMap {
    fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            by_token: HashMap::new(),
            counter: 1,
        }
    }

    fn mint(&mut self, key: &str) -> Minted {
        if let Some(token) = self.by_key.get(key) {
            return Minted {
                token: token.clone(),
                is_new: false,
            };
        }
        self.counter += 1;
        let token = to_base32(self.counter);
        self.by_key.insert(key.to_string(), token.clone());
        self.by_token.insert(token.clone(), key.to_string());
        Minted {
            token,
            is_new: true,
        }
    }

    fn resolve(&self, token: &str) -> Option<&str> {
        self.by_token.get(token).map(String::as_str)
    }

    fn len(&self) -> usize {
        self.by_key.len()
    }
}

/// The pair of alias maps owned by the codec for one connection lifetime.
#[derive(Debug)]
pub struct AliasTable {
    locations: AliasMap,
    operations: AliasMap,
}

impl AliasTable {
    /// Creates empty tables with fresh counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locations: AliasMap::new(),
            operations: AliasMap::new(),
        }
    }

    /// Returns the location token for a full node address.
    pub fn location(&mut self, address: &str) -> Minted {
        self.locations.mint(address)
    }

    /// Returns the operation token for `(location token, route, topic)`
    /// together with the composite key it stands for.
    pub fn operation(&mut self, location: &str, route: &str, topic: &str) -> (Minted, String) {
        let key = operation_key(location, route, topic);
        (self.operations.mint(&key), key)
    }

    /// Resolves an operation token back to its composite key.
    #[must_use]
    pub fn resolve_operation(&self, token: &str) -> Option<&str> {
        self.operations.resolve(token)
    }

    /// Resolves a location token back to the full address.
    #[must_use]
    pub fn resolve_location(&self, token: &str) -> Option<&str> {
        self.locations.resolve(token)
    }

    /// Number of location aliases minted this connection.
    #[must_use]
    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    /// Number of operation aliases minted this connection.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Forgets every alias and restarts both counters.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the composite operation key.
#[must_use]
pub fn operation_key(location: &str, route: &str, topic: &str) -> String {
    format!("{location}{FIELD_SEPARATOR}{route}{FIELD_SEPARATOR}{topic}")
}
