//! Permission set ingested from an authorization grant.
//!
//! The grant carries role groups, each with per-domain rule lists:
//!
//! ```text
//! [ { "p": [ { "d": { "id": "gates" }, "p": [ { "t": "gates#.*", "a": true } ] } ] } ]
//! ```
//!
//! A domain is allowed once any group lists at least one rule for it.
//! Topic rules are unanchored regular expressions over `route#topic`.
//! Deny rules override allow rules; `"a"` defaults to allow.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::Subject;

/// Domain id that allows every domain.
pub const ANY_DOMAIN: &str = "*";

/// One role group in the grant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionGroup {
    /// Per-domain rule lists.
    #[serde(default, rename = "p")]
    pub domains: Vec<DomainRules>,
}

/// Rules attached to a single domain.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainRules {
    /// Domain reference.
    #[serde(rename = "d")]
    pub domain: Option<DomainRef>,
    /// Topic rules for the domain.
    #[serde(default, rename = "p")]
    pub rules: Vec<RuleSpec>,
}

/// Domain reference; ids may arrive as strings or numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainRef {
    /// Domain identifier.
    pub id: Value,
}

/// A single topic rule as sent by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    /// Regular expression over `route#topic`.
    #[serde(rename = "t")]
    pub pattern: Option<String>,
    /// Polarity; missing means allow.
    #[serde(default = "default_allow", rename = "a")]
    pub allow: bool,
}

const fn default_allow() -> bool {
    true
}

#[derive(Debug, Clone)]
struct TopicRule {
    pattern: Regex,
    allow: bool,
}

/// Compiled permission set. Empty until the first grant.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    domains: Vec<String>,
    rules: Vec<TopicRule>,
}

impl PermissionSet {
    /// Builds a set from the grant's `permissions` array.
    ///
    /// Patterns that fail to compile are skipped with a warning; a
    /// duplicated `(pattern, polarity)` pair is kept once.
    #[must_use]
    pub fn from_groups(groups: &[PermissionGroup]) -> Self {
        let mut domains: Vec<String> = Vec::new();
        let mut seen: Vec<(&str, bool)> = Vec::new();
        let mut rules = Vec::new();

        for group in groups {
            for entry in &group.domains {
                let Some(id) = entry.domain.as_ref().and_then(|d| domain_id(&d.id)) else {
                    continue;
                };
                if !entry.rules.is_empty() && !domains.contains(&id) {
                    domains.push(id);
                }
                for rule in &entry.rules {
                    let Some(pattern) = rule.pattern.as_deref().filter(|p| !p.is_empty()) else {
                        continue;
                    };
                    if seen.contains(&(pattern, rule.allow)) {
                        continue;
                    }
                    seen.push((pattern, rule.allow));
                    match Regex::new(pattern) {
                        Ok(compiled) => rules.push(TopicRule {
                            pattern: compiled,
                            allow: rule.allow,
                        }),
                        Err(err) => {
                            tracing::warn!(pattern, error = %err, "skipping invalid permission pattern");
                        }
                    }
                }
            }
        }

        Self { domains, rules }
    }

    /// Parses the raw `permissions` JSON value; anything that is not a
    /// well-formed array yields an empty set.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match serde_json::from_value::<Vec<PermissionGroup>>(value.clone()) {
            Ok(groups) => Self::from_groups(&groups),
            Err(err) => {
                tracing::warn!(error = %err, "malformed permission set, treating as empty");
                Self::default()
            }
        }
    }

    /// Returns `true` if `domain` or the wildcard domain is allowed.
    #[must_use]
    pub fn has_domain_permission(&self, domain: &str) -> bool {
        self.domains
            .iter()
            .any(|d| d == ANY_DOMAIN || d == domain)
    }

    /// Returns `true` if some allow rule matches `route#topic` and no deny
    /// rule does.
    #[must_use]
    pub fn has_topic_permission(&self, route: &str, topic: &str) -> bool {
        self.allows_key(&format!("{route}#{topic}"))
    }

    /// [`PermissionSet::has_topic_permission`] for a subject's route and
    /// topic; the address plays no part.
    #[must_use]
    pub fn has_subject_permission(&self, subject: &Subject) -> bool {
        self.allows_key(&subject.permission_key())
    }

    fn allows_key(&self, key: &str) -> bool {
        let mut allowed = false;
        for rule in self.rules.iter().filter(|r| r.pattern.is_match(key)) {
            if !rule.allow {
                return false;
            }
            allowed = true;
        }
        allowed
    }

    /// Allowed domain ids, in grant order.
    #[must_use]
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Number of compiled topic rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if nothing is allowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.rules.is_empty()
    }
}

fn domain_id(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
