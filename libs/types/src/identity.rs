//! Service addressing
//!
//! A service is addressed as `name@processId`. The *last* `@` separates
//! the two halves, so a bare name can always be promoted by appending the
//! local process id. Raw service names must not contain `@`; that rule is
//! enforced by [`Identity::new`] while [`Identity::parse`] keeps accepting
//! whatever a peer sends, splitting on the last separator.

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between service name and process id
pub const SEPARATOR: char = '@';

/// Fully qualified service address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
    name: String,
    id: String,
}

impl Identity {
    /// Create from a raw service name and a process id
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let id = id.into();

        if name.is_empty() {
            return Err(TypesError::invalid_identity(name, "service name is empty"));
        }
        if name.contains(SEPARATOR) {
            return Err(TypesError::invalid_identity(
                name,
                "service names may not contain '@'",
            ));
        }
        if id.is_empty() || id.contains(SEPARATOR) {
            return Err(TypesError::invalid_identity(
                format!("{}@{}", name, id),
                "process id must be non-empty and may not contain '@'",
            ));
        }

        Ok(Self { name, id })
    }

    /// Parse `name@id`, splitting on the last `@`
    pub fn parse(full: &str) -> Result<Self> {
        match full.rfind(SEPARATOR) {
            Some(at) if at > 0 && at + 1 < full.len() => Ok(Self {
                name: full[..at].to_string(),
                id: full[at + 1..].to_string(),
            }),
            _ => Err(TypesError::invalid_identity(full, "expected name@id")),
        }
    }

    /// Canonicalize a possibly bare name against the local process id
    pub fn resolve(raw: &str, local_id: &str) -> Result<Self> {
        Self::parse(&full_name(raw, local_id))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_local(&self, local_id: &str) -> bool {
        self.id == local_id
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, SEPARATOR, self.id)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.to_string()
    }
}

impl TryFrom<String> for Identity {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl std::str::FromStr for Identity {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Append `@local_id` unless `name` already carries a process id
pub fn full_name(name: &str, local_id: &str) -> String {
    if name.contains(SEPARATOR) {
        name.to_string()
    } else {
        format!("{}{}{}", name, SEPARATOR, local_id)
    }
}

/// Service-name half of an address (the whole string when there is no `@`)
pub fn split_name(name: &str) -> &str {
    match name.rfind(SEPARATOR) {
        Some(at) => &name[..at],
        None => name,
    }
}

/// Process-id half of an address; `None` when absent or empty
pub fn split_id(name: &str) -> Option<&str> {
    name.rfind(SEPARATOR)
        .map(|at| &name[at + 1..])
        .filter(|id| !id.is_empty())
}

pub fn is_local(name: &str, local_id: &str) -> bool {
    split_id(name) == Some(local_id)
}

/// Default subscriber method for a topic method.
///
/// `publishX` and `getX` become `onX`; anything else is prefixed, so an
/// `onX` topic yields `onOnX`.
pub fn callback_topic_name(method: &str) -> String {
    let topic = method
        .strip_prefix("publish")
        .or_else(|| method.strip_prefix("get"))
        .unwrap_or(method);
    format!("on{}", capitalize(topic))
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
