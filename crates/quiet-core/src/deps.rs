//! Dependency references.
//!
//! A dep declares a prerequisite event as `"type:id"`. Inside a command
//! batch a dep may instead be the forward reference
//! `"@generated:type:index"`, resolved positionally against ids produced
//! earlier in the same run.

use crate::errors::{QuietError, Result};
use crate::events::EventKind;
use crate::identifiers::EventId;
use crate::placeholder::{GeneratedIds, PLACEHOLDER_PREFIX};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A concrete `"type:id"` reference to a prerequisite event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepRef {
    /// Kind of the prerequisite event
    pub kind: EventKind,
    /// Its event id (or, for invites, the invite pubkey)
    pub id: EventId,
}

impl DepRef {
    /// Create a dep reference.
    pub fn new(kind: EventKind, id: impl Into<EventId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for DepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for DepRef {
    type Err = QuietError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| QuietError::invalid(format!("dep missing ':' separator: {s}")))?;
        if id.is_empty() {
            return Err(QuietError::invalid(format!("dep missing id: {s}")));
        }
        Ok(Self {
            kind: kind.parse()?,
            id: EventId::new(id),
        })
    }
}

/// A declared dependency: concrete, or a positional forward reference to
/// an event generated within the same run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DepSpec {
    /// `"type:id"`
    Concrete(DepRef),
    /// `"@generated:type:index"`
    Generated {
        /// Kind of the event to be generated
        kind: EventKind,
        /// Position among that kind's ids within the run
        index: usize,
    },
}

impl DepSpec {
    /// Convenience constructor for a concrete dep.
    pub fn concrete(kind: EventKind, id: impl Into<EventId>) -> Self {
        Self::Concrete(DepRef::new(kind, id))
    }

    /// True for unresolved `@generated:` forward references.
    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated { .. })
    }

    /// The concrete reference, if this dep has one.
    pub fn as_concrete(&self) -> Option<&DepRef> {
        match self {
            Self::Concrete(dep) => Some(dep),
            Self::Generated { .. } => None,
        }
    }

    /// Resolve a forward reference against the run's generated ids,
    /// leaving it untouched when out of range.
    pub fn resolve_in_place(&mut self, ids: &GeneratedIds) {
        if let Self::Generated { kind, index } = self {
            if let Some(id) = ids.lookup(*kind, *index) {
                *self = Self::Concrete(DepRef::new(*kind, id.clone()));
            }
        }
    }
}

impl fmt::Display for DepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concrete(dep) => dep.fmt(f),
            Self::Generated { kind, index } => {
                write!(f, "{PLACEHOLDER_PREFIX}{kind}:{index}")
            }
        }
    }
}

impl FromStr for DepSpec {
    type Err = QuietError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix(PLACEHOLDER_PREFIX) {
            let (kind, index) = rest
                .split_once(':')
                .ok_or_else(|| QuietError::invalid(format!("malformed placeholder dep: {s}")))?;
            let index = index
                .parse::<usize>()
                .map_err(|_| QuietError::invalid(format!("bad placeholder index: {s}")))?;
            return Ok(Self::Generated {
                kind: kind.parse()?,
                index,
            });
        }
        Ok(Self::Concrete(s.parse()?))
    }
}

impl TryFrom<String> for DepSpec {
    type Error = QuietError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DepSpec> for String {
    fn from(dep: DepSpec) -> Self {
        dep.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_concrete_round_trip() {
        let dep: DepSpec = "channel:abcd".parse().expect("parse");
        assert_eq!(
            dep.as_concrete().map(|d| d.kind),
            Some(EventKind::Channel)
        );
        assert_eq!(dep.to_string(), "channel:abcd");
    }

    #[test]
    fn test_generated_round_trip() {
        let dep: DepSpec = "@generated:peer:0".parse().expect("parse");
        assert!(dep.is_generated());
        assert_eq!(dep.to_string(), "@generated:peer:0");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("nodep".parse::<DepSpec>().is_err());
        assert!("channel:".parse::<DepSpec>().is_err());
        assert!("mystery:abcd".parse::<DepSpec>().is_err());
        assert!("@generated:peer:x".parse::<DepSpec>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let dep: DepSpec = "peer:ff00".parse().expect("parse");
        let json = serde_json::to_string(&dep).expect("serialize");
        assert_eq!(json, "\"peer:ff00\"");
        let back: DepSpec = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, dep);
    }
}
