//! `@generated:` placeholder machinery.
//!
//! A placeholder is the string `@generated:<event_type>:<index>` standing
//! for the nth event id of that type produced within the current pipeline
//! run. Resolution is a pure transform over JSON values; strings that
//! cannot be resolved are left intact so the failure surfaces as an
//! envelope error rather than a silent substitution.

use crate::events::EventKind;
use crate::identifiers::EventId;
use serde_json::Value;
use std::collections::BTreeMap;

/// Sentinel prefix marking a forward reference.
pub const PLACEHOLDER_PREFIX: &str = "@generated:";

/// Per-run table of event ids keyed by kind, in production order.
#[derive(Debug, Default, Clone)]
pub struct GeneratedIds {
    by_kind: BTreeMap<EventKind, Vec<EventId>>,
}

impl GeneratedIds {
    /// Record an id produced by the current run.
    pub fn record(&mut self, kind: EventKind, id: EventId) {
        let ids = self.by_kind.entry(kind).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Look up the nth id of a kind.
    pub fn lookup(&self, kind: EventKind, index: usize) -> Option<&EventId> {
        self.by_kind.get(&kind).and_then(|ids| ids.get(index))
    }

    /// Resolve a placeholder string (without or with the prefix already
    /// stripped callers pass the full string).
    pub fn resolve_str(&self, placeholder: &str) -> Option<&EventId> {
        let rest = placeholder.strip_prefix(PLACEHOLDER_PREFIX)?;
        let (kind, index) = rest.split_once(':')?;
        let kind: EventKind = kind.parse().ok()?;
        let index: usize = index.parse().ok()?;
        self.lookup(kind, index)
    }
}

/// True if any string in the value tree is a placeholder.
pub fn value_has_placeholder(value: &Value) -> bool {
    match value {
        Value::String(s) => s.starts_with(PLACEHOLDER_PREFIX),
        Value::Array(items) => items.iter().any(value_has_placeholder),
        Value::Object(map) => map.values().any(value_has_placeholder),
        _ => false,
    }
}

/// Replace every resolvable placeholder string in the value tree with the
/// concrete event id; unresolvable placeholders stay as-is.
pub fn resolve_value(value: Value, ids: &GeneratedIds) -> Value {
    match value {
        Value::String(s) => match ids.resolve_str(&s) {
            Some(id) => Value::String(id.to_string()),
            None => Value::String(s),
        },
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| resolve_value(v, ids)).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, resolve_value(v, ids)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_nested() {
        let mut ids = GeneratedIds::default();
        ids.record(EventKind::Peer, EventId::new("p0"));
        ids.record(EventKind::Peer, EventId::new("p1"));

        let value = json!({
            "peer_id": "@generated:peer:1",
            "nested": {"list": ["@generated:peer:0", "plain"]}
        });
        let resolved = resolve_value(value, &ids);
        assert_eq!(resolved["peer_id"], "p1");
        assert_eq!(resolved["nested"]["list"][0], "p0");
        assert_eq!(resolved["nested"]["list"][1], "plain");
        assert!(!value_has_placeholder(&resolved));
    }

    #[test]
    fn test_unresolvable_left_in_place() {
        let ids = GeneratedIds::default();
        let value = json!({"peer_id": "@generated:peer:0"});
        let resolved = resolve_value(value, &ids);
        assert_eq!(resolved["peer_id"], "@generated:peer:0");
        assert!(value_has_placeholder(&resolved));
    }

    #[test]
    fn test_duplicate_record_ignored() {
        let mut ids = GeneratedIds::default();
        ids.record(EventKind::Peer, EventId::new("p0"));
        ids.record(EventKind::Peer, EventId::new("p0"));
        assert!(ids.lookup(EventKind::Peer, 1).is_none());
    }
}
