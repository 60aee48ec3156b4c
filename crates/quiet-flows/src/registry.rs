//! Flow registry: `op_id → flow function`.
//!
//! A flow is a small read-query-and-emit orchestration. It may only read
//! the store through its context and only write by emitting events; the
//! response carries the ids of stored events plus operation-shaped data.

use crate::ctx::FlowCtx;
use quiet_core::{QuietError, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Response of one operation: stored ids by type name plus free-form data.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FlowResponse {
    /// `event_type → event_id` of the operation's stored events
    pub ids: BTreeMap<String, String>,
    /// Operation-specific response data
    pub data: Value,
}

impl FlowResponse {
    /// Response with ids only.
    pub fn with_ids(ids: BTreeMap<String, String>) -> Self {
        Self {
            ids,
            data: Value::Null,
        }
    }
}

/// A registered flow function.
pub type FlowFn = fn(&mut FlowCtx<'_>, &Value) -> Result<FlowResponse>;

/// Static map of operation ids to flows, fixed at node construction.
#[derive(Default)]
pub struct FlowRegistry {
    flows: BTreeMap<&'static str, FlowFn>,
}

impl FlowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flow under its operation id.
    pub fn register(&mut self, op_id: &'static str, flow: FlowFn) {
        self.flows.insert(op_id, flow);
    }

    /// Look up a flow.
    pub fn get(&self, op_id: &str) -> Result<FlowFn> {
        self.flows
            .get(op_id)
            .copied()
            .ok_or_else(|| QuietError::invalid(format!("unknown flow op: {op_id}")))
    }

    /// Registered operation ids, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        self.flows.keys().copied().collect()
    }
}

impl std::fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("ops", &self.list())
            .finish()
    }
}

/// Required string parameter.
pub fn require_str(params: &Value, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| QuietError::invalid(format!("{key} is required")))
}

/// Optional string parameter with a default.
pub fn str_or(params: &Value, key: &str, default: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Optional integer parameter.
pub fn i64_or(params: &Value, key: &str, default: i64) -> i64 {
    params.get(key).and_then(Value::as_i64).unwrap_or(default)
}
