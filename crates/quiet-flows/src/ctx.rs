//! Flow execution context.
//!
//! `FlowCtx` is what a flow sees: read-only queries against the store
//! and `emit_event`, which drives one envelope through the runner to
//! completion and returns the stored id: so a flow's next step can use
//! concrete ids instead of placeholders.

use quiet_core::{
    DepSpec, Envelope, Event, EventId, EventPayload, QuietError, RequestId, Result,
};
use quiet_pipeline::{HandlerRegistry, PipelineRunner};
use quiet_store::Store;
use tracing::debug;

/// Everything needed to build one envelope from a flow.
#[derive(Debug, Clone)]
pub struct EmitSpec {
    /// The event payload
    pub payload: EventPayload,
    /// Declared prerequisite events
    pub deps: Vec<DepSpec>,
    /// Signing context (peer or identity id); becomes `envelope.peer_id`
    pub by: Option<String>,
    /// Network scope hint
    pub network_id: Option<String>,
    /// Group scope hint (key selection for events without a payload group)
    pub group_id: Option<String>,
    /// Never leaves this node
    pub local_only: bool,
    /// Seal one-way to this peer/user (sync requests)
    pub seal_to: Option<String>,
    /// Event-layer key hint (key id)
    pub encrypt_to: Option<String>,
    /// Key material for the crypto handler to install (hex)
    pub local_secret: Option<String>,
    /// Explicit outgoing marker
    pub is_outgoing: Option<bool>,
    /// Authored here (sign) vs transient unsigned traffic
    pub self_created: bool,
}

impl EmitSpec {
    /// Spec with defaults: signed, not local-only, no hints.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            deps: Vec::new(),
            by: None,
            network_id: None,
            group_id: None,
            local_only: false,
            seal_to: None,
            encrypt_to: None,
            local_secret: None,
            is_outgoing: None,
            self_created: true,
        }
    }

    /// Declare prerequisite events.
    pub fn deps(mut self, deps: Vec<DepSpec>) -> Self {
        self.deps = deps;
        self
    }

    /// Set the signing context.
    pub fn by(mut self, by: impl Into<String>) -> Self {
        self.by = Some(by.into());
        self
    }

    /// Mark local-only.
    pub fn local_only(mut self) -> Self {
        self.local_only = true;
        self
    }

    /// Seal one-way to a peer/user.
    pub fn seal_to(mut self, target: impl Into<String>) -> Self {
        self.seal_to = Some(target.into());
        self.self_created = false;
        self
    }

    /// Hint the event-layer key.
    pub fn encrypt_to(mut self, key_id: impl Into<String>) -> Self {
        self.encrypt_to = Some(key_id.into());
        self
    }

    /// Hand key material to the crypto handler.
    pub fn local_secret(mut self, secret_hex: impl Into<String>) -> Self {
        self.local_secret = Some(secret_hex.into());
        self
    }

    /// Set the group scope hint.
    pub fn group_scope(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Mark explicitly outgoing.
    pub fn outgoing(mut self) -> Self {
        self.is_outgoing = Some(true);
        self
    }

    fn into_envelope(self, request_id: &RequestId) -> Envelope {
        let network_id = self
            .network_id
            .or_else(|| self.payload.network_id().map(str::to_string));
        let mut env = Envelope::from_event(Event::new(self.payload, self.deps));
        env.peer_id = self.by;
        env.network_id = network_id;
        env.group_id = self.group_id;
        env.local_only = self.local_only;
        env.seal_to = self.seal_to;
        env.encrypt_to = self.encrypt_to;
        env.local_secret = self.local_secret;
        env.is_outgoing = self.is_outgoing;
        env.self_created = self.self_created;
        env.request_id = Some(request_id.clone());
        env
    }
}

/// Execution context handed to flows.
pub struct FlowCtx<'a> {
    store: &'a mut Store,
    registry: &'a HandlerRegistry,
    runner: &'a PipelineRunner,
    request_id: RequestId,
}

impl<'a> FlowCtx<'a> {
    /// Build a context for one client operation.
    pub fn new(
        store: &'a mut Store,
        registry: &'a HandlerRegistry,
        runner: &'a PipelineRunner,
        request_id: RequestId,
    ) -> Self {
        Self {
            store,
            registry,
            runner,
            request_id,
        }
    }

    /// Read-only store access for queries.
    pub fn store(&self) -> &Store {
        self.store
    }

    /// The operation's correlation id.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Drive one event through the pipeline and return its stored id.
    ///
    /// # Errors
    ///
    /// Fails when the pipeline did not store an event of the payload's
    /// kind (the envelope was dropped or blocked).
    pub fn emit_event(&mut self, spec: EmitSpec) -> Result<EventId> {
        let kind = spec.payload.kind();
        let envelope = spec.into_envelope(&self.request_id);
        let outcome = self.runner.run(self.registry, self.store, vec![envelope])?;

        if let Some(id) = outcome.stored_ids.get(&kind) {
            debug!(kind = %kind, id = %id, "flow emitted event");
            return Ok(id.clone());
        }
        if outcome.stored_ids.len() == 1 {
            if let Some(id) = outcome.stored_ids.values().next() {
                return Ok(id.clone());
            }
        }
        Err(QuietError::invalid(format!(
            "emit_event did not store a {kind} event: {}",
            outcome
                .failures
                .first()
                .map(String::as_str)
                .unwrap_or("no failure recorded")
        )))
    }

    /// Drive a transient (never stored) envelope, e.g. a sealed sync
    /// request, to completion.
    pub fn emit_transient(&mut self, spec: EmitSpec) -> Result<()> {
        let envelope = spec.into_envelope(&self.request_id);
        let outcome = self.runner.run(self.registry, self.store, vec![envelope])?;
        if let Some(failure) = outcome.failures.first() {
            return Err(QuietError::invalid(format!(
                "transient emit failed: {failure}"
            )));
        }
        Ok(())
    }

    /// Local symmetric key material `(key_id, scope, secret_hex)` for
    /// re-sealing to a new member. The one sanctioned secret read
    /// outside the crypto handler; output must only ever be fed back
    /// into sealed key events.
    pub fn symmetric_secrets(&self) -> Vec<(String, Option<String>, String)> {
        self.store
            .secrets
            .all_symmetric()
            .map(|record| {
                (
                    record.id.clone(),
                    record.scope.clone(),
                    record.secret.to_hex(),
                )
            })
            .collect()
    }
}
