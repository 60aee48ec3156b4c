//! One protocol node: store + pipeline + flow surface.
//!
//! `Node` owns the store, the handler registry, the runner, and the
//! flow registry as explicit state (no module-level singletons). Its
//! `&mut self` methods serialize all mutation; reads go through the
//! store reference.

use crate::ctx::FlowCtx;
use crate::flows;
use crate::registry::{FlowRegistry, FlowResponse};
use quiet_core::time::now_ms;
use quiet_core::{Envelope, RequestId, Result};
use quiet_pipeline::{standard_registry, HandlerRegistry, PipelineRunner, RunOutcome};
use quiet_store::Store;
use serde_json::Value;
use tracing::info;

/// The standard operation surface.
fn standard_flows() -> FlowRegistry {
    let mut registry = FlowRegistry::new();
    registry.register("identity.create", flows::identity::create);
    registry.register("identity.create_as_user", flows::identity::create_as_user);
    registry.register("peer.create", flows::peer::create);
    registry.register("network.create", flows::network::create);
    registry.register("group.create", flows::group::create);
    registry.register("channel.create", flows::channel::create);
    registry.register("user.create", flows::user::create);
    registry.register("user.join_as_user", flows::user::join_as_user);
    registry.register("invite.create", flows::invite::create);
    registry.register("member.create", flows::member::create);
    registry.register("message.create", flows::message::create);
    registry.register("address.announce", flows::address::announce);
    registry.register("key.create", flows::key::create);
    registry.register("key.share", flows::key::share);
    registry.register("transit_secret.create", flows::transit_secret::create);
    registry.register("sync_request.run", flows::sync::run);

    registry.register("identity.list", flows::queries::list_identities);
    registry.register("peer.list", flows::queries::list_peers);
    registry.register("network.list", flows::queries::list_networks);
    registry.register("group.list", flows::queries::list_groups);
    registry.register("channel.list", flows::queries::list_channels);
    registry.register("user.list", flows::queries::list_users);
    registry.register("member.list", flows::queries::list_members);
    registry.register("message.list", flows::queries::list_messages);
    registry.register("key.list", flows::queries::list_keys);
    registry.register("address.list", flows::queries::list_addresses);
    registry.register("system.dump", flows::queries::dump);
    registry
}

/// A single peer-protocol node.
pub struct Node {
    store: Store,
    registry: HandlerRegistry,
    runner: PipelineRunner,
    flows: FlowRegistry,
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    /// Node with the standard handlers and flows.
    pub fn new() -> Self {
        Self {
            store: Store::new(),
            registry: standard_registry(),
            runner: PipelineRunner::new(),
            flows: standard_flows(),
        }
    }

    /// Execute one client operation `(op_id, params) → {ids, data}`.
    pub fn execute(&mut self, op_id: &str, params: &Value) -> Result<FlowResponse> {
        let flow = self.flows.get(op_id)?;
        let request_id = RequestId::generate();
        info!(op = op_id, request_id = %request_id, "executing flow");
        let mut ctx = FlowCtx::new(&mut self.store, &self.registry, &self.runner, request_id);
        flow(&mut ctx, params)
    }

    /// Run a pre-built envelope batch (placeholder commands) through the
    /// pipeline under one request id.
    pub fn execute_batch(&mut self, envelopes: Vec<Envelope>) -> Result<RunOutcome> {
        let request_id = RequestId::generate();
        let envelopes = envelopes
            .into_iter()
            .map(|mut env| {
                if env.request_id.is_none() {
                    env.request_id = Some(request_id.clone());
                }
                env
            })
            .collect();
        self.runner.run(&self.registry, &mut self.store, envelopes)
    }

    /// Admit raw bytes from the transport.
    pub fn receive(&mut self, raw_bytes: Vec<u8>, origin_address: &str) -> Result<RunOutcome> {
        let envelope = Envelope::incoming(raw_bytes, origin_address, now_ms());
        self.runner
            .run(&self.registry, &mut self.store, vec![envelope])
    }

    /// Admit already-shaped envelopes (blocked-queue readmission across
    /// invocations, tests).
    pub fn inject(&mut self, envelopes: Vec<Envelope>) -> Result<RunOutcome> {
        self.runner.run(&self.registry, &mut self.store, envelopes)
    }

    /// Read access to the store (queries, assertions).
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Mutable store access (transport adapters, test seeding).
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// Take the wire envelopes awaiting transport.
    pub fn take_outbox(&mut self) -> Vec<Envelope> {
        self.store.drain_outbox()
    }

    /// Registered operation ids.
    pub fn operations(&self) -> Vec<&'static str> {
        self.flows.list()
    }
}
