//! The one owner of all pipeline-shared storage.
//!
//! Holds the event store, blocked queue, secret store, projected state,
//! and the outbox (wire envelopes awaiting the external transport). A
//! runner invocation receives `&mut Store`; callers serialize
//! invocations, so there is one writer at a time.

use crate::blocked::BlockedQueue;
use crate::event_store::EventStore;
use crate::secrets::SecretStore;
use crate::state::ProjectedState;
use quiet_core::Envelope;

/// Shared storage for one node.
#[derive(Debug, Default)]
pub struct Store {
    /// Durable event log
    pub events: EventStore,
    /// Envelopes parked on missing deps
    pub blocked: BlockedQueue,
    /// Local secret material
    pub secrets: SecretStore,
    /// Projected relational state
    pub state: ProjectedState,
    /// Wire envelopes awaiting the external transport
    pub outbox: Vec<Envelope>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a fully transit-encrypted envelope to the transport seam.
    pub fn push_outgoing(&mut self, envelope: Envelope) {
        self.outbox.push(envelope);
    }

    /// Drain the outbox (taken by the transport adapter).
    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }
}
