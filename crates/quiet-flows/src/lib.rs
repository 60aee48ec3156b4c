//! # Quiet Flows
//!
//! The command/flow orchestrator: translates client operations into
//! envelopes, drives them through the pipeline, and shapes responses.
//! Sequential flows emit events one at a time so each step can use
//! concrete ids; batch commands submit placeholder-bearing envelopes
//! the runner resolves in place.

#![forbid(unsafe_code)]

/// Placeholder command batches
pub mod commands;
/// Flow execution context
pub mod ctx;
/// Per-event-type flows
pub mod flows;
/// Invite link codec
pub mod invite_link;
/// Node: store + pipeline + flow surface
pub mod node;
/// Flow registry and parameter helpers
pub mod registry;

pub use ctx::{EmitSpec, FlowCtx};
pub use invite_link::{InviteLink, INVITE_PREFIX};
pub use node::Node;
pub use registry::{FlowRegistry, FlowResponse};
