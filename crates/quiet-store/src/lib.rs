//! # Quiet Store
//!
//! Storage for one node: the append-only event log, the blocked queue
//! with its reverse dependency index, the local secret store, the
//! projected relational state, and the outbox seam to the external
//! transport. The [`Store`] struct is the single owner; the pipeline
//! mutates it under one writer at a time.

#![forbid(unsafe_code)]

/// Blocked queue with reverse dep index
pub mod blocked;
/// Append-only event log
pub mod event_store;
/// Read-only query surface
pub mod queries;
/// Local secret material
pub mod secrets;
/// Projected relational state
pub mod state;
/// Combined store
pub mod store;

pub use blocked::{BlockedEnvelope, BlockedQueue};
pub use event_store::{EventStore, InsertOutcome, StoredEvent};
pub use secrets::{SecretKind, SecretRecord, SecretStore};
pub use state::{
    AddressRow, ChannelRow, GroupMemberRow, GroupRow, IdentityRow, InviteRow, KeyRow, MessageRow,
    NetworkRow, PeerRow, ProjectedState, UserRow,
};
pub use store::Store;
