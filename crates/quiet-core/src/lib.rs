//! # Quiet Core
//!
//! Foundation types for the Quiet envelope pipeline: the in-flight
//! [`Envelope`] record, the typed [`Event`] model, dependency references,
//! `@generated:` placeholder machinery, canonical serialization, and the
//! unified error type.
//!
//! This crate holds no behavior beyond pure transforms: handlers,
//! stores, and flows live in the crates layered above it.

#![forbid(unsafe_code)]

/// Canonical sorted-key serialization for signing and hashing
pub mod canonical;
/// Dependency references (`"type:id"` and `"@generated:type:index"`)
pub mod deps;
/// In-flight envelope record
pub mod envelope;
/// Unified error handling
pub mod errors;
/// Typed event model
pub mod events;
/// Core identifier types
pub mod identifiers;
/// Placeholder resolution machinery
pub mod placeholder;
/// Millisecond wall-clock helpers
pub mod time;

pub use canonical::canonical_bytes;
pub use deps::{DepRef, DepSpec};
pub use envelope::{Envelope, KeyRef};
pub use errors::{QuietError, Result};
pub use events::{AddressAction, Event, EventKind, EventPayload};
pub use identifiers::{EventId, RequestId};
pub use placeholder::{GeneratedIds, PLACEHOLDER_PREFIX};
