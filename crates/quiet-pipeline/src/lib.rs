//! # Quiet Pipeline
//!
//! The handler-composed state machine at the center of the protocol: an
//! ordered registry of single-responsibility handlers and a fixpoint
//! runner that carries envelopes through dependency resolution,
//! decryption, signature verification, membership validation,
//! projection, and outgoing encryption.
//!
//! Registry order is fixed at build time: `resolve_deps`, `crypto`,
//! `signature`, `membership`, `projector`, `outgoing`. Per envelope the
//! registry applies the first matching handler until quiescence, so the
//! declared order doubles as priority.

#![forbid(unsafe_code)]

/// Crypto handler (transit + event layers)
pub mod crypto_handler;
/// Handler trait and ordered registry
pub mod handler;
/// Membership and validation handler
pub mod membership;
/// Outgoing fan-out handler
pub mod outgoing;
/// Projector (store + projections writer)
pub mod projector;
/// Dependency resolver
pub mod resolve_deps;
/// Fixpoint runner
pub mod runner;
/// Signature handler
pub mod signature;
/// Transit wire format
pub mod wire;

pub use crypto_handler::CryptoHandler;
pub use handler::{Handler, HandlerRegistry};
pub use membership::MembershipHandler;
pub use outgoing::OutgoingHandler;
pub use projector::ProjectorHandler;
pub use resolve_deps::ResolveDepsHandler;
pub use runner::{PipelineRunner, RunOutcome, MAX_ITERATIONS};
pub use signature::SignatureHandler;

/// The standard handler ordering used by every node.
pub fn standard_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(ResolveDepsHandler));
    registry.register(Box::new(CryptoHandler));
    registry.register(Box::new(SignatureHandler));
    registry.register(Box::new(MembershipHandler));
    registry.register(Box::new(ProjectorHandler));
    registry.register(Box::new(OutgoingHandler));
    registry
}
