//! Handler contract and ordered registry.
//!
//! A handler is a single-responsibility transform over an envelope. Its
//! filter is a pure predicate over envelope fields; its process step may
//! mutate the envelope, emit new envelopes, and read/write the store.
//! Handlers never panic on missing fields: a missing prerequisite makes
//! the filter return false: and they record failures on the envelope
//! instead of unwinding.

use quiet_core::{Envelope, QuietError, Result};
use quiet_store::Store;
use tracing::debug;

/// Upper bound on handler applications per envelope per registry pass.
/// Hitting it means a handler failed to flip its gate field.
const STEP_CAP: usize = 64;

/// A single-responsibility envelope transform.
pub trait Handler: Send + Sync {
    /// Stable handler name (for logs).
    fn name(&self) -> &'static str;

    /// Pure predicate over envelope fields; must not read external state.
    fn filter(&self, envelope: &Envelope) -> bool;

    /// Transform the envelope, returning any newly emitted envelopes.
    /// Failures belonging to the envelope go through [`Envelope::fail`];
    /// an `Err` return is reserved for fatal internal conditions.
    fn process(&self, envelope: &mut Envelope, store: &mut Store) -> Result<Vec<Envelope>>;
}

/// Ordered set of handlers. Order defines priority: each pass applies the
/// first matching handler until none match or the envelope terminates.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler at the end of the order.
    pub fn register(&mut self, handler: Box<dyn Handler>) {
        debug!(handler = handler.name(), "registered handler");
        self.handlers.push(handler);
    }

    /// Registered handler names, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Drive one envelope to quiescence: repeatedly apply the first
    /// matching handler, collecting emissions, until no filter matches,
    /// the envelope terminates, or the step cap trips.
    pub fn process_envelope(
        &self,
        envelope: &mut Envelope,
        store: &mut Store,
    ) -> Result<Vec<Envelope>> {
        let mut emitted = Vec::new();
        let mut steps = 0;
        while !envelope.is_terminal() {
            let Some(handler) = self.handlers.iter().find(|h| h.filter(envelope)) else {
                break;
            };
            steps += 1;
            if steps > STEP_CAP {
                envelope.fail(format!(
                    "handler '{}' did not settle after {STEP_CAP} steps",
                    handler.name()
                ));
                break;
            }
            debug!(handler = handler.name(), event_id = ?envelope.event_id, "consume");
            let new_envelopes = handler.process(envelope, store)?;
            if !new_envelopes.is_empty() {
                debug!(handler = handler.name(), count = new_envelopes.len(), "emit");
                emitted.extend(new_envelopes);
            }
        }
        Ok(emitted)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

/// Convenience for handlers: fatal internal error.
pub(crate) fn internal(message: impl Into<String>) -> QuietError {
    QuietError::internal(message)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    /// Sets a marker by filling `error`-free state: flips `projected`.
    struct FlipProjected;

    impl Handler for FlipProjected {
        fn name(&self) -> &'static str {
            "flip_projected"
        }

        fn filter(&self, envelope: &Envelope) -> bool {
            !envelope.projected
        }

        fn process(&self, envelope: &mut Envelope, _store: &mut Store) -> Result<Vec<Envelope>> {
            envelope.projected = true;
            Ok(vec![Envelope::default()])
        }
    }

    /// Filter that never flips its gate: must trip the step cap.
    struct Stuck;

    impl Handler for Stuck {
        fn name(&self) -> &'static str {
            "stuck"
        }

        fn filter(&self, _envelope: &Envelope) -> bool {
            true
        }

        fn process(&self, _envelope: &mut Envelope, _store: &mut Store) -> Result<Vec<Envelope>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_applies_until_quiescent() {
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(FlipProjected));
        let mut store = Store::new();
        let mut envelope = Envelope::default();
        let emitted = registry
            .process_envelope(&mut envelope, &mut store)
            .expect("process");
        assert!(envelope.projected);
        assert_eq!(emitted.len(), 1);
    }

    #[test]
    fn test_step_cap_fails_envelope() {
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(Stuck));
        let mut store = Store::new();
        let mut envelope = Envelope::default();
        registry
            .process_envelope(&mut envelope, &mut store)
            .expect("process");
        assert!(envelope.error.as_deref().is_some_and(|e| e.contains("did not settle")));
    }
}
