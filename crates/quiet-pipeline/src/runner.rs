//! Pipeline runner: iterative fixpoint over a work queue of envelopes.
//!
//! Non-placeholder envelopes drain first; placeholder-bearing ones are
//! resolved against the ids generated so far (positional, per kind) just
//! before processing. Emitted envelopes feed back into the queue. A hard
//! iteration cap turns a loop bug into a fatal error rather than a hang.

use crate::handler::{internal, HandlerRegistry};
use quiet_core::{Envelope, EventId, EventKind, GeneratedIds, Result, PLACEHOLDER_PREFIX};
use quiet_store::Store;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Fixpoint cap: hitting it is a loop bug, not a data condition.
pub const MAX_ITERATIONS: usize = 1000;

/// What one runner invocation produced.
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// `event_type → event_id` for kinds that stored exactly one event
    pub stored_ids: BTreeMap<EventKind, EventId>,
    /// Envelopes processed (including re-queued ones)
    pub processed: usize,
    /// Envelopes emitted by handlers
    pub emitted: usize,
    /// Per-envelope failures recorded during the run
    pub failures: Vec<String>,
}

/// Single-threaded cooperative fixpoint runner.
#[derive(Debug, Clone)]
pub struct PipelineRunner {
    max_iterations: usize,
}

impl Default for PipelineRunner {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
        }
    }
}

impl PipelineRunner {
    /// Runner with the standard iteration cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner with a custom cap (tests).
    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Self { max_iterations }
    }

    /// Drive the input envelopes (and everything they emit) to
    /// completion against one store.
    ///
    /// # Errors
    ///
    /// Only the iteration cap and store-invariant breakage surface as
    /// `Err`; per-envelope failures are recorded in the outcome.
    pub fn run(
        &self,
        registry: &HandlerRegistry,
        store: &mut Store,
        input: Vec<Envelope>,
    ) -> Result<RunOutcome> {
        let mut outcome = RunOutcome::default();
        let mut generated = GeneratedIds::default();
        // event_id -> kind, for the single-stored-per-kind response map
        let mut stored: BTreeMap<EventId, EventKind> = BTreeMap::new();

        let (mut queue, mut deferred): (Vec<Envelope>, Vec<Envelope>) =
            input.into_iter().partition(|env| !has_placeholders(env));
        debug!(
            immediate = queue.len(),
            deferred = deferred.len(),
            "runner seeded"
        );

        let mut iterations = 0;
        loop {
            if queue.is_empty() {
                if deferred.is_empty() {
                    break;
                }
                // Placeholder phase: everything producible has been
                // produced; resolve and admit the deferred envelopes.
                queue = deferred
                    .drain(..)
                    .map(|mut env| {
                        resolve_envelope_placeholders(&mut env, &generated);
                        env
                    })
                    .collect();
            }

            iterations += 1;
            if iterations > self.max_iterations {
                return Err(internal(format!(
                    "pipeline exceeded {} iterations (infinite loop detected)",
                    self.max_iterations
                )));
            }

            let mut next_queue = Vec::new();
            for mut envelope in queue.drain(..) {
                outcome.processed += 1;
                let emitted = registry.process_envelope(&mut envelope, store)?;
                outcome.emitted += emitted.len();

                if let (Some(id), Some(kind)) = (&envelope.event_id, envelope.event_type) {
                    generated.record(kind, id.clone());
                    if envelope.stored {
                        stored.insert(id.clone(), kind);
                    }
                }
                if let Some(error) = &envelope.error {
                    warn!(event_id = ?envelope.event_id, error = %error, "envelope dropped");
                    outcome.failures.push(error.clone());
                }

                next_queue.extend(emitted);
            }
            queue = next_queue;
        }

        let mut counts: BTreeMap<EventKind, usize> = BTreeMap::new();
        for kind in stored.values() {
            *counts.entry(*kind).or_insert(0) += 1;
        }
        for (id, kind) in &stored {
            if counts.get(kind) == Some(&1) {
                outcome.stored_ids.insert(*kind, id.clone());
            }
        }

        info!(
            processed = outcome.processed,
            emitted = outcome.emitted,
            stored = stored.len(),
            failures = outcome.failures.len(),
            iterations,
            "pipeline run complete"
        );
        Ok(outcome)
    }
}

/// Placeholders can sit in the event payload, the deps, or the
/// envelope-level signer reference.
fn has_placeholders(env: &Envelope) -> bool {
    if env
        .peer_id
        .as_deref()
        .is_some_and(|p| p.starts_with(PLACEHOLDER_PREFIX))
    {
        return true;
    }
    env.event_plaintext
        .as_ref()
        .is_some_and(|event| event.has_placeholders())
}

/// Resolve what the run has generated so far; anything left dangling
/// fails the envelope (boundary behavior: out-of-range placeholders are
/// dropped with an error, never silently substituted).
fn resolve_envelope_placeholders(env: &mut Envelope, generated: &GeneratedIds) {
    if let Some(peer_ref) = env.peer_id.clone() {
        if peer_ref.starts_with(PLACEHOLDER_PREFIX) {
            match generated.resolve_str(&peer_ref) {
                Some(id) => env.peer_id = Some(id.to_string()),
                None => {
                    env.fail(format!("unresolvable placeholder: {peer_ref}"));
                    return;
                }
            }
        }
    }
    if let Some(event) = env.event_plaintext.as_mut() {
        if let Err(e) = event.resolve_placeholders(generated) {
            env.fail(format!("{e}"));
            return;
        }
        if event.has_placeholders() {
            env.fail("unresolvable placeholder in event");
        }
    }
}
