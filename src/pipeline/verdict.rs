//! The verdict stream — everything the verifier tells its consumer.
//!
//! Verdicts are produced by the inference worker and dispatched immediately
//! to every registered callback; nothing is stored.  Timestamps are seconds
//! since `start()` and are non-decreasing within a session.

use crate::model::NoteEvent;
use crate::verify::PitchClass;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// One event on the result stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// One completed inference pass: when it finished and how long the model
    /// took.  Useful for latency monitoring.
    Tick { t: f64, inference_ms: f64 },

    /// Raw per-tick detections, before aggregation — an optional overlay for
    /// consumers that want to visualise what the model hears.
    Notes { t: f64, notes: Vec<NoteEvent> },

    /// The expected chord was held for the confirmation window.
    Match { t: f64 },

    /// A failed tick, with the diagnostic pitch-class partition:
    /// `matched ∪ missing` is exactly the expected set and the two are
    /// disjoint.
    Miss {
        t: f64,
        matched: Vec<PitchClass>,
        missing: Vec<PitchClass>,
    },

    /// A recoverable or fatal failure; the message is opaque to consumers.
    Error { message: String },
}

impl Verdict {
    /// The session timestamp this verdict carries, if any.
    pub fn timestamp(&self) -> Option<f64> {
        match self {
            Verdict::Tick { t, .. }
            | Verdict::Notes { t, .. }
            | Verdict::Match { t }
            | Verdict::Miss { t, .. } => Some(*t),
            Verdict::Error { .. } => None,
        }
    }

    /// Returns `true` for `Match` and `Miss` — the verdicts a practice UI
    /// reacts to.
    pub fn is_decision(&self) -> bool {
        matches!(self, Verdict::Match { .. } | Verdict::Miss { .. })
    }
}

// ---------------------------------------------------------------------------
// VerdictSink
// ---------------------------------------------------------------------------

/// A registered verdict consumer.
pub(crate) type VerdictCallback = Box<dyn Fn(&Verdict) + Send>;

/// Fan-out point between the inference worker and subscribed callbacks.
///
/// Cloned into the worker; the controller keeps the other handle so
/// `on_result` subscriptions made after `start()` still take effect.
/// Callbacks run synchronously on the worker task, so they should be quick —
/// forward into a channel if heavy processing is needed.
#[derive(Clone)]
pub(crate) struct VerdictSink {
    callbacks: std::sync::Arc<std::sync::Mutex<Vec<VerdictCallback>>>,
}

impl VerdictSink {
    pub(crate) fn new() -> Self {
        Self {
            callbacks: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn register(&self, callback: VerdictCallback) {
        self.callbacks.lock().unwrap().push(callback);
    }

    pub(crate) fn emit(&self, verdict: &Verdict) {
        for callback in self.callbacks.lock().unwrap().iter() {
            callback(verdict);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_exposed() {
        assert_eq!(
            Verdict::Tick {
                t: 1.5,
                inference_ms: 12.0
            }
            .timestamp(),
            Some(1.5)
        );
        assert_eq!(Verdict::Match { t: 2.0 }.timestamp(), Some(2.0));
        assert_eq!(
            Verdict::Error {
                message: "x".into()
            }
            .timestamp(),
            None
        );
    }

    #[test]
    fn sink_fans_out_to_every_callback() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let sink = VerdictSink::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            sink.register(Box::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // A clone shares the registry, as the worker's copy does.
        sink.clone().emit(&Verdict::Match { t: 0.0 });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn decisions_are_match_and_miss() {
        assert!(Verdict::Match { t: 0.0 }.is_decision());
        assert!(Verdict::Miss {
            t: 0.0,
            matched: vec![],
            missing: vec![PitchClass::E]
        }
        .is_decision());
        assert!(!Verdict::Tick {
            t: 0.0,
            inference_ms: 0.0
        }
        .is_decision());
    }
}
