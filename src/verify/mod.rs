//! Chord verification — pitch-class reduction, aggregation, and policy.
//!
//! The inference worker hands each tick's note list to [`TickHistory`] for
//! smoothing, then to [`PolicyEngine`] for the pass/fail decision against
//! the current [`ChordSpec`].  Everything in this module is plain
//! single-threaded state owned by the worker.

pub mod aggregate;
pub mod chord;
pub mod policy;

pub use aggregate::TickHistory;
pub use chord::{midi_to_hz, ChordSpec, ChordSpecError, PitchClass};
pub use policy::{Decision, PolicyEngine, PolicyPhase, VerifyPolicy};
