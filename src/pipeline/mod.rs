//! Session orchestration — controller, tick scheduler, verdict stream.
//!
//! # Concurrency model
//!
//! Two execution contexts share exactly one thing, the lock-free sample
//! ring:
//!
//! 1. **Capture context** — the host audio callback.  Non-blocking,
//!    non-allocating; appends to the ring and nothing else.
//! 2. **Inference context** — the scheduler worker task.  Reads the
//!    ring, resamples, runs the model on the blocking pool, owns the
//!    aggregator and policy state, and dispatches verdicts.
//!
//! The controller talks to the worker only through its command channel, so
//! target changes land at tick boundaries and no mutex is ever contended on
//! the hot path.

pub mod controller;
pub(crate) mod scheduler;
pub mod status;
pub mod verdict;

pub use controller::{ChordVerifier, StartError};
pub use status::VerifierStatus;
pub use verdict::Verdict;
