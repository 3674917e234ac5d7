//! Audio front end — microphone capture → lock-free ring → resampling.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → mono downmix → SampleRing (SPSC, lock-free)
//!           → read_latest (rolling window) → resample_linear → model input
//! ```
//!
//! The capture side runs on the host's real-time audio thread and never
//! blocks, locks, or allocates; the only shared state with the inference
//! worker is the [`ring`] pair.

pub mod capture;
pub mod gate;
pub mod resample;
pub mod ring;

pub use capture::{AudioCapture, CaptureError, CaptureFault, StreamHandle};
pub use gate::{window_rms, NoiseGate};
pub use resample::{output_len, resample_linear};
pub use ring::{ring, RingConsumer, RingProducer};
