//! # chordcheck — real-time polyphonic chord verification
//!
//! Listens to a microphone, transcribes the notes being played with a
//! pretrained polyphonic pitch model, and checks them against an expected
//! chord supplied by the caller (typically a practice UI stepping through a
//! score).  Verdicts stream out as [`Verdict`] events: `Match` when the
//! student has held the expected chord long enough, `Miss` with the matched
//! and missing pitch classes otherwise.
//!
//! # Pipeline
//!
//! ```text
//! Mic → cpal callback → SampleRing (lock-free SPSC) → tick loop (40 ms)
//!     → linear resample to 22 050 Hz → ONNX transcription → NoteEvents
//!     → temporal aggregation → chord policy → Verdict stream
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chordcheck::{
//!     ChordSpec, ChordVerifier, OnnxTranscriber, PitchClass, Verdict, VerifierConfig,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = VerifierConfig::load()?;
//! let transcriber = Arc::new(OnnxTranscriber::load("models/nmp.onnx", 4)?);
//!
//! let mut verifier = ChordVerifier::new(config, transcriber)?;
//! verifier.on_result(|v| {
//!     if let Verdict::Match { t } = v {
//!         println!("matched at {t:.2}s");
//!     }
//! });
//!
//! // E minor triad: E, G, B — any 2 of 3 pitch classes count.
//! let e_minor = ChordSpec::new(
//!     [PitchClass::E, PitchClass::G, PitchClass::B],
//!     2,
//!     Some(PitchClass::E),
//! )?;
//! verifier.set_expected(e_minor);
//! verifier.start()?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod model;
pub mod pipeline;
pub mod verify;

pub use audio::{AudioCapture, CaptureError, StreamHandle};
pub use config::{AppPaths, AudioSettings, ModelSettings, PolicySettings, VerifierConfig};
pub use model::{NoteEvent, OnnxTranscriber, Transcriber, TranscriberError};
pub use pipeline::{ChordVerifier, StartError, Verdict, VerifierStatus};
pub use verify::{ChordSpec, ChordSpecError, PitchClass, VerifyPolicy};
