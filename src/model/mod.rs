//! Polyphonic transcription module.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                Transcriber (trait)                    │
//! │                                                      │
//! │   ┌─────────────┐    ┌────────────────┐              │
//! │   │  ModelPaths  │    │ OnnxTranscriber│              │
//! │   │ - resolve    │───▶│ - session      │              │
//! │   │ - exists?    │    │ - output map   │              │
//! │   └─────────────┘    └───────┬────────┘              │
//! │                              │                       │
//! │                              ▼                       │
//! │                    ┌──────────────────┐              │
//! │                    │   evaluate()     │              │
//! │                    │ window → notes   │              │
//! │                    └──────────────────┘              │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use chordcheck::model::{OnnxTranscriber, Transcriber, MODEL_WINDOW_SAMPLES};
//!
//! let transcriber = OnnxTranscriber::load("models/nmp.onnx", 4)
//!     .expect("model not found — download it first");
//!
//! // One silent window (zero-padded to the model's fixed input length).
//! let window = vec![0.0_f32; MODEL_WINDOW_SAMPLES];
//! let notes = transcriber.evaluate(&window).unwrap();
//! assert!(notes.is_empty());
//! ```

pub mod events;
pub mod onnx;
pub mod registry;
pub mod transcriber;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use events::{extract_notes, ActivationGrid, NoteExtraction};
pub use onnx::OnnxTranscriber;
pub use registry::{find_model_by_id, ModelInfo, ModelPaths, TRANSCRIPTION_MODELS};
pub use transcriber::{
    pack_model_window, NoteEvent, Transcriber, TranscriberError, ANNOTATIONS_FPS, FFT_HOP,
    MIDI_OFFSET, MODEL_SAMPLE_RATE, MODEL_WINDOW_SAMPLES, N_PITCH_BINS,
};

// test-only re-export so pipeline test modules can import MockTranscriber
// without reaching into the transcriber module.
#[cfg(test)]
pub use transcriber::MockTranscriber;
