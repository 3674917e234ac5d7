//! Core transcription trait, note events and the model input contract.
//!
//! # Overview
//!
//! [`Transcriber`] is the seam between the inference scheduler and whatever
//! runs the polyphonic model.  It is object-safe and `Send + Sync` so it can
//! be held behind an `Arc<dyn Transcriber>` and invoked from
//! `spawn_blocking`.
//!
//! [`OnnxTranscriber`](crate::model::OnnxTranscriber) is the production
//! implementation.  [`MockTranscriber`] (under `#[cfg(test)]`) returns
//! scripted note lists so the scheduler and controller can be exercised
//! without a model file or a microphone.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Model geometry (fixed by the pretrained network)
// ---------------------------------------------------------------------------

/// Sample rate the model was trained at.
pub const MODEL_SAMPLE_RATE: u32 = 22_050;

/// STFT hop length inside the model, in samples.
pub const FFT_HOP: usize = 256;

/// Exact input length: two seconds minus one hop (43 844 samples ≈ 1.988 s).
pub const MODEL_WINDOW_SAMPLES: usize = 2 * MODEL_SAMPLE_RATE as usize - FFT_HOP;

/// Activation frames per second produced by the model (≈ 86.13).
pub const ANNOTATIONS_FPS: f64 = MODEL_SAMPLE_RATE as f64 / FFT_HOP as f64;

/// MIDI number of the lowest pitch bin (A0).
pub const MIDI_OFFSET: i32 = 21;

/// Number of pitch bins in the frame/onset activation grids (piano range).
pub const N_PITCH_BINS: usize = 88;

// ---------------------------------------------------------------------------
// NoteEvent
// ---------------------------------------------------------------------------

/// A single transcribed note within one analysis window.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    /// MIDI note number (69 = A4).
    pub midi: i32,
    /// Onset time in seconds, relative to the window start.
    pub start_time: f64,
    /// Release time in seconds relative to the window start, or `None` when
    /// the note is still sounding at the end of the window.
    pub end_time: Option<f64>,
    /// Peak model activation for the note, in `[0, 1]`.
    pub salience: f32,
}

// ---------------------------------------------------------------------------
// TranscriberError
// ---------------------------------------------------------------------------

/// All errors that can arise from the transcription subsystem.
#[derive(Debug, Clone, Error)]
pub enum TranscriberError {
    /// The model file was not found at the given path.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The ONNX runtime failed to initialise a session.
    #[error("model session initialisation failed: {0}")]
    SessionInit(String),

    /// The input buffer is not exactly [`MODEL_WINDOW_SAMPLES`] long.
    #[error("model input must be {expected} samples, got {got}")]
    InputLength { expected: usize, got: usize },

    /// An error occurred during the inference pass.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The model returned outputs with missing names or unexpected shapes.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for polyphonic transcription.
///
/// # Contract
///
/// - `samples` must be **22 050 Hz, mono, f32** PCM, exactly
///   [`MODEL_WINDOW_SAMPLES`] long — use [`pack_model_window`] to zero-pad or
///   truncate a resampled rolling window to size.
/// - Returns one [`NoteEvent`] per detected note; `salience` is the model's
///   peak activation amplitude in `[0, 1]`.
/// - A failed inference returns [`TranscriberError`]; the caller reports it
///   and keeps ticking.
pub trait Transcriber: Send + Sync {
    /// Transcribe one analysis window into note events.
    fn evaluate(&self, samples: &[f32]) -> Result<Vec<NoteEvent>, TranscriberError>;
}

// Compile-time assertion: Box<dyn Transcriber> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Transcriber>) {}
};

// ---------------------------------------------------------------------------
// pack_model_window
// ---------------------------------------------------------------------------

/// Fit a resampled window into the model's fixed input length.
///
/// Shorter inputs are zero-padded at the **front** (the most recent audio
/// stays aligned to the end of the window); longer inputs contribute only
/// their trailing [`MODEL_WINDOW_SAMPLES`] samples.
///
/// `out` must be exactly [`MODEL_WINDOW_SAMPLES`] long.
pub fn pack_model_window(resampled: &[f32], out: &mut [f32]) {
    debug_assert_eq!(out.len(), MODEL_WINDOW_SAMPLES);

    if resampled.len() >= out.len() {
        let tail = &resampled[resampled.len() - out.len()..];
        out.copy_from_slice(tail);
    } else {
        let pad = out.len() - resampled.len();
        out[..pad].fill(0.0);
        out[pad..].copy_from_slice(resampled);
    }
}

// ---------------------------------------------------------------------------
// MockTranscriber  (test-only)
// ---------------------------------------------------------------------------

/// A test double that returns a scripted sequence of results without loading
/// any model, optionally sleeping to simulate inference latency.
#[cfg(test)]
pub struct MockTranscriber {
    script: std::sync::Mutex<std::collections::VecDeque<Result<Vec<NoteEvent>, TranscriberError>>>,
    fallback: Vec<NoteEvent>,
    delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl MockTranscriber {
    /// A mock that always detects the given MIDI notes with salience 0.9.
    pub fn notes(midis: &[i32]) -> Self {
        Self {
            script: std::sync::Mutex::new(std::collections::VecDeque::new()),
            fallback: Self::events(midis),
            delay: None,
        }
    }

    /// A mock that replays `steps` in order, then repeats the last step's
    /// note list forever.
    pub fn sequence(steps: Vec<Result<Vec<NoteEvent>, TranscriberError>>) -> Self {
        let fallback = steps
            .iter()
            .rev()
            .find_map(|r| r.as_ref().ok().cloned())
            .unwrap_or_default();
        Self {
            script: std::sync::Mutex::new(steps.into()),
            fallback,
            delay: None,
        }
    }

    /// Add a fixed per-call latency (simulates a slow model).
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Build note events for a set of MIDI numbers, salience 0.9.
    pub fn events(midis: &[i32]) -> Vec<NoteEvent> {
        midis
            .iter()
            .map(|&midi| NoteEvent {
                midi,
                start_time: 0.0,
                end_time: None,
                salience: 0.9,
            })
            .collect()
    }
}

#[cfg(test)]
impl Transcriber for MockTranscriber {
    fn evaluate(&self, samples: &[f32]) -> Result<Vec<NoteEvent>, TranscriberError> {
        // Enforce the input-length contract even in the mock so callers are
        // tested against it.
        if samples.len() != MODEL_WINDOW_SAMPLES {
            return Err(TranscriberError::InputLength {
                expected: MODEL_WINDOW_SAMPLES,
                got: samples.len(),
            });
        }

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            Some(step) => step,
            None => Ok(self.fallback.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
