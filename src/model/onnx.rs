//! ONNX-backed polyphonic transcription.
//!
//! [`OnnxTranscriber`] wraps an `ort` session around the pretrained pitch
//! model.  One [`evaluate`](crate::model::Transcriber::evaluate) call runs a
//! single forward pass over a fixed 43 844-sample window and converts the
//! frame/onset activation grids into [`NoteEvent`]s via
//! [`extract_notes`](super::events::extract_notes).
//!
//! The network is a TensorFlow export, so its tensor names carry the
//! `serving_default` / `StatefulPartitionedCall` convention; the constants
//! below pin the mapping.  Output indices are resolved by name once at load
//! time so a model with a different signature fails fast instead of
//! producing garbage verdicts.

use std::path::Path;

use ndarray::{Array3, CowArray};
use ort::tensor::OrtOwnedTensor;
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};

use super::events::{extract_notes, ActivationGrid, NoteExtraction};
use super::transcriber::{
    NoteEvent, Transcriber, TranscriberError, MODEL_WINDOW_SAMPLES, N_PITCH_BINS,
};

/// Name of the audio input tensor: shape `[1, 43844, 1]`.
const INPUT_NAME: &str = "serving_default_input_2:0";

/// Frame (sounding-pitch) activations: shape `[1, frames, 88]`.
const NOTE_OUTPUT_NAME: &str = "StatefulPartitionedCall:1";

/// Onset activations: shape `[1, frames, 88]`.
const ONSET_OUTPUT_NAME: &str = "StatefulPartitionedCall:2";

// ---------------------------------------------------------------------------
// OnnxTranscriber
// ---------------------------------------------------------------------------

/// Production transcriber backed by ONNX Runtime.
///
/// `run` on an `ort` session is thread-safe, so the transcriber can be
/// shared behind an `Arc<dyn Transcriber>` and called from the blocking
/// thread pool without any locking.
pub struct OnnxTranscriber {
    session: Session,
    note_output: usize,
    onset_output: usize,
    extraction: NoteExtraction,
}

impl std::fmt::Debug for OnnxTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxTranscriber")
            .field("note_output", &self.note_output)
            .field("onset_output", &self.onset_output)
            .finish_non_exhaustive()
    }
}

// The session holds the loaded graph, which is read-only after
// initialisation, and onnxruntime documents `Run` as thread-safe.
// SAFETY: no interior mutation is reachable through &OnnxTranscriber.
unsafe impl Send for OnnxTranscriber {}
unsafe impl Sync for OnnxTranscriber {}

impl OnnxTranscriber {
    /// Load the model from `model_path` and prepare it for inference.
    ///
    /// `intra_threads` caps the ONNX Runtime intra-op thread pool; the 40 ms
    /// tick budget is comfortably met with 2–4 threads on desktop CPUs.
    ///
    /// # Errors
    ///
    /// - [`TranscriberError::ModelNotFound`] — `model_path` does not exist.
    /// - [`TranscriberError::SessionInit`] — the runtime rejected the file.
    /// - [`TranscriberError::MalformedOutput`] — the graph lacks the
    ///   expected output tensors.
    pub fn load(
        model_path: impl AsRef<Path>,
        intra_threads: i16,
    ) -> Result<Self, TranscriberError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(TranscriberError::ModelNotFound(path.display().to_string()));
        }

        let environment = Environment::builder()
            .with_name("chordcheck")
            .build()
            .map_err(|e| TranscriberError::SessionInit(e.to_string()))?
            .into_arc();

        let session = SessionBuilder::new(&environment)
            .map_err(|e| TranscriberError::SessionInit(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| TranscriberError::SessionInit(e.to_string()))?
            .with_intra_threads(intra_threads)
            .map_err(|e| TranscriberError::SessionInit(e.to_string()))?
            .with_model_from_file(path)
            .map_err(|e| TranscriberError::SessionInit(e.to_string()))?;

        let note_output = output_index(&session, NOTE_OUTPUT_NAME)?;
        let onset_output = output_index(&session, ONSET_OUTPUT_NAME)?;

        // Inputs bind positionally, so a renamed input tensor still works as
        // long as the shape matches; flag it anyway.
        if let Some(input) = session.inputs.first() {
            if input.name != INPUT_NAME {
                log::warn!(
                    "model input tensor is named {:?} (expected {INPUT_NAME:?})",
                    input.name
                );
            }
        }

        log::info!(
            "transcription model loaded: {} ({} outputs)",
            path.display(),
            session.outputs.len()
        );

        Ok(Self {
            session,
            note_output,
            onset_output,
            extraction: NoteExtraction::default(),
        })
    }

    /// Override the note-extraction thresholds.
    pub fn with_extraction(mut self, extraction: NoteExtraction) -> Self {
        self.extraction = extraction;
        self
    }
}

impl Transcriber for OnnxTranscriber {
    fn evaluate(&self, samples: &[f32]) -> Result<Vec<NoteEvent>, TranscriberError> {
        if samples.len() != MODEL_WINDOW_SAMPLES {
            return Err(TranscriberError::InputLength {
                expected: MODEL_WINDOW_SAMPLES,
                got: samples.len(),
            });
        }

        // Shape [batch=1, samples, channels=1], as the TF export expects.
        let array = Array3::from_shape_vec((1, MODEL_WINDOW_SAMPLES, 1), samples.to_vec())
            .map_err(|e| TranscriberError::Inference(e.to_string()))?
            .into_dyn();
        let cow = CowArray::from(array);

        let input = Value::from_array(self.session.allocator(), &cow)
            .map_err(|e| TranscriberError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(vec![input])
            .map_err(|e| TranscriberError::Inference(e.to_string()))?;

        let frames = grid_from_output(&outputs[self.note_output], "note")?;
        let onsets = grid_from_output(&outputs[self.onset_output], "onset")?;

        if frames.frames() != onsets.frames() {
            return Err(TranscriberError::MalformedOutput(format!(
                "frame/onset grids disagree: {} vs {} frames",
                frames.frames(),
                onsets.frames()
            )));
        }

        Ok(extract_notes(&frames, &onsets, &self.extraction))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve an output tensor's position by name.
fn output_index(session: &Session, name: &str) -> Result<usize, TranscriberError> {
    session
        .outputs
        .iter()
        .position(|o| o.name == name)
        .ok_or_else(|| {
            TranscriberError::MalformedOutput(format!("model has no output named {name:?}"))
        })
}

/// Extract a `[1, frames, 88]` activation tensor into an [`ActivationGrid`].
fn grid_from_output(value: &Value, label: &str) -> Result<ActivationGrid, TranscriberError> {
    let tensor: OrtOwnedTensor<f32, _> = value
        .try_extract()
        .map_err(|e| TranscriberError::MalformedOutput(format!("{label}: {e}")))?;
    let view = tensor.view();
    let shape = view.shape();

    if shape.len() != 3 || shape[0] != 1 || shape[2] != N_PITCH_BINS {
        return Err(TranscriberError::MalformedOutput(format!(
            "{label}: unexpected shape {shape:?}"
        )));
    }

    let n_frames = shape[1];
    let data: Vec<f32> = view.iter().copied().collect();

    ActivationGrid::new(n_frames, N_PITCH_BINS, data).ok_or_else(|| {
        TranscriberError::MalformedOutput(format!("{label}: grid size mismatch"))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
