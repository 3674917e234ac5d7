//! Model registry, metadata and path resolution.
//!
//! [`TRANSCRIPTION_MODELS`] lists the ONNX artifacts the verifier knows how
//! to run.  [`ModelPaths`] resolves the on-disk location of a model given an
//! [`crate::config::AppPaths`] instance.

use std::path::PathBuf;

use crate::config::AppPaths;

// ---------------------------------------------------------------------------
// ModelInfo
// ---------------------------------------------------------------------------

/// Static metadata for a single ONNX model file.
#[derive(Debug)]
pub struct ModelInfo {
    /// Unique identifier used in `ModelSettings::model`.
    pub id: &'static str,
    /// Human-readable display name.
    pub display_name: &'static str,
    /// File name under the models directory.
    pub file_name: &'static str,
    /// Approximate file size in megabytes.
    pub file_size_mb: u64,
    /// Source URL for obtaining the ONNX file.
    pub source_url: &'static str,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Known polyphonic transcription models.
///
/// There is currently a single entry — the ICASSP 2022 neural music pitch
/// network, which fixes the 22 050 Hz / 43 844-sample input contract the
/// rest of the pipeline is built around.
pub const TRANSCRIPTION_MODELS: &[ModelInfo] = &[ModelInfo {
    id: "nmp-icassp2022",
    display_name: "Neural Music Pitch (ICASSP 2022)",
    file_name: "nmp.onnx",
    file_size_mb: 9,
    source_url: "https://github.com/spotify/basic-pitch",
}];

/// Find a [`ModelInfo`] by its `id` string.
pub fn find_model_by_id(id: &str) -> Option<&'static ModelInfo> {
    TRANSCRIPTION_MODELS.iter().find(|m| m.id == id)
}

// ---------------------------------------------------------------------------
// ModelPaths
// ---------------------------------------------------------------------------

/// Resolves the on-disk location of model files.
///
/// ```rust,no_run
/// use chordcheck::config::AppPaths;
/// use chordcheck::model::{ModelPaths, TRANSCRIPTION_MODELS};
///
/// let paths = ModelPaths::from_app_paths(&AppPaths::new());
/// let available: Vec<_> = TRANSCRIPTION_MODELS
///     .iter()
///     .filter(|m| paths.is_available(m))
///     .collect();
/// ```
#[derive(Debug, Clone)]
pub struct ModelPaths {
    /// Directory that contains (or will contain) ONNX model files.
    pub models_dir: PathBuf,
}

impl ModelPaths {
    /// Build a [`ModelPaths`] from the application's [`AppPaths`].
    pub fn from_app_paths(app_paths: &AppPaths) -> Self {
        Self {
            models_dir: app_paths.models_dir.clone(),
        }
    }

    /// Construct directly from a models directory path (useful in tests).
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    /// Full path to the ONNX file for the given model.
    pub fn model_path(&self, model: &ModelInfo) -> PathBuf {
        self.models_dir.join(model.file_name)
    }

    /// Returns `true` if the model file exists on disk.
    pub fn is_available(&self, model: &ModelInfo) -> bool {
        self.model_path(model).exists()
    }

    /// Returns all registered models that are present on disk.
    pub fn list_local_models(&self) -> Vec<&'static ModelInfo> {
        TRANSCRIPTION_MODELS
            .iter()
            .filter(|m| self.is_available(m))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_model_by_id_known() {
        let m = find_model_by_id("nmp-icassp2022");
        assert!(m.is_some());
        assert_eq!(m.unwrap().file_name, "nmp.onnx");
    }

    #[test]
    fn find_model_by_id_unknown() {
        assert!(find_model_by_id("does-not-exist").is_none());
    }

    #[test]
    fn model_paths_non_existent_returns_false() {
        let mp = ModelPaths::new("/nonexistent/path");
        assert!(!mp.is_available(&TRANSCRIPTION_MODELS[0]));
        assert!(mp.list_local_models().is_empty());
    }

    #[test]
    fn model_paths_correct_file_name() {
        let mp = ModelPaths::new("/models");
        let p = mp.model_path(&TRANSCRIPTION_MODELS[0]);
        assert!(p.to_str().unwrap().ends_with("nmp.onnx"));
    }
}
