//! Verifier settings structs, defaults, validation and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across
//! threads.  [`VerifierConfig::validate`] rejects inconsistent values at the
//! call site before any pipeline state is touched.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::verify::VerifyPolicy;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration value that cannot drive the pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("window_sec must be positive, got {0}")]
    NonPositiveWindow(f64),

    #[error("tick_ms must be at least 1")]
    ZeroTick,

    #[error("aggregator_max_len must be 3..=5, got {0}")]
    AggregatorLen(usize),

    #[error("frames_confirm must be at least 1")]
    ZeroFramesConfirm,

    #[error("salience_threshold must be in [0, 1], got {0}")]
    SalienceRange(f32),

    #[error("frequency range must satisfy 0 < min_f0_hz < max_f0_hz, got {min}..{max}")]
    F0Range { min: f64, max: f64 },

    #[error("a4_hz must be positive, got {0}")]
    NonPositiveA4(f64),
}

// ---------------------------------------------------------------------------
// AudioSettings
// ---------------------------------------------------------------------------

/// Settings for capture, windowing and the tick cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Rolling window length in seconds fed to the transcription model.
    pub window_sec: f64,
    /// Scheduler period in milliseconds.
    pub tick_ms: u64,
    /// RMS threshold below which the analysis window is skipped entirely.
    /// `0.0` disables the gate.
    pub noise_gate_rms: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            window_sec: 1.3,
            tick_ms: 40,
            noise_gate_rms: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelSettings
// ---------------------------------------------------------------------------

/// Settings for the transcription model runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Registry id of the model to load (see
    /// [`crate::model::TRANSCRIPTION_MODELS`]).
    pub model: String,
    /// Intra-op thread count handed to the ONNX runtime.
    pub intra_threads: i16,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "nmp-icassp2022".into(),
            intra_threads: optimal_threads(),
        }
    }
}

/// Number of CPU threads to hand the model runtime, capped at 4 — the 40 ms
/// inference budget saturates well before that on desktop hardware.
pub(crate) fn optimal_threads() -> i16 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4) as i16)
        .unwrap_or(2)
}

// ---------------------------------------------------------------------------
// PolicySettings
// ---------------------------------------------------------------------------

/// Settings for the chord verification policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Consecutive passing ticks required before a `Match` is emitted.
    pub frames_confirm: u32,
    /// Minimum interval between `Miss` emissions, in milliseconds.
    pub miss_cooldown_ms: u64,
    /// Minimum salience for a note to participate in matching.
    pub salience_threshold: f32,
    /// Detune tolerance in cents.  When set it overrides
    /// `salience_threshold` through a small lookup (tighter tolerance →
    /// stronger evidence demanded).
    pub cents_tol: Option<f32>,
    /// Semitones added to detected MIDI before pitch-class reduction
    /// (e.g. `2` when playing with a capo on the second fret).
    pub transpose_semitones: i32,
    /// When `false`, additionally require the lowest detected note to be the
    /// chord root.
    pub accept_inversions: bool,
    /// Matching strategy.
    pub policy: VerifyPolicy,
    /// Number of recent ticks fused by the temporal aggregator (3–5).
    pub aggregator_max_len: usize,
    /// Lowest acceptable fundamental, Hz.  Default is E2; widen to 73.42 Hz
    /// (D2) for dropped tunings.
    pub min_f0_hz: f64,
    /// Highest acceptable fundamental, Hz (E6 by default).
    pub max_f0_hz: f64,
    /// Tuning reference for MIDI→frequency conversion.
    pub a4_hz: f64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            frames_confirm: 3,
            miss_cooldown_ms: 250,
            salience_threshold: 0.2,
            cents_tol: None,
            transpose_semitones: 0,
            accept_inversions: true,
            policy: VerifyPolicy::KOfN,
            aggregator_max_len: 5,
            min_f0_hz: 82.41,
            max_f0_hz: 1318.51,
            a4_hz: 440.0,
        }
    }
}

// ---------------------------------------------------------------------------
// VerifierConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level verifier configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use chordcheck::config::VerifierConfig;
///
/// // Load (returns Default when the file is missing)
/// let config = VerifierConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Capture, windowing and cadence settings.
    pub audio: AudioSettings,
    /// Model runtime settings.
    pub model: ModelSettings,
    /// Verification policy settings.
    pub policy: PolicySettings,
}

impl VerifierConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(VerifierConfig::default())` when the file does not exist
    /// yet (first-run scenario) so callers never need to special-case a
    /// missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns `true` when no `settings.toml` file exists yet.
    pub fn is_first_run() -> bool {
        !AppPaths::new().settings_file.exists()
    }

    /// Reject values the pipeline cannot run with.  Called by the verifier
    /// controller before any resource is acquired.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.audio.window_sec > 0.0) {
            return Err(ConfigError::NonPositiveWindow(self.audio.window_sec));
        }
        if self.audio.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        if !(3..=5).contains(&self.policy.aggregator_max_len) {
            return Err(ConfigError::AggregatorLen(self.policy.aggregator_max_len));
        }
        if self.policy.frames_confirm == 0 {
            return Err(ConfigError::ZeroFramesConfirm);
        }
        if !(0.0..=1.0).contains(&self.policy.salience_threshold) {
            return Err(ConfigError::SalienceRange(self.policy.salience_threshold));
        }
        if !(self.policy.min_f0_hz > 0.0 && self.policy.min_f0_hz < self.policy.max_f0_hz) {
            return Err(ConfigError::F0Range {
                min: self.policy.min_f0_hz,
                max: self.policy.max_f0_hz,
            });
        }
        if !(self.policy.a4_hz > 0.0) {
            return Err(ConfigError::NonPositiveA4(self.policy.a4_hz));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Verify that a default `VerifierConfig` survives a TOML round trip.
    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = VerifierConfig::default();
        original.save_to(&path).expect("save");

        let loaded = VerifierConfig::load_from(&path).expect("load");

        assert_eq!(original.audio.window_sec, loaded.audio.window_sec);
        assert_eq!(original.audio.tick_ms, loaded.audio.tick_ms);
        assert_eq!(original.model.model, loaded.model.model);
        assert_eq!(original.policy.frames_confirm, loaded.policy.frames_confirm);
        assert_eq!(
            original.policy.miss_cooldown_ms,
            loaded.policy.miss_cooldown_ms
        );
        assert_eq!(original.policy.policy, loaded.policy.policy);
        assert_eq!(original.policy.cents_tol, loaded.policy.cents_tol);
        assert_eq!(original.policy.a4_hz, loaded.policy.a4_hz);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = VerifierConfig::load_from(&path).expect("should not error");
        let default = VerifierConfig::default();

        assert_eq!(config.audio.window_sec, default.audio.window_sec);
        assert_eq!(config.policy.frames_confirm, default.policy.frames_confirm);
    }

    /// Verify default values match the documented behaviour.
    #[test]
    fn default_values() {
        let cfg = VerifierConfig::default();

        assert_eq!(cfg.audio.window_sec, 1.3);
        assert_eq!(cfg.audio.tick_ms, 40);
        assert_eq!(cfg.audio.noise_gate_rms, 0.0);
        assert_eq!(cfg.model.model, "nmp-icassp2022");
        assert_eq!(cfg.policy.frames_confirm, 3);
        assert_eq!(cfg.policy.miss_cooldown_ms, 250);
        assert_eq!(cfg.policy.salience_threshold, 0.2);
        assert_eq!(cfg.policy.cents_tol, None);
        assert_eq!(cfg.policy.transpose_semitones, 0);
        assert!(cfg.policy.accept_inversions);
        assert_eq!(cfg.policy.policy, VerifyPolicy::KOfN);
        assert_eq!(cfg.policy.aggregator_max_len, 5);
        assert!((cfg.policy.min_f0_hz - 82.41).abs() < 1e-9);
        assert!((cfg.policy.max_f0_hz - 1318.51).abs() < 1e-9);
        assert_eq!(cfg.policy.a4_hz, 440.0);
        assert!(cfg.validate().is_ok());
    }

    /// Modified non-default values must survive a round trip.
    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = VerifierConfig::default();
        cfg.audio.window_sec = 1.0;
        cfg.audio.tick_ms = 50;
        cfg.policy.policy = VerifyPolicy::BassPriority;
        cfg.policy.cents_tol = Some(25.0);
        cfg.policy.transpose_semitones = 2;
        cfg.policy.accept_inversions = false;
        cfg.policy.min_f0_hz = 73.42; // drop-D

        cfg.save_to(&path).expect("save");
        let loaded = VerifierConfig::load_from(&path).expect("load");

        assert_eq!(loaded.audio.tick_ms, 50);
        assert_eq!(loaded.policy.policy, VerifyPolicy::BassPriority);
        assert_eq!(loaded.policy.cents_tol, Some(25.0));
        assert_eq!(loaded.policy.transpose_semitones, 2);
        assert!(!loaded.policy.accept_inversions);
        assert!((loaded.policy.min_f0_hz - 73.42).abs() < 1e-9);
    }

    // ---- validate ----------------------------------------------------------

    #[test]
    fn validate_rejects_non_positive_window() {
        let mut cfg = VerifierConfig::default();
        cfg.audio.window_sec = 0.0;
        assert_eq!(cfg.validate(), Err(ConfigError::NonPositiveWindow(0.0)));
    }

    #[test]
    fn validate_rejects_zero_tick() {
        let mut cfg = VerifierConfig::default();
        cfg.audio.tick_ms = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTick));
    }

    #[test]
    fn validate_rejects_aggregator_len_out_of_band() {
        let mut cfg = VerifierConfig::default();
        cfg.policy.aggregator_max_len = 2;
        assert_eq!(cfg.validate(), Err(ConfigError::AggregatorLen(2)));
        cfg.policy.aggregator_max_len = 6;
        assert_eq!(cfg.validate(), Err(ConfigError::AggregatorLen(6)));
        cfg.policy.aggregator_max_len = 4;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_f0_range() {
        let mut cfg = VerifierConfig::default();
        cfg.policy.min_f0_hz = 2000.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::F0Range { .. })
        ));
    }

    #[test]
    fn validate_rejects_salience_out_of_unit_range() {
        let mut cfg = VerifierConfig::default();
        cfg.policy.salience_threshold = 1.5;
        assert_eq!(cfg.validate(), Err(ConfigError::SalienceRange(1.5)));
    }

    #[test]
    fn optimal_threads_is_positive_and_at_most_4() {
        let t = optimal_threads();
        assert!((1..=4).contains(&t));
    }
}
