//! Configuration module for chordcheck.
//!
//! Provides `VerifierConfig` (top-level settings), sub-configs for each
//! subsystem, `AppPaths` for cross-platform data directories, and TOML
//! persistence via `VerifierConfig::load` / `VerifierConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AudioSettings, ConfigError, ModelSettings, PolicySettings, VerifierConfig,
};
