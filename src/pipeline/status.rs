//! Verifier lifecycle state.
//!
//! The controller drives the machine:
//!
//! ```text
//! Idle ──start()──▶ Loading ──resources ready──▶ Listening
//!                      │ acquisition failed          │ stop()
//!                      ▼                             ▼
//!                    Error ◀──device lost────────── Idle
//! ```
//!
//! Verdicts flow only while `Listening`.

// ---------------------------------------------------------------------------
// VerifierStatus
// ---------------------------------------------------------------------------

/// Lifecycle phase of a [`ChordVerifier`](crate::pipeline::ChordVerifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifierStatus {
    /// No session: before the first `start()` or after `stop()`.
    #[default]
    Idle,

    /// `start()` is acquiring the device and warming the model.
    Loading,

    /// Capture and inference are running; verdicts flow.
    Listening,

    /// A fatal fault (device lost, adapter init failed) ended the session.
    Error,
}

impl VerifierStatus {
    /// Returns `true` while a session holds the audio device.
    pub fn is_active(&self) -> bool {
        matches!(self, VerifierStatus::Loading | VerifierStatus::Listening)
    }

    /// A short human-readable label for status displays.
    pub fn label(&self) -> &'static str {
        match self {
            VerifierStatus::Idle => "Idle",
            VerifierStatus::Loading => "Loading",
            VerifierStatus::Listening => "Listening",
            VerifierStatus::Error => "Error",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
