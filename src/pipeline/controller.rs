//! The verifier controller — session lifecycle and the public surface.
//!
//! [`ChordVerifier`] owns the capture stream, the sample ring, and the
//! inference worker.  `start()` wires them together; `stop()` tears them
//! down (idempotently); `set_expected()` retargets the policy engine through
//! the worker's command channel; `on_result()` subscribes to the verdict
//! stream.
//!
//! # Startup sequence
//!
//! 1. Acquire the default input device and read its native rate.
//! 2. Size the ring for the rolling window plus half a second of slack.
//! 3. Warm the model with one silent inference (the first real tick must
//!    not pay graph-initialisation cost).
//! 4. Start the capture stream and spawn the worker, then go `Listening`.
//!
//! `start()` must be called from within a tokio runtime — the worker is
//! spawned onto the current one, mirroring how the binary hands the
//! orchestrator to its own runtime.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::{ring, AudioCapture, CaptureError, StreamHandle};
use crate::config::{ConfigError, VerifierConfig};
use crate::model::{Transcriber, MODEL_WINDOW_SAMPLES};
use crate::verify::ChordSpec;

use super::scheduler::{InferenceWorker, WorkerCommand};
use super::status::VerifierStatus;
use super::verdict::{Verdict, VerdictSink};

// ---------------------------------------------------------------------------
// StartError
// ---------------------------------------------------------------------------

/// Why a session could not be started.
#[derive(Debug, Error)]
pub enum StartError {
    /// The platform refused microphone access.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable input device, or the device rejected the stream.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(#[source] CaptureError),

    /// The transcription model failed to produce a warm-up inference.
    #[error("transcription model initialisation failed: {0}")]
    AdapterInit(#[from] crate::model::TranscriberError),

    /// The configuration was rejected before any resource was touched.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Hosts report a mic-permission refusal as a backend-specific stream
/// error; there is no dedicated cpal variant to match on, so the message is
/// inspected.
fn classify_capture(err: CaptureError) -> StartError {
    let text = err.to_string().to_lowercase();
    if text.contains("permission") || text.contains("denied") || text.contains("not authorized") {
        StartError::PermissionDenied(err.to_string())
    } else {
        StartError::DeviceUnavailable(err)
    }
}

// ---------------------------------------------------------------------------
// ChordVerifier
// ---------------------------------------------------------------------------

/// Everything a running session owns; dropped as a unit on `stop()`.
struct Running {
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
    _worker: tokio::task::JoinHandle<()>,
    /// Dropping the handle stops the cpal stream and releases the device.
    _stream: StreamHandle,
}

/// The public verifier: capture → transcription → policy → verdicts.
///
/// See the crate-level docs for a usage example.
pub struct ChordVerifier {
    config: VerifierConfig,
    transcriber: Arc<dyn Transcriber>,
    sink: VerdictSink,
    status: Arc<Mutex<VerifierStatus>>,
    /// The most recent target; applied on `start()` and forwarded live while
    /// a session runs.
    expected: Option<ChordSpec>,
    running: Option<Running>,
}

impl ChordVerifier {
    /// Build a verifier over a loaded transcriber.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` contains values the pipeline
    /// cannot run with; nothing is acquired in that case.
    pub fn new(
        config: VerifierConfig,
        transcriber: Arc<dyn Transcriber>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            transcriber,
            sink: VerdictSink::new(),
            status: Arc::new(Mutex::new(VerifierStatus::Idle)),
            expected: None,
            running: None,
        })
    }

    /// Subscribe to the verdict stream.
    ///
    /// Callbacks run on the worker task and must not block; multiple
    /// subscriptions all receive every verdict.
    pub fn on_result(&self, callback: impl Fn(&Verdict) + Send + 'static) {
        self.sink.register(Box::new(callback));
    }

    /// Current lifecycle status.
    pub fn status(&self) -> VerifierStatus {
        *self.status.lock().unwrap()
    }

    /// The configuration this verifier was built with.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Replace the expected chord.
    ///
    /// Specs are validated at construction ([`ChordSpec::new`]), so this
    /// never fails and never disturbs a tick in flight: a running worker
    /// picks the new target up at the next tick boundary, with its
    /// confirmation state reset.
    pub fn set_expected(&mut self, spec: ChordSpec) {
        if let Some(running) = &self.running {
            // Send failure means the worker already exited (fatal fault);
            // the stored spec still applies to the next start().
            let _ = running
                .command_tx
                .send(WorkerCommand::SetExpected(spec.clone()));
        }
        self.expected = Some(spec);
    }

    /// Start a verification session.
    ///
    /// No-op when already listening.  On failure the status moves to
    /// `Error`, an `Error` verdict is emitted, and the error is returned.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.running.is_some() {
            return Ok(());
        }

        *self.status.lock().unwrap() = VerifierStatus::Loading;

        match self.start_inner() {
            Ok(running) => {
                self.running = Some(running);
                *self.status.lock().unwrap() = VerifierStatus::Listening;
                log::info!("verifier listening");
                Ok(())
            }
            Err(e) => {
                *self.status.lock().unwrap() = VerifierStatus::Error;
                self.sink.emit(&Verdict::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn start_inner(&mut self) -> Result<Running, StartError> {
        let capture = AudioCapture::new().map_err(classify_capture)?;
        let device_rate = capture.sample_rate();
        log::info!(
            "audio capture ready: {} Hz, {} ch",
            device_rate,
            capture.channels()
        );

        // Half a second of slack beyond the window absorbs scheduling
        // jitter between the callback and the tick loop.
        let capacity =
            ((self.config.audio.window_sec + 0.5) * device_rate as f64).ceil() as usize;
        let (producer, consumer) = ring(capacity);

        // Warm the model so the first real tick runs at steady-state speed.
        let warm_start = std::time::Instant::now();
        let silence = vec![0.0; MODEL_WINDOW_SAMPLES];
        self.transcriber.evaluate(&silence)?;
        log::debug!(
            "model warm-up inference took {:.0} ms",
            warm_start.elapsed().as_secs_f64() * 1000.0
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();

        let stream = capture
            .start(producer, fault_tx)
            .map_err(classify_capture)?;

        let worker = InferenceWorker::new(
            &self.config,
            device_rate,
            consumer,
            Arc::clone(&self.transcriber),
            self.expected.clone(),
            self.sink.clone(),
            Arc::clone(&self.status),
            command_rx,
            fault_rx,
        );

        Ok(Running {
            command_tx,
            _worker: tokio::spawn(worker.run()),
            _stream: stream,
        })
    }

    /// Tear the session down: no more ticks, device released, ring
    /// discarded.  Idempotent — a second call has no observable effect.
    ///
    /// An in-flight inference is allowed to finish; its verdicts may still
    /// be dispatched before the worker observes the stop.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.command_tx.send(WorkerCommand::Stop);
            // `running` drops here: the stream handle releases the device
            // and the last ring handle goes with the worker when it exits.
            *self.status.lock().unwrap() = VerifierStatus::Idle;
            log::info!("verifier stopped");
        }
    }
}

impl Drop for ChordVerifier {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MockTranscriber;
    use crate::verify::PitchClass;

    fn verifier() -> ChordVerifier {
        ChordVerifier::new(
            VerifierConfig::default(),
            Arc::new(MockTranscriber::notes(&[52, 55, 59])),
        )
        .unwrap()
    }

    fn e_minor() -> ChordSpec {
        ChordSpec::new(
            [PitchClass::E, PitchClass::G, PitchClass::B],
            2,
            Some(PitchClass::E),
        )
        .unwrap()
    }

    // ---- Construction ------------------------------------------------------

    #[test]
    fn new_rejects_invalid_config() {
        let mut config = VerifierConfig::default();
        config.audio.tick_ms = 0;

        let result = ChordVerifier::new(config, Arc::new(MockTranscriber::notes(&[])));
        assert!(matches!(result, Err(ConfigError::ZeroTick)));
    }

    #[test]
    fn fresh_verifier_is_idle() {
        let v = verifier();
        assert_eq!(v.status(), VerifierStatus::Idle);
    }

    // ---- set_expected / stop before start ----------------------------------

    #[test]
    fn set_expected_before_start_is_stored() {
        let mut v = verifier();
        v.set_expected(e_minor());
        assert_eq!(v.expected.as_ref(), Some(&e_minor()));
    }

    #[test]
    fn set_expected_twice_keeps_latest() {
        let mut v = verifier();
        v.set_expected(e_minor());

        let a_major = ChordSpec::new(
            [PitchClass::A, PitchClass::C_SHARP, PitchClass::E],
            2,
            Some(PitchClass::A),
        )
        .unwrap();
        v.set_expected(a_major.clone());
        assert_eq!(v.expected.as_ref(), Some(&a_major));
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let mut v = verifier();
        v.stop();
        v.stop();
        assert_eq!(v.status(), VerifierStatus::Idle);
    }

    // ---- Subscriptions -----------------------------------------------------

    #[test]
    fn on_result_receives_emitted_verdicts() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let v = verifier();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = Arc::clone(&hits);
            v.on_result(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        v.sink.emit(&Verdict::Match { t: 0.0 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    // ---- Error classification ----------------------------------------------

    #[test]
    fn no_device_classifies_as_unavailable() {
        let err = classify_capture(CaptureError::NoDevice);
        assert!(matches!(err, StartError::DeviceUnavailable(_)));
    }

    #[test]
    fn start_error_display_is_descriptive() {
        let err = StartError::PermissionDenied("os said no".into());
        assert!(err.to_string().contains("permission"));

        let err = StartError::Config(ConfigError::ZeroTick);
        assert!(err.to_string().contains("configuration"));
    }
}
