//! The inference worker — a periodic tick loop over the rolling window.
//!
//! Every `tick_ms` the worker snapshots the latest window from the sample
//! ring, resamples it to the model rate, runs one inference on the blocking
//! thread pool, and feeds the notes through aggregation and policy.  The
//! pass is awaited inline and the interval uses
//! [`MissedTickBehavior::Skip`], which is exactly the single-flight
//! contract: an inference that overruns the tick period causes ticks to be
//! **dropped**, never queued, so verdicts stay anchored to current audio.
//!
//! The worker owns all mutable pipeline state (buffers, aggregator, policy).
//! The controller talks to it only through the command channel, so a new
//! expected chord takes effect at the next tick boundary and no lock is ever
//! shared with the audio callback.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::audio::{resample_linear, CaptureFault, NoiseGate, RingConsumer};
use crate::config::VerifierConfig;
use crate::model::{
    pack_model_window, Transcriber, MODEL_SAMPLE_RATE, MODEL_WINDOW_SAMPLES,
};
use crate::verify::{ChordSpec, Decision, PolicyEngine, TickHistory};

use super::status::VerifierStatus;
use super::verdict::{Verdict, VerdictSink};

// ---------------------------------------------------------------------------
// WorkerCommand
// ---------------------------------------------------------------------------

/// Messages from the controller to the worker.
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    /// Replace the verification target; applied at the next tick boundary.
    SetExpected(ChordSpec),
    /// Exit the tick loop.  Closing the channel has the same effect.
    Stop,
}

// ---------------------------------------------------------------------------
// InferenceWorker
// ---------------------------------------------------------------------------

/// The dedicated tick-loop task.  Constructed by the controller, consumed by
/// [`run`](InferenceWorker::run) inside `tokio::spawn`.
pub(crate) struct InferenceWorker {
    consumer: RingConsumer,
    transcriber: Arc<dyn Transcriber>,
    aggregator: TickHistory,
    policy: PolicyEngine,
    gate: NoiseGate,
    device_rate: u32,
    tick: Duration,
    /// Rolling window at the device rate; refilled from the ring each pass.
    window: Vec<f32>,
    /// The window resampled to the model rate.
    scratch: Vec<f32>,
    /// Fixed-length model input; round-trips through `spawn_blocking`.
    model_input: Vec<f32>,
    started: Instant,
    sink: VerdictSink,
    status: Arc<Mutex<VerifierStatus>>,
    command_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    fault_rx: mpsc::UnboundedReceiver<CaptureFault>,
}

impl InferenceWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: &VerifierConfig,
        device_rate: u32,
        consumer: RingConsumer,
        transcriber: Arc<dyn Transcriber>,
        expected: Option<ChordSpec>,
        sink: VerdictSink,
        status: Arc<Mutex<VerifierStatus>>,
        command_rx: mpsc::UnboundedReceiver<WorkerCommand>,
        fault_rx: mpsc::UnboundedReceiver<CaptureFault>,
    ) -> Self {
        let window_len = (config.audio.window_sec * device_rate as f64).ceil() as usize;
        let scratch_len =
            crate::audio::output_len(window_len, device_rate, MODEL_SAMPLE_RATE);

        let mut policy = PolicyEngine::new(config.policy.clone());
        if let Some(spec) = expected {
            policy.set_expected(spec);
        }

        Self {
            consumer,
            transcriber,
            aggregator: TickHistory::new(config.policy.aggregator_max_len),
            policy,
            gate: NoiseGate::new(config.audio.noise_gate_rms),
            device_rate,
            tick: Duration::from_millis(config.audio.tick_ms),
            window: vec![0.0; window_len],
            scratch: vec![0.0; scratch_len],
            model_input: vec![0.0; MODEL_WINDOW_SAMPLES],
            started: Instant::now(),
            sink,
            status,
            command_rx,
            fault_rx,
        }
    }

    /// Run until a `Stop` command arrives, the command channel closes, or
    /// the capture side reports a fatal fault.
    pub(crate) async fn run(mut self) {
        log::debug!(
            "inference worker started: {} ms tick, {} samples @ {} Hz window",
            self.tick.as_millis(),
            self.window.len(),
            self.device_rate
        );

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => self.pass().await,

                cmd = self.command_rx.recv() => match cmd {
                    Some(WorkerCommand::SetExpected(spec)) => {
                        log::debug!("expected chord → {spec}");
                        self.policy.set_expected(spec);
                    }
                    Some(WorkerCommand::Stop) | None => {
                        log::debug!("inference worker stopping");
                        break;
                    }
                },

                Some(fault) = self.fault_rx.recv() => {
                    log::error!("capture fault: {fault}");
                    self.sink.emit(&Verdict::Error {
                        message: fault.to_string(),
                    });
                    *self.status.lock().unwrap() = VerifierStatus::Error;
                    break;
                }
            }
        }
    }

    /// One pipeline pass: window → resample → inference → aggregate → policy.
    async fn pass(&mut self) {
        self.consumer.read_latest(&mut self.window);

        if !self.gate.is_open(&self.window) {
            return;
        }

        resample_linear(
            &self.window,
            self.device_rate,
            &mut self.scratch,
            MODEL_SAMPLE_RATE,
        );
        pack_model_window(&self.scratch, &mut self.model_input);

        // The input buffer moves into the blocking task and comes back with
        // the result, so the steady state stays allocation-free.
        let transcriber = Arc::clone(&self.transcriber);
        let input = std::mem::take(&mut self.model_input);

        let infer_start = Instant::now();
        let joined = tokio::task::spawn_blocking(move || {
            let result = transcriber.evaluate(&input);
            (result, input)
        })
        .await;
        let inference_ms = infer_start.elapsed().as_secs_f64() * 1000.0;
        let t = self.started.elapsed().as_secs_f64();

        let result = match joined {
            Ok((result, input)) => {
                self.model_input = input;
                result
            }
            Err(e) => {
                // The buffer died with the panicked task; replace it.
                self.model_input = vec![0.0; MODEL_WINDOW_SAMPLES];
                self.sink.emit(&Verdict::Error {
                    message: format!("inference task failed: {e}"),
                });
                return;
            }
        };

        match result {
            Ok(notes) => {
                self.sink.emit(&Verdict::Notes {
                    t,
                    notes: notes.clone(),
                });

                let fused = self.aggregator.push(notes);
                if let Some(decision) = self.policy.evaluate(&fused, t) {
                    let verdict = match decision {
                        Decision::Match => Verdict::Match { t },
                        Decision::Miss { matched, missing } => Verdict::Miss {
                            t,
                            matched,
                            missing,
                        },
                    };
                    self.sink.emit(&verdict);
                }

                self.sink.emit(&Verdict::Tick { t, inference_ms });
            }
            Err(e) => {
                log::warn!("inference failed: {e}");
                self.sink.emit(&Verdict::Error {
                    message: e.to_string(),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
