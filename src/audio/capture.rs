//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.  Call
//! [`AudioCapture::start`] with a [`RingProducer`] to begin streaming; the
//! callback downmixes interleaved channels to mono by arithmetic mean and
//! appends straight into the ring, with no allocation and no locking.  The
//! returned [`StreamHandle`] is a RAII guard — dropping it stops the
//! underlying cpal stream and releases the device.
//!
//! Callers should disable echo cancellation, noise suppression, and
//! automatic gain control on the input device; all three distort the
//! harmonic content the transcription model depends on.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;

use super::ring::RingProducer;

// ---------------------------------------------------------------------------
// CaptureFault
// ---------------------------------------------------------------------------

/// A fault raised by the running stream after a successful start.
///
/// Sent to the inference worker over the fault channel; the worker emits an
/// `Error` verdict and shuts the session down.
#[derive(Debug, Clone, Error)]
pub enum CaptureFault {
    /// The device disappeared or the host tore the stream down.
    #[error("audio device lost: {0}")]
    DeviceLost(String),
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream alive.
///
/// Dropping this value stops the underlying hardware stream.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
///
/// Queries the device's preferred stream configuration, so the pipeline
/// runs at whatever rate the hardware reports (commonly 44 100 or
/// 48 000 Hz) — downstream resampling is rate-agnostic.
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    /// Native sample rate reported by the device (Hz).
    sample_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
}

impl AudioCapture {
    /// Create a new [`AudioCapture`] using the system default input device.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoDevice`] when no input device is available,
    /// or [`CaptureError::DefaultConfig`] when the device cannot report a
    /// default stream configuration.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }

    /// Start capturing into `producer`.
    ///
    /// The cpal callback runs on a dedicated audio thread.  Multi-channel
    /// frames are reduced to mono by arithmetic mean as they are written, so
    /// the callback performs no allocation.  Stream errors (device unplugged,
    /// host shutdown) are forwarded over `fault_tx`; send failures are
    /// ignored so the audio thread never panics.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::BuildStream`] or [`CaptureError::PlayStream`]
    /// if the platform rejects the stream configuration.
    pub fn start(
        &self,
        mut producer: RingProducer,
        fault_tx: mpsc::UnboundedSender<CaptureFault>,
    ) -> Result<StreamHandle, CaptureError> {
        let channels = self.channels as usize;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if channels <= 1 {
                    producer.write(data);
                } else {
                    producer.extend(
                        data.chunks_exact(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                    );
                }
            },
            move |err: cpal::StreamError| {
                let _ = fault_tx.send(CaptureFault::DeviceLost(err.to_string()));
            },
            None, // no timeout
        )?;

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }

    /// Native sample rate of the capture stream in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels delivered by the device.
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// `CaptureFault` must cross thread boundaries (audio thread → worker).
    #[test]
    fn capture_fault_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CaptureFault>();
    }

    #[test]
    fn capture_fault_display_carries_cause() {
        let fault = CaptureFault::DeviceLost("unplugged".into());
        assert!(fault.to_string().contains("unplugged"));
    }

    /// The mono downmix used in the callback: mean over interleaved frames.
    #[test]
    fn downmix_matches_arithmetic_mean() {
        let (mut tx, rx) = crate::audio::ring(8);
        let data = [1.0_f32, -1.0, 0.5, 0.5, 0.2, 0.4];
        let channels = 2;

        tx.extend(
            data.chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );

        let mut out = [0.0_f32; 3];
        rx.read_latest(&mut out);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[2] - 0.3).abs() < 1e-6);
    }
}
