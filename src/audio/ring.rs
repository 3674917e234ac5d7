//! Lock-free single-producer single-consumer sample ring.
//!
//! [`SampleRing`] stores the most recent `capacity` mono `f32` samples.  The
//! cpal capture callback appends through [`RingProducer`]; the inference
//! worker reads the latest analysis window through [`RingConsumer`].  Neither
//! side ever blocks or allocates, so the producer is safe to call from the
//! real-time audio thread.
//!
//! # Synchronisation
//!
//! The write index is a free-running `u64` counter (reduced modulo `capacity`
//! only at slot access).  The producer stores every sample with `Relaxed`
//! ordering and then publishes the new index with `Release`; the consumer
//! loads the index with `Acquire` before reading slots.  Every sample the
//! consumer observes at or below the published index was therefore written
//! in full.  Samples are stored as `AtomicU32` bit patterns so a concurrent
//! overwrite can never tear an individual sample — the consumer may see a
//! window that mixes ticks, but each sample in it is valid.
//!
//! # Example
//!
//! ```rust
//! use chordcheck::audio::ring;
//!
//! let (mut producer, consumer) = ring(8);
//! producer.write(&[1.0, 2.0, 3.0]);
//!
//! let mut out = [0.0_f32; 4];
//! consumer.read_latest(&mut out);
//! // Fewer than 4 samples ever written → zero left-padding.
//! assert_eq!(out, [0.0, 1.0, 2.0, 3.0]);
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// SampleRing
// ---------------------------------------------------------------------------

/// Shared storage behind a [`RingProducer`] / [`RingConsumer`] pair.
struct SampleRing {
    /// Samples stored as `f32` bit patterns for per-sample atomicity.
    slots: Box<[AtomicU32]>,
    /// Total samples ever written; wraps the slot array modulo `capacity`.
    write_index: AtomicU64,
}

impl SampleRing {
    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Create a ring holding the most recent `capacity` samples and split it
/// into its producer and consumer halves.
///
/// The halves are the only handles to the ring; neither is `Clone`, which
/// enforces the single-producer single-consumer discipline at the type
/// level.
///
/// # Panics
///
/// Panics if `capacity == 0`.
pub fn ring(capacity: usize) -> (RingProducer, RingConsumer) {
    assert!(capacity > 0, "ring capacity must be > 0");

    let slots: Box<[AtomicU32]> = (0..capacity).map(|_| AtomicU32::new(0)).collect();
    let shared = Arc::new(SampleRing {
        slots,
        write_index: AtomicU64::new(0),
    });

    (
        RingProducer {
            ring: Arc::clone(&shared),
        },
        RingConsumer { ring: shared },
    )
}

// ---------------------------------------------------------------------------
// RingProducer
// ---------------------------------------------------------------------------

/// Writing half of the ring.  Owned by the capture callback.
pub struct RingProducer {
    ring: Arc<SampleRing>,
}

impl RingProducer {
    /// Append `samples`, overwriting the oldest data once the ring is full.
    ///
    /// Publishes the write index once, after the whole slice is stored.
    pub fn write(&mut self, samples: &[f32]) {
        self.extend(samples.iter().copied());
    }

    /// Append every sample yielded by `iter` with a single index publication
    /// at the end.
    ///
    /// This is the non-allocating path used by the capture callback to
    /// downmix interleaved channels on the fly.
    pub fn extend(&mut self, iter: impl IntoIterator<Item = f32>) {
        let capacity = self.ring.capacity();
        let base = self.ring.write_index.load(Ordering::Relaxed);

        let mut written: u64 = 0;
        for sample in iter {
            let slot = ((base + written) % capacity as u64) as usize;
            self.ring.slots[slot].store(sample.to_bits(), Ordering::Relaxed);
            written += 1;
        }

        if written > 0 {
            self.ring
                .write_index
                .store(base + written, Ordering::Release);
        }
    }

    /// Total number of samples ever written.
    pub fn written(&self) -> u64 {
        self.ring.write_index.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// RingConsumer
// ---------------------------------------------------------------------------

/// Reading half of the ring.  Owned by the inference worker.
pub struct RingConsumer {
    ring: Arc<SampleRing>,
}

impl RingConsumer {
    /// Copy the most recent `out.len()` samples into `out`, newest at
    /// `out[out.len() - 1]`.
    ///
    /// When fewer samples are available — either because fewer than
    /// `out.len()` have ever been written, or because `out.len()` exceeds the
    /// ring capacity — the head of `out` is zero-filled and only the tail
    /// carries audio.  An empty `out` is a no-op.  Never blocks.
    pub fn read_latest(&self, out: &mut [f32]) {
        if out.is_empty() {
            return;
        }

        let capacity = self.ring.capacity();
        let published = self.ring.write_index.load(Ordering::Acquire);

        // Only the most recent `capacity` samples are still meaningful.
        let take = (out.len() as u64).min(published).min(capacity as u64);
        let pad = out.len() - take as usize;
        out[..pad].fill(0.0);

        let start = published - take;
        for (i, slot) in out[pad..].iter_mut().enumerate() {
            let index = ((start + i as u64) % capacity as u64) as usize;
            *slot = f32::from_bits(self.ring.slots[index].load(Ordering::Relaxed));
        }
    }

    /// Maximum number of samples the ring retains.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
