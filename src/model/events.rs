//! Conversion of model activations into note events.
//!
//! The network emits two time × pitch activation grids per window: *frame*
//! activations (is this pitch sounding?) and *onset* activations (did it
//! just start?).  [`extract_notes`] turns them into [`NoteEvent`]s by
//! walking each pitch bin, anchoring note starts to onset peaks, and
//! extending each note across the contiguous run of active frames.  The
//! note's salience is the peak frame activation inside the run.
//!
//! A note that began before the current window has no onset inside it, so a
//! bin that is already active at frame 0 also anchors a note; without this a
//! chord sustained longer than the window length would disappear from the
//! output.

use super::transcriber::{NoteEvent, ANNOTATIONS_FPS, MIDI_OFFSET};

// ---------------------------------------------------------------------------
// ActivationGrid
// ---------------------------------------------------------------------------

/// A dense time × pitch activation matrix, row-major by frame.
#[derive(Debug, Clone)]
pub struct ActivationGrid {
    frames: usize,
    pitches: usize,
    data: Vec<f32>,
}

impl ActivationGrid {
    /// Wrap `data` as a `frames × pitches` grid.
    ///
    /// Returns `None` when `data.len() != frames * pitches`.
    pub fn new(frames: usize, pitches: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != frames * pitches {
            return None;
        }
        Some(Self {
            frames,
            pitches,
            data,
        })
    }

    /// Number of time frames.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Number of pitch bins.
    pub fn pitches(&self) -> usize {
        self.pitches
    }

    #[inline]
    fn at(&self, frame: usize, pitch: usize) -> f32 {
        self.data[frame * self.pitches + pitch]
    }
}

// ---------------------------------------------------------------------------
// NoteExtraction
// ---------------------------------------------------------------------------

/// Tunables for [`extract_notes`].
#[derive(Debug, Clone, Copy)]
pub struct NoteExtraction {
    /// Minimum frame activation for a pitch to count as sounding.
    pub frame_threshold: f32,
    /// Minimum onset activation for a local peak to anchor a note start.
    pub onset_threshold: f32,
    /// Minimum run length in frames; shorter blips are discarded.
    pub min_note_frames: usize,
}

impl Default for NoteExtraction {
    fn default() -> Self {
        Self {
            frame_threshold: 0.3,
            onset_threshold: 0.5,
            min_note_frames: 3, // ~35 ms at the model frame rate
        }
    }
}

// ---------------------------------------------------------------------------
// extract_notes
// ---------------------------------------------------------------------------

/// Group contiguous active frames into note events, anchored to onsets.
///
/// `frames` and `onsets` must share dimensions; the caller (the ONNX
/// adapter) validates the shapes it got from the runtime before building the
/// grids.
pub fn extract_notes(
    frames: &ActivationGrid,
    onsets: &ActivationGrid,
    opts: &NoteExtraction,
) -> Vec<NoteEvent> {
    debug_assert_eq!(frames.frames(), onsets.frames());
    debug_assert_eq!(frames.pitches(), onsets.pitches());

    let n_frames = frames.frames();
    let mut notes = Vec::new();

    for pitch in 0..frames.pitches() {
        let mut f = 0;
        while f < n_frames {
            let active = frames.at(f, pitch) >= opts.frame_threshold;
            let anchored =
                active && (is_onset_peak(onsets, f, pitch, opts.onset_threshold) || f == 0);

            if !anchored {
                f += 1;
                continue;
            }

            // Extend across the contiguous active run.
            let start = f;
            let mut end = f;
            let mut peak = 0.0_f32;
            while end < n_frames && frames.at(end, pitch) >= opts.frame_threshold {
                peak = peak.max(frames.at(end, pitch));
                end += 1;
            }

            if end - start >= opts.min_note_frames {
                notes.push(NoteEvent {
                    midi: pitch as i32 + MIDI_OFFSET,
                    start_time: start as f64 / ANNOTATIONS_FPS,
                    // Still active at the window edge → the note is sustained
                    // past what we can see.
                    end_time: (end < n_frames).then(|| end as f64 / ANNOTATIONS_FPS),
                    salience: peak.clamp(0.0, 1.0),
                });
            }

            f = end.max(start + 1);
        }
    }

    notes
}

/// An onset anchors a note when it crosses the threshold and is a local
/// maximum in time for its pitch bin.
fn is_onset_peak(onsets: &ActivationGrid, frame: usize, pitch: usize, threshold: f32) -> bool {
    let value = onsets.at(frame, pitch);
    if value < threshold {
        return false;
    }
    let before_ok = frame == 0 || onsets.at(frame - 1, pitch) <= value;
    let after_ok = frame + 1 >= onsets.frames() || onsets.at(frame + 1, pitch) <= value;
    before_ok && after_ok
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
