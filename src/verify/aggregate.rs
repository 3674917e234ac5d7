//! Temporal aggregation of per-tick note lists.
//!
//! A single 40 ms tick is a noisy witness: overtones flicker in and out,
//! and the model occasionally drops a string for a frame.  [`TickHistory`]
//! keeps the last few tick outputs and fuses them — one note per MIDI key,
//! salience averaged across the retained ticks — so the policy engine sees
//! a stabilised picture at the cost of `max_len × tick_ms` of smoothing lag.

use std::collections::{BTreeMap, VecDeque};

use crate::model::NoteEvent;

// ---------------------------------------------------------------------------
// TickHistory
// ---------------------------------------------------------------------------

/// Bounded FIFO of recent tick note lists with duplicate-MIDI fusion.
pub struct TickHistory {
    ticks: VecDeque<Vec<NoteEvent>>,
    max_len: usize,
}

impl TickHistory {
    /// Create a history retaining the last `max_len` ticks.
    ///
    /// # Panics
    ///
    /// Panics if `max_len == 0`.  Config validation keeps the practical
    /// range to 3–5.
    pub fn new(max_len: usize) -> Self {
        assert!(max_len > 0, "TickHistory max_len must be > 0");
        Self {
            ticks: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    /// Append one tick's notes and return the fused view over the retained
    /// history, ordered by MIDI number.
    pub fn push(&mut self, notes: Vec<NoteEvent>) -> Vec<NoteEvent> {
        if self.ticks.len() == self.max_len {
            self.ticks.pop_front();
        }
        self.ticks.push_back(notes);
        self.fused()
    }

    /// Fuse the retained ticks: one entry per MIDI key with averaged
    /// salience, the earliest observed start, and the latest end (open if
    /// any observation was still sounding).
    fn fused(&self) -> Vec<NoteEvent> {
        struct Accum {
            salience_sum: f32,
            count: u32,
            start: f64,
            end: Option<f64>,
            open: bool,
        }

        let mut by_midi: BTreeMap<i32, Accum> = BTreeMap::new();

        for tick in &self.ticks {
            for note in tick {
                let entry = by_midi.entry(note.midi).or_insert(Accum {
                    salience_sum: 0.0,
                    count: 0,
                    start: note.start_time,
                    end: None,
                    open: false,
                });
                entry.salience_sum += note.salience;
                entry.count += 1;
                entry.start = entry.start.min(note.start_time);
                match note.end_time {
                    Some(end) => {
                        entry.end = Some(entry.end.map_or(end, |e: f64| e.max(end)));
                    }
                    None => entry.open = true,
                }
            }
        }

        by_midi
            .into_iter()
            .map(|(midi, acc)| NoteEvent {
                midi,
                start_time: acc.start,
                end_time: if acc.open { None } else { acc.end },
                salience: acc.salience_sum / acc.count as f32,
            })
            .collect()
    }

    /// Drop all retained ticks.
    pub fn clear(&mut self) {
        self.ticks.clear();
    }

    /// Number of ticks currently retained.
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Returns `true` when no ticks are retained.
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Maximum number of ticks retained.
    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn note(midi: i32, salience: f32) -> NoteEvent {
        NoteEvent {
            midi,
            start_time: 0.0,
            end_time: Some(0.5),
            salience,
        }
    }

    // ---- Fusion ------------------------------------------------------------

    #[test]
    fn single_tick_passes_through() {
        let mut history = TickHistory::new(3);
        let fused = history.push(vec![note(52, 0.8), note(55, 0.6)]);

        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].midi, 52);
        assert!((fused[0].salience - 0.8).abs() < 1e-6);
    }

    #[test]
    fn duplicate_midi_across_ticks_averages_salience() {
        let mut history = TickHistory::new(3);
        history.push(vec![note(52, 0.9)]);
        let fused = history.push(vec![note(52, 0.5)]);

        assert_eq!(fused.len(), 1);
        assert!((fused[0].salience - 0.7).abs() < 1e-6);
    }

    #[test]
    fn distinct_midis_are_kept_separate_and_sorted() {
        let mut history = TickHistory::new(3);
        history.push(vec![note(59, 0.5)]);
        let fused = history.push(vec![note(52, 0.8), note(55, 0.6)]);

        let midis: Vec<i32> = fused.iter().map(|n| n.midi).collect();
        assert_eq!(midis, vec![52, 55, 59]);
    }

    #[test]
    fn flickering_note_dilutes_toward_history_average() {
        // Seen in 1 of 3 ticks at 0.9 → averaged only over its own
        // observations (count = 1), so salience stays 0.9 but the note
        // persists in the fused view while history retains it.
        let mut history = TickHistory::new(3);
        history.push(vec![note(52, 0.9)]);
        history.push(vec![]);
        let fused = history.push(vec![]);

        assert_eq!(fused.len(), 1);
        assert!((fused[0].salience - 0.9).abs() < 1e-6);
    }

    // ---- Window bounds -----------------------------------------------------

    #[test]
    fn oldest_tick_is_dropped_at_max_len() {
        let mut history = TickHistory::new(3);
        history.push(vec![note(40, 0.9)]);
        history.push(vec![]);
        history.push(vec![]);
        // Fourth push evicts the tick containing MIDI 40.
        let fused = history.push(vec![]);

        assert!(fused.is_empty());
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn len_grows_to_max_then_saturates() {
        let mut history = TickHistory::new(4);
        for i in 0..6 {
            history.push(vec![]);
            assert_eq!(history.len(), (i + 1).min(4));
        }
    }

    // ---- Start / end fusion -------------------------------------------------

    #[test]
    fn fused_note_spans_earliest_start_to_latest_end() {
        let mut history = TickHistory::new(3);
        history.push(vec![NoteEvent {
            midi: 52,
            start_time: 0.2,
            end_time: Some(0.6),
            salience: 0.8,
        }]);
        let fused = history.push(vec![NoteEvent {
            midi: 52,
            start_time: 0.1,
            end_time: Some(0.9),
            salience: 0.8,
        }]);

        assert_eq!(fused[0].start_time, 0.1);
        assert_eq!(fused[0].end_time, Some(0.9));
    }

    #[test]
    fn any_open_observation_keeps_the_fused_note_open() {
        let mut history = TickHistory::new(3);
        history.push(vec![NoteEvent {
            midi: 52,
            start_time: 0.0,
            end_time: Some(0.5),
            salience: 0.8,
        }]);
        let fused = history.push(vec![NoteEvent {
            midi: 52,
            start_time: 0.0,
            end_time: None,
            salience: 0.8,
        }]);

        assert_eq!(fused[0].end_time, None);
    }

    // ---- Reset -------------------------------------------------------------

    #[test]
    fn clear_empties_history() {
        let mut history = TickHistory::new(3);
        history.push(vec![note(52, 0.9)]);
        history.clear();

        assert!(history.is_empty());
        let fused = history.push(vec![]);
        assert!(fused.is_empty());
    }

    // ---- Panic guard -------------------------------------------------------

    #[test]
    #[should_panic(expected = "TickHistory max_len must be > 0")]
    fn zero_max_len_panics() {
        let _ = TickHistory::new(0);
    }
}
