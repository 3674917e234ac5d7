//! Chord verification policy — pitch-class matching, confirmation, debounce.
//!
//! [`PolicyEngine`] turns an aggregated note list into at most one decision
//! per tick:
//!
//! 1. Drop notes below the salience threshold or outside the instrument's
//!    frequency range.
//! 2. Reduce the survivors to an octave-invariant pitch-class set (after
//!    transposition, e.g. for a capo).
//! 3. Compare against the expected [`ChordSpec`] under the selected
//!    [`VerifyPolicy`], with an optional bass check when inversions are not
//!    accepted.
//! 4. Require [`frames_confirm`](crate::config::PolicySettings::frames_confirm)
//!    consecutive passing ticks before a `Match`, and space `Miss` decisions
//!    at least `miss_cooldown_ms` apart so a sustained wrong chord does not
//!    spam the consumer.
//!
//! The engine advances through [`PolicyPhase`]s:
//!
//! ```text
//! Idle ──set_expected──▶ Armed ──pass──▶ Confirming ──k passes──▶ Cooldown
//!                          ▲               │ fail                   │ pass
//!                          └───────────────┘◀──────────────────────-┘
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::PolicySettings;
use crate::model::NoteEvent;

use super::chord::{midi_to_hz, ChordSpec, PitchClass};

// ---------------------------------------------------------------------------
// VerifyPolicy
// ---------------------------------------------------------------------------

/// How the detected pitch-class set is compared against the expected chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerifyPolicy {
    /// Pass when at least `k` of the expected pitch classes are detected.
    #[default]
    KOfN,
    /// Pass when the root (or lowest listed pitch class) is detected,
    /// regardless of the rest.
    IncludesTarget,
    /// Pass when `KOfN` passes **and** the lowest detected note is the root.
    BassPriority,
}

// ---------------------------------------------------------------------------
// PolicyPhase
// ---------------------------------------------------------------------------

/// Where the engine is in its confirmation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyPhase {
    /// No expected chord has been set; every tick is ignored.
    #[default]
    Idle,
    /// Expected chord set, waiting for the first passing tick.
    Armed,
    /// At least one passing tick accrued, match not yet confirmed.
    Confirming,
    /// A match was just emitted; passes accrue toward the next one.
    Cooldown,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// The outcome of one evaluated tick, before it is stamped into a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The expected chord was held for `frames_confirm` consecutive ticks.
    Match,
    /// The tick failed the policy; `matched ∪ missing` is exactly the
    /// expected set and the two are disjoint.
    Miss {
        matched: Vec<PitchClass>,
        missing: Vec<PitchClass>,
    },
}

// ---------------------------------------------------------------------------
// PolicyEngine
// ---------------------------------------------------------------------------

/// Stateful verification engine, owned exclusively by the inference worker.
pub struct PolicyEngine {
    settings: PolicySettings,
    spec: Option<ChordSpec>,
    phase: PolicyPhase,
    confirm_count: u32,
    last_match_at: Option<f64>,
    last_miss_at: Option<f64>,
}

impl PolicyEngine {
    pub fn new(settings: PolicySettings) -> Self {
        Self {
            settings,
            spec: None,
            phase: PolicyPhase::Idle,
            confirm_count: 0,
            last_match_at: None,
            last_miss_at: None,
        }
    }

    /// Replace the verification target and restart the confirmation cycle.
    ///
    /// The miss-debounce clock survives a target switch: a score advancing
    /// through chords must not burst one `Miss` per switch.
    pub fn set_expected(&mut self, spec: ChordSpec) {
        self.spec = Some(spec);
        self.phase = PolicyPhase::Armed;
        self.confirm_count = 0;
        self.last_match_at = None;
    }

    /// The current confirmation phase.
    pub fn phase(&self) -> PolicyPhase {
        self.phase
    }

    /// The active target, if one has been set.
    pub fn expected(&self) -> Option<&ChordSpec> {
        self.spec.as_ref()
    }

    /// The salience cutoff in effect: a detune tolerance maps onto it when
    /// provided (tight tolerance → demand stronger evidence), otherwise the
    /// configured threshold applies directly.
    pub fn effective_salience_threshold(&self) -> f32 {
        match self.settings.cents_tol {
            Some(cents) if cents <= 25.0 => 0.4,
            Some(cents) if cents <= 50.0 => 0.3,
            Some(_) => 0.2,
            None => self.settings.salience_threshold,
        }
    }

    /// Evaluate one tick's aggregated notes at wall-clock second `t`.
    ///
    /// Returns `None` while idle, while a pass is still accumulating
    /// confirmation, or while a failing tick sits inside the miss cooldown.
    pub fn evaluate(&mut self, notes: &[NoteEvent], t: f64) -> Option<Decision> {
        let spec = self.spec.as_ref()?;

        let threshold = self.effective_salience_threshold();
        let transpose = self.settings.transpose_semitones;

        let audible: Vec<&NoteEvent> = notes
            .iter()
            .filter(|n| n.salience >= threshold && self.in_instrument_range(n.midi))
            .collect();

        let pc_set: BTreeSet<PitchClass> = audible
            .iter()
            .map(|n| PitchClass::from_midi(n.midi + transpose))
            .collect();
        let lowest_pc = audible
            .iter()
            .min_by_key(|n| n.midi)
            .map(|n| PitchClass::from_midi(n.midi + transpose));

        let matched: Vec<PitchClass> = spec.pcs().intersection(&pc_set).copied().collect();
        let missing: Vec<PitchClass> = spec.pcs().difference(&pc_set).copied().collect();

        let bass_is_target = lowest_pc == Some(spec.target());
        let mut pass = match self.settings.policy {
            VerifyPolicy::KOfN => matched.len() >= spec.k(),
            VerifyPolicy::IncludesTarget => pc_set.contains(&spec.target()),
            VerifyPolicy::BassPriority => matched.len() >= spec.k() && bass_is_target,
        };
        if !self.settings.accept_inversions {
            pass = pass && bass_is_target;
        }

        if pass {
            self.confirm_count += 1;
            if self.confirm_count >= self.settings.frames_confirm {
                // Reset to start a new confirmation cycle: at most one match
                // per frames_confirm consecutive passing ticks.
                self.confirm_count = 0;
                self.phase = PolicyPhase::Cooldown;
                self.last_match_at = Some(t);
                return Some(Decision::Match);
            }
            self.phase = PolicyPhase::Confirming;
            None
        } else {
            self.confirm_count = 0;
            self.phase = PolicyPhase::Armed;

            let cooldown_s = self.settings.miss_cooldown_ms as f64 / 1000.0;
            let due = self.last_miss_at.map_or(true, |prev| t - prev >= cooldown_s);
            if due {
                self.last_miss_at = Some(t);
                Some(Decision::Miss { matched, missing })
            } else {
                None
            }
        }
    }

    fn in_instrument_range(&self, midi: i32) -> bool {
        let hz = midi_to_hz(midi, self.settings.a4_hz);
        hz >= self.settings.min_f0_hz && hz <= self.settings.max_f0_hz
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PolicySettings {
        PolicySettings::default()
    }

    fn note(midi: i32, salience: f32) -> NoteEvent {
        NoteEvent {
            midi,
            start_time: 0.0,
            end_time: None,
            salience,
        }
    }

    /// E minor triad: pcs {E=4, G=7, B=11}, k=2, root E.
    fn e_minor() -> ChordSpec {
        ChordSpec::new([PitchClass::E, PitchClass::G, PitchClass::B], 2, Some(PitchClass::E))
            .unwrap()
    }

    /// C major triad: pcs {C=0, E=4, G=7}, k as given, root C.
    fn c_major(k: usize) -> ChordSpec {
        ChordSpec::new([PitchClass::C, PitchClass::E, PitchClass::G], k, Some(PitchClass::C))
            .unwrap()
    }

    fn engine_with(spec: ChordSpec, settings: PolicySettings) -> PolicyEngine {
        let mut engine = PolicyEngine::new(settings);
        engine.set_expected(spec);
        engine
    }

    /// Drive `n` ticks with the same notes, 40 ms apart starting at `t0`.
    fn drive(
        engine: &mut PolicyEngine,
        notes: &[NoteEvent],
        n: usize,
        t0: f64,
    ) -> Vec<Option<Decision>> {
        (0..n)
            .map(|i| engine.evaluate(notes, t0 + i as f64 * 0.04))
            .collect()
    }

    // ---- Idle --------------------------------------------------------------

    #[test]
    fn no_expected_chord_means_no_decisions() {
        let mut engine = PolicyEngine::new(settings());
        assert_eq!(engine.phase(), PolicyPhase::Idle);
        assert!(engine.evaluate(&[note(52, 0.9)], 0.0).is_none());
        assert_eq!(engine.phase(), PolicyPhase::Idle);
    }

    // ---- Confirmation ------------------------------------------------------

    #[test]
    fn match_requires_frames_confirm_consecutive_passes() {
        // E3 + G3 + B3 — full E minor voicing.
        let notes = [note(52, 0.9), note(55, 0.9), note(59, 0.9)];
        let mut engine = engine_with(e_minor(), settings());

        assert_eq!(engine.evaluate(&notes, 0.00), None);
        assert_eq!(engine.phase(), PolicyPhase::Confirming);
        assert_eq!(engine.evaluate(&notes, 0.04), None);
        assert_eq!(engine.evaluate(&notes, 0.08), Some(Decision::Match));
        assert_eq!(engine.phase(), PolicyPhase::Cooldown);
    }

    #[test]
    fn at_most_one_match_per_confirm_window() {
        let notes = [note(52, 0.9), note(55, 0.9), note(59, 0.9)];
        let mut engine = engine_with(e_minor(), settings());

        let results = drive(&mut engine, &notes, 9, 0.0);
        let matches = results.iter().filter(|r| **r == Some(Decision::Match)).count();
        // 9 consecutive passing ticks with frames_confirm = 3 → 3 matches.
        assert_eq!(matches, 3);
        assert_eq!(results[2], Some(Decision::Match));
        assert_eq!(results[5], Some(Decision::Match));
        assert_eq!(results[8], Some(Decision::Match));
    }

    #[test]
    fn failed_tick_resets_confirmation() {
        let full = [note(52, 0.9), note(55, 0.9), note(59, 0.9)];
        let broken = [note(52, 0.9)]; // E alone: 1 < k=2
        let mut engine = engine_with(e_minor(), settings());

        assert_eq!(engine.evaluate(&full, 0.00), None);
        assert_eq!(engine.evaluate(&full, 0.04), None);
        // Interruption: confirmation restarts from zero.
        let miss = engine.evaluate(&broken, 0.08);
        assert!(matches!(miss, Some(Decision::Miss { .. })));

        assert_eq!(engine.evaluate(&full, 0.12), None);
        assert_eq!(engine.evaluate(&full, 0.16), None);
        assert_eq!(engine.evaluate(&full, 0.20), Some(Decision::Match));
    }

    // ---- K-of-N ------------------------------------------------------------

    #[test]
    fn k_of_n_passes_on_partial_voicing() {
        // Only E and G sounding, k = 2 → still a pass.
        let notes = [note(52, 0.9), note(55, 0.9)];
        let mut engine = engine_with(e_minor(), settings());

        let results = drive(&mut engine, &notes, 3, 0.0);
        assert_eq!(results[2], Some(Decision::Match));
    }

    #[test]
    fn miss_reports_matched_and_missing_partition() {
        // E + G only, against a k=3 requirement: diagnostic sets must
        // partition the expected chord.
        let spec = ChordSpec::new(
            [PitchClass::E, PitchClass::G, PitchClass::B],
            3,
            Some(PitchClass::E),
        )
        .unwrap();
        let notes = [note(52, 0.9), note(55, 0.9)];
        let mut engine = engine_with(spec, settings());

        match engine.evaluate(&notes, 0.0) {
            Some(Decision::Miss { matched, missing }) => {
                assert_eq!(matched, vec![PitchClass::E, PitchClass::G]);
                assert_eq!(missing, vec![PitchClass::B]);
            }
            other => panic!("expected Miss, got {other:?}"),
        }
    }

    #[test]
    fn single_note_chord_with_k_one() {
        let spec = ChordSpec::new([PitchClass::A], 1, None).unwrap();
        let mut engine = engine_with(spec, settings());

        // A2 present → pass through to a match.
        let results = drive(&mut engine, &[note(45, 0.9)], 3, 0.0);
        assert_eq!(results[2], Some(Decision::Match));

        // B2 only → miss.
        let mut engine2 = engine_with(ChordSpec::new([PitchClass::A], 1, None).unwrap(), settings());
        assert!(matches!(
            engine2.evaluate(&[note(47, 0.9)], 0.0),
            Some(Decision::Miss { .. })
        ));
    }

    // ---- Octave invariance and transpose ------------------------------------

    #[test]
    fn octave_shift_still_matches() {
        // E4 + G4 + B4 — one octave above the scored voicing.
        let notes = [note(64, 0.9), note(67, 0.9), note(71, 0.9)];
        let mut engine = engine_with(e_minor(), settings());

        let results = drive(&mut engine, &notes, 3, 0.0);
        assert_eq!(results[2], Some(Decision::Match));
    }

    #[test]
    fn capo_transpose_maps_d_major_onto_c_major() {
        // transpose +2: played D3 + F#3 + A3 verifies against a C major spec.
        let mut cfg = settings();
        cfg.transpose_semitones = 2;
        let notes = [note(50, 0.9), note(54, 0.9), note(57, 0.9)];
        let mut engine = engine_with(c_major(2), cfg);

        let results = drive(&mut engine, &notes, 3, 0.0);
        assert_eq!(results[2], Some(Decision::Match));
    }

    // ---- Inversions and bass -------------------------------------------------

    #[test]
    fn inversion_rejected_when_not_accepted() {
        // C major with G in the bass (G2 + C3 + E3); all pitch classes
        // present but the bass is wrong.
        let mut cfg = settings();
        cfg.accept_inversions = false;
        let notes = [note(43, 0.9), note(48, 0.9), note(52, 0.9)];
        let mut engine = engine_with(c_major(3), cfg);

        match engine.evaluate(&notes, 0.0) {
            Some(Decision::Miss { matched, missing }) => {
                assert_eq!(
                    matched,
                    vec![PitchClass::C, PitchClass::E, PitchClass::G]
                );
                assert!(missing.is_empty());
            }
            other => panic!("expected Miss, got {other:?}"),
        }
    }

    #[test]
    fn inversion_accepted_by_default() {
        let notes = [note(43, 0.9), note(48, 0.9), note(52, 0.9)];
        let mut engine = engine_with(c_major(3), settings());

        let results = drive(&mut engine, &notes, 3, 0.0);
        assert_eq!(results[2], Some(Decision::Match));
    }

    #[test]
    fn bass_priority_needs_root_in_bass() {
        let mut cfg = settings();
        cfg.policy = VerifyPolicy::BassPriority;

        // Root-position C major: C3 bass → passes.
        let rooted = [note(48, 0.9), note(52, 0.9), note(55, 0.9)];
        let mut engine = engine_with(c_major(2), cfg.clone());
        let results = drive(&mut engine, &rooted, 3, 0.0);
        assert_eq!(results[2], Some(Decision::Match));

        // First inversion (E in the bass) → fails even though k is met.
        let inverted = [note(52, 0.9), note(55, 0.9), note(60, 0.9)];
        let mut engine = engine_with(c_major(2), cfg);
        assert!(matches!(
            engine.evaluate(&inverted, 0.0),
            Some(Decision::Miss { .. })
        ));
    }

    #[test]
    fn includes_target_ignores_other_voices() {
        let mut cfg = settings();
        cfg.policy = VerifyPolicy::IncludesTarget;
        let mut engine = engine_with(e_minor(), cfg);

        // Only E2 sounding: enough for IncludesTarget.
        let results = drive(&mut engine, &[note(40, 0.9)], 3, 0.0);
        assert_eq!(results[2], Some(Decision::Match));
    }

    // ---- Salience / range filters -------------------------------------------

    #[test]
    fn weak_notes_are_filtered_out() {
        // B3 below the 0.2 default threshold → effectively E + G only.
        let spec = ChordSpec::new(
            [PitchClass::E, PitchClass::G, PitchClass::B],
            3,
            Some(PitchClass::E),
        )
        .unwrap();
        let notes = [note(52, 0.9), note(55, 0.9), note(59, 0.1)];
        let mut engine = engine_with(spec, settings());

        match engine.evaluate(&notes, 0.0) {
            Some(Decision::Miss { missing, .. }) => {
                assert_eq!(missing, vec![PitchClass::B]);
            }
            other => panic!("expected Miss, got {other:?}"),
        }
    }

    #[test]
    fn cents_tolerance_maps_to_salience_threshold() {
        let mut cfg = settings();
        cfg.cents_tol = Some(20.0);
        assert_eq!(PolicyEngine::new(cfg.clone()).effective_salience_threshold(), 0.4);

        cfg.cents_tol = Some(50.0);
        assert_eq!(PolicyEngine::new(cfg.clone()).effective_salience_threshold(), 0.3);

        cfg.cents_tol = Some(80.0);
        assert_eq!(PolicyEngine::new(cfg.clone()).effective_salience_threshold(), 0.2);

        cfg.cents_tol = None;
        cfg.salience_threshold = 0.35;
        assert_eq!(PolicyEngine::new(cfg).effective_salience_threshold(), 0.35);
    }

    #[test]
    fn notes_outside_guitar_range_are_ignored() {
        // MIDI 24 (C1, ~32.7 Hz) and MIDI 100 (E7, ~2637 Hz) fall outside
        // E2–E6; only the in-range E3 counts.
        let notes = [note(24, 0.9), note(100, 0.9), note(52, 0.9)];
        let spec = ChordSpec::new([PitchClass::E], 1, None).unwrap();
        let mut engine = engine_with(spec, settings());

        let results = drive(&mut engine, &notes, 3, 0.0);
        assert_eq!(results[2], Some(Decision::Match));

        // C1 alone, pitch class C, would otherwise satisfy a C spec.
        let mut engine = engine_with(ChordSpec::new([PitchClass::C], 1, None).unwrap(), settings());
        assert!(matches!(
            engine.evaluate(&[note(24, 0.9)], 0.0),
            Some(Decision::Miss { .. })
        ));
    }

    // ---- Miss debounce -------------------------------------------------------

    #[test]
    fn misses_are_spaced_by_cooldown() {
        let mut engine = engine_with(e_minor(), settings());
        let silence: [NoteEvent; 0] = [];

        // Ticks every 40 ms; cooldown 250 ms → a miss at most every 7th tick.
        let mut miss_times = Vec::new();
        for i in 0..40 {
            let t = i as f64 * 0.04;
            if let Some(Decision::Miss { .. }) = engine.evaluate(&silence, t) {
                miss_times.push(t);
            }
        }

        assert!(miss_times.len() >= 2);
        for pair in miss_times.windows(2) {
            assert!(
                pair[1] - pair[0] >= 0.25 - 1e-9,
                "misses too close: {} → {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn silence_never_matches() {
        let mut engine = engine_with(e_minor(), settings());
        for i in 0..50 {
            let d = engine.evaluate(&[], i as f64 * 0.04);
            assert!(!matches!(d, Some(Decision::Match)));
        }
    }

    // ---- set_expected -------------------------------------------------------

    #[test]
    fn set_expected_resets_confirmation() {
        let e_minor_notes = [note(52, 0.9), note(55, 0.9), note(59, 0.9)];
        let mut engine = engine_with(e_minor(), settings());

        // Two passes accrued, then the score advances to A minor.
        assert_eq!(engine.evaluate(&e_minor_notes, 0.00), None);
        assert_eq!(engine.evaluate(&e_minor_notes, 0.04), None);

        let a_minor = ChordSpec::new(
            [PitchClass::A, PitchClass::C, PitchClass::E],
            2,
            Some(PitchClass::A),
        )
        .unwrap();
        engine.set_expected(a_minor);
        assert_eq!(engine.phase(), PolicyPhase::Armed);

        // Still sustaining E minor: no spurious match within a fresh
        // confirmation window; only E overlaps with A minor.
        for i in 0..3 {
            let d = engine.evaluate(&e_minor_notes, 0.30 + i as f64 * 0.04);
            assert!(!matches!(d, Some(Decision::Match)));
            if let Some(Decision::Miss { matched, missing }) = d {
                assert_eq!(matched, vec![PitchClass::E]);
                assert_eq!(missing, vec![PitchClass::C, PitchClass::A]);
            }
        }
    }

    #[test]
    fn set_expected_twice_is_idempotent() {
        let mut engine = engine_with(e_minor(), settings());
        engine.set_expected(e_minor());

        assert_eq!(engine.phase(), PolicyPhase::Armed);
        assert_eq!(engine.expected(), Some(&e_minor()));

        let notes = [note(52, 0.9), note(55, 0.9), note(59, 0.9)];
        let results = drive(&mut engine, &notes, 3, 0.0);
        assert_eq!(results[2], Some(Decision::Match));
    }
}
