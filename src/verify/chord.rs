//! Pitch classes, pitch arithmetic, and the expected-chord target.
//!
//! A [`PitchClass`] is the residue of a MIDI number modulo 12 — the note
//! letter independent of octave.  A [`ChordSpec`] is the verification
//! target: a set of pitch classes, the minimum count `k` that must be heard,
//! and an optional root for bass/inversion checks.  Specs are validated at
//! construction, so an invalid target can never reach the policy engine.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// PitchClass
// ---------------------------------------------------------------------------

/// A note letter: C = 0 through B = 11, octave-invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PitchClass(u8);

impl PitchClass {
    pub const C: PitchClass = PitchClass(0);
    pub const C_SHARP: PitchClass = PitchClass(1);
    pub const D: PitchClass = PitchClass(2);
    pub const D_SHARP: PitchClass = PitchClass(3);
    pub const E: PitchClass = PitchClass(4);
    pub const F: PitchClass = PitchClass(5);
    pub const F_SHARP: PitchClass = PitchClass(6);
    pub const G: PitchClass = PitchClass(7);
    pub const G_SHARP: PitchClass = PitchClass(8);
    pub const A: PitchClass = PitchClass(9);
    pub const A_SHARP: PitchClass = PitchClass(10);
    pub const B: PitchClass = PitchClass(11);

    const NAMES: [&'static str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];

    /// Wrap a raw value; `None` when `value >= 12`.
    pub fn new(value: u8) -> Option<Self> {
        (value < 12).then_some(Self(value))
    }

    /// Reduce a MIDI number (or any semitone offset, possibly negative) to
    /// its pitch class.
    pub fn from_midi(midi: i32) -> Self {
        Self(midi.rem_euclid(12) as u8)
    }

    /// The raw value, 0..=11.
    pub fn value(self) -> u8 {
        self.0
    }

    /// Note name with sharps (`"C#"`, `"A"`, …).
    pub fn name(self) -> &'static str {
        Self::NAMES[self.0 as usize]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Frequency helpers
// ---------------------------------------------------------------------------

/// Frequency of a MIDI note under the given tuning reference (69 = A4).
pub fn midi_to_hz(midi: i32, a4_hz: f64) -> f64 {
    a4_hz * 2.0_f64.powf((midi - 69) as f64 / 12.0)
}

// ---------------------------------------------------------------------------
// ChordSpec
// ---------------------------------------------------------------------------

/// Why a [`ChordSpec`] could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChordSpecError {
    /// The pitch-class set was empty.
    #[error("chord must contain at least one pitch class")]
    Empty,

    /// `k` was zero or exceeded the number of distinct pitch classes.
    #[error("k must be in 1..={len}, got {k}")]
    KOutOfRange { k: usize, len: usize },
}

/// The chord the student is expected to play.
///
/// # Example
///
/// ```rust
/// use chordcheck::verify::{ChordSpec, PitchClass};
///
/// // C major triad, any 2 of 3 pitch classes, C in the bass for
/// // inversion-sensitive policies.
/// let spec = ChordSpec::new(
///     [PitchClass::C, PitchClass::E, PitchClass::G],
///     2,
///     Some(PitchClass::C),
/// )
/// .unwrap();
/// assert_eq!(spec.k(), 2);
/// assert_eq!(spec.target(), PitchClass::C);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordSpec {
    pcs: BTreeSet<PitchClass>,
    k: usize,
    root: Option<PitchClass>,
}

impl ChordSpec {
    /// Build a validated spec.  Duplicate pitch classes collapse (the target
    /// is a set); `k` is checked against the deduplicated size.
    pub fn new(
        pcs: impl IntoIterator<Item = PitchClass>,
        k: usize,
        root: Option<PitchClass>,
    ) -> Result<Self, ChordSpecError> {
        let pcs: BTreeSet<PitchClass> = pcs.into_iter().collect();
        if pcs.is_empty() {
            return Err(ChordSpecError::Empty);
        }
        if k == 0 || k > pcs.len() {
            return Err(ChordSpecError::KOutOfRange { k, len: pcs.len() });
        }
        Ok(Self { pcs, k, root })
    }

    /// Build a spec with the default `k = min(2, |pcs|)` — two sounding
    /// pitch classes are enough evidence for a strummed triad.
    pub fn with_default_k(
        pcs: impl IntoIterator<Item = PitchClass>,
        root: Option<PitchClass>,
    ) -> Result<Self, ChordSpecError> {
        let pcs: BTreeSet<PitchClass> = pcs.into_iter().collect();
        let k = pcs.len().min(2);
        Self::new(pcs, k, root)
    }

    /// The expected pitch classes.
    pub fn pcs(&self) -> &BTreeSet<PitchClass> {
        &self.pcs
    }

    /// Minimum number of expected pitch classes that must be detected.
    pub fn k(&self) -> usize {
        self.k
    }

    /// The declared root, if any.
    pub fn root(&self) -> Option<PitchClass> {
        self.root
    }

    /// The pitch class that root-sensitive policies test against: the
    /// declared root, or the lowest-numbered listed pitch class when none
    /// was declared.
    pub fn target(&self) -> PitchClass {
        self.root.unwrap_or_else(|| {
            *self
                .pcs
                .iter()
                .next()
                .expect("ChordSpec is never empty after validation")
        })
    }
}

impl fmt::Display for ChordSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.pcs.iter().map(|pc| pc.name()).collect();
        write!(f, "{{{}}} k={}", names.join(","), self.k)?;
        if let Some(root) = self.root {
            write!(f, " root={root}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
