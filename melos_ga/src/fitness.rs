// Fitness functions of the two phases. Higher is better in both.
//
// Rhythm fitness is absolute: it rewards strong-beat onsets and bar echoes
// and penalizes misaligned, long, and discontinuous notes. Pitch fitness is
// relative to a reference melody whose `PitchFeatures` are extracted once,
// when the function is built, and compared against every candidate.
//
// When a candidate and the reference differ in length, per-bar and per-slot
// comparisons run over the common prefix while the averaging denominators
// stay those of the candidate.

use crate::config::{PitchWeights, RhythmWeights};
use crate::evolution::FitnessFn;
use crate::features::{PitchFeatures, RhythmFeatures, pearson};
use crate::track::Track;

#[derive(Debug, Clone)]
pub struct RhythmFitness {
    weights: RhythmWeights,
}

impl RhythmFitness {
    pub fn new(weights: RhythmWeights) -> Self {
        RhythmFitness { weights }
    }

    /// Score precomputed features of a track in the given settings.
    pub fn score(&self, f: &RhythmFeatures, strong_slots_per_bar: usize) -> f64 {
        let w = &self.weights;
        let expected = (strong_slots_per_bar * f.bars) as f64;
        w.strong_beat * (f.strong_beats as f64 - expected) + w.echo * f.echo
            - w.misalignment * f.misalignment
            - w.long_note * f.long_notes
            - w.discontinuity * f.discontinuity as f64
    }
}

impl FitnessFn for RhythmFitness {
    fn evaluate(&self, track: &Track) -> f64 {
        let features = RhythmFeatures::extract(track);
        self.score(&features, track.settings.half_slots_per_bar())
    }
}

/// Similarity to a reference melody's pitch profile.
#[derive(Debug, Clone)]
pub struct PitchFitness {
    reference: PitchFeatures,
    weights: PitchWeights,
}

impl PitchFitness {
    pub fn new(reference: &Track, weights: PitchWeights) -> Self {
        PitchFitness {
            reference: PitchFeatures::extract(reference, &weights),
            weights,
        }
    }

    pub fn reference(&self) -> &PitchFeatures {
        &self.reference
    }

    pub fn score(&self, f: &PitchFeatures) -> f64 {
        let w = &self.weights;
        let r = &self.reference;
        let bars = f.bars.max(1) as f64;

        let last_bar = f.interval_means.len().saturating_sub(1);
        let interval_dev: f64 = f
            .interval_means
            .iter()
            .zip(&r.interval_means)
            .enumerate()
            .map(|(i, (m, rm))| {
                let weight = if i == 0 || i == last_bar {
                    w.interval_edge_weight
                } else {
                    1.0
                };
                weight * (m - rm).abs()
            })
            .sum();

        let slots = f.tension.len();
        let tension_dev: f64 = f
            .tension
            .iter()
            .zip(&r.tension)
            .enumerate()
            .map(|(j, (e, re))| {
                let weight = if j + 1 == slots {
                    w.tension_final_weight
                } else {
                    w.tension_slot_weights[j % w.tension_slot_weights.len()]
                };
                weight * (e - re).abs()
            })
            .sum();

        w.interval * (-interval_dev / bars).exp()
            + w.three_note * f.three_note / bars
            + w.tension * (-tension_dev / slots.max(1) as f64).exp()
            + w.echo * bars / (f.echo + 1.0)
            + w.contour * pearson(&f.curve, &r.curve)
    }
}

impl FitnessFn for PitchFitness {
    fn evaluate(&self, track: &Track) -> f64 {
        self.score(&PitchFeatures::extract(track, &self.weights))
    }
}
