// Run configuration: GA sizes plus every fitness and mutation weight.
//
// The weights were hand-tuned over many revisions without changing the
// algorithm's shape, so all of them live here rather than in the code that
// uses them. Loaded from JSON; `#[serde(default)]` everywhere means a config
// file only needs the fields it changes.

use crate::error::{GaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Weights of the rhythm fitness terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmWeights {
    /// θ: reward per strong-beat onset beyond two per bar.
    pub strong_beat: f64,
    /// δ: reward for bar-pair onset coincidence.
    pub echo: f64,
    /// ε: penalty for notes off their own duration grid.
    pub misalignment: f64,
    /// ω: penalty for long notes.
    pub long_note: f64,
    /// ο: penalty for half/eighth neighbours.
    pub discontinuity: f64,
    /// Stop early once the best fitness exceeds this.
    pub target: f64,
}

impl Default for RhythmWeights {
    fn default() -> Self {
        RhythmWeights {
            strong_beat: 0.5,
            echo: 1.0,
            misalignment: 0.3,
            long_note: 0.1,
            discontinuity: 0.1,
            target: 3.5,
        }
    }
}

/// Weights and shape constants of the pitch fitness terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchWeights {
    /// Similarity of per-bar mean interval size to the reference.
    pub interval: f64,
    pub three_note: f64,
    /// Similarity of the tension sequence to the reference.
    pub tension: f64,
    /// Inverse melodic echo distance.
    pub echo: f64,
    /// Correlation of the melody curve with the reference.
    pub contour: f64,
    /// Stop early once the best fitness exceeds this.
    pub target: f64,

    /// Interval magnitudes are divided by this before averaging.
    pub interval_divisor: f64,
    /// Weight of the first and last bar in the interval deviation.
    pub interval_edge_weight: f64,

    /// Steps up to this size in the same direction count as smooth motion.
    pub step_bound: i32,
    /// A step product below `-harsh_product` is a leap-and-reverse.
    pub harsh_product: i32,
    pub harsh_penalty: f64,

    /// Tension of scale degrees 1-7.
    pub tension_by_degree: [f64; 7],
    /// Tension of empty slots and out-of-key notes.
    pub tension_default: f64,
    /// Per-slot weights of the tension deviation, cycled along the track.
    pub tension_slot_weights: Vec<f64>,
    /// Weight of the final slot (the cadence).
    pub tension_final_weight: f64,
}

impl Default for PitchWeights {
    fn default() -> Self {
        PitchWeights {
            interval: 3.0,
            three_note: 2.0,
            tension: 3.0,
            echo: 1.0,
            contour: 2.0,
            target: 9.0,
            interval_divisor: 3.0,
            interval_edge_weight: 2.0,
            step_bound: 5,
            harsh_product: 25,
            harsh_penalty: 3.0,
            // Tonic stable, subdominant and leading tone tense.
            tension_by_degree: [1.0, 4.0, 3.0, 5.0, 4.0, 2.0, 5.0],
            tension_default: 3.0,
            // Phrase endings (every fourth half-bar) weigh most.
            tension_slot_weights: vec![1.5, 0.5, 0.8, 1.0, 1.5, 0.5, 0.8, 2.0],
            tension_final_weight: 3.0,
        }
    }
}

/// Relative weights of the four rhythm mutation operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmMutationWeights {
    pub swap_durations: f64,
    pub split_note: f64,
    pub merge_notes: f64,
    pub copy_bar: f64,
}

impl Default for RhythmMutationWeights {
    fn default() -> Self {
        RhythmMutationWeights {
            swap_durations: 1.0,
            split_note: 5.0,
            merge_notes: 1.0,
            copy_bar: 2.0,
        }
    }
}

impl RhythmMutationWeights {
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.swap_durations,
            self.split_note,
            self.merge_notes,
            self.copy_bar,
        ]
    }
}

/// Relative weights of the four pitch mutation operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchMutationWeights {
    pub octave_clamp: f64,
    pub random_pitch: f64,
    pub swap_pitches: f64,
    pub smooth_leap: f64,
    /// Interval (semitones) above which a short note counts as leaping,
    /// and the window radius it is re-pitched into.
    pub leap_threshold: u8,
}

impl Default for PitchMutationWeights {
    fn default() -> Self {
        PitchMutationWeights {
            octave_clamp: 2.0,
            random_pitch: 1.0,
            swap_pitches: 1.0,
            smooth_leap: 2.0,
            leap_threshold: 7,
        }
    }
}

impl PitchMutationWeights {
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.octave_clamp,
            self.random_pitch,
            self.swap_pitches,
            self.smooth_leap,
        ]
    }
}

/// Everything a two-phase run needs besides the reference track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaConfig {
    pub population_size: usize,
    /// Per-slot probability of mutation each generation.
    pub mutation_rate: f64,
    /// Generation budget of each phase.
    pub generations: usize,
    /// Bars to generate; defaults to the reference's bar count.
    pub bar_count: Option<usize>,
    /// Seed for the run's generator; None picks one from the clock.
    pub seed: Option<u64>,
    /// Retry cap of the random bar packing.
    pub max_duration_draws: usize,
    /// Log a progress line every this many generations (0 = never).
    pub log_every: usize,
    pub rhythm: RhythmWeights,
    pub pitch: PitchWeights,
    pub rhythm_mutation: RhythmMutationWeights,
    pub pitch_mutation: PitchMutationWeights,
}

impl Default for GaConfig {
    fn default() -> Self {
        GaConfig {
            population_size: 20,
            mutation_rate: 0.8,
            generations: 1000,
            bar_count: None,
            seed: None,
            max_duration_draws: 32,
            log_every: 50,
            rhythm: RhythmWeights::default(),
            pitch: PitchWeights::default(),
            rhythm_mutation: RhythmMutationWeights::default(),
            pitch_mutation: PitchMutationWeights::default(),
        }
    }
}

impl GaConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: GaConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject values outside their documented ranges.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(GaError::InvalidConfig(msg));
        if self.population_size == 0 {
            return invalid("population_size must be greater than 0".into());
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return invalid(format!(
                "mutation_rate must be within [0, 1], got {}",
                self.mutation_rate
            ));
        }
        if self.generations == 0 {
            return invalid("generations must be greater than 0".into());
        }
        if self.pitch.interval_divisor <= 0.0 {
            return invalid("pitch.interval_divisor must be positive".into());
        }
        if self.pitch.tension_slot_weights.is_empty() {
            return invalid("pitch.tension_slot_weights must not be empty".into());
        }
        let no_positive = |w: [f64; 4]| !w.iter().any(|&x| x > 0.0);
        if no_positive(self.rhythm_mutation.as_array()) {
            return invalid("at least one rhythm mutation weight must be positive".into());
        }
        if no_positive(self.pitch_mutation.as_array()) {
            return invalid("at least one pitch mutation weight must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        GaConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: GaConfig =
            serde_json::from_str(r#"{"population_size": 8, "rhythm": {"echo": 2.5}}"#).unwrap();
        assert_eq!(config.population_size, 8);
        assert_eq!(config.rhythm.echo, 2.5);
        assert_eq!(config.rhythm.strong_beat, 0.5);
        assert_eq!(config.generations, 1000);
        assert_eq!(config.pitch, PitchWeights::default());
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            GaConfig {
                population_size: 0,
                ..GaConfig::default()
            },
            GaConfig {
                mutation_rate: 1.5,
                ..GaConfig::default()
            },
            GaConfig {
                generations: 0,
                ..GaConfig::default()
            },
            GaConfig {
                rhythm_mutation: RhythmMutationWeights {
                    swap_durations: 0.0,
                    split_note: 0.0,
                    merge_notes: 0.0,
                    copy_bar: 0.0,
                },
                ..GaConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(GaError::InvalidConfig(_))));
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = GaConfig {
            seed: Some(7),
            bar_count: Some(8),
            ..GaConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(GaConfig::load(&path).unwrap(), config);
    }
}
