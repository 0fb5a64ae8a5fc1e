// Two-phase melody composition: evolve a rhythm, freeze it, evolve pitches.
//
// Stage sequence:
//
//   Init -> RhythmLoop -> RhythmDone -> PitchInit -> PitchLoop -> Done
//                                \-> Cancelled
//
// `Init` validates the configuration and the reference before anything is
// generated; a rejected run never reaches `RhythmLoop`. The rhythm phase
// starts from random bar-filling rhythms (each ending in a tonic half-note
// cadence) and uses bar crossover plus the rhythm mutation set; it returns
// the last generation's best. The pitch phase clones that winner, gives
// every copy random in-key pitches, and evolves pitches only (no crossover)
// toward the reference's pitch profile, returning the best individual ever
// seen.
//
// A sink that breaks during the rhythm phase ends the run at `Cancelled`:
// no pitch generation runs, and the composition carries only the rhythm.
//
// One `MelosRng` and one progress sink are threaded through both phases.

use crate::config::GaConfig;
use crate::error::{GaError, Result};
use crate::evolution::{
    EvolutionLoop, Phase, PhaseOutcome, Population, ProgressSink, StopReason,
};
use crate::fitness::{PitchFitness, RhythmFitness};
use crate::operators::{BarCrossover, PitchMutations, RhythmMutations};
use crate::settings::MusicalSettings;
use crate::track::Track;
use melos_prng::MelosRng;

/// Echo features compare bars within groups of four.
pub const MIN_BARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    RhythmLoop,
    RhythmDone,
    PitchInit,
    PitchLoop,
    Done,
    Cancelled,
}

/// Result of a full two-phase run.
#[derive(Debug, Clone)]
pub struct Composition {
    /// The rhythm winner with evolved pitches, or the bare rhythm winner
    /// (placeholder pitches, tonic cadence) when the run was cancelled
    /// before the pitch phase.
    pub melody: Track,
    pub rhythm: PhaseOutcome,
    /// `None` when the run was cancelled during the rhythm phase.
    pub pitch: Option<PhaseOutcome>,
}

impl Composition {
    /// Whether a progress sink stopped the run early.
    pub fn cancelled(&self) -> bool {
        match &self.pitch {
            Some(pitch) => pitch.stop == StopReason::Cancelled,
            None => true,
        }
    }
}

/// Drives one composition through its stages.
pub struct Composer<'a> {
    config: &'a GaConfig,
    stage: Stage,
}

impl<'a> Composer<'a> {
    pub fn new(config: &'a GaConfig) -> Self {
        Composer {
            config,
            stage: Stage::Init,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, stage: Stage) {
        log::debug!("stage {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    pub fn run(
        &mut self,
        reference: &Track,
        rng: &mut MelosRng,
        sink: &mut dyn ProgressSink,
    ) -> Result<Composition> {
        let bar_count = validate(reference, self.config)?;

        self.advance(Stage::RhythmLoop);
        log::info!(
            "rhythm phase: {} bars, population {}, up to {} generations",
            bar_count,
            self.config.population_size,
            self.config.generations
        );
        let mut rhythm = evolve_rhythm(reference.settings, bar_count, self.config, rng, sink);
        rhythm.best.instrument = reference.instrument;
        self.advance(Stage::RhythmDone);
        log::info!(
            "rhythm phase finished after {} generation(s) ({:?}), fitness {:.4}",
            rhythm.generations,
            rhythm.stop,
            rhythm.fitness
        );
        if rhythm.stop == StopReason::Cancelled {
            self.advance(Stage::Cancelled);
            log::info!("cancelled during the rhythm phase; pitch phase skipped");
            return Ok(Composition {
                melody: rhythm.best.clone(),
                rhythm,
                pitch: None,
            });
        }

        self.advance(Stage::PitchInit);
        let fitness = PitchFitness::new(reference, self.config.pitch.clone());
        let population = pitch_population(&rhythm.best, self.config.population_size, rng);

        self.advance(Stage::PitchLoop);
        let pitch = evolve_pitch(fitness, population, self.config, rng, sink);
        log::info!(
            "pitch phase finished after {} generation(s) ({:?}), fitness {:.4}",
            pitch.generations,
            pitch.stop,
            pitch.fitness
        );

        self.advance(Stage::Done);
        Ok(Composition {
            melody: pitch.best.clone(),
            rhythm,
            pitch: Some(pitch),
        })
    }
}

/// Run both phases against `reference`.
pub fn compose(
    reference: &Track,
    config: &GaConfig,
    rng: &mut MelosRng,
    sink: &mut dyn ProgressSink,
) -> Result<Composition> {
    Composer::new(config).run(reference, rng, sink)
}

/// Check the run can start; returns the number of bars to generate.
fn validate(reference: &Track, config: &GaConfig) -> Result<usize> {
    config.validate()?;
    if reference.notes.is_empty() {
        return Err(GaError::EmptyReference);
    }
    let found = reference.bar_count();
    if found < MIN_BARS {
        return Err(GaError::TooFewBars {
            found,
            required: MIN_BARS,
        });
    }
    let bars = config.bar_count.unwrap_or(found);
    if bars < MIN_BARS {
        return Err(GaError::TooFewBars {
            found: bars,
            required: MIN_BARS,
        });
    }
    Ok(bars)
}

/// Evolve a rhythm of `bar_count` bars from a random population.
pub fn evolve_rhythm(
    settings: MusicalSettings,
    bar_count: usize,
    config: &GaConfig,
    rng: &mut MelosRng,
    sink: &mut dyn ProgressSink,
) -> PhaseOutcome {
    let tracks = (0..config.population_size)
        .map(|_| Track::random_rhythm(settings, bar_count, config.max_duration_draws, rng))
        .collect();
    let mut population = Population::new(tracks);
    EvolutionLoop::new(
        Phase::Rhythm,
        RhythmFitness::new(config.rhythm.clone()),
        RhythmMutations {
            weights: config.rhythm_mutation.clone(),
        },
    )
    .with_crossover(BarCrossover)
    .mutation_rate(config.mutation_rate)
    .generations(config.generations)
    .target(config.rhythm.target)
    .run(&mut population, rng, sink)
}

/// Copies of a fixed rhythm, each with random in-key pitches.
pub fn pitch_population(rhythm: &Track, size: usize, rng: &mut MelosRng) -> Population {
    let tracks = (0..size)
        .map(|_| {
            let mut t = rhythm.clone();
            t.assign_random_pitches(rng);
            t
        })
        .collect();
    Population::new(tracks)
}

/// Evolve the pitches of `population` toward the fitness function's
/// reference, keeping the best individual ever seen.
pub fn evolve_pitch(
    fitness: PitchFitness,
    mut population: Population,
    config: &GaConfig,
    rng: &mut MelosRng,
    sink: &mut dyn ProgressSink,
) -> PhaseOutcome {
    EvolutionLoop::new(
        Phase::Pitch,
        fitness,
        PitchMutations {
            weights: config.pitch_mutation.clone(),
        },
    )
    .mutation_rate(config.mutation_rate)
    .generations(config.generations)
    .target(config.pitch.target)
    .keep_best_ever(true)
    .run(&mut population, rng, sink)
}
