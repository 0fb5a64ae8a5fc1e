// Generic generational loop shared by the rhythm and pitch phases.
//
// A phase is an `EvolutionLoop` over three seams: a `FitnessFn` (higher is
// better), a `MutationSet` (one weighted operator per mutated slot) and an
// optional `CrossoverFn`. The pitch phase has no crossover and uses the
// uninhabited `NoCrossover` as its type parameter.
//
// Order of work: the initial population is evaluated and selected once
// before the first generation, so a zero-generation run returns the initial
// best. Each generation then runs
//
//   crossover (if any) -> mutation -> evaluation -> selection -> report
//
// and stops early when the best fitness exceeds the target or the progress
// sink asks to stop. Parents for crossover and mutation are the best and
// second-best individuals chosen by the previous selection, snapshotted at
// the start of the generation so that rewriting slots in place cannot change
// them mid-generation.
//
// Running out of generations is not an error: the phase returns its best
// individual either from the last generation or, with `keep_best_ever`, the
// best seen at any point.

use crate::track::Track;
use melos_prng::MelosRng;
use std::fmt;
use std::ops::ControlFlow;

/// Scores a track. Higher is better.
pub trait FitnessFn {
    fn evaluate(&self, track: &Track) -> f64;
}

/// Applies one randomly chosen operator to a track. Returns false when the
/// chosen operator found nothing to change.
pub trait MutationSet {
    fn mutate(&self, track: &mut Track, rng: &mut MelosRng) -> bool;
}

/// Breeds one child from two parents.
pub trait CrossoverFn {
    fn cross(&self, a: &Track, b: &Track, rng: &mut MelosRng) -> Track;
}

/// Crossover type of phases that never cross over.
#[derive(Debug, Clone, Copy)]
pub enum NoCrossover {}

impl CrossoverFn for NoCrossover {
    fn cross(&self, _: &Track, _: &Track, _: &mut MelosRng) -> Track {
        match *self {}
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Rhythm,
    Pitch,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Rhythm => "rhythm",
            Phase::Pitch => "pitch",
        })
    }
}

/// Sent to the progress sink once per generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationReport {
    pub phase: Phase,
    /// 0-based index of the generation just completed.
    pub generation: usize,
    /// Best fitness of this generation's population.
    pub best_fitness: f64,
    /// Best fitness seen so far in this phase, including the initial
    /// population.
    pub best_so_far: f64,
}

/// Receives per-generation progress. Returning `ControlFlow::Break(())`
/// stops the phase after the current generation.
pub trait ProgressSink {
    fn report(&mut self, report: &GenerationReport) -> ControlFlow<()>;
}

impl<F> ProgressSink for F
where
    F: FnMut(&GenerationReport) -> ControlFlow<()>,
{
    fn report(&mut self, report: &GenerationReport) -> ControlFlow<()> {
        self(report)
    }
}

/// Logs every `every`-th generation at info level; never cancels.
#[derive(Debug, Clone, Copy)]
pub struct LogProgress {
    pub every: usize,
}

impl ProgressSink for LogProgress {
    fn report(&mut self, r: &GenerationReport) -> ControlFlow<()> {
        if self.every > 0 && r.generation % self.every == 0 {
            log::info!(
                "{} generation {}: best {:.4} (best so far {:.4})",
                r.phase,
                r.generation,
                r.best_fitness,
                r.best_so_far
            );
        }
        ControlFlow::Continue(())
    }
}

/// Fixed-size population with a parallel fitness vector.
#[derive(Debug, Clone)]
pub struct Population {
    pub tracks: Vec<Track>,
    pub fitness: Vec<f64>,
    best: usize,
    second: usize,
}

impl Population {
    pub fn new(tracks: Vec<Track>) -> Self {
        let fitness = vec![0.0; tracks.len()];
        Population {
            tracks,
            fitness,
            best: 0,
            second: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn evaluate(&mut self, f: &impl FitnessFn) {
        for (score, track) in self.fitness.iter_mut().zip(&self.tracks) {
            *score = f.evaluate(track);
        }
    }

    /// Find the best and second-best indices in one pass. Ties go to the
    /// earlier index; a population of one has `second == best`.
    pub fn select(&mut self) {
        let mut best = 0;
        let mut second = 0;
        for i in 1..self.fitness.len() {
            if self.fitness[i] > self.fitness[best] {
                second = best;
                best = i;
            } else if second == best || self.fitness[i] > self.fitness[second] {
                second = i;
            }
        }
        self.best = best;
        self.second = second;
    }

    pub fn best_index(&self) -> usize {
        self.best
    }

    pub fn second_index(&self) -> usize {
        self.second
    }

    pub fn best_track(&self) -> &Track {
        &self.tracks[self.best]
    }

    pub fn best_fitness(&self) -> f64 {
        self.fitness[self.best]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    BudgetExhausted,
    Cancelled,
}

/// What a finished phase hands back.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub best: Track,
    pub fitness: f64,
    /// Generations actually run.
    pub generations: usize,
    pub stop: StopReason,
    /// Mutations that changed their track.
    pub mutations_applied: usize,
}

pub struct EvolutionLoop<F, M, C = NoCrossover> {
    phase: Phase,
    fitness: F,
    mutations: M,
    crossover: Option<C>,
    mutation_rate: f64,
    generations: usize,
    target: f64,
    keep_best_ever: bool,
}

impl<F: FitnessFn, M: MutationSet> EvolutionLoop<F, M> {
    /// A loop without crossover. Defaults: rate 1.0, 100 generations, no
    /// target.
    pub fn new(phase: Phase, fitness: F, mutations: M) -> Self {
        EvolutionLoop {
            phase,
            fitness,
            mutations,
            crossover: None,
            mutation_rate: 1.0,
            generations: 100,
            target: f64::INFINITY,
            keep_best_ever: false,
        }
    }
}

impl<F: FitnessFn, M: MutationSet, C: CrossoverFn> EvolutionLoop<F, M, C> {
    pub fn with_crossover<C2: CrossoverFn>(self, crossover: C2) -> EvolutionLoop<F, M, C2> {
        EvolutionLoop {
            phase: self.phase,
            fitness: self.fitness,
            mutations: self.mutations,
            crossover: Some(crossover),
            mutation_rate: self.mutation_rate,
            generations: self.generations,
            target: self.target,
            keep_best_ever: self.keep_best_ever,
        }
    }

    pub fn mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate;
        self
    }

    pub fn generations(mut self, generations: usize) -> Self {
        self.generations = generations;
        self
    }

    /// Stop as soon as a generation's best fitness exceeds `target`.
    pub fn target(mut self, target: f64) -> Self {
        self.target = target;
        self
    }

    /// Return the best individual ever seen instead of the last
    /// generation's best.
    pub fn keep_best_ever(mut self, keep: bool) -> Self {
        self.keep_best_ever = keep;
        self
    }

    /// Evolve `population` in place. The population must not be empty.
    pub fn run(
        &self,
        population: &mut Population,
        rng: &mut MelosRng,
        sink: &mut dyn ProgressSink,
    ) -> PhaseOutcome {
        population.evaluate(&self.fitness);
        population.select();
        let mut best_ever = population.best_track().clone();
        let mut best_ever_fitness = population.best_fitness();

        let mut stop = StopReason::BudgetExhausted;
        let mut generations = 0;
        let mut mutations_applied = 0;
        for generation in 0..self.generations {
            let parents = [
                population.tracks[population.best].clone(),
                population.tracks[population.second].clone(),
            ];

            if let Some(crossover) = &self.crossover {
                for slot in &mut population.tracks {
                    let a = pick(&parents, rng);
                    let b = pick(&parents, rng);
                    *slot = crossover.cross(a, b, rng);
                }
            }
            for slot in &mut population.tracks {
                if !rng.random_bool(self.mutation_rate) {
                    continue;
                }
                let mut child = pick(&parents, rng).clone();
                if self.mutations.mutate(&mut child, rng) {
                    mutations_applied += 1;
                }
                *slot = child;
            }

            population.evaluate(&self.fitness);
            population.select();
            generations = generation + 1;

            let best_fitness = population.best_fitness();
            if best_fitness > best_ever_fitness {
                best_ever_fitness = best_fitness;
                best_ever = population.best_track().clone();
            }
            let flow = sink.report(&GenerationReport {
                phase: self.phase,
                generation,
                best_fitness,
                best_so_far: best_ever_fitness,
            });
            if best_fitness > self.target {
                stop = StopReason::TargetReached;
                break;
            }
            if flow.is_break() {
                stop = StopReason::Cancelled;
                break;
            }
        }

        let (best, fitness) = if self.keep_best_ever {
            (best_ever, best_ever_fitness)
        } else {
            (population.best_track().clone(), population.best_fitness())
        };
        log::debug!(
            "{} phase stopped after {} generation(s): {:?}, fitness {:.4}",
            self.phase,
            generations,
            stop,
            fitness
        );
        PhaseOutcome {
            best,
            fitness,
            generations,
            stop,
            mutations_applied,
        }
    }
}

/// Best or second-best with equal probability.
fn pick<'a>(parents: &'a [Track; 2], rng: &mut MelosRng) -> &'a Track {
    &parents[usize::from(rng.coin_flip())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MusicalSettings;
    use crate::track::Note;

    /// Fitness = number of notes.
    struct CountNotes;
    impl FitnessFn for CountNotes {
        fn evaluate(&self, track: &Track) -> f64 {
            track.notes.len() as f64
        }
    }

    /// Fitness = minus the number of notes.
    struct FewerNotes;
    impl FitnessFn for FewerNotes {
        fn evaluate(&self, track: &Track) -> f64 {
            -(track.notes.len() as f64)
        }
    }

    /// Always appends one note.
    struct AddNote;
    impl MutationSet for AddNote {
        fn mutate(&self, track: &mut Track, _: &mut MelosRng) -> bool {
            let start = track.total_length();
            track.notes.push(Note::new(60, 240, start, 64));
            true
        }
    }

    fn with_notes(n: usize) -> Track {
        let mut t = Track::new(MusicalSettings::default(), 0);
        for i in 0..n {
            t.notes.push(Note::new(60, 240, i as u32 * 240, 64));
        }
        t
    }

    fn population(sizes: &[usize]) -> Population {
        Population::new(sizes.iter().map(|&n| with_notes(n)).collect())
    }

    fn quiet() -> impl FnMut(&GenerationReport) -> ControlFlow<()> {
        |_: &GenerationReport| ControlFlow::Continue(())
    }

    #[test]
    fn select_finds_best_and_second() {
        let mut p = population(&[3, 7, 5, 7, 1]);
        p.evaluate(&CountNotes);
        p.select();
        assert_eq!(p.best_index(), 1, "ties go to the first seen");
        assert_eq!(p.second_index(), 3);

        let mut p = population(&[9, 2, 4]);
        p.evaluate(&CountNotes);
        p.select();
        assert_eq!((p.best_index(), p.second_index()), (0, 2));
    }

    #[test]
    fn select_single_individual() {
        let mut p = population(&[4]);
        p.evaluate(&CountNotes);
        p.select();
        assert_eq!((p.best_index(), p.second_index()), (0, 0));
    }

    #[test]
    fn zero_generations_returns_initial_best() {
        let mut p = population(&[2, 6, 4]);
        let mut rng = MelosRng::new(1);
        let out = EvolutionLoop::new(Phase::Rhythm, CountNotes, AddNote)
            .generations(0)
            .run(&mut p, &mut rng, &mut quiet());
        assert_eq!(out.generations, 0);
        assert_eq!(out.stop, StopReason::BudgetExhausted);
        assert_eq!(out.best.notes.len(), 6);
        assert_eq!(out.fitness, 6.0);
    }

    #[test]
    fn target_stops_early() {
        let mut p = population(&[1, 2]);
        let mut rng = MelosRng::new(2);
        let out = EvolutionLoop::new(Phase::Rhythm, CountNotes, AddNote)
            .generations(1000)
            .target(5.5)
            .run(&mut p, &mut rng, &mut quiet());
        assert_eq!(out.stop, StopReason::TargetReached);
        assert!(out.fitness > 5.5);
        assert!(out.generations < 1000);
    }

    #[test]
    fn sink_can_cancel() {
        let mut p = population(&[1, 2]);
        let mut rng = MelosRng::new(3);
        let mut seen = Vec::new();
        let mut sink = |r: &GenerationReport| {
            seen.push(r.generation);
            if r.generation == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        let out = EvolutionLoop::new(Phase::Pitch, CountNotes, AddNote)
            .generations(50)
            .run(&mut p, &mut rng, &mut sink);
        assert_eq!(out.stop, StopReason::Cancelled);
        assert_eq!(out.generations, 3);
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn best_ever_survives_regression() {
        // Every mutation makes a track worse and the rate is 1, so the whole
        // population regresses each generation.
        let run = |keep: bool| {
            let mut p = population(&[3, 5]);
            let mut rng = MelosRng::new(4);
            let mut reports = Vec::new();
            let mut sink = |r: &GenerationReport| {
                reports.push(*r);
                ControlFlow::Continue(())
            };
            let out = EvolutionLoop::new(Phase::Pitch, FewerNotes, AddNote)
                .generations(10)
                .keep_best_ever(keep)
                .run(&mut p, &mut rng, &mut sink);
            (out, reports)
        };

        let (last, _) = run(false);
        assert!(last.fitness < -3.0);

        let (kept, reports) = run(true);
        assert_eq!(kept.fitness, -3.0);
        assert_eq!(kept.best.notes.len(), 3);
        assert_eq!(kept.mutations_applied, 20);
        for w in reports.windows(2) {
            assert!(w[1].best_so_far >= w[0].best_so_far);
        }
        assert!(reports.iter().all(|r| r.best_so_far == -3.0));
    }

    #[test]
    fn crossover_runs_for_every_slot() {
        struct TakeFirst;
        impl CrossoverFn for TakeFirst {
            fn cross(&self, a: &Track, _: &Track, _: &mut MelosRng) -> Track {
                a.clone()
            }
        }
        let mut p = population(&[1, 8, 2, 3]);
        let mut rng = MelosRng::new(5);
        EvolutionLoop::new(Phase::Rhythm, CountNotes, AddNote)
            .with_crossover(TakeFirst)
            .mutation_rate(0.0)
            .generations(1)
            .run(&mut p, &mut rng, &mut quiet());
        // Every child is a copy of the best (8 notes) or second (3 notes).
        assert!(p.tracks.iter().all(|t| t.notes.len() == 8 || t.notes.len() == 3));
    }
}
