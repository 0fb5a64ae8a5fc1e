// Melos: two-phase genetic melody generator.
//
// Evolves a short melodic line toward the stylistic profile of a reference
// melody. Phase one evolves rhythm only (durations and onsets over a bar
// grid, ending on a tonic half-note cadence); phase two freezes the winning
// rhythm and evolves pitches toward the reference's interval, contour,
// tension and echo profile.
//
// Architecture:
// - settings.rs: Key (tonic + major/minor), meter, tick grid, allowed durations
// - track.rs: Note/Track/Bar model, bar split/join, random generators,
//   transforms (transpose, invert, retrograde), text summary
// - features.rs: Rhythm and pitch feature extraction
// - fitness.rs: Rhythm fitness and reference-relative pitch fitness
// - operators.rs: Bar crossover plus rhythm and pitch mutation sets
// - evolution.rs: Generic generational loop, population, progress reporting
// - controller.rs: Two-phase stage machine and run validation
// - config.rs: JSON run configuration (sizes, weights, targets)
// - midi.rs: MIDI file input and output
// - error.rs: Error type
//
// All randomness comes from one `melos_prng::MelosRng`, so a run is
// deterministic given a seed.

pub mod config;
pub mod controller;
pub mod error;
pub mod evolution;
pub mod features;
pub mod fitness;
pub mod midi;
pub mod operators;
pub mod settings;
pub mod track;
