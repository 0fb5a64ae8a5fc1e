// End-to-end runs through the public API: MIDI in, two-phase evolution,
// MIDI out.

use melos_ga::config::{GaConfig, PitchWeights};
use melos_ga::controller::compose;
use melos_ga::error::GaError;
use melos_ga::evolution::{GenerationReport, Phase, StopReason};
use melos_ga::features::{PitchFeatures, RhythmFeatures};
use melos_ga::midi::{read_midi, write_midi};
use melos_ga::settings::{Key, MusicalSettings};
use melos_ga::track::{Note, Track};
use melos_prng::MelosRng;
use std::ops::ControlFlow;

fn settings() -> MusicalSettings {
    MusicalSettings::default().with_key(Key::parse("G").unwrap())
}

/// Eight bars: a two-bar idea played twice, then a two-bar answer played
/// twice.
fn reference_melody() -> Track {
    let idea: [(u8, u32); 7] = [
        (67, 480),
        (71, 480),
        (74, 960),
        (72, 480),
        (71, 240),
        (69, 240),
        (67, 960),
    ];
    let answer: [(u8, u32); 6] = [
        (69, 480),
        (71, 480),
        (72, 960),
        (74, 960),
        (72, 480),
        (71, 480),
    ];
    let mut t = Track::new(settings(), 0);
    let mut start = 0;
    for phrase in [&idea[..], &idea[..], &answer[..], &answer[..]] {
        for &(pitch, duration) in phrase {
            t.notes.push(Note::new(pitch, duration, start, 90));
            start += duration;
        }
    }
    t
}

fn accompaniment() -> Track {
    let mut t = Track::new(settings(), 32);
    for bar in 0..8u32 {
        t.notes.push(Note::new(43, 1920, bar * 1920, 70));
    }
    t
}

fn config() -> GaConfig {
    GaConfig {
        population_size: 8,
        generations: 40,
        ..GaConfig::default()
    }
}

#[test]
fn compose_from_midi_file_and_write_result() {
    let dir = tempfile::tempdir().unwrap();
    let reference_path = dir.path().join("reference.mid");
    let output_path = dir.path().join("output.mid");
    write_midi(&[reference_melody(), accompaniment()], &reference_path).unwrap();

    let song = read_midi(&reference_path).unwrap();
    assert_eq!(song.settings.key, Key::parse("G").unwrap());
    let reference = song.melody().unwrap().clone();
    assert_eq!(reference.notes, reference_melody().notes);
    assert_eq!(reference.bar_count(), 8);

    let mut rhythm_gens = 0;
    let mut pitch_best = Vec::new();
    let mut sink = |r: &GenerationReport| {
        match r.phase {
            Phase::Rhythm => rhythm_gens += 1,
            Phase::Pitch => pitch_best.push(r.best_so_far),
        }
        ControlFlow::Continue(())
    };
    let out = compose(&reference, &config(), &mut MelosRng::new(2024), &mut sink).unwrap();
    assert_eq!(rhythm_gens, out.rhythm.generations);
    assert!(pitch_best.windows(2).all(|w| w[1] >= w[0]));

    let melody = out.melody;
    assert_eq!(melody.bar_count(), 8);
    assert!(melody.ends_on_tonic());
    assert_eq!(melody.notes.last().unwrap().duration, settings().half());

    write_midi(&[melody.clone(), song.accompaniment().unwrap().clone()], &output_path).unwrap();
    let written = read_midi(&output_path).unwrap();
    assert_eq!(written.tracks.len(), 2);
    assert_eq!(written.melody().unwrap().notes, melody.notes);
    assert_eq!(written.tracks[1].instrument, 32);
}

#[test]
fn cancelling_the_rhythm_phase_ends_the_run() {
    let mut config = GaConfig {
        generations: 300,
        ..config()
    };
    config.rhythm.target = 1e9;
    config.pitch.target = 1e9;
    let mut reports = Vec::new();
    let mut sink = |r: &GenerationReport| {
        reports.push((r.phase, r.generation));
        if r.phase == Phase::Rhythm && r.generation == 1 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    };
    let out = compose(&reference_melody(), &config, &mut MelosRng::new(5), &mut sink).unwrap();
    assert_eq!(out.rhythm.stop, StopReason::Cancelled);
    assert_eq!(out.rhythm.generations, 2);
    assert!(out.pitch.is_none());
    assert!(out.cancelled());
    assert!(reports.iter().all(|&(phase, _)| phase == Phase::Rhythm));
    assert_eq!(reports.len(), 2);
    assert!(out.melody.ends_on_tonic());
}

#[test]
fn cancelling_the_pitch_phase_keeps_the_best_so_far() {
    let mut config = GaConfig {
        generations: 300,
        ..config()
    };
    config.pitch.target = 1e9;
    let mut pitch_reports = 0;
    let mut sink = |r: &GenerationReport| {
        if r.phase == Phase::Pitch {
            pitch_reports += 1;
            if pitch_reports == 3 {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    };
    let out = compose(&reference_melody(), &config, &mut MelosRng::new(6), &mut sink).unwrap();
    let pitch = out.pitch.as_ref().unwrap();
    assert_eq!(pitch.stop, StopReason::Cancelled);
    assert_eq!(pitch.generations, 3);
    assert!(out.cancelled());
    assert!(out.melody.ends_on_tonic());
}

#[test]
fn three_bar_reference_is_rejected() {
    let mut short = reference_melody();
    short.notes.retain(|n| n.end() <= 3 * 1920);
    let mut sink = |_: &GenerationReport| ControlFlow::Continue(());
    let err = compose(&short, &config(), &mut MelosRng::new(1), &mut sink).unwrap_err();
    assert!(matches!(err, GaError::TooFewBars { found: 3, required: 4 }));
}

#[test]
fn repeated_material_scores_as_perfect_echo() {
    let reference = reference_melody();
    let rhythm = RhythmFeatures::extract(&reference);
    assert!((rhythm.echo - 4.0).abs() < 1e-9, "rhythm echo {}", rhythm.echo);
    let pitch = PitchFeatures::extract(&reference, &PitchWeights::default());
    assert_eq!(pitch.echo, 0.0);
}
