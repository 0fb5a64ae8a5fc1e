// Genetic operators: bar crossover and the rhythm and pitch mutation sets.
//
// Every operator edits a track in place and returns whether it changed
// anything. Operators that draw a position they cannot act on (a split of a
// minimal note, a swap across a bar line, a merge into a downbeat, a track
// too short to hold the position) are silent no-ops.
//
// No operator moves, resizes, or re-pitches the final note: the tonic
// half-note cadence placed by the random generators survives both phases.
//
// Rhythm operators:
// 1. swap the durations of two adjacent notes in the same bar
// 2. split a note into a head and a shorter allowed-duration tail
// 3. merge a note with its successor unless the successor is on a downbeat
// 4. copy bar i onto bar i-2
//
// Pitch operators:
// 1. pull every leap beyond an octave back by an octave
// 2. give a random note a random in-key pitch
// 3. swap the pitches of two adjacent notes
// 4. re-pitch the first short note that leaps away from its successor

use crate::config::{PitchMutationWeights, RhythmMutationWeights};
use crate::evolution::{CrossoverFn, MutationSet};
use crate::track::{Note, Track};
use melos_prng::MelosRng;

/// One-point crossover at an even bar index.
#[derive(Debug, Clone, Copy, Default)]
pub struct BarCrossover;

impl CrossoverFn for BarCrossover {
    fn cross(&self, a: &Track, b: &Track, rng: &mut MelosRng) -> Track {
        let bars_a = a.split_into_bars();
        let bars_b = b.split_into_bars();
        let pairs = bars_a.len() / 2;
        let cut = if pairs == 0 {
            0
        } else {
            2 * rng.range_usize(0, pairs)
        };
        let bars = bars_a
            .into_iter()
            .take(cut)
            .chain(bars_b.into_iter().skip(cut))
            .collect();
        let mut child = a.clone();
        child.join_bars(bars);
        child
    }
}

#[derive(Debug, Clone)]
pub struct RhythmMutations {
    pub weights: RhythmMutationWeights,
}

impl MutationSet for RhythmMutations {
    fn mutate(&self, track: &mut Track, rng: &mut MelosRng) -> bool {
        match rng.pick_weighted(&self.weights.as_array()) {
            Some(0) => swap_durations(track, rng),
            Some(1) => split_note(track, rng),
            Some(2) => merge_notes(track, rng),
            Some(3) => copy_bar(track, rng),
            _ => false,
        }
    }
}

/// Swap the durations of a random note and its successor, keeping the pair's
/// span. Never touches the final note.
pub fn swap_durations(track: &mut Track, rng: &mut MelosRng) -> bool {
    let n = track.notes.len();
    if n < 3 {
        return false;
    }
    let idx = rng.range_usize(0, n - 2);
    let bar = track.settings.bar();
    let (first, second) = (track.notes[idx], track.notes[idx + 1]);
    if first.start / bar != second.start / bar || first.duration == second.duration {
        return false;
    }
    let end = second.end();
    track.notes[idx].duration = second.duration;
    track.notes[idx + 1].duration = first.duration;
    track.notes[idx + 1].start = end - first.duration;
    true
}

/// Split a random non-final note; the tail takes a uniformly chosen allowed
/// duration shorter than the note.
pub fn split_note(track: &mut Track, rng: &mut MelosRng) -> bool {
    let n = track.notes.len();
    if n < 2 {
        return false;
    }
    let idx = rng.range_usize(0, n - 1);
    let note = track.notes[idx];
    if note.duration <= track.settings.min_unit() {
        return false;
    }
    let shorter: Vec<u32> = track
        .settings
        .durations()
        .into_iter()
        .filter(|&d| d < note.duration)
        .collect();
    let Some(&tail) = rng.choose(&shorter) else {
        return false;
    };
    track.notes[idx].duration -= tail;
    track
        .notes
        .insert(idx + 1, Note::new(note.pitch, tail, note.end() - tail, note.velocity));
    true
}

/// Merge a random note with its successor unless the successor starts a bar.
/// The successor is never the final note.
pub fn merge_notes(track: &mut Track, rng: &mut MelosRng) -> bool {
    let n = track.notes.len();
    if n < 3 {
        return false;
    }
    let idx = rng.range_usize(0, n - 2);
    let next = track.notes[idx + 1];
    if next.start % track.settings.bar() == 0 {
        return false;
    }
    let note = &mut track.notes[idx];
    note.duration = next.end() - note.start;
    track.notes.remove(idx + 1);
    true
}

/// Overwrite bar `i - 2` with a copy of bar `i`, for a random `i >= 2`.
pub fn copy_bar(track: &mut Track, rng: &mut MelosRng) -> bool {
    let bar_count = track.bar_count();
    if bar_count < 3 {
        return false;
    }
    let idx = rng.range_usize(2, bar_count);
    let mut bars = track.split_into_bars();
    let copy = bars[idx].shifted(-2 * track.settings.bar() as i64);
    if copy.notes == bars[idx - 2].notes {
        return false;
    }
    bars[idx - 2] = copy;
    track.join_bars(bars);
    true
}

#[derive(Debug, Clone)]
pub struct PitchMutations {
    pub weights: PitchMutationWeights,
}

impl MutationSet for PitchMutations {
    fn mutate(&self, track: &mut Track, rng: &mut MelosRng) -> bool {
        match rng.pick_weighted(&self.weights.as_array()) {
            Some(0) => octave_clamp(track),
            Some(1) => random_pitch(track, rng),
            Some(2) => swap_pitches(track, rng),
            Some(3) => smooth_leap(track, self.weights.leap_threshold, rng),
            _ => false,
        }
    }
}

/// Left to right, move each note an octave toward its successor when they
/// are more than an octave apart.
pub fn octave_clamp(track: &mut Track) -> bool {
    let mut changed = false;
    for i in 0..track.notes.len().saturating_sub(1) {
        let here = track.notes[i].pitch as i16;
        let next = track.notes[i + 1].pitch as i16;
        let moved = if next - here > 12 {
            here + 12
        } else if next - here < -12 {
            here - 12
        } else {
            continue;
        };
        track.notes[i].pitch = moved.clamp(0, 127) as u8;
        changed = true;
    }
    changed
}

/// Re-pitch a random non-final note to a random in-key pitch in range.
pub fn random_pitch(track: &mut Track, rng: &mut MelosRng) -> bool {
    let n = track.notes.len();
    if n < 2 {
        return false;
    }
    let idx = rng.range_usize(0, n - 1);
    let s = track.settings;
    match s.key.random_pitch(s.pitch_low, s.pitch_high, rng) {
        Some(p) if p != track.notes[idx].pitch => {
            track.notes[idx].pitch = p;
            true
        }
        _ => false,
    }
}

/// Swap the pitches of two adjacent non-final notes.
pub fn swap_pitches(track: &mut Track, rng: &mut MelosRng) -> bool {
    let n = track.notes.len();
    if n < 3 {
        return false;
    }
    let idx = rng.range_usize(1, n - 1);
    let (a, b) = (track.notes[idx - 1].pitch, track.notes[idx].pitch);
    if a == b {
        return false;
    }
    track.notes[idx - 1].pitch = b;
    track.notes[idx].pitch = a;
    true
}

/// Find the first note of at most an eighth that is more than `threshold`
/// semitones from its successor, and re-pitch it to an in-key pitch within
/// `threshold` of the successor.
pub fn smooth_leap(track: &mut Track, threshold: u8, rng: &mut MelosRng) -> bool {
    let short = track.settings.eighth();
    let key = track.settings.key;
    for i in 0..track.notes.len().saturating_sub(1) {
        let note = track.notes[i];
        let next = track.notes[i + 1].pitch;
        if note.duration > short || note.pitch.abs_diff(next) <= threshold {
            continue;
        }
        let low = next.saturating_sub(threshold);
        let high = next.saturating_add(threshold).min(127);
        return match key.random_pitch(low, high, rng) {
            Some(p) => {
                track.notes[i].pitch = p;
                true
            }
            None => false,
        };
    }
    false
}
