// Feature extraction: the numeric summaries the fitness functions score.
//
// `RhythmFeatures` looks only at onsets and durations; `PitchFeatures` looks
// at pitches over a fixed rhythm. Both are pure functions of a track and are
// recomputed on every evaluation. The reference melody's `PitchFeatures`
// become the target profile of the pitch phase (see fitness.rs).
//
// Bar-local features are computed on the bar view (notes cut at bar lines),
// whole-track features (discontinuity, tension, melody curve) on the note
// list itself. Echo features compare bars 0/2 and 1/3 of every complete
// group of four bars; a trailing partial group is ignored.

use crate::config::PitchWeights;
use crate::track::{Bar, Note, Track};

/// Rhythm summary of one track.
#[derive(Debug, Clone, PartialEq)]
pub struct RhythmFeatures {
    pub bars: usize,
    /// Notes starting on the half-note grid.
    pub strong_beats: usize,
    /// Per bar, the share of notes that are off the strong grid and also off
    /// their own duration grid; summed over bars.
    pub misalignment: f64,
    /// Onset coincidence of echo bar pairs.
    pub echo: f64,
    /// 1 per note of at least a half, 0.15 per other note of at least a
    /// quarter.
    pub long_notes: f64,
    /// Adjacent notes whose durations differ by a half minus an eighth.
    pub discontinuity: usize,
}

impl RhythmFeatures {
    pub fn extract(track: &Track) -> Self {
        let s = &track.settings;
        let half = s.half();
        let quarter = s.quarter();
        let bars = track.split_into_bars();

        let mut strong_beats = 0;
        let mut misalignment = 0.0;
        let mut long_notes = 0.0;
        for bar in &bars {
            let mut misaligned = 0usize;
            for note in &bar.notes {
                if note.start % half == 0 {
                    strong_beats += 1;
                } else if note.duration > 0 && note.start % note.duration != 0 {
                    misaligned += 1;
                }
                if note.duration >= half {
                    long_notes += 1.0;
                } else if note.duration >= quarter {
                    long_notes += 0.15;
                }
            }
            if !bar.notes.is_empty() {
                misalignment += misaligned as f64 / bar.notes.len() as f64;
            }
        }

        let gap = half - s.eighth();
        let discontinuity = track
            .notes
            .windows(2)
            .filter(|w| w[0].duration.abs_diff(w[1].duration) == gap)
            .count();

        let bar_len = s.bar();
        RhythmFeatures {
            bars: bars.len(),
            strong_beats,
            misalignment,
            echo: echo_sum(&bars, |a, b| onset_similarity(a, b, bar_len)),
            long_notes,
            discontinuity,
        }
    }
}

/// `same² / (|a|·|b|)` where `same` counts note pairs whose onsets sit at the
/// same position within their bars. Empty bars score 0.
pub fn onset_similarity(a: &Bar, b: &Bar, bar_len: u32) -> f64 {
    if a.notes.is_empty() || b.notes.is_empty() {
        return 0.0;
    }
    let mut same = 0usize;
    for x in &a.notes {
        for y in &b.notes {
            if x.start.abs_diff(y.start) % bar_len == 0 {
                same += 1;
            }
        }
    }
    (same * same) as f64 / (a.notes.len() * b.notes.len()) as f64
}

/// `f(b0, b2) + f(b1, b3)` summed over every complete group of four bars.
fn echo_sum(bars: &[Bar], f: impl Fn(&Bar, &Bar) -> f64) -> f64 {
    (0..bars.len() / 4)
        .map(|g| {
            let b = 4 * g;
            f(&bars[b], &bars[b + 2]) + f(&bars[b + 1], &bars[b + 3])
        })
        .sum()
}

/// Pitch summary of one track.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchFeatures {
    pub bars: usize,
    /// Per bar, mean scaled interval size (including the step in from the
    /// previous bar).
    pub interval_means: Vec<f64>,
    /// Smooth three-note motion reward minus leap-and-reverse penalties.
    pub three_note: f64,
    /// One tension value per half-note slot.
    pub tension: Vec<f64>,
    /// Summed interval-shape distance of echo bar pairs; 0 means identical.
    pub echo: f64,
    /// Mean-centred active pitch per minimum-unit slot.
    pub curve: Vec<f64>,
}

impl PitchFeatures {
    pub fn extract(track: &Track, weights: &PitchWeights) -> Self {
        let bars = track.split_into_bars();
        PitchFeatures {
            bars: bars.len(),
            interval_means: interval_means(&bars, weights.interval_divisor),
            three_note: three_note_score(&bars, weights),
            tension: tension_sequence(track, bars.len(), weights),
            echo: echo_sum(&bars, |a, b| interval_shape_distance(track, a, b)),
            curve: melody_curve(track, bars.len()),
        }
    }
}

fn step(a: &Note, b: &Note) -> i32 {
    b.pitch as i32 - a.pitch as i32
}

fn interval_means(bars: &[Bar], divisor: f64) -> Vec<f64> {
    let mut means = Vec::with_capacity(bars.len());
    let mut previous_last: Option<Note> = None;
    for bar in bars {
        let mut values: Vec<f64> = bar
            .notes
            .windows(2)
            .map(|w| step(&w[0], &w[1]).unsigned_abs() as f64 / divisor)
            .collect();
        if let (Some(prev), Some(first)) = (previous_last, bar.notes.first()) {
            values.push(step(&prev, first).unsigned_abs() as f64 / divisor);
        }
        means.push(if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        });
        previous_last = bar.notes.last().copied();
    }
    means
}

fn three_note_score(bars: &[Bar], w: &PitchWeights) -> f64 {
    let mut total = 0.0;
    for bar in bars {
        if bar.notes.len() <= 2 {
            continue;
        }
        let mut score = 0.0;
        for t in bar.notes.windows(3) {
            let d1 = step(&t[0], &t[1]);
            let d2 = step(&t[1], &t[2]);
            if d1.abs() <= w.step_bound && d2.abs() <= w.step_bound && d1 * d2 >= 0 {
                score += 1.0;
            } else if d1 * d2 < -w.harsh_product {
                score -= w.harsh_penalty;
            }
        }
        total += score / (bar.notes.len() - 2) as f64;
    }
    total
}

fn tension_sequence(track: &Track, bar_count: usize, w: &PitchWeights) -> Vec<f64> {
    let s = &track.settings;
    let half = s.half();
    let mut tension = vec![w.tension_default; bar_count * s.half_slots_per_bar()];
    for note in &track.notes {
        if note.start % half != 0 {
            continue;
        }
        let slot = (note.start / half) as usize;
        if let Some(t) = tension.get_mut(slot) {
            *t = s
                .key
                .degree(note.pitch)
                .map_or(w.tension_default, |d| w.tension_by_degree[d as usize - 1]);
        }
    }
    tension
}

/// Mean absolute difference of the per-slot interval arrays of two bars.
/// A note's slot holds the step down to the next note in the same bar.
fn interval_shape_distance(track: &Track, a: &Bar, b: &Bar) -> f64 {
    let slots = track.settings.unit_slots_per_bar();
    if slots == 0 {
        return 0.0;
    }
    let x = interval_shape(a, track.settings.min_unit(), slots);
    let y = interval_shape(b, track.settings.min_unit(), slots);
    let total: i32 = x.iter().zip(&y).map(|(p, q)| (p - q).abs()).sum();
    total as f64 / slots as f64
}

fn interval_shape(bar: &Bar, unit: u32, slots: usize) -> Vec<i32> {
    let mut shape = vec![0; slots];
    for w in bar.notes.windows(2) {
        let slot = ((w[0].start - bar.start) / unit) as usize;
        if let Some(v) = shape.get_mut(slot) {
            *v = -step(&w[0], &w[1]);
        }
    }
    shape
}

fn melody_curve(track: &Track, bar_count: usize) -> Vec<f64> {
    let unit = track.settings.min_unit();
    let mut curve = vec![0.0; bar_count * track.settings.unit_slots_per_bar()];
    for note in &track.notes {
        let first = (note.start / unit) as usize;
        let count = (note.duration / unit) as usize;
        for v in curve.iter_mut().skip(first).take(count) {
            *v = note.pitch as f64;
        }
    }
    if !curve.is_empty() {
        let mean = curve.iter().sum::<f64>() / curve.len() as f64;
        for v in &mut curve {
            *v -= mean;
        }
    }
    curve
}

/// Pearson correlation over the common prefix of `a` and `b`. Zero variance
/// on either side, or fewer than two samples, yields 0.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}
