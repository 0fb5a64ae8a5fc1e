// Notes, tracks, and the bar view: the mutable musical data the GA evolves.
//
// A `Track` is an ordered list of `Note`s (start-time order, kept by the
// generators and operators rather than by sorting) plus an instrument and
// the run's `MusicalSettings`. Rests are gaps between notes; the random
// generators never leave gaps inside a bar.
//
// `split_into_bars` produces one `Bar` per bar window. A note that crosses a
// bar line is cut at every line it crosses; the pieces are flagged
// `tied_out` / `tied_in` so `join_bars` glues them back together. Splitting
// and immediately rejoining reproduces the original notes exactly, which is
// what lets crossover and the bar-copy mutation work bar-by-bar.
//
// Also hosts the random generators (rhythm with a tonic half-note cadence,
// random in-key pitches over a fixed rhythm) and the classic track
// transforms (transpose, inversion, retrograde).

use crate::settings::MusicalSettings;
use melos_prng::MelosRng;

/// Pitch given to rhythm-only notes before the pitch phase assigns real ones.
pub const PLACEHOLDER_PITCH: u8 = 0;

/// A single note. Times are in ticks from the start of the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    /// MIDI pitch number.
    pub pitch: u8,
    pub duration: u32,
    pub start: u32,
    pub velocity: u8,
}

impl Note {
    pub fn new(pitch: u8, duration: u32, start: u32, velocity: u8) -> Self {
        Note {
            pitch,
            duration,
            start,
            velocity,
        }
    }

    pub fn end(&self) -> u32 {
        self.start + self.duration
    }
}

/// The notes of one bar window.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    /// Tick at which this bar begins.
    pub start: u32,
    pub notes: Vec<Note>,
    /// The first note continues a note cut at the previous bar line.
    pub tied_in: bool,
    /// The last note continues across the next bar line.
    pub tied_out: bool,
}

impl Bar {
    fn empty(start: u32) -> Self {
        Bar {
            start,
            notes: Vec::new(),
            tied_in: false,
            tied_out: false,
        }
    }

    /// Move the bar (and its notes) by `delta` ticks.
    pub fn shifted(&self, delta: i64) -> Bar {
        let shift = |t: u32| (t as i64 + delta).max(0) as u32;
        Bar {
            start: shift(self.start),
            notes: self
                .notes
                .iter()
                .map(|n| Note {
                    start: shift(n.start),
                    ..*n
                })
                .collect(),
            tied_in: self.tied_in,
            tied_out: self.tied_out,
        }
    }
}

/// A monophonic line.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub notes: Vec<Note>,
    /// MIDI program number.
    pub instrument: u8,
    pub settings: MusicalSettings,
}

impl Track {
    pub fn new(settings: MusicalSettings, instrument: u8) -> Self {
        Track {
            notes: Vec::new(),
            instrument,
            settings,
        }
    }

    /// Latest note end, or 0 for an empty track.
    pub fn total_length(&self) -> u32 {
        self.notes.iter().map(Note::end).max().unwrap_or(0)
    }

    pub fn bar_count(&self) -> usize {
        self.total_length().div_ceil(self.settings.bar()) as usize
    }

    /// Cut the track into bars, splitting notes at bar lines.
    pub fn split_into_bars(&self) -> Vec<Bar> {
        let bar_len = self.settings.bar();
        let mut bars: Vec<Bar> = (0..self.bar_count())
            .map(|i| Bar::empty(i as u32 * bar_len))
            .collect();

        for note in &self.notes {
            let mut piece = *note;
            loop {
                let idx = (piece.start / bar_len) as usize;
                while bars.len() <= idx {
                    bars.push(Bar::empty(bars.len() as u32 * bar_len));
                }
                let line = (idx as u32 + 1) * bar_len;
                if piece.end() <= line {
                    bars[idx].notes.push(piece);
                    break;
                }
                let end = piece.end();
                bars[idx].notes.push(Note {
                    duration: line - piece.start,
                    ..piece
                });
                bars[idx].tied_out = true;
                if bars.len() <= idx + 1 {
                    bars.push(Bar::empty(line));
                }
                bars[idx + 1].tied_in = true;
                piece.start = line;
                piece.duration = end - line;
            }
        }
        bars
    }

    /// Replace this track's notes with the concatenation of `bars`, merging
    /// pieces that were cut at a bar line.
    pub fn join_bars(&mut self, bars: Vec<Bar>) {
        let mut notes: Vec<Note> = Vec::new();
        let mut previous_tied_out = false;
        for bar in bars {
            let mut pieces = bar.notes.into_iter().peekable();
            let rejoin = bar.tied_in && previous_tied_out;
            match (notes.last_mut(), pieces.peek().copied()) {
                (Some(last), Some(first))
                    if rejoin && last.end() == first.start && last.pitch == first.pitch =>
                {
                    last.duration += first.duration;
                    pieces.next();
                }
                _ => {}
            }
            notes.extend(pieces);
            previous_tied_out = bar.tied_out;
        }
        self.notes = notes;
    }

    /// A random rhythm of `bar_count` full bars ending on a tonic half note.
    ///
    /// Every note but the last carries `PLACEHOLDER_PITCH`.
    pub fn random_rhythm(
        settings: MusicalSettings,
        bar_count: usize,
        max_draws: usize,
        rng: &mut MelosRng,
    ) -> Track {
        let mut track = Track::new(settings, 0);
        if bar_count == 0 {
            return track;
        }
        let bar = settings.bar();
        for i in 0..bar_count - 1 {
            track.fill_span(i as u32 * bar, bar, max_draws, rng);
        }
        let last_bar = (bar_count as u32 - 1) * bar;
        let cadence = settings.half();
        track.fill_span(last_bar, bar - cadence, max_draws, rng);
        let tonic = cadence_pitch(&settings, rng);
        track.notes.push(Note::new(
            tonic,
            cadence,
            last_bar + bar - cadence,
            settings.velocity,
        ));
        track
    }

    /// Pack `[start, start + length)` with random allowed durations.
    ///
    /// Draws that overflow are retried up to `max_draws` times, after which
    /// the longest allowed duration that fits is placed.
    fn fill_span(&mut self, start: u32, length: u32, max_draws: usize, rng: &mut MelosRng) {
        let durations = self.settings.durations();
        let mut remaining = length;
        let mut misses = 0;
        while remaining > 0 {
            let drawn = durations[rng.range_usize(0, durations.len())];
            let duration = if drawn <= remaining {
                drawn
            } else {
                misses += 1;
                if misses < max_draws {
                    continue;
                }
                durations
                    .iter()
                    .copied()
                    .find(|&d| d <= remaining)
                    .unwrap_or(remaining)
            };
            misses = 0;
            self.notes.push(Note::new(
                PLACEHOLDER_PITCH,
                duration,
                start + length - remaining,
                self.settings.velocity,
            ));
            remaining -= duration;
        }
    }

    /// Give every note a random in-key pitch, then end on a tonic.
    pub fn assign_random_pitches(&mut self, rng: &mut MelosRng) {
        let s = self.settings;
        for note in &mut self.notes {
            if let Some(pitch) = s.key.random_pitch(s.pitch_low, s.pitch_high, rng) {
                note.pitch = pitch;
            }
        }
        self.force_tonic_ending(rng);
    }

    /// Re-pitch the final note to a tonic if it is not one already.
    pub fn force_tonic_ending(&mut self, rng: &mut MelosRng) {
        let s = self.settings;
        let last = self.notes.last_mut().filter(|n| !s.key.is_tonic(n.pitch));
        if let Some(last) = last {
            last.pitch = cadence_pitch(&s, rng);
        }
    }

    pub fn ends_on_tonic(&self) -> bool {
        self.notes
            .last()
            .is_some_and(|n| self.settings.key.is_tonic(n.pitch))
    }

    pub fn transpose(&mut self, semitones: i16) {
        for note in &mut self.notes {
            note.pitch = (note.pitch as i16 + semitones).clamp(0, 127) as u8;
        }
    }

    /// Mirror every pitch around `center`.
    pub fn invert(&mut self, center: u8) {
        for note in &mut self.notes {
            note.pitch = (2 * center as i16 - note.pitch as i16).clamp(0, 127) as u8;
        }
    }

    /// Play the track backwards.
    pub fn retrograde(&mut self) {
        let total = self.total_length();
        for note in &mut self.notes {
            note.start = total - note.end();
        }
        self.notes.reverse();
    }

    /// One line per track: bars separated by `|`, each note as its name
    /// followed by one `-` per extra minimum unit it is held.
    pub fn summary(&self) -> String {
        let unit = self.settings.min_unit().max(1);
        let bars = self.split_into_bars();
        let mut out = String::new();
        for (i, bar) in bars.iter().enumerate() {
            if i > 0 {
                out.push_str(" |");
            }
            for note in &bar.notes {
                out.push(' ');
                if note.pitch == PLACEHOLDER_PITCH {
                    out.push('x');
                } else {
                    out.push_str(&pitch_name(note.pitch));
                }
                for _ in 1..(note.duration / unit) {
                    out.push('-');
                }
            }
        }
        out.trim_start().to_string()
    }
}

fn cadence_pitch(settings: &MusicalSettings, rng: &mut MelosRng) -> u8 {
    settings
        .key
        .random_tonic(settings.pitch_low, settings.pitch_high, rng)
        .unwrap_or_else(|| settings.key.tonic_at_or_above(settings.pitch_low))
}

/// Note name with octave, 60 = "C4".
pub fn pitch_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
    ];
    let octave = pitch as i16 / 12 - 1;
    format!("{}{}", NAMES[(pitch % 12) as usize], octave)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Key;

    fn settings() -> MusicalSettings {
        MusicalSettings::default()
    }

    fn track_of(notes: &[(u8, u32, u32)]) -> Track {
        let mut t = Track::new(settings(), 0);
        t.notes = notes
            .iter()
            .map(|&(p, d, s)| Note::new(p, d, s, 64))
            .collect();
        t
    }

    #[test]
    fn length_and_bar_count() {
        let t = track_of(&[(60, 960, 0), (62, 960, 960), (64, 480, 1920)]);
        assert_eq!(t.total_length(), 2400);
        assert_eq!(t.bar_count(), 2);
        assert_eq!(Track::new(settings(), 0).bar_count(), 0);
    }

    #[test]
    fn split_keeps_bar_local_notes() {
        let t = track_of(&[(60, 960, 0), (62, 960, 960), (64, 1920, 1920)]);
        let bars = t.split_into_bars();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].notes.len(), 2);
        assert_eq!(bars[1].start, 1920);
        assert!(!bars[0].tied_out && !bars[1].tied_in);
    }

    #[test]
    fn straddling_note_is_cut_and_rejoined() {
        // A half note starting on beat 4 of bar 0 crosses into bar 1.
        let t = track_of(&[(60, 1440, 0), (67, 960, 1440), (65, 1440, 2400)]);
        let bars = t.split_into_bars();
        assert_eq!(bars[0].notes.last().unwrap().duration, 480);
        assert_eq!(bars[1].notes[0].start, 1920);
        assert_eq!(bars[1].notes[0].duration, 480);
        assert!(bars[0].tied_out && bars[1].tied_in);

        let mut joined = t.clone();
        joined.join_bars(bars);
        assert_eq!(joined, t);
    }

    #[test]
    fn note_spanning_several_bars_round_trips() {
        let t = track_of(&[(60, 480, 0), (72, 4800, 480)]);
        let bars = t.split_into_bars();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[1].notes.len(), 1);
        assert!(bars[1].tied_in && bars[1].tied_out);
        let mut joined = t.clone();
        joined.join_bars(bars);
        assert_eq!(joined.notes, t.notes);
    }

    #[test]
    fn random_rhythm_round_trips_through_bars() {
        let mut rng = MelosRng::new(11);
        for bars in 1..=8 {
            let t = Track::random_rhythm(settings(), bars, 32, &mut rng);
            let mut joined = t.clone();
            joined.join_bars(t.split_into_bars());
            assert_eq!(joined, t);
        }
    }

    #[test]
    fn random_rhythm_fills_every_bar_exactly() {
        let s = settings();
        let mut rng = MelosRng::new(2024);
        for bar_count in [1, 4, 8, 12] {
            for _ in 0..20 {
                let t = Track::random_rhythm(s, bar_count, 32, &mut rng);
                assert_eq!(t.bar_count(), bar_count);
                for bar in t.split_into_bars() {
                    let mut cursor = bar.start;
                    for note in &bar.notes {
                        assert_eq!(note.start, cursor, "gap or overlap in bar at {}", bar.start);
                        assert!(s.durations().contains(&note.duration));
                        cursor = note.end();
                    }
                    assert_eq!(cursor, bar.start + s.bar());
                    assert!(!bar.tied_in && !bar.tied_out);
                }
            }
        }
    }

    #[test]
    fn random_rhythm_ends_with_tonic_half_note() {
        let s = settings().with_key(Key::parse("Db").unwrap());
        let mut rng = MelosRng::new(3);
        let t = Track::random_rhythm(s, 4, 32, &mut rng);
        let last = t.notes.last().unwrap();
        assert_eq!(last.duration, s.half());
        assert_eq!(last.end(), 4 * s.bar());
        assert!(t.ends_on_tonic());
        assert!(t.notes[..t.notes.len() - 1]
            .iter()
            .all(|n| n.pitch == PLACEHOLDER_PITCH));
    }

    #[test]
    fn zero_draw_cap_still_terminates() {
        let mut rng = MelosRng::new(8);
        let t = Track::random_rhythm(settings(), 4, 0, &mut rng);
        assert_eq!(t.bar_count(), 4);
        assert_eq!(t.notes.iter().map(|n| n.duration).sum::<u32>(), 4 * 1920);
    }

    #[test]
    fn random_pitches_stay_in_key_and_range() {
        let s = settings().with_key(Key::parse("F#m").unwrap());
        let mut rng = MelosRng::new(17);
        let mut t = Track::random_rhythm(s, 4, 32, &mut rng);
        t.assign_random_pitches(&mut rng);
        for n in &t.notes {
            assert!(s.key.contains(n.pitch));
            assert!((s.pitch_low..=s.pitch_high).contains(&n.pitch));
        }
        assert!(t.ends_on_tonic());
    }

    #[test]
    fn transforms() {
        let mut t = track_of(&[(60, 480, 0), (64, 960, 480), (67, 480, 1440)]);
        let original = t.clone();

        t.transpose(2);
        assert_eq!(t.notes.iter().map(|n| n.pitch).collect::<Vec<_>>(), [62, 66, 69]);
        t.transpose(-2);

        t.invert(64);
        assert_eq!(t.notes.iter().map(|n| n.pitch).collect::<Vec<_>>(), [68, 64, 61]);
        t.invert(64);
        assert_eq!(t, original);

        t.retrograde();
        assert_eq!(t.notes[0].pitch, 67);
        assert_eq!(t.notes[0].start, 0);
        assert_eq!(t.notes[1].start, 480);
        t.retrograde();
        assert_eq!(t, original);
    }

    #[test]
    fn summary_and_names() {
        assert_eq!(pitch_name(60), "C4");
        assert_eq!(pitch_name(70), "Bb4");
        let t = track_of(&[(60, 960, 0), (62, 480, 960), (64, 480, 1440), (0, 1920, 1920)]);
        assert_eq!(t.summary(), "C4--- D4- E4- | x-------");
    }
}
