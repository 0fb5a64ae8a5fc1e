// Key and meter settings shared by every track in a run.
//
// A `Key` is a tonic pitch class plus a major or minor scale; it answers
// membership ("is this pitch in key?"), scale-degree order (1 = tonic), and
// in-range pitch enumeration for the random generators and pitch mutations.
//
// `MusicalSettings` fixes the tick grid: ticks per quarter note, the meter,
// and the derived note lengths (whole/half/quarter/eighth, bar). The allowed
// duration set is [half, quarter, eighth] and the eighth is the minimum unit,
// so every generated start and duration is a multiple of it. Meters whose bar
// is not a whole number of half notes are rejected: strong-beat counting,
// tension slots, and the cadential half note all assume that grid.
//
// Used by track.rs for generation and bar splitting, by features.rs for the
// slot grids, and by midi.rs for key/time signature conversion.

use crate::error::{GaError, Result};
use melos_prng::MelosRng;

/// Major or natural minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Major,
    Minor,
}

impl Scale {
    /// Semitone offsets of scale degrees 1-7 from the tonic.
    pub fn offsets(self) -> [u8; 7] {
        match self {
            Scale::Major => [0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => [0, 2, 3, 5, 7, 8, 10],
        }
    }
}

/// A key: tonic pitch class (0 = C) and scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    pub tonic_pc: u8,
    pub scale: Scale,
}

const MAJOR_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];
const MINOR_NAMES: [&str; 12] = [
    "Cm", "C#m", "Dm", "Ebm", "Em", "Fm", "F#m", "Gm", "G#m", "Am", "Bbm", "Bm",
];

impl Key {
    pub fn new(tonic_pc: u8, scale: Scale) -> Self {
        Key {
            tonic_pc: tonic_pc % 12,
            scale,
        }
    }

    pub fn c_major() -> Self {
        Key::new(0, Scale::Major)
    }

    /// Parse names like `C`, `Db`, `F#`, `Am`, `Bbm`.
    pub fn parse(name: &str) -> Result<Self> {
        let unknown = || GaError::UnknownKey(name.to_string());
        let mut chars = name.trim().chars().peekable();
        let letter = chars.next().ok_or_else(unknown)?;
        let base: i16 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(unknown()),
        };
        let accidental = match chars.peek() {
            Some('#') => 1,
            Some('b') => -1,
            _ => 0,
        };
        if accidental != 0 {
            chars.next();
        }
        let scale = match chars.next() {
            None => Scale::Major,
            Some('m') if chars.peek().is_none() => Scale::Minor,
            Some(_) => return Err(unknown()),
        };
        Ok(Key::new((base + accidental).rem_euclid(12) as u8, scale))
    }

    /// Conventional spelling of this key.
    pub fn name(&self) -> &'static str {
        match self.scale {
            Scale::Major => MAJOR_NAMES[self.tonic_pc as usize],
            Scale::Minor => MINOR_NAMES[self.tonic_pc as usize],
        }
    }

    /// Build from a MIDI key signature (`sharps` < 0 means flats).
    pub fn from_key_signature(sharps: i8, minor: bool) -> Self {
        let major_pc = (sharps as i16 * 7).rem_euclid(12) as u8;
        if minor {
            Key::new(major_pc + 9, Scale::Minor)
        } else {
            Key::new(major_pc, Scale::Major)
        }
    }

    /// MIDI key signature: (sharps or negative flats, is_minor).
    pub fn key_signature(&self) -> (i8, bool) {
        let major_pc = match self.scale {
            Scale::Major => self.tonic_pc,
            Scale::Minor => (self.tonic_pc + 3) % 12,
        };
        // Fewest accidentals wins; F#/Gb ties go to sharps.
        let sharps = (-6i8..=6)
            .filter(|s| (*s as i16 * 7).rem_euclid(12) as u8 == major_pc)
            .min_by_key(|s| (s.unsigned_abs(), *s < 0))
            .unwrap_or(0);
        (sharps, self.scale == Scale::Minor)
    }

    fn pitch_class_offset(&self, pitch: u8) -> u8 {
        (pitch % 12 + 12 - self.tonic_pc) % 12
    }

    pub fn contains(&self, pitch: u8) -> bool {
        self.degree(pitch).is_some()
    }

    /// 1-based scale-degree order (1 = tonic), or None if out of key.
    pub fn degree(&self, pitch: u8) -> Option<u8> {
        let offset = self.pitch_class_offset(pitch);
        self.scale
            .offsets()
            .iter()
            .position(|&o| o == offset)
            .map(|d| d as u8 + 1)
    }

    pub fn is_tonic(&self, pitch: u8) -> bool {
        self.degree(pitch) == Some(1)
    }

    /// All in-key pitches in `[low, high]`.
    pub fn pitches_in_range(&self, low: u8, high: u8) -> Vec<u8> {
        (low..=high).filter(|&p| self.contains(p)).collect()
    }

    /// A uniformly random in-key pitch in `[low, high]`.
    pub fn random_pitch(&self, low: u8, high: u8, rng: &mut MelosRng) -> Option<u8> {
        rng.choose(&self.pitches_in_range(low, high)).copied()
    }

    /// A uniformly random tonic in `[low, high]`.
    pub fn random_tonic(&self, low: u8, high: u8, rng: &mut MelosRng) -> Option<u8> {
        let tonics: Vec<u8> = (low..=high).filter(|&p| self.is_tonic(p)).collect();
        rng.choose(&tonics).copied()
    }

    /// The lowest tonic at or above `pitch`.
    pub fn tonic_at_or_above(&self, pitch: u8) -> u8 {
        let up = (self.tonic_pc + 12 - pitch % 12) % 12;
        pitch.saturating_add(up)
    }
}

/// Tick grid, meter, key, and generation defaults for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicalSettings {
    pub key: Key,
    /// Tempo carried through to MIDI output.
    pub bpm: f64,
    /// Velocity given to generated notes.
    pub velocity: u8,
    /// Inclusive pitch range for random pitches.
    pub pitch_low: u8,
    pub pitch_high: u8,
    ticks_per_beat: u16,
    numerator: u8,
    denominator: u8,
}

impl Default for MusicalSettings {
    fn default() -> Self {
        MusicalSettings {
            key: Key::c_major(),
            bpm: 120.0,
            velocity: 64,
            pitch_low: 60,  // C4
            pitch_high: 84, // C6
            ticks_per_beat: 480,
            numerator: 4,
            denominator: 4,
        }
    }
}

impl MusicalSettings {
    /// Validate the meter and tick resolution.
    pub fn new(key: Key, ticks_per_beat: u16, numerator: u8, denominator: u8) -> Result<Self> {
        let reject = |reason| GaError::UnsupportedMeter {
            numerator,
            denominator,
            ticks_per_beat,
            reason,
        };
        if ticks_per_beat == 0 || ticks_per_beat % 2 != 0 {
            return Err(reject("ticks per beat must be a positive even number"));
        }
        if numerator == 0 || denominator == 0 || !denominator.is_power_of_two() {
            return Err(reject("denominator must be a power of two"));
        }
        let whole = 4 * ticks_per_beat as u32;
        if (whole * numerator as u32) % denominator as u32 != 0 {
            return Err(reject("bar is not a whole number of ticks"));
        }
        let bar = whole * numerator as u32 / denominator as u32;
        if bar % (2 * ticks_per_beat as u32) != 0 {
            return Err(reject("bar must be a whole number of half notes"));
        }
        Ok(MusicalSettings {
            key,
            ticks_per_beat,
            numerator,
            denominator,
            ..MusicalSettings::default()
        })
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = key;
        self
    }

    pub fn ticks_per_beat(&self) -> u16 {
        self.ticks_per_beat
    }

    pub fn numerator(&self) -> u8 {
        self.numerator
    }

    pub fn denominator(&self) -> u8 {
        self.denominator
    }

    pub fn whole(&self) -> u32 {
        4 * self.ticks_per_beat as u32
    }

    pub fn half(&self) -> u32 {
        2 * self.ticks_per_beat as u32
    }

    pub fn quarter(&self) -> u32 {
        self.ticks_per_beat as u32
    }

    pub fn eighth(&self) -> u32 {
        self.ticks_per_beat as u32 / 2
    }

    pub fn bar(&self) -> u32 {
        self.whole() * self.numerator as u32 / self.denominator as u32
    }

    /// Allowed note durations, longest first.
    pub fn durations(&self) -> [u32; 3] {
        [self.half(), self.quarter(), self.eighth()]
    }

    /// The shortest schedulable duration.
    pub fn min_unit(&self) -> u32 {
        self.eighth()
    }

    /// Minimum-unit slots in one bar.
    pub fn unit_slots_per_bar(&self) -> usize {
        (self.bar() / self.min_unit()) as usize
    }

    /// Half-note slots in one bar.
    pub fn half_slots_per_bar(&self) -> usize {
        (self.bar() / self.half()) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_key_names() {
        assert_eq!(Key::parse("C").unwrap(), Key::new(0, Scale::Major));
        assert_eq!(Key::parse("Db").unwrap(), Key::new(1, Scale::Major));
        assert_eq!(Key::parse("F#m").unwrap(), Key::new(6, Scale::Minor));
        assert_eq!(Key::parse("Bbm").unwrap(), Key::new(10, Scale::Minor));
        assert_eq!(Key::parse("Cb").unwrap(), Key::new(11, Scale::Major));
        assert!(Key::parse("H").is_err());
        assert!(Key::parse("Cmaj").is_err());
        assert!(Key::parse("").is_err());
    }

    #[test]
    fn degrees_in_c_major_and_a_minor() {
        let c = Key::c_major();
        assert_eq!(c.degree(60), Some(1)); // C4
        assert_eq!(c.degree(62), Some(2)); // D4
        assert_eq!(c.degree(71), Some(7)); // B4
        assert_eq!(c.degree(61), None); // C#4
        let am = Key::parse("Am").unwrap();
        assert_eq!(am.degree(69), Some(1)); // A4
        assert_eq!(am.degree(72), Some(3)); // C5
        assert!(!am.contains(68)); // G#4 is not in natural minor
    }

    #[test]
    fn key_signature_round_trip() {
        for name in ["C", "G", "D", "Db", "F#", "Bb", "Am", "Ebm", "C#m", "Gm"] {
            let key = Key::parse(name).unwrap();
            let (sharps, minor) = key.key_signature();
            assert_eq!(Key::from_key_signature(sharps, minor), key, "{name}");
        }
        assert_eq!(Key::parse("Db").unwrap().key_signature(), (-5, false));
        assert_eq!(Key::parse("Em").unwrap().key_signature(), (1, true));
    }

    #[test]
    fn random_tonic_is_tonic() {
        let key = Key::parse("Eb").unwrap();
        let mut rng = MelosRng::new(5);
        for _ in 0..100 {
            let p = key.random_tonic(60, 84, &mut rng).unwrap();
            assert!(key.is_tonic(p) && (60..=84).contains(&p));
        }
    }

    #[test]
    fn default_tick_grid() {
        let s = MusicalSettings::default();
        assert_eq!(s.bar(), 1920);
        assert_eq!(s.durations(), [960, 480, 240]);
        assert_eq!(s.min_unit(), 240);
        assert_eq!(s.unit_slots_per_bar(), 8);
        assert_eq!(s.half_slots_per_bar(), 2);
    }

    #[test]
    fn meter_validation() {
        let key = Key::c_major();
        assert!(MusicalSettings::new(key, 480, 4, 4).is_ok());
        assert!(MusicalSettings::new(key, 480, 2, 4).is_ok());
        assert_eq!(MusicalSettings::new(key, 480, 2, 2).unwrap().bar(), 1920);
        assert!(MusicalSettings::new(key, 480, 3, 4).is_err());
        assert!(MusicalSettings::new(key, 480, 6, 8).is_err());
        assert!(MusicalSettings::new(key, 481, 4, 4).is_err());
        assert!(MusicalSettings::new(key, 480, 4, 3).is_err());
    }
}
