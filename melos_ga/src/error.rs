// Error taxonomy for the genetic melody engine.
//
// Only rejected input surfaces here: a reference that is too short or empty,
// a configuration outside its documented ranges, and the I/O collaborators
// (MIDI files, JSON config). Degenerate mutations are silent no-ops inside
// operators.rs and never become errors; zero-variance correlation is
// normalized inside fitness.rs.

use thiserror::Error;

/// Everything that can reject a run before the first generation, or fail in
/// the file collaborators around it.
#[derive(Debug, Error)]
pub enum GaError {
    /// Echo features compare bars 0/2 and 1/3 of a 4-bar group, so fewer
    /// bars leave nothing to compare.
    #[error("track has {found} bar(s); at least {required} are needed for echo features")]
    TooFewBars { found: usize, required: usize },

    #[error("reference track contains no notes")]
    EmptyReference,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown key name `{0}` (expected e.g. `C`, `Db`, `F#m`)")]
    UnknownKey(String),

    #[error("unsupported meter {numerator}/{denominator} at {ticks_per_beat} ticks per beat: {reason}")]
    UnsupportedMeter {
        numerator: u8,
        denominator: u8,
        ticks_per_beat: u16,
        reason: &'static str,
    },

    #[error("invalid MIDI file: {0}")]
    InvalidMidi(String),

    #[error("MIDI file contains no track with notes")]
    NoMelodyTrack,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MIDI error: {0}")]
    Midi(#[from] midly::Error),

    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = GaError> = std::result::Result<T, E>;
