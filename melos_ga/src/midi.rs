// MIDI file input and output.
//
// Reading turns a Standard MIDI File into `MusicalSettings` (tick
// resolution, tempo, time signature, key signature) plus one `Track` per
// file track that contains notes. Note-on/note-off pairs become `Note`s; a
// note-on with velocity 0 counts as a note-off, and a program change sets
// the track's instrument. Tracks without notes (tempo maps, meta-only
// tracks) are skipped, so the first returned track is the melody.
//
// Writing produces SMF Format 1: a conductor track with tempo, time
// signature and key signature, then one track per `Track`. Events are
// sorted by tick with note-offs before note-ons at the same tick so that
// repeated pitches retrigger cleanly.
//
// Uses the `midly` crate for both directions.

use crate::error::{GaError, Result};
use crate::settings::{Key, MusicalSettings};
use crate::track::{Note, Track};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Largest tempo value a set-tempo event can hold (about 3.58 bpm).
const MAX_US_PER_BEAT: u32 = 0xFF_FFFF;

/// Channels assigned to output tracks in order, skipping the GM drum channel.
const CHANNELS: [u8; 15] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15];

/// The musical content of one MIDI file.
#[derive(Debug, Clone)]
pub struct MidiSong {
    pub settings: MusicalSettings,
    pub tracks: Vec<Track>,
}

impl MidiSong {
    /// The first track with notes.
    pub fn melody(&self) -> Result<&Track> {
        self.tracks.first().ok_or(GaError::NoMelodyTrack)
    }

    /// The second track with notes, if any.
    pub fn accompaniment(&self) -> Option<&Track> {
        self.tracks.get(1)
    }
}

pub fn read_midi(path: &Path) -> Result<MidiSong> {
    let bytes = std::fs::read(path)?;
    parse_midi(&bytes)
}

/// Decode an in-memory Standard MIDI File.
pub fn parse_midi(bytes: &[u8]) -> Result<MidiSong> {
    let smf = Smf::parse(bytes)?;
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(..) => {
            return Err(GaError::InvalidMidi(
                "timecode (SMPTE) timing is not supported; expected ticks per beat".into(),
            ));
        }
    };

    let mut tempo: Option<u32> = None;
    let mut meter: Option<(u8, u8)> = None;
    let mut key: Option<Key> = None;
    for event in smf.tracks.iter().flatten() {
        if let TrackEventKind::Meta(meta) = event.kind {
            match meta {
                MetaMessage::Tempo(us) if tempo.is_none() => tempo = Some(us.as_int()),
                MetaMessage::TimeSignature(num, pow, _, _) if meter.is_none() => {
                    meter = Some((num, 1u8.checked_shl(pow as u32).unwrap_or(0)));
                }
                MetaMessage::KeySignature(sharps, minor) if key.is_none() => {
                    key = Some(Key::from_key_signature(sharps, minor));
                }
                _ => {}
            }
        }
    }

    let (numerator, denominator) = meter.unwrap_or((4, 4));
    let mut settings = MusicalSettings::new(
        key.unwrap_or_else(Key::c_major),
        ticks_per_beat,
        numerator,
        denominator,
    )?;
    if let Some(us) = tempo.filter(|&us| us > 0) {
        settings.bpm = 60_000_000.0 / us as f64;
    }

    let tracks: Vec<Track> = smf
        .tracks
        .iter()
        .map(|events| collect_notes(events, settings))
        .filter(|t| !t.notes.is_empty())
        .collect();
    if tracks.is_empty() {
        return Err(GaError::NoMelodyTrack);
    }
    log::debug!(
        "parsed MIDI: {} note track(s), {}/{} at {} ticks per beat, {} bpm, key {}",
        tracks.len(),
        numerator,
        denominator,
        ticks_per_beat,
        settings.bpm,
        settings.key.name()
    );
    Ok(MidiSong { settings, tracks })
}

fn collect_notes(events: &[TrackEvent], settings: MusicalSettings) -> Track {
    let mut track = Track::new(settings, 0);
    let mut sounding: [Option<(u32, u8)>; 128] = [None; 128];
    let mut tick = 0u32;
    for event in events {
        tick += event.delta.as_int();
        let TrackEventKind::Midi { message, .. } = event.kind else {
            continue;
        };
        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                let pitch = key.as_int();
                // Re-striking a sounding pitch ends the earlier note.
                if let Some((start, velocity)) = sounding[pitch as usize].take() {
                    track.notes.push(Note::new(pitch, tick - start, start, velocity));
                }
                sounding[pitch as usize] = Some((tick, vel.as_int()));
            }
            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                let pitch = key.as_int();
                if let Some((start, velocity)) = sounding[pitch as usize].take() {
                    track.notes.push(Note::new(pitch, tick - start, start, velocity));
                }
            }
            MidiMessage::ProgramChange { program } => track.instrument = program.as_int(),
            _ => {}
        }
    }
    track.notes.retain(|n| n.duration > 0);
    track.notes.sort_by_key(|n| (n.start, n.pitch));
    track
}

pub fn write_midi(tracks: &[Track], path: &Path) -> Result<()> {
    std::fs::write(path, encode_midi(tracks)?)?;
    Ok(())
}

/// Encode tracks as an in-memory SMF. Tempo, meter and key come from the
/// first track's settings.
pub fn encode_midi(tracks: &[Track]) -> Result<Vec<u8>> {
    let smf = tracks_to_smf(tracks);
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    Ok(buf)
}

fn tracks_to_smf(tracks: &[Track]) -> Smf<'static> {
    let settings = tracks
        .first()
        .map(|t| t.settings)
        .unwrap_or_default();
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(settings.ticks_per_beat())),
    ));
    smf.tracks.push(conductor_track(&settings));
    for (i, track) in tracks.iter().enumerate() {
        let channel = u4::new(CHANNELS[i % CHANNELS.len()]);
        smf.tracks.push(note_track(track, channel));
    }
    smf
}

fn conductor_track(settings: &MusicalSettings) -> midly::Track<'static> {
    let us_per_beat = (60_000_000.0 / settings.bpm.max(f64::MIN_POSITIVE))
        .round()
        .clamp(1.0, MAX_US_PER_BEAT as f64) as u32;
    let (sharps, minor) = settings.key.key_signature();
    let meta = [
        MetaMessage::Tempo(u24::new(us_per_beat)),
        MetaMessage::TimeSignature(
            settings.numerator(),
            settings.denominator().trailing_zeros() as u8,
            24,
            8,
        ),
        MetaMessage::KeySignature(sharps, minor),
        MetaMessage::EndOfTrack,
    ];
    meta.into_iter()
        .map(|m| TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(m),
        })
        .collect()
}

fn note_track(track: &Track, channel: u4) -> midly::Track<'static> {
    // (tick, note-on?, message): false sorts before true, so offs lead.
    let mut timed: Vec<(u32, bool, MidiMessage)> = Vec::with_capacity(track.notes.len() * 2);
    for note in &track.notes {
        let key = u7::new(note.pitch.min(127));
        timed.push((
            note.start,
            true,
            MidiMessage::NoteOn {
                key,
                vel: u7::new(note.velocity.clamp(1, 127)),
            },
        ));
        timed.push((
            note.end(),
            false,
            MidiMessage::NoteOff {
                key,
                vel: u7::new(0),
            },
        ));
    }
    timed.sort_by_key(|&(tick, on, _)| (tick, on));

    let mut events = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(track.instrument.min(127)),
            },
        },
    }];
    let mut last = 0u32;
    for (tick, _, message) in timed {
        events.push(TrackEvent {
            delta: u28::new(tick - last),
            kind: TrackEventKind::Midi { channel, message },
        });
        last = tick;
    }
    events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    events
}
