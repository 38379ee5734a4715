pub mod key;

use crate::instruments::{EventKind, TrackEvent};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::Path;
use thiserror::Error;

/// Tempo assumed until the first tempo event (120 bpm).
pub const DEFAULT_TEMPO_USEC: u32 = 500_000;

/// Channel that carries unpitched percussion; ignored for key detection.
const PERCUSSION_CHANNEL: u8 = 9;

#[derive(Error, Debug)]
pub enum SymbolicError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("MIDI parse error: {0}")]
    Parse(String),
    #[error("Length is undefined for asynchronous (format 2) files")]
    Asynchronous,
    #[error("No pitched notes to analyze")]
    NoNotes,
}

/// The parts of a MIDI message the annotator cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Message {
    Program { channel: u8, program: u8 },
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    Tempo(u32),
    TimeSignature { numerator: u8, denominator_pow: u8 },
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    delta: u32,
    message: Message,
}

#[derive(Debug, Clone, Copy)]
enum Clock {
    /// Ticks per quarter note; seconds per tick follow the tempo map.
    Metrical(u16),
    /// Fixed seconds per tick.
    Timecode { seconds_per_tick: f64 },
}

/// An owned, decoded Standard MIDI File.
#[derive(Debug, Clone)]
pub struct SymbolicFile {
    clock: Clock,
    asynchronous: bool,
    tracks: Vec<Vec<Event>>,
}

impl SymbolicFile {
    /// Read and decode a MIDI file from disk.
    pub fn open(path: &Path) -> Result<Self, SymbolicError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SymbolicError> {
        let smf = Smf::parse(bytes).map_err(|e| SymbolicError::Parse(e.to_string()))?;

        let clock = match smf.header.timing {
            Timing::Metrical(ticks) => Clock::Metrical(ticks.as_int().max(1)),
            Timing::Timecode(fps, subframes) => Clock::Timecode {
                seconds_per_tick: 1.0 / (f64::from(fps.as_f32()) * f64::from(subframes.max(1))),
            },
        };

        let tracks = smf
            .tracks
            .iter()
            .map(|track| {
                track
                    .iter()
                    .map(|event| Event {
                        delta: event.delta.as_int(),
                        message: decode_kind(&event.kind),
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            clock,
            asynchronous: matches!(smf.header.format, midly::Format::Sequential),
            tracks,
        })
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// All events of all tracks with absolute ticks, in playback order.
    /// Events at the same tick keep track order.
    fn merged(&self) -> Vec<(u64, Message)> {
        let mut merged: Vec<(u64, Message)> = Vec::new();
        for track in &self.tracks {
            let mut tick: u64 = 0;
            for event in track {
                tick += u64::from(event.delta);
                merged.push((tick, event.message));
            }
        }
        merged.sort_by_key(|(tick, _)| *tick);
        merged
    }

    /// Nominal playback length in seconds, following tempo changes.
    pub fn length_secs(&self) -> Result<f64, SymbolicError> {
        if self.asynchronous {
            return Err(SymbolicError::Asynchronous);
        }

        let mut seconds = 0.0;
        let mut last_tick: u64 = 0;
        let mut tempo = DEFAULT_TEMPO_USEC;

        for (tick, message) in self.merged() {
            let delta = (tick - last_tick) as f64;
            last_tick = tick;
            seconds += match self.clock {
                Clock::Metrical(ppq) => delta * f64::from(tempo) / 1e6 / f64::from(ppq),
                Clock::Timecode { seconds_per_tick } => delta * seconds_per_tick,
            };
            if let Message::Tempo(usec) = message {
                tempo = usec;
            }
        }

        Ok(seconds)
    }

    /// Tempo of the first tempo event in playback order, in bpm.
    pub fn first_tempo_bpm(&self) -> Option<f64> {
        self.merged().into_iter().find_map(|(_, message)| match message {
            Message::Tempo(usec) if usec > 0 => Some(60_000_000.0 / f64::from(usec)),
            _ => None,
        })
    }

    /// First time signature in playback order, as "numerator/denominator".
    pub fn time_signature(&self) -> Option<String> {
        self.merged().into_iter().find_map(|(_, message)| match message {
            Message::TimeSignature { numerator, denominator_pow } => 1u32
                .checked_shl(u32::from(denominator_pow))
                .map(|denominator| format!("{}/{}", numerator, denominator)),
            _ => None,
        })
    }

    /// Per-track channel events for instrumentation profiling.
    pub fn channel_tracks(&self) -> Vec<Vec<TrackEvent>> {
        self.tracks
            .iter()
            .map(|track| {
                track
                    .iter()
                    .map(|event| {
                        let kind = match event.message {
                            Message::Program { channel, program } => {
                                EventKind::ProgramChange { channel, program }
                            }
                            Message::NoteOn { channel, pitch, .. } => EventKind::NoteOn { channel, pitch },
                            Message::NoteOff { channel, pitch } => EventKind::NoteOff { channel, pitch },
                            _ => EventKind::Other,
                        };
                        TrackEvent::new(event.delta, kind)
                    })
                    .collect()
            })
            .collect()
    }

    /// Sounding ticks per pitch class over all pitched channels.
    ///
    /// Notes still held at the end of a track are closed there.
    pub fn pitch_class_histogram(&self) -> [f64; 12] {
        let mut histogram = [0.0_f64; 12];

        for track in &self.tracks {
            let mut tick: u64 = 0;
            let mut held: Vec<((u8, u8), u64)> = Vec::new();

            for event in track {
                tick += u64::from(event.delta);
                match event.message {
                    Message::NoteOn { channel, .. } | Message::NoteOff { channel, .. }
                        if channel == PERCUSSION_CHANNEL => {}
                    Message::NoteOn { channel, pitch, velocity } if velocity > 0 => {
                        held.push(((channel, pitch), tick));
                    }
                    Message::NoteOn { channel, pitch, .. } | Message::NoteOff { channel, pitch } => {
                        if let Some(i) = held.iter().rposition(|(k, _)| *k == (channel, pitch)) {
                            let (_, onset) = held.remove(i);
                            histogram[usize::from(pitch % 12)] += (tick - onset).max(1) as f64;
                        }
                    }
                    _ => {}
                }
            }

            for ((_, pitch), onset) in held {
                histogram[usize::from(pitch % 12)] += (tick - onset).max(1) as f64;
            }
        }

        histogram
    }

    /// Estimated key, e.g. "E- minor" (music21-style flat spelling).
    pub fn key(&self) -> Result<key::Key, SymbolicError> {
        key::detect_key(&self.pitch_class_histogram()).ok_or(SymbolicError::NoNotes)
    }
}

fn decode_kind(kind: &TrackEventKind) -> Message {
    match *kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::ProgramChange { program } => Message::Program {
                    channel,
                    program: program.as_int(),
                },
                MidiMessage::NoteOn { key, vel } => Message::NoteOn {
                    channel,
                    pitch: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, .. } => Message::NoteOff {
                    channel,
                    pitch: key.as_int(),
                },
                _ => Message::Other,
            }
        }
        TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => Message::Tempo(tempo.as_int()),
        TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denominator_pow, _, _)) => {
            Message::TimeSignature {
                numerator,
                denominator_pow,
            }
        }
        _ => Message::Other,
    }
}
