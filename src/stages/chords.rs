use super::{run_command, split_command, ChordRecognizer, StageError};
use crate::config::ChordsConfig;
use std::ffi::OsStr;
use std::path::Path;

/// A recognized chord and the time (seconds) it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordEvent {
    pub symbol: String,
    pub timestamp: f64,
}

impl ChordEvent {
    pub fn new(symbol: impl Into<String>, timestamp: f64) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
        }
    }
}

/// Chord recognizer driven through a CSV-emitting command line, e.g.
/// sonic-annotator with the Chordino plugin. The audio path is appended.
pub struct CommandChordRecognizer {
    command: Vec<String>,
}

impl CommandChordRecognizer {
    pub fn new(config: &ChordsConfig) -> Self {
        Self {
            command: config.command.clone(),
        }
    }
}

impl ChordRecognizer for CommandChordRecognizer {
    fn recognize(&self, audio: &Path) -> Result<Vec<ChordEvent>, StageError> {
        let (program, leading) = split_command(&self.command, "chords")?;
        let args = leading
            .iter()
            .map(OsStr::new)
            .chain(std::iter::once(audio.as_os_str()));
        let stdout = run_command(program, args)?;
        parse_chord_csv(&String::from_utf8_lossy(&stdout))
    }
}

/// Parse recognizer CSV output. Only the last two fields of each line are
/// read: `timestamp,"label"`. Leading fields (the file name on the first
/// line) are ignored.
pub fn parse_chord_csv(output: &str) -> Result<Vec<ChordEvent>, StageError> {
    let mut chords = Vec::new();

    for (n, line) in output.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.rsplitn(3, ',');
        let label = fields.next().map(unquote);
        let timestamp = fields.next().map(|t| unquote(t).parse::<f64>());

        match (label, timestamp) {
            (Some(label), Some(Ok(timestamp))) if !label.is_empty() => {
                chords.push(ChordEvent::new(label, timestamp));
            }
            _ => {
                return Err(StageError::Malformed {
                    what: "chord recognizer output",
                    message: format!("line {}: {:?}", n + 1, line),
                });
            }
        }
    }

    Ok(chords)
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"')
}

/// Drop the recognizer's first and last events, which are boundary artifacts.
pub fn trim_boundaries(mut chords: Vec<ChordEvent>) -> Vec<ChordEvent> {
    if chords.len() <= 2 {
        return Vec::new();
    }
    chords.pop();
    chords.remove(0);
    chords
}
