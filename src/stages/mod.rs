//! Adapters for the external tools the annotator drives: the synthesizer,
//! the embedding/tagging models and the chord recognizer.
//!
//! Every adapter is a blocking call into a child process. The orchestrator
//! only sees the traits, so tests swap in fakes.

pub mod chords;
pub mod synth;
pub mod tagger;

use crate::config::AppConfig;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

pub use chords::{ChordEvent, CommandChordRecognizer};
pub use synth::{FluidSynth, SynthesizedAudio};
pub use tagger::{CommandTagger, TagHead, Tags};

#[derive(Error, Debug)]
pub enum StageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} not found; is it installed and on PATH?")]
    NotFound(String),
    #[error("{program} failed: {stderr}")]
    Failed { program: String, stderr: String },
    #[error("No command configured for {0}")]
    NoCommand(&'static str),
    #[error("Expected output missing: {0}")]
    MissingOutput(PathBuf),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Malformed {what}: {message}")]
    Malformed { what: &'static str, message: String },
}

/// Renders a MIDI file to audio.
pub trait Synthesizer {
    fn synthesize(&self, midi: &Path) -> Result<SynthesizedAudio, StageError>;
}

/// Runs an embedding model plus one classifier head over an audio file.
/// Returns per-frame class activations.
pub trait Tagger {
    fn activations(&self, audio: &Path, head: &TagHead) -> Result<Vec<Vec<f32>>, StageError>;
}

/// Recognizes a timed chord sequence in an audio file.
pub trait ChordRecognizer {
    fn recognize(&self, audio: &Path) -> Result<Vec<ChordEvent>, StageError>;
}

/// All external stages used for one run.
pub struct Stages {
    pub synthesizer: Box<dyn Synthesizer>,
    pub tagger: Box<dyn Tagger>,
    pub chords: Box<dyn ChordRecognizer>,
    pub genre: TagHead,
    pub mood: TagHead,
}

impl Stages {
    /// Build the command-line adapters described by the config.
    /// Fails if a tag head's class metadata can't be loaded.
    pub fn from_config(config: &AppConfig) -> Result<Self, StageError> {
        let genre = TagHead::load("genre", &config.tagging.genre, tagger::GENRE_DEFAULTS)?;
        let mood = TagHead::load("mood", &config.tagging.mood, tagger::MOOD_DEFAULTS)?;
        log::info!(
            "Tag heads: {} genre classes, {} mood classes",
            genre.classes.len(),
            mood.classes.len()
        );

        Ok(Self {
            synthesizer: Box::new(FluidSynth::new(&config.synthesis)),
            tagger: Box::new(CommandTagger::new(&config.tagging)),
            chords: Box::new(CommandChordRecognizer::new(&config.chords)),
            genre,
            mood,
        })
    }
}

/// Run an external program to completion and return its stdout.
pub(crate) fn run_command<I, S>(program: &str, args: I) -> Result<Vec<u8>, StageError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = match Command::new(program).args(args).output() {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StageError::NotFound(program.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StageError::Failed {
            program: program.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(output.stdout)
}

/// Split a configured command line into program and leading arguments.
pub(crate) fn split_command<'a>(
    command: &'a [String],
    stage: &'static str,
) -> Result<(&'a str, &'a [String]), StageError> {
    match command.split_first() {
        Some((program, args)) => Ok((program.as_str(), args)),
        None => Err(StageError::NoCommand(stage)),
    }
}
