use super::{run_command, StageError, Synthesizer};
use crate::config::SynthesisConfig;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Sample rate the audio gate and the downstream models work at.
pub const ANALYSIS_SAMPLE_RATE: u32 = 16_000;

/// A rendered WAV file owned by the file currently being annotated.
#[derive(Debug)]
pub struct SynthesizedAudio {
    pub path: PathBuf,
    /// Length in samples at [`ANALYSIS_SAMPLE_RATE`].
    pub samples: u64,
}

impl SynthesizedAudio {
    /// Inspect an existing WAV file.
    pub fn from_wav(path: PathBuf) -> Result<Self, StageError> {
        let samples = count_samples(&path, ANALYSIS_SAMPLE_RATE)?;
        Ok(Self { path, samples })
    }

    /// Delete the WAV file. Missing files are not an error.
    pub fn remove(self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// FluidSynth command-line renderer.
pub struct FluidSynth {
    program: String,
    soundfont: PathBuf,
    sample_rate: u32,
}

impl FluidSynth {
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            program: config.program.clone(),
            soundfont: config.soundfont.clone(),
            sample_rate: config.sample_rate,
        }
    }
}

impl Synthesizer for FluidSynth {
    fn synthesize(&self, midi: &Path) -> Result<SynthesizedAudio, StageError> {
        let wav = audio_path_for(midi);
        let rate = self.sample_rate.to_string();

        run_command(
            &self.program,
            [
                OsStr::new("-ni"),
                OsStr::new("-F"),
                wav.as_os_str(),
                OsStr::new("-r"),
                OsStr::new(&rate),
                self.soundfont.as_os_str(),
                midi.as_os_str(),
            ],
        )?;

        if !wav.exists() {
            return Err(StageError::MissingOutput(wav));
        }

        SynthesizedAudio::from_wav(wav.clone()).inspect_err(|_| {
            std::fs::remove_file(&wav).ok();
        })
    }
}

/// Where the rendered audio for a MIDI file is written: next to it, `.wav`.
pub fn audio_path_for(midi: &Path) -> PathBuf {
    midi.with_extension("wav")
}

/// Number of samples (per channel) in a WAV file, rescaled to `target_rate`.
pub fn count_samples(path: &Path, target_rate: u32) -> Result<u64, StageError> {
    let reader = hound::WavReader::open(path)?;
    let rate = u64::from(reader.spec().sample_rate.max(1));
    Ok(u64::from(reader.duration()) * u64::from(target_rate) / rate)
}
