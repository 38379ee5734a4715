use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

/// Config file looked up in the working directory when `--config` isn't given.
pub const LOCAL_CONFIG: &str = "midicaps.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No config file: pass --config, or create ./midicaps.toml or {0}")]
    NotFound(String),
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Annotation run configuration, loaded from TOML.
///
/// Resource paths are used as written (relative paths resolve against the
/// working directory). Unlike the sections below, the top-level paths have no
/// defaults: a config missing one is rejected.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Input catalog: one `{"name": <path>}` per line.
    pub location_file: PathBuf,
    /// Output records, one JSON object per line.
    pub output_file: PathBuf,
    /// CSV table mapping program ids (row index) to display names.
    pub instrument_map: PathBuf,
    pub synthesis: SynthesisConfig,
    pub tagging: TaggingConfig,
    #[serde(default)]
    pub chords: ChordsConfig,
}

#[derive(Debug, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_synth_program")]
    pub program: String,
    pub soundfont: PathBuf,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

#[derive(Debug, Deserialize)]
pub struct TaggingConfig {
    /// Program and leading arguments of the tagging script.
    pub command: Vec<String>,
    pub embedding_model: PathBuf,
    pub genre: TagHeadConfig,
    pub mood: TagHeadConfig,
}

#[derive(Debug, Deserialize)]
pub struct TagHeadConfig {
    pub model: PathBuf,
    /// JSON file with a `classes` array.
    pub metadata: PathBuf,
    pub max_tags: Option<usize>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChordsConfig {
    /// Program and leading arguments; the audio path is appended.
    pub command: Vec<String>,
}

impl Default for ChordsConfig {
    fn default() -> Self {
        Self {
            command: [
                "sonic-annotator",
                "-d",
                "vamp:nnls-chroma:chordino:simplechord",
                "-w",
                "csv",
                "--csv-stdout",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

fn default_synth_program() -> String {
    "fluidsynth".into()
}

fn default_sample_rate() -> u32 {
    crate::stages::synth::ANALYSIS_SAMPLE_RATE
}

impl AppConfig {
    /// Load config from `explicit`, else `./midicaps.toml`, else
    /// `~/.config/midicaps/config.toml`. Any failure is an error: a run
    /// without its resource paths can't do anything useful.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::discover()?,
        };

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn discover() -> Result<PathBuf, ConfigError> {
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.exists() {
            return Ok(local);
        }

        match Self::user_config_path() {
            Some(path) if path.exists() => Ok(path),
            Some(path) => Err(ConfigError::NotFound(path.display().to_string())),
            None => Err(ConfigError::NotFound("the user config directory".into())),
        }
    }

    /// `~/.config/midicaps/config.toml` (platform equivalent).
    fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
