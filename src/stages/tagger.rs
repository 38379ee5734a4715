use super::{run_command, split_command, StageError, Tagger};
use crate::config::{TagHeadConfig, TaggingConfig};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// (max tags, activation threshold) when the config doesn't say.
pub const GENRE_DEFAULTS: (usize, f32) = (4, 0.05);
pub const MOOD_DEFAULTS: (usize, f32) = (5, 0.02);

/// Model metadata file: only the class list is used.
#[derive(Debug, Deserialize)]
struct HeadMetadata {
    classes: Vec<String>,
}

/// One classifier head on top of the shared audio embedding.
#[derive(Debug, Clone)]
pub struct TagHead {
    pub name: &'static str,
    pub model: PathBuf,
    pub classes: Vec<String>,
    pub max_tags: usize,
    pub threshold: f32,
}

impl TagHead {
    pub fn load(
        name: &'static str,
        config: &TagHeadConfig,
        defaults: (usize, f32),
    ) -> Result<Self, StageError> {
        let raw = std::fs::read_to_string(&config.metadata)?;
        let metadata: HeadMetadata = serde_json::from_str(&raw).map_err(|e| StageError::Malformed {
            what: "tag metadata",
            message: format!("{}: {}", config.metadata.display(), e),
        })?;

        Ok(Self {
            name,
            model: config.model.clone(),
            classes: metadata.classes,
            max_tags: config.max_tags.unwrap_or(defaults.0),
            threshold: config.threshold.unwrap_or(defaults.1),
        })
    }

    /// Turn per-frame activations into the head's tags.
    pub fn tags(&self, activations: &[Vec<f32>]) -> Result<Tags, StageError> {
        select_tags(activations, &self.classes, self.max_tags, self.threshold)
    }
}

/// Tags with their mean activations, strongest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tags {
    pub names: Vec<String>,
    pub scores: Vec<f64>,
}

/// Pick the `max_tags` classes with the highest mean activation, drop those
/// at or below `threshold`, and round the scores to 4 decimals.
pub fn select_tags(
    activations: &[Vec<f32>],
    classes: &[String],
    max_tags: usize,
    threshold: f32,
) -> Result<Tags, StageError> {
    if activations.is_empty() {
        return Err(StageError::Malformed {
            what: "tagger output",
            message: "no frames".into(),
        });
    }

    let mut means = vec![0.0_f64; classes.len()];
    for (frame, row) in activations.iter().enumerate() {
        if row.len() != classes.len() {
            return Err(StageError::Malformed {
                what: "tagger output",
                message: format!(
                    "frame {} has {} activations, expected {}",
                    frame,
                    row.len(),
                    classes.len()
                ),
            });
        }
        for (mean, value) in means.iter_mut().zip(row) {
            *mean += f64::from(*value);
        }
    }
    for mean in &mut means {
        *mean /= activations.len() as f64;
    }

    let mut ranked: Vec<usize> = (0..classes.len()).collect();
    ranked.sort_by(|&a, &b| means[b].total_cmp(&means[a]));

    let mut tags = Tags::default();
    for i in ranked.into_iter().take(max_tags) {
        if means[i] > f64::from(threshold) {
            tags.names.push(classes[i].clone());
            tags.scores.push((means[i] * 10_000.0).round() / 10_000.0);
        }
    }

    Ok(tags)
}

/// Runs an external embedding + classifier script.
///
/// Invoked as `<command...> --embedding-model <pb> --model <pb> <wav>`; the
/// script prints a JSON array of per-frame activation rows.
pub struct CommandTagger {
    command: Vec<String>,
    embedding_model: PathBuf,
}

impl CommandTagger {
    pub fn new(config: &TaggingConfig) -> Self {
        Self {
            command: config.command.clone(),
            embedding_model: config.embedding_model.clone(),
        }
    }
}

impl Tagger for CommandTagger {
    fn activations(&self, audio: &Path, head: &TagHead) -> Result<Vec<Vec<f32>>, StageError> {
        let (program, leading) = split_command(&self.command, "tagging")?;

        let args = leading
            .iter()
            .map(OsStr::new)
            .chain([
                OsStr::new("--embedding-model"),
                self.embedding_model.as_os_str(),
                OsStr::new("--model"),
                head.model.as_os_str(),
                audio.as_os_str(),
            ]);

        let stdout = run_command(program, args)?;
        log::trace!("{} head returned {} bytes", head.name, stdout.len());

        serde_json::from_slice(&stdout).map_err(|e| StageError::Malformed {
            what: "tagger output",
            message: e.to_string(),
        })
    }
}
