use crate::catalog::{self, CatalogError};
use crate::checkpoint::{self, CheckpointError};
use crate::config::AppConfig;
use crate::instruments::{self, ProfileError};
use crate::motif::{self, Motif};
use crate::output::{OutputError, RecordWriter};
use crate::record::{self, Analysis, InstrumentMap, InstrumentMapError};
use crate::stages::{chords, ChordEvent, StageError, Stages, SynthesizedAudio, TagHead, Tags};
use crate::symbolic::{SymbolicError, SymbolicFile};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use std::path::Path;
use thiserror::Error;

/// Files whose nominal length exceeds this are not annotated.
pub const MAX_DURATION_SECS: f64 = 900.0;

/// Rendered audio shorter than this (3 s at 16 kHz) is not annotated.
pub const MIN_AUDIO_SAMPLES: u64 = 48_000;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Instrument table error: {0}")]
    InstrumentMap(#[from] InstrumentMapError),
    #[error("Stage setup error: {0}")]
    Stage(#[from] StageError),
    #[error("Resume error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("Output error: {0}")]
    Output(#[from] OutputError),
}

/// Why a catalog entry produced no record.
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("unreadable MIDI: {0}")]
    Unreadable(#[from] SymbolicError),
    #[error("too long ({0:.0} s)")]
    TooLong(f64),
    #[error("synthesis failed: {0}")]
    Synthesis(StageError),
    #[error("audio too short ({0} samples)")]
    AudioTooShort(u64),
    #[error("{head} tagging failed: {source}")]
    Tagging {
        head: &'static str,
        source: StageError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotateResult {
    pub written: u64,
    pub skipped: u64,
}

/// Everything produced from the rendered audio.
struct AudioAnalysis {
    genre: Tags,
    mood: Tags,
    chords: Vec<ChordEvent>,
    motif: Option<Motif>,
}

/// Annotate a configured run end to end: load resources, open (or recover)
/// the output, then stream records for the rest of the catalog.
pub fn run(config: &AppConfig, resume: bool) -> Result<AnnotateResult, AnnotateError> {
    let catalog = catalog::read_catalog(&config.location_file)?;
    log::info!(
        "Catalog: {} entries from {}",
        catalog.len(),
        config.location_file.display()
    );

    let instruments = InstrumentMap::load(&config.instrument_map)?;
    let stages = Stages::from_config(config)?;
    let (mut writer, checkpoint) = checkpoint::open_output(&config.output_file, resume, &catalog)?;

    annotate_catalog(
        &catalog,
        checkpoint.start_index(),
        &mut writer,
        &stages,
        &instruments,
        &mut rand::thread_rng(),
    )
}

/// Annotate `catalog[start..]` in order, writing one record per file that
/// passes the gates.
///
/// Skipped files are logged and counted. Only a failure to write the output
/// stops the run.
pub fn annotate_catalog<R: Rng + ?Sized>(
    catalog: &[String],
    start: usize,
    writer: &mut RecordWriter,
    stages: &Stages,
    instruments: &InstrumentMap,
    rng: &mut R,
) -> Result<AnnotateResult, AnnotateError> {
    let mut written: u64 = 0;
    let mut skipped: u64 = 0;

    let remaining = catalog.get(start..).unwrap_or_default();
    if remaining.is_empty() {
        log::info!("Nothing to annotate");
        return Ok(AnnotateResult { written, skipped });
    }
    log::info!("Annotating {} files from catalog entry {}", remaining.len(), start);

    let pb = progress_bar(catalog.len() as u64);
    pb.set_position(start as u64);

    for name in remaining {
        log::debug!("Annotating: {}", name);

        match annotate_file(name, stages) {
            Ok(analysis) => {
                let record = record::assemble(analysis, instruments, rng);
                writer.write(&record)?;
                written += 1;
            }
            Err(reason) => {
                log::warn!("Skipping {}: {}", name, reason);
                skipped += 1;
            }
        }

        pb.inc(1);
        pb.set_message(format!("{} written, {} skipped", written, skipped));
    }

    pb.finish_with_message(format!("Done: {} written, {} skipped", written, skipped));

    Ok(AnnotateResult { written, skipped })
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    match ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}") {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => log::debug!("Progress template rejected: {}", e),
    }
    pb
}

/// Run every stage for one file: gates, then rendering and audio analysis,
/// then the symbolic readers.
fn annotate_file(name: &str, stages: &Stages) -> Result<Analysis, SkipReason> {
    let path = Path::new(name);
    let midi = SymbolicFile::open(path)?;

    let duration_secs = midi.length_secs()?;
    if duration_secs > MAX_DURATION_SECS {
        return Err(SkipReason::TooLong(duration_secs));
    }

    let audio = stages.synthesizer.synthesize(path).map_err(SkipReason::Synthesis)?;
    let analyzed = analyze_audio(&audio, stages);
    discard_audio(audio);
    let AudioAnalysis {
        genre,
        mood,
        chords,
        motif,
    } = analyzed?;

    let instruments = match instruments::profile_tracks(&midi.channel_tracks()) {
        Ok(programs) => programs,
        Err(ProfileError::TooManyAssignments(count)) => {
            log::warn!("{}: {} channel/program combinations, instrumentation dropped", name, count);
            Vec::new()
        }
    };

    let key = match midi.key() {
        Ok(key) => Some(key.to_string()),
        Err(e) => {
            log::warn!("{}: no key: {}", name, e);
            None
        }
    };

    Ok(Analysis {
        name: name.to_string(),
        duration_secs,
        genre,
        mood,
        chords,
        motif,
        instruments,
        key,
        time_signature: midi.time_signature(),
        bpm: midi.first_tempo_bpm(),
    })
}

fn analyze_audio(audio: &SynthesizedAudio, stages: &Stages) -> Result<AudioAnalysis, SkipReason> {
    if audio.samples < MIN_AUDIO_SAMPLES {
        return Err(SkipReason::AudioTooShort(audio.samples));
    }

    let genre = tag(audio, stages, &stages.genre)?;
    let mood = tag(audio, stages, &stages.mood)?;

    let (chords, motif) = match stages.chords.recognize(&audio.path) {
        Ok(events) => {
            let chords = chords::trim_boundaries(events);
            let symbols: Vec<&str> = chords.iter().map(|c| c.symbol.as_str()).collect();
            let motif = motif::find_motif(&symbols);
            (chords, Some(motif))
        }
        Err(e) => {
            log::warn!("{}: chord recognition failed: {}", audio.path.display(), e);
            (Vec::new(), None)
        }
    };

    Ok(AudioAnalysis {
        genre,
        mood,
        chords,
        motif,
    })
}

fn tag(audio: &SynthesizedAudio, stages: &Stages, head: &TagHead) -> Result<Tags, SkipReason> {
    stages
        .tagger
        .activations(&audio.path, head)
        .and_then(|frames| head.tags(&frames))
        .map_err(|source| SkipReason::Tagging {
            head: head.name,
            source,
        })
}

fn discard_audio(audio: SynthesizedAudio) {
    let path = audio.path.clone();
    if let Err(e) = audio.remove() {
        log::warn!("Could not remove {}: {}", path.display(), e);
    }
}
