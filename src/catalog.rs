use crate::SUPPORTED_EXTENSIONS;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Catalog line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
}

/// One line of the input catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
}

/// Read catalog entry names in file order. Blank lines are ignored.
pub fn read_catalog(path: &Path) -> Result<Vec<String>, CatalogError> {
    let reader = BufReader::new(File::open(path)?);
    let mut names = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: CatalogEntry =
            serde_json::from_str(&line).map_err(|source| CatalogError::Json { line: i + 1, source })?;
        names.push(entry.name);
    }

    Ok(names)
}

pub fn write_catalog(path: &Path, files: &[PathBuf]) -> Result<(), CatalogError> {
    let mut out = BufWriter::new(File::create(path)?);
    for (i, file) in files.iter().enumerate() {
        let entry = CatalogEntry {
            name: file.to_string_lossy().to_string(),
        };
        let line = serde_json::to_string(&entry).map_err(|source| CatalogError::Json { line: i + 1, source })?;
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}

/// Recursively collect MIDI files under `dirs`, sorted by path.
pub fn find_midi_files(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = dirs
        .iter()
        .flat_map(|dir| WalkDir::new(dir).follow_links(true).into_iter())
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_midi(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

fn is_midi(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Shuffle catalog order, reproducibly when a seed is given.
pub fn shuffle(files: &mut [PathBuf], seed: Option<u64>) {
    match seed {
        Some(seed) => files.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => files.shuffle(&mut rand::thread_rng()),
    }
}
