use crate::output::{OutputError, RecordWriter};
use serde::Deserialize;
use std::ffi::OsString;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Most recent records distrusted on resume and recomputed. A record torn
/// by an interruption can't be told apart from a complete one, so the tail
/// of the prior output is thrown away rather than trusted.
pub const REVERIFY_WINDOW: usize = 5;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Output error: {0}")]
    Output(#[from] OutputError),
    #[error("Output line {line} is not a record: {source}")]
    Corrupt {
        line: usize,
        source: serde_json::Error,
    },
    #[error(
        "Cannot resume: no catalog entry from position {from} on matches {name:?}. \
         Has the catalog changed since the interrupted run?"
    )]
    NoCatalogMatch { name: String, from: usize },
}

#[derive(Deserialize)]
struct RecordName {
    name: String,
}

/// A record from a previous run, kept byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorRecord {
    pub name: String,
    pub line: String,
}

/// Where a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// No prior output: start at the first catalog entry.
    Fresh,
    /// Keep the first `retained` prior records and continue from catalog
    /// entry `restart`.
    Resume { retained: usize, restart: usize },
}

impl Checkpoint {
    pub fn start_index(&self) -> usize {
        match self {
            Self::Fresh => 0,
            Self::Resume { restart, .. } => *restart,
        }
    }
}

/// Read every record of a previous output file.
///
/// A final line that isn't valid JSON is a torn write and is dropped; a bad
/// line anywhere else means the file isn't ours, and is an error.
pub fn read_prior_records(path: &Path) -> Result<Vec<PriorRecord>, CheckpointError> {
    let text = std::fs::read_to_string(path)?;
    let last = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, _)| i)
        .last();
    let mut records = Vec::new();

    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RecordName>(line) {
            Ok(r) => records.push(PriorRecord {
                name: r.name,
                line: line.to_string(),
            }),
            Err(e) if Some(i) == last => {
                log::warn!("Dropping torn last line of {}: {}", path.display(), e);
            }
            Err(source) => return Err(CheckpointError::Corrupt { line: i + 1, source }),
        }
    }

    Ok(records)
}

/// Position of `name` in the catalog, searching from `from` on.
pub fn find_restart(catalog: &[String], from: usize, name: &str) -> Option<usize> {
    catalog
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, entry)| entry.as_str() == name)
        .map(|(i, _)| i)
}

/// Work out where to pick up given the prior records and the catalog.
///
/// Every written record consumed at least one catalog entry, so the record
/// after the retained prefix can't sit earlier in the catalog than the
/// prefix length.
pub fn plan_resume(prior: &[PriorRecord], catalog: &[String]) -> Result<Checkpoint, CheckpointError> {
    if prior.is_empty() {
        return Ok(Checkpoint::Fresh);
    }

    let retained = prior.len().saturating_sub(REVERIFY_WINDOW);
    let expected = &prior[retained].name;

    match find_restart(catalog, retained, expected) {
        Some(restart) => Ok(Checkpoint::Resume { retained, restart }),
        None => Err(CheckpointError::NoCatalogMatch {
            name: expected.clone(),
            from: retained,
        }),
    }
}

/// Open the output stream for a run.
///
/// A fresh run truncates the output. A resumed run rewrites the output to
/// its retained prefix (via a temporary file renamed into place, so the
/// prior output survives an interruption here) and appends from there.
pub fn open_output(
    path: &Path,
    resume: bool,
    catalog: &[String],
) -> Result<(RecordWriter, Checkpoint), CheckpointError> {
    if !resume {
        return Ok((RecordWriter::create(path)?, Checkpoint::Fresh));
    }
    if !path.exists() {
        log::warn!("Nothing to resume: {} does not exist, starting fresh", path.display());
        return Ok((RecordWriter::create(path)?, Checkpoint::Fresh));
    }

    let prior = read_prior_records(path)?;
    let checkpoint = plan_resume(&prior, catalog)?;

    let retained = match checkpoint {
        Checkpoint::Fresh => {
            log::warn!("No records in {}, starting fresh", path.display());
            return Ok((RecordWriter::create(path)?, Checkpoint::Fresh));
        }
        Checkpoint::Resume { retained, restart } => {
            log::info!(
                "Resuming: keeping {} of {} prior records, restarting at catalog entry {}",
                retained,
                prior.len(),
                restart
            );
            retained
        }
    };

    let tmp = sibling_tmp_path(path);
    {
        let mut out = File::create(&tmp)?;
        for record in &prior[..retained] {
            out.write_all(record.line.as_bytes())?;
            out.write_all(b"\n")?;
        }
        out.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;

    Ok((RecordWriter::append(path)?, checkpoint))
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".resume");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}.mid")).collect()
    }

    fn prior(names: &[&str]) -> Vec<PriorRecord> {
        names
            .iter()
            .map(|n| PriorRecord {
                name: n.to_string(),
                line: format!("{{\"name\":\"{n}\"}}"),
            })
            .collect()
    }

    #[test]
    fn lookup_searches_from_hint() {
        let cat = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(find_restart(&cat, 0, "a"), Some(0));
        assert_eq!(find_restart(&cat, 1, "a"), Some(2));
        assert_eq!(find_restart(&cat, 0, "z"), None);
        assert_eq!(find_restart(&cat, 5, "a"), None);
    }

    #[test]
    fn keeps_all_but_window() {
        let cat = catalog(20);
        // f3 was skipped in the earlier run
        let names = ["f0.mid", "f1.mid", "f2.mid", "f4.mid", "f5.mid", "f6.mid", "f7.mid", "f8.mid"];
        let checkpoint = plan_resume(&prior(&names), &cat).unwrap();
        // 8 records - 5 = 3 kept; the 4th record (f4) is recomputed
        assert_eq!(checkpoint, Checkpoint::Resume { retained: 3, restart: 4 });
        assert_eq!(checkpoint.start_index(), 4);
    }

    #[test]
    fn short_prior_output_restarts_at_first_record() {
        let cat = catalog(10);
        let checkpoint = plan_resume(&prior(&["f0.mid", "f1.mid"]), &cat).unwrap();
        assert_eq!(checkpoint, Checkpoint::Resume { retained: 0, restart: 0 });
    }

    #[test]
    fn empty_prior_output_is_fresh() {
        assert_eq!(plan_resume(&[], &catalog(3)).unwrap(), Checkpoint::Fresh);
    }

    #[test]
    fn changed_catalog_is_fatal() {
        let names = ["f0.mid", "f1.mid", "f2.mid", "f3.mid", "f4.mid", "f5.mid"];
        let other: Vec<String> = (0..10).map(|i| format!("g{i}.mid")).collect();
        let err = plan_resume(&prior(&names), &other).unwrap_err();
        assert!(matches!(err, CheckpointError::NoCatalogMatch { ref name, from: 1 } if name == "f1.mid"));
    }

    #[test]
    fn torn_last_line_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "{\"name\":\"a.mid\",\"key\":null}\n{\"name\":\"b.mid\"}\n{\"name\":\"c.m").unwrap();

        let records = read_prior_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, "{\"name\":\"a.mid\",\"key\":null}");
        assert_eq!(records[1].name, "b.mid");
    }

    #[test]
    fn corrupt_middle_line_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "{\"name\":\"a.mid\"}\ngarbage\n{\"name\":\"b.mid\"}\n").unwrap();
        assert!(matches!(
            read_prior_records(&path),
            Err(CheckpointError::Corrupt { line: 2, .. })
        ));
    }

    #[test]
    fn corrupt_line_number_counts_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "\n\n{\"name\":\"a.mid\"}\ngarbage\n{\"name\":\"b.mid\"}\n\n").unwrap();
        assert!(matches!(
            read_prior_records(&path),
            Err(CheckpointError::Corrupt { line: 4, .. })
        ));
    }

    #[test]
    fn torn_line_before_trailing_blank_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "{\"name\":\"a.mid\"}\n{\"name\":\"b.m\n\n").unwrap();
        let records = read_prior_records(&path).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn resume_rewrites_output_to_retained_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let cat = catalog(10);
        let lines: Vec<String> = (0..7).map(|i| format!("{{\"name\":\"f{i}.mid\",\"n\":{i}}}")).collect();
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let (writer, checkpoint) = open_output(&path, true, &cat).unwrap();
        assert_eq!(checkpoint, Checkpoint::Resume { retained: 2, restart: 2 });
        assert_eq!(writer.written(), 0);
        drop(writer);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, format!("{}\n{}\n", lines[0], lines[1]));
        assert!(!sibling_tmp_path(&path).exists());
    }

    #[test]
    fn resume_without_output_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let (_, checkpoint) = open_output(&path, true, &catalog(3)).unwrap();
        assert_eq!(checkpoint, Checkpoint::Fresh);
        assert!(path.exists());
    }

    #[test]
    fn fresh_run_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "{\"name\":\"old.mid\"}\n").unwrap();
        let (_, checkpoint) = open_output(&path, false, &catalog(3)).unwrap();
        assert_eq!(checkpoint, Checkpoint::Fresh);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
