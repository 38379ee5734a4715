use crate::record::OutputRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only stream of output records, one JSON object per line.
///
/// Each record is serialized in full before any byte reaches the file, then
/// written and flushed as one line, so an interruption leaves at most one
/// torn line at the end.
pub struct RecordWriter {
    out: BufWriter<File>,
    written: u64,
}

impl RecordWriter {
    /// Start a new, empty output file.
    pub fn create(path: &Path) -> Result<Self, OutputError> {
        Ok(Self::from_file(File::create(path)?))
    }

    /// Continue an existing output file.
    pub fn append(path: &Path) -> Result<Self, OutputError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: File) -> Self {
        Self {
            out: BufWriter::new(file),
            written: 0,
        }
    }

    pub fn write(&mut self, record: &OutputRecord) -> Result<(), OutputError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.out.write_all(line.as_bytes())?;
        self.out.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Records written through this writer (not counting any kept prefix).
    pub fn written(&self) -> u64 {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> OutputRecord {
        OutputRecord {
            name: name.into(),
            genre: (vec![], vec![]),
            mood: (vec![], vec![]),
            key: None,
            time_signature: None,
            tempo: (None, None),
            duration: (10, "short fragment".into()),
            chord_summary: (None, 0),
            mapped_instruments_summary: vec![],
            mapped_instruments: vec![],
            sorted_instruments: vec![],
            chords: vec![],
        }
    }

    #[test]
    fn one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let mut writer = RecordWriter::create(&path).unwrap();
        writer.write(&record("a.mid")).unwrap();
        writer.write(&record("b.mid")).unwrap();
        assert_eq!(writer.written(), 2);

        // Flushed per record, readable while the writer is still open
        let text = std::fs::read_to_string(&path).unwrap();
        let names: Vec<String> = text
            .lines()
            .map(|l| serde_json::from_str::<OutputRecord>(l).unwrap().name)
            .collect();
        assert_eq!(names, vec!["a.mid", "b.mid"]);
    }

    #[test]
    fn append_keeps_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "{\"name\":\"kept.mid\"}\n").unwrap();

        let mut writer = RecordWriter::append(&path).unwrap();
        writer.write(&record("new.mid")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("{\"name\":\"kept.mid\"}\n{\"name\":\"new.mid\""));
    }
}
