use crate::motif::Motif;
use crate::stages::{ChordEvent, Tags};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Distinct instrument names kept in the summary view.
pub const SUMMARY_CAP: usize = 5;

/// Column of the instrument table holding the display name.
pub const DISPLAY_NAME_COLUMN: usize = 3;

const CLASSICAL_MARKS: [u32; 8] = [40, 60, 70, 90, 110, 140, 160, 210];
const CLASSICAL_LABELS: [&str; 9] = [
    "Grave", "Largo", "Adagio", "Andante", "Moderato", "Allegro", "Vivace", "Presto", "Prestissimo",
];
const COLLOQUIAL_MARKS: [u32; 3] = [80, 120, 160];
const COLLOQUIAL_LABELS: [&str; 4] = ["Slow", "Moderate tempo", "Fast", "Very fast"];

const DURATION_MARKS: [u32; 3] = [30, 120, 300];
const DURATION_LABELS: [&str; 4] = ["short fragment", "short song", "song", "long piece"];

#[derive(Error, Debug)]
pub enum InstrumentMapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Instrument table row {row} has no display-name column")]
    ShortRow { row: usize },
}

/// Program id → display name, read from a CSV table whose row index is the
/// program id.
#[derive(Debug, Clone)]
pub struct InstrumentMap {
    names: Vec<String>,
}

impl InstrumentMap {
    pub fn load(path: &Path) -> Result<Self, InstrumentMapError> {
        let text = std::fs::read_to_string(path)?;
        let map = Self::parse(&text)?;
        log::info!("Instrument table: {} programs from {}", map.names.len(), path.display());
        Ok(map)
    }

    pub fn parse(text: &str) -> Result<Self, InstrumentMapError> {
        let names = text
            .lines()
            .enumerate()
            .map(|(row, line)| {
                split_csv_row(line)
                    .into_iter()
                    .nth(DISPLAY_NAME_COLUMN)
                    .ok_or(InstrumentMapError::ShortRow { row })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { names })
    }

    pub fn name(&self, program: u8) -> Option<&str> {
        self.names.get(usize::from(program)).map(String::as_str)
    }

    /// Display names for ranked program ids, in the same order. Ids missing
    /// from the table are logged and left out.
    pub fn display_names(&self, programs: &[u8]) -> Vec<String> {
        programs
            .iter()
            .filter_map(|&program| match self.name(program) {
                Some(name) => Some(name.to_string()),
                None => {
                    log::warn!("Program {} not in instrument table", program);
                    None
                }
            })
            .collect()
    }
}

/// Split one CSV line, honoring double-quoted fields and `""` escapes.
fn split_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// First occurrence of each name, capped at [`SUMMARY_CAP`].
pub fn summarize_instruments(names: &[String]) -> Vec<String> {
    let mut summary: Vec<String> = Vec::with_capacity(SUMMARY_CAP);
    for name in names {
        if summary.len() == SUMMARY_CAP {
            break;
        }
        if !summary.contains(name) {
            summary.push(name.clone());
        }
    }
    summary
}

/// The two tempo wordings. Each record uses one, picked at random, so the
/// dataset sees both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempoVocabulary {
    /// Italian tempo markings, Grave through Prestissimo.
    Classical,
    /// Slow / Moderate tempo / Fast / Very fast.
    Colloquial,
}

impl TempoVocabulary {
    pub fn choose<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            Self::Classical
        } else {
            Self::Colloquial
        }
    }

    pub fn label(self, bpm: u32) -> &'static str {
        match self {
            Self::Classical => bucket(bpm, &CLASSICAL_MARKS, &CLASSICAL_LABELS),
            Self::Colloquial => bucket(bpm, &COLLOQUIAL_MARKS, &COLLOQUIAL_LABELS),
        }
    }
}

/// Label index = number of marks strictly below `value`.
fn bucket(value: u32, marks: &[u32], labels: &[&'static str]) -> &'static str {
    labels[marks.iter().filter(|&&mark| value > mark).count()]
}

pub fn duration_label(seconds: u32) -> &'static str {
    bucket(seconds, &DURATION_MARKS, &DURATION_LABELS)
}

/// "B- minor" → "Bb minor".
pub fn normalize_key(key: &str) -> String {
    key.replace('-', "b")
}

/// One annotated file, as written to the output.
///
/// Field order is the output column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub name: String,
    pub genre: (Vec<String>, Vec<f64>),
    pub mood: (Vec<String>, Vec<f64>),
    pub key: Option<String>,
    pub time_signature: Option<String>,
    pub tempo: (Option<u32>, Option<String>),
    pub duration: (u32, String),
    pub chord_summary: (Option<Vec<String>>, usize),
    pub mapped_instruments_summary: Vec<String>,
    pub mapped_instruments: Vec<String>,
    pub sorted_instruments: Vec<u8>,
    pub chords: Vec<(String, f64)>,
}

/// Everything the stages produced for one file. Optional stages that
/// failed are `None` (or empty).
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub name: String,
    pub duration_secs: f64,
    pub genre: Tags,
    pub mood: Tags,
    /// Recognized chords with the boundary events already trimmed.
    pub chords: Vec<ChordEvent>,
    pub motif: Option<Motif>,
    pub instruments: Vec<u8>,
    /// Key as spelled by the detector, e.g. "E- major".
    pub key: Option<String>,
    pub time_signature: Option<String>,
    pub bpm: Option<f64>,
}

pub fn assemble<R: Rng + ?Sized>(
    analysis: Analysis,
    instruments: &InstrumentMap,
    rng: &mut R,
) -> OutputRecord {
    let mapped = instruments.display_names(&analysis.instruments);
    let summary = summarize_instruments(&mapped);

    let tempo = match analysis.bpm.map(|bpm| bpm.round()) {
        Some(bpm) if bpm.is_finite() && bpm >= 0.0 => {
            let bpm = bpm as u32;
            let label = TempoVocabulary::choose(rng).label(bpm);
            (Some(bpm), Some(label.to_string()))
        }
        _ => (None, None),
    };

    let seconds = analysis.duration_secs.round().max(0.0) as u32;

    let chord_summary = match analysis.motif {
        Some(motif) => (motif.chords, motif.count),
        None => (None, 0),
    };

    OutputRecord {
        name: analysis.name,
        genre: (analysis.genre.names, analysis.genre.scores),
        mood: (analysis.mood.names, analysis.mood.scores),
        key: analysis.key.as_deref().map(normalize_key),
        time_signature: analysis.time_signature,
        tempo,
        duration: (seconds, duration_label(seconds).to_string()),
        chord_summary,
        mapped_instruments_summary: summary,
        mapped_instruments: mapped,
        sorted_instruments: analysis.instruments,
        chords: analysis
            .chords
            .into_iter()
            .map(|c| (c.symbol, c.timestamp))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TABLE: &str = "\
0,Acoustic Grand Piano,Piano,Piano
1,Bright Acoustic Piano,Piano,Piano
2,\"Guitar, Nylon\",Guitar,\"Acoustic Guitar\"
3,Drawbar Organ,Organ,Organ
";

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duration_buckets() {
        assert_eq!(duration_label(25), "short fragment");
        assert_eq!(duration_label(30), "short fragment");
        assert_eq!(duration_label(31), "short song");
        assert_eq!(duration_label(120), "short song");
        assert_eq!(duration_label(121), "song");
        assert_eq!(duration_label(300), "song");
        assert_eq!(duration_label(301), "long piece");
    }

    #[test]
    fn classical_tempo_labels() {
        let v = TempoVocabulary::Classical;
        assert_eq!(v.label(30), "Grave");
        assert_eq!(v.label(40), "Grave");
        assert_eq!(v.label(41), "Largo");
        assert_eq!(v.label(100), "Moderato");
        assert_eq!(v.label(120), "Allegro");
        assert_eq!(v.label(200), "Presto");
        assert_eq!(v.label(240), "Prestissimo");
    }

    #[test]
    fn colloquial_tempo_labels() {
        let v = TempoVocabulary::Colloquial;
        assert_eq!(v.label(80), "Slow");
        assert_eq!(v.label(100), "Moderate tempo");
        assert_eq!(v.label(140), "Fast");
        assert_eq!(v.label(161), "Very fast");
    }

    #[test]
    fn both_vocabularies_get_chosen() {
        let mut rng = StdRng::seed_from_u64(42);
        let picks: Vec<_> = (0..64).map(|_| TempoVocabulary::choose(&mut rng)).collect();
        assert!(picks.contains(&TempoVocabulary::Classical));
        assert!(picks.contains(&TempoVocabulary::Colloquial));
    }

    #[test]
    fn summary_dedups_and_caps() {
        let full = names(&["Piano", "Bass", "Piano", "Drums", "Strings", "Bass", "Brass", "Organ", "Synth"]);
        assert_eq!(
            summarize_instruments(&full),
            names(&["Piano", "Bass", "Drums", "Strings", "Brass"])
        );
        assert_eq!(summarize_instruments(&names(&["Piano", "Piano"])), names(&["Piano"]));
    }

    #[test]
    fn seven_distinct_names_keep_first_five() {
        let full = names(&["A", "B", "C", "D", "E", "F", "G"]);
        assert_eq!(summarize_instruments(&full), names(&["A", "B", "C", "D", "E"]));
    }

    #[test]
    fn key_spelling_normalized() {
        assert_eq!(normalize_key("B- minor"), "Bb minor");
        assert_eq!(normalize_key("F# major"), "F# major");
    }

    #[test]
    fn instrument_table_by_row_index() {
        let map = InstrumentMap::parse(TABLE).unwrap();
        assert_eq!(map.name(0), Some("Piano"));
        assert_eq!(map.name(2), Some("Acoustic Guitar"));
        assert_eq!(map.name(4), None);
        assert_eq!(map.display_names(&[3, 0, 9, 1]), names(&["Organ", "Piano", "Piano"]));
    }

    #[test]
    fn short_table_row_rejected() {
        let err = InstrumentMap::parse("0,Piano,Piano,Piano\n1,Organ\n").unwrap_err();
        assert!(matches!(err, InstrumentMapError::ShortRow { row: 1 }));
    }

    #[test]
    fn csv_quotes_and_escapes() {
        assert_eq!(split_csv_row(r#"a,"b,c","say ""hi""""#), names(&["a", "b,c", "say \"hi\""]));
        assert_eq!(split_csv_row("x,y\r"), names(&["x", "y"]));
    }

    #[test]
    fn assembled_record_serializes_in_column_order() {
        let map = InstrumentMap::parse(TABLE).unwrap();
        let analysis = Analysis {
            name: "midi/song.mid".into(),
            duration_secs: 95.4,
            genre: Tags { names: names(&["pop"]), scores: vec![0.41] },
            mood: Tags::default(),
            chords: vec![ChordEvent::new("C", 1.0), ChordEvent::new("G", 2.5)],
            motif: Some(Motif { chords: Some(names(&["C", "G"])), count: 1 }),
            instruments: vec![3, 0, 3],
            key: Some("E- major".into()),
            time_signature: Some("4/4".into()),
            bpm: Some(119.6),
        };
        let record = assemble(analysis, &map, &mut StdRng::seed_from_u64(1));

        assert_eq!(record.key.as_deref(), Some("Eb major"));
        assert_eq!(record.tempo.0, Some(120));
        let label = record.tempo.1.clone().unwrap();
        assert!(label == "Allegro" || label == "Moderate tempo");
        assert_eq!(record.duration, (95, "short song".to_string()));
        assert_eq!(record.mapped_instruments, names(&["Organ", "Piano", "Organ"]));
        assert_eq!(record.mapped_instruments_summary, names(&["Organ", "Piano"]));

        let json = serde_json::to_string(&record).unwrap();
        let order = [
            "\"name\"", "\"genre\"", "\"mood\"", "\"key\"", "\"time_signature\"", "\"tempo\"",
            "\"duration\"", "\"chord_summary\"", "\"mapped_instruments_summary\"",
            "\"mapped_instruments\"", "\"sorted_instruments\"", "\"chords\"",
        ];
        let positions: Vec<usize> = order.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(json.contains(r#""genre":[["pop"],[0.41]]"#));
        assert!(json.contains(r#""chord_summary":[["C","G"],1]"#));
        assert!(json.contains(r#""chords":[["C",1.0],["G",2.5]]"#));
    }

    #[test]
    fn missing_optional_fields_are_null() {
        let map = InstrumentMap::parse(TABLE).unwrap();
        let analysis = Analysis {
            name: "x.mid".into(),
            duration_secs: 10.0,
            ..Default::default()
        };
        let record = assemble(analysis, &map, &mut StdRng::seed_from_u64(1));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["key"], serde_json::Value::Null);
        assert_eq!(json["tempo"], serde_json::json!([null, null]));
        assert_eq!(json["chord_summary"], serde_json::json!([null, 0]));
        assert_eq!(json["sorted_instruments"], serde_json::json!([]));
    }
}
