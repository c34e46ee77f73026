//! Labeled text dataset loading.
//!
//! Conforma consumes a two-column CSV (`text`, `label`) of component
//! descriptions labeled compliant (0) or non-compliant (1). This module
//! parses that file into typed records and provides the train/holdout
//! split used by vocabulary fitting and offline evaluation.

use std::fmt;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConformaError, Result};

/// Binary compliance label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    /// Component description meets the regulatory wording rules.
    Compliant,
    /// Component description violates the regulatory wording rules.
    NonCompliant,
}

impl Label {
    /// Numeric encoding used in the CSV and in model targets.
    pub fn as_u8(&self) -> u8 {
        match self {
            Label::Compliant => 0,
            Label::NonCompliant => 1,
        }
    }

    /// Parse the CSV label column.
    ///
    /// Accepts `0`/`1` and the words `compliant`/`non-compliant`
    /// (case-insensitive, hyphen or underscore). Anything else is rejected
    /// with the offending data row number.
    pub fn parse(row: usize, raw: &str) -> Result<Self> {
        let norm = raw.trim().to_lowercase().replace('-', "_");
        match norm.as_str() {
            "0" | "compliant" => Ok(Label::Compliant),
            "1" | "non_compliant" | "noncompliant" => Ok(Label::NonCompliant),
            _ => Err(ConformaError::InvalidLabel {
                row,
                value: raw.trim().to_string(),
            }),
        }
    }

    /// Threshold a sigmoid output into a label.
    pub fn from_probability(p: f32, threshold: f32) -> Self {
        if p >= threshold {
            Label::NonCompliant
        } else {
            Label::Compliant
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Compliant => write!(f, "compliant"),
            Label::NonCompliant => write!(f, "non_compliant"),
        }
    }
}

/// One labeled description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub text: String,
    pub label: Label,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    text: String,
    label: String,
}

/// In-memory labeled dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Load a dataset from a headered CSV file with `text` and `label`
    /// columns.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| ConformaError::Dataset(format!("{}: {}", path.display(), e)))?;
        let ds = Self::from_reader(file, &path.display().to_string())?;
        info!(
            path = %path.display(),
            records = ds.len(),
            non_compliant = ds.summary().non_compliant,
            "loaded dataset"
        );
        Ok(ds)
    }

    /// Parse CSV from any reader. `source` only labels errors.
    ///
    /// Rows with an empty text field are skipped. Any unparseable label
    /// aborts the load with the 1-based data row number.
    pub fn from_reader<R: std::io::Read>(reader: R, source: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (idx, row) in reader.deserialize::<RawRecord>().enumerate() {
            let row_no = idx + 1;
            let raw = row?;
            if raw.text.is_empty() {
                skipped += 1;
                continue;
            }
            records.push(Record {
                label: Label::parse(row_no, &raw.label)?,
                text: raw.text,
            });
        }

        if records.is_empty() {
            return Err(ConformaError::EmptyDataset(source.to_string()));
        }
        if skipped > 0 {
            debug!(skipped, "skipped rows with empty text");
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over the raw text column, in file order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.text.as_str())
    }

    /// Shuffle with a fixed seed and split off an evaluation fraction.
    ///
    /// `eval_fraction` must be in `(0, 1)` and the dataset needs at least
    /// two records so both halves are non-empty.
    pub fn split(&self, eval_fraction: f64, seed: u64) -> Result<SplitDataset> {
        if !(eval_fraction > 0.0 && eval_fraction < 1.0) {
            return Err(ConformaError::InvalidInput(format!(
                "eval fraction must be in (0, 1), got {}",
                eval_fraction
            )));
        }
        if self.records.len() < 2 {
            return Err(ConformaError::InvalidInput(
                "cannot split a dataset with fewer than 2 records".into(),
            ));
        }
        let mut shuffled = self.records.clone();
        let mut rng = StdRng::seed_from_u64(seed);
        shuffled.shuffle(&mut rng);

        let eval_len = ((shuffled.len() as f64) * eval_fraction).round() as usize;
        let eval_len = eval_len.clamp(1, shuffled.len() - 1);
        let train = shuffled.split_off(eval_len);
        Ok(SplitDataset {
            train: Dataset::new(train),
            eval: Dataset::new(shuffled),
        })
    }

    /// Per-label counts, for log lines and sanity checks.
    pub fn summary(&self) -> DatasetSummary {
        let non_compliant = self
            .records
            .iter()
            .filter(|r| r.label == Label::NonCompliant)
            .count();
        DatasetSummary {
            total: self.records.len(),
            compliant: self.records.len() - non_compliant,
            non_compliant,
        }
    }
}

/// Label distribution of a dataset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total: usize,
    pub compliant: usize,
    pub non_compliant: usize,
}

/// Result of a deterministic train/eval split.
#[derive(Debug, Clone)]
pub struct SplitDataset {
    pub train: Dataset,
    pub eval: Dataset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_basic_csv() {
        let file = write_csv(
            "text,label\n\
             brake hose meets FMVSS 106,0\n\
             seat anchor weld untested,1\n",
        );
        let ds = Dataset::from_csv_path(file.path()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records()[0].label, Label::Compliant);
        assert_eq!(ds.records()[1].label, Label::NonCompliant);
        assert_eq!(ds.records()[0].text, "brake hose meets FMVSS 106");
    }

    #[test]
    fn test_label_word_forms() {
        let file = write_csv(
            "text,label\n\
             a,Compliant\n\
             b,non-compliant\n\
             c,NON_COMPLIANT\n",
        );
        let ds = Dataset::from_csv_path(file.path()).unwrap();
        assert_eq!(ds.records()[0].label, Label::Compliant);
        assert_eq!(ds.records()[1].label, Label::NonCompliant);
        assert_eq!(ds.records()[2].label, Label::NonCompliant);
    }

    #[test]
    fn test_skips_empty_text_rows() {
        let file = write_csv("text,label\n,0\nvalid row,1\n");
        let ds = Dataset::from_csv_path(file.path()).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.records()[0].text, "valid row");
    }

    #[test]
    fn test_quoted_multiline_text() {
        let file = write_csv("text,label\n\"line one\nline two\",1\n");
        let ds = Dataset::from_csv_path(file.path()).unwrap();
        assert_eq!(ds.len(), 1);
        assert!(ds.records()[0].text.contains('\n'));
    }

    #[test]
    fn test_rejects_bad_label_with_row_number() {
        let file = write_csv("text,label\nfine,0\nbroken,yes\n");
        let err = Dataset::from_csv_path(file.path()).unwrap_err();
        match err {
            ConformaError::InvalidLabel { row, value } => {
                assert_eq!(row, 2);
                assert_eq!(value, "yes");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let file = write_csv("text,label\n");
        let err = Dataset::from_csv_path(file.path()).unwrap_err();
        assert!(matches!(err, ConformaError::EmptyDataset(_)));
    }

    #[test]
    fn test_split_is_deterministic() {
        let records: Vec<Record> = (0..100)
            .map(|i| Record {
                text: format!("component {}", i),
                label: if i % 3 == 0 {
                    Label::NonCompliant
                } else {
                    Label::Compliant
                },
            })
            .collect();
        let ds = Dataset::new(records);

        let a = ds.split(0.2, 7).unwrap();
        let b = ds.split(0.2, 7).unwrap();
        assert_eq!(a.train.len(), 80);
        assert_eq!(a.eval.len(), 20);
        assert_eq!(
            a.train.records()[0].text,
            b.train.records()[0].text,
            "same seed must give the same split"
        );
        assert_eq!(a.eval.records()[5].text, b.eval.records()[5].text);
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let ds = Dataset::new(vec![Record {
            text: "x".into(),
            label: Label::Compliant,
        }]);
        assert!(ds.split(0.0, 1).is_err());
        assert!(ds.split(1.0, 1).is_err());
    }

    #[test]
    fn test_label_threshold() {
        assert_eq!(Label::from_probability(0.9, 0.5), Label::NonCompliant);
        assert_eq!(Label::from_probability(0.1, 0.5), Label::Compliant);
        assert_eq!(Label::from_probability(0.5, 0.5), Label::NonCompliant);
    }

    #[test]
    fn test_summary_counts() {
        let ds = Dataset::new(vec![
            Record {
                text: "a".into(),
                label: Label::Compliant,
            },
            Record {
                text: "b".into(),
                label: Label::NonCompliant,
            },
            Record {
                text: "c".into(),
                label: Label::NonCompliant,
            },
        ]);
        let s = ds.summary();
        assert_eq!(s.total, 3);
        assert_eq!(s.compliant, 1);
        assert_eq!(s.non_compliant, 2);
    }
}
