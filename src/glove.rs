//! Pretrained word-vector import.
//!
//! Reads the plain-text vector format (one token followed by its
//! whitespace-separated float components per line) and projects it onto a
//! fitted vocabulary to produce an embedding matrix.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConformaError, Result};
use crate::vocab::Vocabulary;

/// A parsed word-vector table.
#[derive(Debug, Clone)]
pub struct GloveFile {
    vectors: HashMap<String, Vec<f32>>,
    dim: usize,
}

/// How much of a vocabulary the vector table covered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoverageReport {
    pub hits: usize,
    pub misses: usize,
}

impl CoverageReport {
    /// Fraction of vocabulary words that had a pretrained vector.
    pub fn coverage(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl GloveFile {
    /// Parse a vector file from disk. Dimension is inferred from the first
    /// line.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ConformaError::Vocab(format!("failed to open {}: {}", path.display(), e))
        })?;
        let parsed = Self::parse(BufReader::new(file), None)?;
        info!(
            path = %path.display(),
            tokens = parsed.len(),
            dim = parsed.dim(),
            "loaded word vectors"
        );
        Ok(parsed)
    }

    /// Parse from any buffered reader.
    ///
    /// When `expected_dim` is given, every line must match it; otherwise
    /// the dimension is taken from the first line and enforced on the
    /// rest. Errors carry the 1-based line number.
    pub fn parse<R: BufRead>(reader: R, expected_dim: Option<usize>) -> Result<Self> {
        let mut vectors = HashMap::new();
        let mut dim = expected_dim;

        for (i, line) in reader.lines().enumerate() {
            let line_no = i + 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let mut parts = line.split_whitespace();
            let token = match parts.next() {
                Some(t) => t,
                None => continue,
            };
            let values = parts
                .map(|p| {
                    p.parse::<f32>().map_err(|_| ConformaError::VectorFormat {
                        line: line_no,
                        reason: format!("not a float: {:?}", p),
                    })
                })
                .collect::<Result<Vec<f32>>>()?;
            if values.is_empty() {
                return Err(ConformaError::VectorFormat {
                    line: line_no,
                    reason: "token without vector values".into(),
                });
            }

            match dim {
                None => dim = Some(values.len()),
                Some(d) if d != values.len() => {
                    return Err(ConformaError::VectorDimension {
                        expected: d,
                        actual: values.len(),
                        line: line_no,
                    });
                }
                Some(_) => {}
            }
            vectors.insert(token.to_string(), values);
        }

        let dim = dim.filter(|_| !vectors.is_empty()).ok_or_else(|| {
            ConformaError::VectorFormat {
                line: 1,
                reason: "file contains no vectors".into(),
            }
        })?;
        Ok(Self { vectors, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, token: &str) -> Option<&[f32]> {
        self.vectors.get(token).map(|v| v.as_slice())
    }

    /// Build an embedding matrix for a vocabulary.
    ///
    /// Row 0 (padding) and the OOV row stay zero. Words missing from the
    /// vector table also get zero rows and are counted as misses.
    pub fn embedding_matrix(
        &self,
        vocab: &Vocabulary,
        dim: usize,
    ) -> Result<(Vec<Vec<f32>>, CoverageReport)> {
        if dim != self.dim {
            return Err(ConformaError::VectorDimension {
                expected: dim,
                actual: self.dim,
                line: 0,
            });
        }

        let mut matrix = vec![vec![0.0f32; dim]; vocab.rows()];
        let mut hits = 0usize;
        let mut misses = 0usize;
        for (word, idx) in vocab.entries() {
            match self.vectors.get(word) {
                Some(vector) => {
                    matrix[idx as usize] = vector.clone();
                    hits += 1;
                }
                None => misses += 1,
            }
        }

        let report = CoverageReport { hits, misses };
        if report.coverage() < 0.5 {
            warn!(
                hits,
                misses,
                "less than half the vocabulary has pretrained vectors"
            );
        }
        Ok((matrix, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::VocabConfig;
    use std::io::Cursor;

    const SAMPLE: &str = "brake 0.1 0.2 0.3\nhose -1.0 0.5 2.5\nweld 0.0 0.0 1.0\n";

    #[test]
    fn test_parse_infers_dimension() {
        let g = GloveFile::parse(Cursor::new(SAMPLE), None).unwrap();
        assert_eq!(g.dim(), 3);
        assert_eq!(g.len(), 3);
        assert_eq!(g.get("hose"), Some(&[-1.0, 0.5, 2.5][..]));
    }

    #[test]
    fn test_dimension_mismatch_names_line() {
        let bad = "brake 0.1 0.2 0.3\nhose 1.0 2.0\n";
        let err = GloveFile::parse(Cursor::new(bad), None).unwrap_err();
        match err {
            ConformaError::VectorDimension {
                expected,
                actual,
                line,
            } => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_expected_dim_enforced_from_first_line() {
        let err = GloveFile::parse(Cursor::new(SAMPLE), Some(4)).unwrap_err();
        assert!(matches!(
            err,
            ConformaError::VectorDimension {
                expected: 4,
                actual: 3,
                line: 1
            }
        ));
    }

    #[test]
    fn test_bad_float_names_line() {
        let bad = "brake 0.1 0.2\nhose 0.3 oops\n";
        let err = GloveFile::parse(Cursor::new(bad), None).unwrap_err();
        assert!(matches!(err, ConformaError::VectorFormat { line: 2, .. }));
    }

    #[test]
    fn test_empty_file_rejected() {
        let err = GloveFile::parse(Cursor::new("\n\n"), None).unwrap_err();
        assert!(matches!(err, ConformaError::VectorFormat { .. }));
    }

    #[test]
    fn test_embedding_matrix_rows_and_coverage() {
        let g = GloveFile::parse(Cursor::new(SAMPLE), None).unwrap();
        let vocab = Vocabulary::fit(
            ["brake hose clamp"], // clamp has no pretrained vector
            VocabConfig::default(),
        )
        .unwrap();

        let (matrix, report) = g.embedding_matrix(&vocab, 3).unwrap();
        assert_eq!(matrix.len(), vocab.rows());
        assert_eq!(matrix[0], vec![0.0, 0.0, 0.0], "padding row stays zero");
        assert_eq!(report.hits, 2);
        assert_eq!(report.misses, 1);

        let brake_idx = vocab.get("brake").unwrap() as usize;
        assert_eq!(matrix[brake_idx], vec![0.1, 0.2, 0.3]);
        let clamp_idx = vocab.get("clamp").unwrap() as usize;
        assert_eq!(matrix[clamp_idx], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_embedding_matrix_dim_mismatch() {
        let g = GloveFile::parse(Cursor::new(SAMPLE), None).unwrap();
        let vocab = Vocabulary::fit(["brake"], VocabConfig::default()).unwrap();
        assert!(g.embedding_matrix(&vocab, 50).is_err());
    }
}
