//! Fixed network topology and the eager forward pass.
//!
//! Exactly one architecture is supported, matching the pretrained weights:
//!
//! ```text
//! ids[seq_len] -> Embedding(vocab_rows x embed_dim)
//!              -> mean pool over non-padding positions
//!              -> Dense(hidden_dim, ReLU)
//!              -> Dense(1), sigmoid -> probability of non-compliance
//! ```
//!
//! Weights are always loaded from a file, never fitted here.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConformaError, Result};

/// Dimensions of the fixed topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperparams {
    pub seq_len: usize,
    pub embed_dim: usize,
    pub hidden_dim: usize,
    pub vocab_rows: usize,
}

/// Pretrained weight blob.
///
/// Layouts: `embedding[vocab_rows][embed_dim]`,
/// `dense1_w[embed_dim][hidden_dim]`, `dense1_b[hidden_dim]`,
/// `dense2_w[hidden_dim]`, scalar `dense2_b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWeights {
    pub embedding: Vec<Vec<f32>>,
    pub dense1_w: Vec<Vec<f32>>,
    pub dense1_b: Vec<f32>,
    pub dense2_w: Vec<f32>,
    pub dense2_b: f32,
}

impl ModelWeights {
    /// Load a JSON weights file and validate its internal consistency.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            ConformaError::Config(format!("failed to read weights {}: {}", path.display(), e))
        })?;
        let weights: ModelWeights = serde_json::from_str(&json)?;
        weights.validate()?;
        info!(
            path = %path.display(),
            vocab_rows = weights.embedding.len(),
            embed_dim = weights.embed_dim(),
            hidden_dim = weights.hidden_dim(),
            "loaded model weights"
        );
        Ok(weights)
    }

    pub fn embed_dim(&self) -> usize {
        self.embedding.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn hidden_dim(&self) -> usize {
        self.dense1_b.len()
    }

    pub fn vocab_rows(&self) -> usize {
        self.embedding.len()
    }

    /// Check every tensor shape against the others. Each mismatch names
    /// the tensor and both shapes.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.is_empty() {
            return Err(ConformaError::WeightShape {
                tensor: "embedding".into(),
                expected: "at least 1 row".into(),
                actual: "0 rows".into(),
            });
        }
        let embed_dim = self.embedding[0].len();
        if embed_dim == 0 {
            return Err(ConformaError::WeightShape {
                tensor: "embedding".into(),
                expected: "non-zero row width".into(),
                actual: "0".into(),
            });
        }
        for (i, row) in self.embedding.iter().enumerate() {
            if row.len() != embed_dim {
                return Err(ConformaError::WeightShape {
                    tensor: format!("embedding[{}]", i),
                    expected: format!("{}", embed_dim),
                    actual: format!("{}", row.len()),
                });
            }
        }

        let hidden_dim = self.dense1_b.len();
        if hidden_dim == 0 {
            return Err(ConformaError::WeightShape {
                tensor: "dense1_b".into(),
                expected: "at least 1 unit".into(),
                actual: "0".into(),
            });
        }
        if self.dense1_w.len() != embed_dim {
            return Err(ConformaError::WeightShape {
                tensor: "dense1_w".into(),
                expected: format!("{}x{}", embed_dim, hidden_dim),
                actual: format!("{}x?", self.dense1_w.len()),
            });
        }
        for (i, row) in self.dense1_w.iter().enumerate() {
            if row.len() != hidden_dim {
                return Err(ConformaError::WeightShape {
                    tensor: format!("dense1_w[{}]", i),
                    expected: format!("{}", hidden_dim),
                    actual: format!("{}", row.len()),
                });
            }
        }
        if self.dense2_w.len() != hidden_dim {
            return Err(ConformaError::WeightShape {
                tensor: "dense2_w".into(),
                expected: format!("{}", hidden_dim),
                actual: format!("{}", self.dense2_w.len()),
            });
        }
        Ok(())
    }

    /// Replace the embedding table, e.g. with a pretrained-vector matrix.
    /// The new matrix must keep the input width of the first dense layer.
    pub fn set_embedding(&mut self, matrix: Vec<Vec<f32>>) -> Result<()> {
        let embed_dim = self.embed_dim();
        if matrix.is_empty() || matrix.iter().any(|r| r.len() != embed_dim) {
            return Err(ConformaError::WeightShape {
                tensor: "embedding".into(),
                expected: format!("Nx{}", embed_dim),
                actual: format!(
                    "{}x{}",
                    matrix.len(),
                    matrix.first().map(|r| r.len()).unwrap_or(0)
                ),
            });
        }
        self.embedding = matrix;
        Ok(())
    }

    /// Hyperparameters implied by these weights at a given sequence length.
    pub fn hyperparams(&self, seq_len: usize) -> Hyperparams {
        Hyperparams {
            seq_len,
            embed_dim: self.embed_dim(),
            hidden_dim: self.hidden_dim(),
            vocab_rows: self.vocab_rows(),
        }
    }
}

/// Eager layer-by-layer scorer over loaded weights.
#[derive(Debug, Clone)]
pub struct ScoringModel {
    weights: ModelWeights,
    seq_len: usize,
}

impl ScoringModel {
    pub fn new(weights: ModelWeights, seq_len: usize) -> Result<Self> {
        if seq_len == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "model.seq_len".into(),
                reason: "must be at least 1".into(),
            });
        }
        weights.validate()?;
        Ok(Self { weights, seq_len })
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn weights(&self) -> &ModelWeights {
        &self.weights
    }

    pub fn hyperparams(&self) -> Hyperparams {
        self.weights.hyperparams(self.seq_len)
    }

    /// Score a padded id sequence. Returns the probability that the text
    /// is non-compliant.
    pub fn predict_ids(&self, ids: &[u32]) -> Result<f32> {
        if ids.len() != self.seq_len {
            return Err(ConformaError::InputLength {
                expected: self.seq_len,
                actual: ids.len(),
            });
        }
        let rows = self.weights.embedding.len();
        for &id in ids {
            if id as usize >= rows {
                return Err(ConformaError::TokenOutOfRange {
                    id: id as i64,
                    rows,
                });
            }
        }

        let pooled = self.mean_pool(ids);
        Ok(self.dense_forward(&pooled))
    }

    /// Wire-format entry point: token ids carried as floats, rounded to
    /// the nearest id.
    pub fn predict_padded(&self, data: &[f32]) -> Result<f32> {
        if data.len() != self.seq_len {
            return Err(ConformaError::InputLength {
                expected: self.seq_len,
                actual: data.len(),
            });
        }
        let ids = ids_from_floats(data, self.weights.embedding.len())?;
        self.predict_ids(&ids)
    }

    // Mean of embedding rows over non-padding positions. All-padding input
    // pools to the zero vector.
    fn mean_pool(&self, ids: &[u32]) -> Vec<f32> {
        let embed_dim = self.weights.embed_dim();
        let mut pooled = vec![0.0f32; embed_dim];
        let mut count = 0u32;
        for &id in ids {
            if id == 0 {
                continue;
            }
            for (acc, v) in pooled.iter_mut().zip(&self.weights.embedding[id as usize]) {
                *acc += v;
            }
            count += 1;
        }
        if count > 0 {
            let inv = 1.0 / count as f32;
            for acc in &mut pooled {
                *acc *= inv;
            }
        }
        pooled
    }

    fn dense_forward(&self, pooled: &[f32]) -> f32 {
        let mut hidden = self.weights.dense1_b.clone();
        for (i, &x) in pooled.iter().enumerate() {
            for (h, w) in hidden.iter_mut().zip(&self.weights.dense1_w[i]) {
                *h += x * w;
            }
        }
        let mut logit = self.weights.dense2_b;
        for (h, w) in hidden.iter().zip(&self.weights.dense2_w) {
            logit += relu(*h) * w;
        }
        sigmoid(logit)
    }
}

/// Round one wire float to a token id, rejecting non-finite and
/// out-of-range values.
pub(crate) fn float_to_id(f: f32, vocab_rows: usize) -> Result<u32> {
    if !f.is_finite() {
        return Err(ConformaError::InvalidInput(format!(
            "non-finite token id: {}",
            f
        )));
    }
    let rounded = f.round();
    if rounded < 0.0 || rounded >= vocab_rows as f32 {
        return Err(ConformaError::TokenOutOfRange {
            id: rounded as i64,
            rows: vocab_rows,
        });
    }
    Ok(rounded as u32)
}

pub(crate) fn ids_from_floats(data: &[f32], vocab_rows: usize) -> Result<Vec<u32>> {
    data.iter().map(|&f| float_to_id(f, vocab_rows)).collect()
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub(crate) fn relu(x: f32) -> f32 {
    x.max(0.0)
}
