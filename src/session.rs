//! Prepared inference session.
//!
//! The session is the fast path: weights are flattened into contiguous
//! buffers once at load, and every call runs a single fused traversal. A
//! caller-held [`Scratch`] can be reused across calls to keep the hot loop
//! allocation-free. Output is numerically identical to the eager
//! [`ScoringModel`](crate::model::ScoringModel) path.

use crate::artifact::Artifact;
use crate::error::{ConformaError, Result};
use crate::model::{float_to_id, relu, sigmoid};
use crate::vocab::Vocabulary;

/// Reusable intermediate buffers for one session.
#[derive(Debug, Clone)]
pub struct Scratch {
    pooled: Vec<f32>,
    hidden: Vec<f32>,
}

impl Scratch {
    pub fn for_session(session: &InferenceSession) -> Self {
        Self {
            pooled: vec![0.0; session.embed_dim],
            hidden: vec![0.0; session.hidden_dim],
        }
    }
}

/// Flattened, ready-to-run model loaded from an artifact.
#[derive(Debug)]
pub struct InferenceSession {
    name: String,
    model_id: String,
    seq_len: usize,
    embed_dim: usize,
    hidden_dim: usize,
    vocab_rows: usize,
    embedding: Vec<f32>,
    dense1_w: Vec<f32>,
    dense1_b: Vec<f32>,
    dense2_w: Vec<f32>,
    dense2_b: f32,
    vocab: Vocabulary,
}

impl InferenceSession {
    pub fn from_artifact(artifact: &Artifact) -> Result<Self> {
        artifact.weights.validate()?;
        let hp = artifact.manifest.hyperparams;

        let mut embedding = Vec::with_capacity(hp.vocab_rows * hp.embed_dim);
        for row in &artifact.weights.embedding {
            embedding.extend_from_slice(row);
        }
        let mut dense1_w = Vec::with_capacity(hp.embed_dim * hp.hidden_dim);
        for row in &artifact.weights.dense1_w {
            dense1_w.extend_from_slice(row);
        }

        Ok(Self {
            name: artifact.manifest.name.clone(),
            model_id: artifact.manifest.model_id.clone(),
            seq_len: hp.seq_len,
            embed_dim: hp.embed_dim,
            hidden_dim: hp.hidden_dim,
            vocab_rows: hp.vocab_rows,
            embedding,
            dense1_w,
            dense1_b: artifact.weights.dense1_b.clone(),
            dense2_w: artifact.weights.dense2_w.clone(),
            dense2_b: artifact.weights.dense2_b,
            vocab: artifact.vocab.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Score a wire-format input (token ids as floats).
    pub fn run(&self, data: &[f32]) -> Result<f32> {
        let mut scratch = Scratch::for_session(self);
        self.run_with(data, &mut scratch)
    }

    /// Score a wire-format input reusing caller-held scratch buffers.
    pub fn run_with(&self, data: &[f32], scratch: &mut Scratch) -> Result<f32> {
        if data.len() != self.seq_len {
            return Err(ConformaError::InputLength {
                expected: self.seq_len,
                actual: data.len(),
            });
        }
        let rows = self.vocab_rows;
        self.score_checked(data.iter().map(|&f| float_to_id(f, rows)), scratch)
    }

    /// Score an already-padded id sequence.
    pub fn run_ids(&self, ids: &[u32]) -> Result<f32> {
        let mut scratch = Scratch::for_session(self);
        self.run_ids_with(ids, &mut scratch)
    }

    pub fn run_ids_with(&self, ids: &[u32], scratch: &mut Scratch) -> Result<f32> {
        if ids.len() != self.seq_len {
            return Err(ConformaError::InputLength {
                expected: self.seq_len,
                actual: ids.len(),
            });
        }
        let rows = self.vocab_rows;
        self.score_checked(
            ids.iter().map(|&id| {
                if (id as usize) < rows {
                    Ok(id)
                } else {
                    Err(ConformaError::TokenOutOfRange {
                        id: id as i64,
                        rows,
                    })
                }
            }),
            scratch,
        )
    }

    /// Tokenize, pad, and score raw text through the bundled vocabulary.
    pub fn run_text(&self, text: &str) -> Result<f32> {
        let ids = self.vocab.encode_padded(text, self.seq_len);
        self.run_ids(&ids)
    }

    // Fused mean-pool + dense forward over pre-checked ids. Operation
    // order matches the eager path exactly so outputs are bit-identical.
    fn score_checked<I>(&self, ids: I, scratch: &mut Scratch) -> Result<f32>
    where
        I: Iterator<Item = Result<u32>>,
    {
        scratch.pooled.fill(0.0);
        let mut count = 0u32;
        for id in ids {
            let id = id? as usize;
            if id == 0 {
                continue;
            }
            let row = &self.embedding[id * self.embed_dim..(id + 1) * self.embed_dim];
            for (acc, v) in scratch.pooled.iter_mut().zip(row) {
                *acc += v;
            }
            count += 1;
        }
        if count > 0 {
            let inv = 1.0 / count as f32;
            for acc in &mut scratch.pooled {
                *acc *= inv;
            }
        }

        scratch.hidden.copy_from_slice(&self.dense1_b);
        for (i, &x) in scratch.pooled.iter().enumerate() {
            let row = &self.dense1_w[i * self.hidden_dim..(i + 1) * self.hidden_dim];
            for (h, w) in scratch.hidden.iter_mut().zip(row) {
                *h += x * w;
            }
        }
        let mut logit = self.dense2_b;
        for (h, w) in scratch.hidden.iter().zip(&self.dense2_w) {
            logit += relu(*h) * w;
        }
        Ok(sigmoid(logit))
    }
}
