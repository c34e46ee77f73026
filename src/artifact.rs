//! Portable model artifact.
//!
//! A single self-describing file bundling everything needed to score:
//! manifest, vocabulary, and weights. Layout on disk:
//!
//! ```text
//! [0..4)  magic "CFMA"
//! [4..8)  format version, u32 little-endian
//! [8..]   bincode (Manifest, payload bytes)
//! ```
//!
//! The payload is itself bincode `(Vocabulary, ModelWeights)`; its SHA-256
//! digest is recorded in the manifest and verified on read.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::error::{ConformaError, Result};
use crate::model::{Hyperparams, ModelWeights};
use crate::vocab::Vocabulary;

/// File magic for Conforma artifacts.
pub const MAGIC: [u8; 4] = *b"CFMA";

/// Current artifact format version.
pub const FORMAT_VERSION: u32 = 1;

/// Element type of a tensor endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Float32,
    Float64,
    Int32,
    Int64,
}

impl DataType {
    pub fn size_bytes(&self) -> usize {
        match self {
            DataType::Float32 | DataType::Int32 => 4,
            DataType::Float64 | DataType::Int64 => 8,
        }
    }
}

/// Shape and type of a model input or output. `-1` marks the batch
/// dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub dtype: DataType,
    pub shape: Vec<i64>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, dtype: DataType, shape: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
        }
    }

    /// Elements per item, ignoring the batch dimension.
    pub fn element_count(&self) -> usize {
        self.shape
            .iter()
            .filter(|&&d| d > 0)
            .product::<i64>() as usize
    }
}

/// Self-description of an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub model_id: String,
    pub name: String,
    pub version: String,
    pub created_at_ms: u64,
    pub input: TensorSpec,
    pub output: TensorSpec,
    pub hyperparams: Hyperparams,
    pub payload_sha256: String,
    pub description: Option<String>,
    pub metrics: HashMap<String, f64>,
}

/// A packaged model: manifest + vocabulary + weights.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub manifest: Manifest,
    pub vocab: Vocabulary,
    pub weights: ModelWeights,
}

impl Artifact {
    /// Bundle validated weights and a vocabulary into an artifact.
    pub fn package(
        name: impl Into<String>,
        weights: ModelWeights,
        vocab: Vocabulary,
        seq_len: usize,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains(['/', ':']) {
            return Err(ConformaError::InvalidInput(format!(
                "model name must be non-empty without '/' or ':', got {:?}",
                name
            )));
        }
        if seq_len == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "model.seq_len".into(),
                reason: "must be at least 1".into(),
            });
        }
        weights.validate()?;
        if vocab.rows() > weights.vocab_rows() {
            return Err(ConformaError::WeightShape {
                tensor: "embedding".into(),
                expected: format!(">= {} rows (vocabulary)", vocab.rows()),
                actual: format!("{} rows", weights.vocab_rows()),
            });
        }

        let payload = encode_payload(&vocab, &weights)?;
        let hyperparams = weights.hyperparams(seq_len);
        let manifest = Manifest {
            model_id: Uuid::new_v4().to_string(),
            name,
            version: "1.0.0".to_string(),
            created_at_ms: now_ms(),
            input: TensorSpec::new("token_ids", DataType::Float32, vec![-1, seq_len as i64]),
            output: TensorSpec::new("probability", DataType::Float32, vec![-1, 1]),
            hyperparams,
            payload_sha256: hex_digest(&payload),
            description: None,
            metrics: HashMap::new(),
        };
        Ok(Self {
            manifest,
            vocab,
            weights,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.manifest.description = Some(description.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.manifest.metrics.insert(key.into(), value);
        self
    }

    /// Serialize to the on-disk layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = encode_payload(&self.vocab, &self.weights)?;
        let body = bincode::serialize(&(&self.manifest, &payload))?;
        let mut out = Vec::with_capacity(body.len() + 8);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode and fully verify an artifact: magic, format version, payload
    /// digest, and manifest/shape consistency.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(ConformaError::ArtifactCorrupt(format!(
                "truncated header: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..4] != MAGIC {
            return Err(ConformaError::ArtifactMagic);
        }
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(version_bytes);
        if version != FORMAT_VERSION {
            return Err(ConformaError::ArtifactVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }

        let (manifest, payload): (Manifest, Vec<u8>) = bincode::deserialize(&bytes[8..])
            .map_err(|e| ConformaError::ArtifactCorrupt(format!("bad body: {}", e)))?;

        let actual = hex_digest(&payload);
        if actual != manifest.payload_sha256 {
            return Err(ConformaError::DigestMismatch {
                expected: manifest.payload_sha256,
                actual,
            });
        }

        let (vocab, weights): (Vocabulary, ModelWeights) = bincode::deserialize(&payload)
            .map_err(|e| ConformaError::ArtifactCorrupt(format!("bad payload: {}", e)))?;

        let artifact = Self {
            manifest,
            vocab,
            weights,
        };
        artifact.cross_validate()?;
        Ok(artifact)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path.as_ref(), &bytes)?;
        info!(
            path = %path.as_ref().display(),
            name = %self.manifest.name,
            size_bytes = bytes.len(),
            "wrote artifact"
        );
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    pub fn seq_len(&self) -> usize {
        self.manifest.hyperparams.seq_len
    }

    // Manifest and payload must agree on every dimension.
    fn cross_validate(&self) -> Result<()> {
        self.weights.validate()?;
        let hp = &self.manifest.hyperparams;
        let actual = self.weights.hyperparams(hp.seq_len);
        if *hp != actual {
            return Err(ConformaError::ArtifactCorrupt(format!(
                "manifest hyperparams {:?} disagree with weights {:?}",
                hp, actual
            )));
        }
        if self.vocab.rows() > self.weights.vocab_rows() {
            return Err(ConformaError::ArtifactCorrupt(format!(
                "vocabulary needs {} embedding rows, weights have {}",
                self.vocab.rows(),
                self.weights.vocab_rows()
            )));
        }
        let expected_input = vec![-1, hp.seq_len as i64];
        if self.manifest.input.shape != expected_input {
            return Err(ConformaError::ArtifactCorrupt(format!(
                "input spec {:?} disagrees with seq_len {}",
                self.manifest.input.shape, hp.seq_len
            )));
        }
        Ok(())
    }
}

fn encode_payload(vocab: &Vocabulary, weights: &ModelWeights) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&(vocab, weights))?)
}

fn hex_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
