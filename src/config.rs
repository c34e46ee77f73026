//! Configuration module for Conforma.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::benchmark::BenchConfig;
use crate::error::{ConformaError, Result};
use crate::inference::InferenceConfig;
use crate::registry::RegistryConfig;
use crate::serving::ServingConfig;
use crate::vocab::VocabConfig;

/// Main configuration for a Conforma service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConformaConfig {
    /// Tokenizer settings used when fitting a vocabulary.
    pub vocab: VocabConfig,
    /// Fixed topology dimensions.
    pub model: ModelSettings,
    /// Model registry configuration.
    pub registry: RegistryConfig,
    /// Scoring engine configuration.
    pub inference: InferenceConfig,
    /// HTTP endpoint configuration.
    pub serving: ServingConfig,
    /// Latency benchmark configuration.
    pub bench: BenchConfig,
}

impl ConformaConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConformaError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ConformaError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.vocab.max_words == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "vocab.max_words".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.model.seq_len == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "model.seq_len".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.model.seq_len > MAX_SEQ_LEN {
            return Err(ConformaError::InvalidConfig {
                field: "model.seq_len".to_string(),
                reason: format!("must be at most {}", MAX_SEQ_LEN),
            });
        }
        if self.model.embed_dim == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "model.embed_dim".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.model.hidden_dim == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "model.hidden_dim".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }

        if self.registry.max_versions == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "registry.max_versions".to_string(),
                reason: "must keep at least 1 version".to_string(),
            });
        }
        if self.registry.max_artifact_bytes == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "registry.max_artifact_bytes".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }

        if self.inference.max_concurrent == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "inference.max_concurrent".to_string(),
                reason: "must admit at least 1 request".to_string(),
            });
        }
        if self.inference.timeout_ms == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "inference.timeout_ms".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.inference.decision_threshold) {
            return Err(ConformaError::InvalidConfig {
                field: "inference.decision_threshold".to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }

        if self.serving.port == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "serving.port".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.serving.max_body_bytes == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "serving.max_body_bytes".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.serving.request_timeout_ms == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "serving.request_timeout_ms".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }

        if self.bench.measure_iters == 0 {
            return Err(ConformaError::InvalidConfig {
                field: "bench.measure_iters".to_string(),
                reason: "must measure at least 1 iteration".to_string(),
            });
        }

        Ok(())
    }

    /// Create a minimal development configuration.
    pub fn development() -> Self {
        Self {
            vocab: VocabConfig {
                max_words: 5_000,
                oov_token: Some("<oov>".to_string()),
                ..VocabConfig::default()
            },
            model: ModelSettings::default(),
            registry: RegistryConfig {
                root: std::path::PathBuf::from("/tmp/conforma/registry"),
                ..RegistryConfig::default()
            },
            inference: InferenceConfig::default(),
            serving: ServingConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                ..ServingConfig::default()
            },
            bench: BenchConfig::default(),
        }
    }
}

/// Hard cap on padded sequence length.
const MAX_SEQ_LEN: usize = 4096;

/// Fixed topology dimensions expected of loaded weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Padded sequence length.
    pub seq_len: usize,
    /// Embedding vector width.
    pub embed_dim: usize,
    /// Hidden dense layer width.
    pub hidden_dim: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            seq_len: 100,
            embed_dim: 50,
            hidden_dim: 16,
        }
    }
}
