// Versioned on-disk model registry

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::artifact::{Artifact, Manifest};
use crate::error::{ConformaError, Result};

const MANIFEST_FILE: &str = "registry.json";
const ARTIFACT_FILE: &str = "model.cfa";

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Root directory for artifacts and the registry manifest
    pub root: PathBuf,
    /// Maximum non-archived versions kept per model
    pub max_versions: usize,
    /// Maximum artifact size in bytes
    pub max_artifact_bytes: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/registry"),
            max_versions: 10,
            max_artifact_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Model status in registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// Ready for deployment
    Ready,
    /// Currently deployed
    Deployed,
    /// Deprecated
    Deprecated,
    /// Archived past the version cap
    Archived,
}

/// One registered model version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Version number, monotonically increasing per model name
    pub version: u32,
    /// Artifact manifest
    pub manifest: Manifest,
    /// Status
    pub status: ModelStatus,
    /// Created timestamp ms
    pub created_at: u64,
    /// Deployed timestamp ms
    pub deployed_at: Option<u64>,
    /// Deprecated timestamp ms
    pub deprecated_at: Option<u64>,
    /// Artifact path relative to the registry root
    pub artifact_path: String,
    /// Artifact size in bytes
    pub size_bytes: u64,
}

/// Per-model bookkeeping persisted in the registry manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ModelEntry {
    /// Next version number to assign; never decreases
    next_version: u32,
    /// Currently deployed version
    deployed: Option<u32>,
    versions: Vec<ModelVersion>,
}

/// On-disk index of every model and version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryManifest {
    models: HashMap<String, ModelEntry>,
}

/// Registry statistics
#[derive(Debug, Default)]
pub struct RegistryStats {
    pub models_registered: AtomicU64,
    pub total_versions: AtomicU64,
    pub models_deployed: AtomicU64,
    pub storage_bytes: AtomicU64,
    pub downloads: AtomicU64,
}

/// Statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStatsSnapshot {
    pub models_registered: u64,
    pub total_versions: u64,
    pub models_deployed: u64,
    pub storage_bytes: u64,
    pub downloads: u64,
}

/// Persistent versioned store of model artifacts.
///
/// Layout under the configured root:
///
/// ```text
/// registry.json            index of every model and version
/// <name>/v<N>/model.cfa    one artifact per registered version
/// ```
///
/// The index is rewritten atomically (temp file + rename) before any
/// mutating call returns, so the in-memory state and the on-disk manifest
/// never diverge.
pub struct ModelRegistry {
    config: RegistryConfig,
    inner: Arc<RwLock<RegistryManifest>>,
    stats: Arc<RegistryStats>,
}

impl ModelRegistry {
    /// Opens (or creates) a registry rooted at `config.root`.
    pub fn open(config: RegistryConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        let manifest_path = config.root.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            let json = fs::read_to_string(&manifest_path)?;
            serde_json::from_str(&json)?
        } else {
            RegistryManifest::default()
        };

        let stats = RegistryStats::default();
        let mut total_versions = 0u64;
        let mut deployed = 0u64;
        let mut storage = 0u64;
        for entry in manifest.models.values() {
            total_versions += entry.versions.len() as u64;
            if entry.deployed.is_some() {
                deployed += 1;
            }
            storage += entry.versions.iter().map(|v| v.size_bytes).sum::<u64>();
        }
        stats
            .models_registered
            .store(manifest.models.len() as u64, Ordering::Relaxed);
        stats.total_versions.store(total_versions, Ordering::Relaxed);
        stats.models_deployed.store(deployed, Ordering::Relaxed);
        stats.storage_bytes.store(storage, Ordering::Relaxed);

        info!(
            root = %config.root.display(),
            models = manifest.models.len(),
            versions = total_versions,
            "opened model registry"
        );
        Ok(Self {
            config,
            inner: Arc::new(RwLock::new(manifest)),
            stats: Arc::new(stats),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Registers a new version of the artifact's model.
    pub async fn register(&self, artifact: &Artifact) -> Result<u32> {
        let name = artifact.manifest.name.clone();
        validate_name(&name)?;

        let bytes = artifact.to_bytes()?;
        let size = bytes.len() as u64;
        if size > self.config.max_artifact_bytes {
            return Err(ConformaError::ArtifactTooLarge {
                size,
                limit: self.config.max_artifact_bytes,
            });
        }

        let mut inner = self.inner.write().await;
        let mut next = inner.clone();
        let entry = next.models.entry(name.clone()).or_insert_with(|| ModelEntry {
            next_version: 1,
            ..ModelEntry::default()
        });
        let version = entry.next_version;
        entry.next_version += 1;

        let rel_path = format!("{}/v{}/{}", name, version, ARTIFACT_FILE);
        let abs_path = self.config.root.join(&rel_path);
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&abs_path, &bytes)?;

        entry.versions.push(ModelVersion {
            version,
            manifest: artifact.manifest.clone(),
            status: ModelStatus::Ready,
            created_at: now_ms(),
            deployed_at: None,
            deprecated_at: None,
            artifact_path: rel_path,
            size_bytes: size,
        });

        // Archive the oldest undeployed versions past the cap. The version
        // registered just now is never a candidate, even when everything
        // older is deployed and the cap cannot be met.
        let active = entry
            .versions
            .iter()
            .filter(|v| v.status != ModelStatus::Archived)
            .count();
        if active > self.config.max_versions {
            let mut excess = active - self.config.max_versions;
            for v in entry.versions.iter_mut() {
                if excess == 0 {
                    break;
                }
                if v.version != version
                    && matches!(v.status, ModelStatus::Ready | ModelStatus::Deprecated)
                {
                    v.status = ModelStatus::Archived;
                    excess -= 1;
                }
            }
        }

        self.persist(&next)?;
        *inner = next;

        self.stats.total_versions.fetch_add(1, Ordering::Relaxed);
        if version == 1 {
            self.stats.models_registered.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.storage_bytes.fetch_add(size, Ordering::Relaxed);
        info!(model = %name, version, size_bytes = size, "registered model version");
        Ok(version)
    }

    /// Gets a model version (latest when `version` is None).
    pub async fn get(&self, name: &str, version: Option<u32>) -> Option<ModelVersion> {
        let inner = self.inner.read().await;
        let entry = inner.models.get(name)?;
        match version {
            Some(v) => entry.versions.iter().find(|mv| mv.version == v).cloned(),
            None => entry.versions.iter().max_by_key(|mv| mv.version).cloned(),
        }
    }

    /// Gets the latest version
    pub async fn latest(&self, name: &str) -> Option<ModelVersion> {
        self.get(name, None).await
    }

    /// Lists all model names, sorted
    pub async fn list_models(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner.models.keys().cloned().collect();
        names.sort();
        names
    }

    /// Lists versions for a model, oldest first
    pub async fn list_versions(&self, name: &str) -> Vec<ModelVersion> {
        let inner = self.inner.read().await;
        inner
            .models
            .get(name)
            .map(|e| e.versions.clone())
            .unwrap_or_default()
    }

    /// Deploys a version. Any previously deployed version of the same
    /// model returns to Ready.
    pub async fn deploy(&self, name: &str, version: u32) -> Result<()> {
        let mut inner = self.inner.write().await;
        let mut next = inner.clone();
        let entry = next
            .models
            .get_mut(name)
            .ok_or_else(|| ConformaError::NotFound(format!("model {}", name)))?;

        let idx = entry
            .versions
            .iter()
            .position(|v| v.version == version)
            .ok_or_else(|| ConformaError::NotFound(format!("{}:v{}", name, version)))?;
        let status = entry.versions[idx].status;
        if status != ModelStatus::Ready && status != ModelStatus::Deployed {
            return Err(ConformaError::InvalidOperation(format!(
                "cannot deploy {}:v{} with status {:?}",
                name, version, status
            )));
        }

        let newly_deployed = entry.deployed != Some(version);
        if let Some(current) = entry.deployed {
            if current != version {
                if let Some(v) = entry.versions.iter_mut().find(|v| v.version == current) {
                    v.status = ModelStatus::Ready;
                    v.deployed_at = None;
                }
            }
        }
        entry.versions[idx].status = ModelStatus::Deployed;
        entry.versions[idx].deployed_at = Some(now_ms());
        let was_undeployed = entry.deployed.is_none();
        entry.deployed = Some(version);

        self.persist(&next)?;
        *inner = next;

        if was_undeployed && newly_deployed {
            self.stats.models_deployed.fetch_add(1, Ordering::Relaxed);
        }
        info!(model = %name, version, "deployed model version");
        Ok(())
    }

    /// Undeploys a model. Returns whether anything was deployed.
    pub async fn undeploy(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let mut next = inner.clone();
        let Some(entry) = next.models.get_mut(name) else {
            return Ok(false);
        };
        let Some(version) = entry.deployed.take() else {
            return Ok(false);
        };
        if let Some(v) = entry.versions.iter_mut().find(|v| v.version == version) {
            v.status = ModelStatus::Ready;
            v.deployed_at = None;
        }

        self.persist(&next)?;
        *inner = next;
        self.stats.models_deployed.fetch_sub(1, Ordering::Relaxed);
        info!(model = %name, version, "undeployed model");
        Ok(true)
    }

    /// Marks a version deprecated. The deployed version must be undeployed
    /// first.
    pub async fn deprecate(&self, name: &str, version: u32) -> Result<()> {
        let mut inner = self.inner.write().await;
        let mut next = inner.clone();
        let entry = next
            .models
            .get_mut(name)
            .ok_or_else(|| ConformaError::NotFound(format!("model {}", name)))?;
        if entry.deployed == Some(version) {
            return Err(ConformaError::InvalidOperation(format!(
                "cannot deprecate deployed version {}:v{}",
                name, version
            )));
        }
        let v = entry
            .versions
            .iter_mut()
            .find(|v| v.version == version)
            .ok_or_else(|| ConformaError::NotFound(format!("{}:v{}", name, version)))?;
        v.status = ModelStatus::Deprecated;
        v.deprecated_at = Some(now_ms());

        self.persist(&next)?;
        *inner = next;
        Ok(())
    }

    /// Deletes a version and its artifact directory. The deployed version
    /// cannot be deleted. Returns whether anything was removed.
    pub async fn delete(&self, name: &str, version: u32) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let mut next = inner.clone();
        let Some(entry) = next.models.get_mut(name) else {
            return Ok(false);
        };
        if entry.deployed == Some(version) {
            return Err(ConformaError::InvalidOperation(format!(
                "cannot delete deployed version {}:v{}",
                name, version
            )));
        }
        let Some(pos) = entry.versions.iter().position(|v| v.version == version) else {
            return Ok(false);
        };
        let removed = entry.versions.remove(pos);
        let drop_model = entry.versions.is_empty();
        if drop_model {
            next.models.remove(name);
        }

        self.persist(&next)?;
        *inner = next;

        // Manifest no longer references the version; now drop the files.
        let version_dir = self.config.root.join(name).join(format!("v{}", version));
        if let Err(e) = fs::remove_dir_all(&version_dir) {
            warn!(path = %version_dir.display(), error = %e, "failed to remove version directory");
        }
        if drop_model {
            let model_dir = self.config.root.join(name);
            if let Err(e) = fs::remove_dir_all(&model_dir) {
                warn!(path = %model_dir.display(), error = %e, "failed to remove model directory");
            }
            self.stats.models_registered.fetch_sub(1, Ordering::Relaxed);
        }
        self.stats.total_versions.fetch_sub(1, Ordering::Relaxed);
        self.stats
            .storage_bytes
            .fetch_sub(removed.size_bytes, Ordering::Relaxed);
        info!(model = %name, version, "deleted model version");
        Ok(true)
    }

    /// Reads a registered artifact back from disk.
    pub async fn load_artifact(&self, name: &str, version: Option<u32>) -> Result<Artifact> {
        let mv = self.get(name, version).await.ok_or_else(|| {
            ConformaError::NotFound(match version {
                Some(v) => format!("{}:v{}", name, v),
                None => format!("model {}", name),
            })
        })?;
        let artifact = Artifact::read(self.config.root.join(&mv.artifact_path))?;
        self.stats.downloads.fetch_add(1, Ordering::Relaxed);
        Ok(artifact)
    }

    /// Gets the deployed version for a model
    pub async fn get_deployed(&self, name: &str) -> Option<ModelVersion> {
        let inner = self.inner.read().await;
        let entry = inner.models.get(name)?;
        let version = entry.deployed?;
        entry.versions.iter().find(|v| v.version == version).cloned()
    }

    /// Lists all deployed models
    pub async fn list_deployed(&self) -> Vec<(String, ModelVersion)> {
        let inner = self.inner.read().await;
        let mut result = Vec::new();
        for (name, entry) in inner.models.iter() {
            if let Some(version) = entry.deployed {
                if let Some(v) = entry.versions.iter().find(|v| v.version == version) {
                    result.push((name.clone(), v.clone()));
                }
            }
        }
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Gets statistics
    pub fn stats(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            models_registered: self.stats.models_registered.load(Ordering::Relaxed),
            total_versions: self.stats.total_versions.load(Ordering::Relaxed),
            models_deployed: self.stats.models_deployed.load(Ordering::Relaxed),
            storage_bytes: self.stats.storage_bytes.load(Ordering::Relaxed),
            downloads: self.stats.downloads.load(Ordering::Relaxed),
        }
    }

    // Atomic manifest rewrite: temp file in the same directory, then
    // rename over the old one.
    fn persist(&self, manifest: &RegistryManifest) -> Result<()> {
        let path = self.config.root.join(MANIFEST_FILE);
        let tmp = self.config.root.join(format!("{}.tmp", MANIFEST_FILE));
        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains(['/', '\\', ':'])
        || name == "."
        || name == ".."
    {
        return Err(ConformaError::InvalidInput(format!(
            "invalid model name: {:?}",
            name
        )));
    }
    Ok(())
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
