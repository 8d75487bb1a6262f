//! Trained model sources and the on-disk model cache
//!
//! Handles downloading, verifying and caching of trained-model files. The
//! engine itself only ever sees opaque bytes.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ModelSettings;
use crate::error::{OcrError, OcrResult};

/// File extension of cached models
const MODEL_EXTENSION: &str = "traineddata";

/// Where a trained model comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Model already in memory
    Bytes(Vec<u8>),
    /// Model file on disk
    File(PathBuf),
    /// Model served over HTTP(S)
    Url(String),
}

impl ModelSource {
    /// Read or download the model into memory
    pub async fn fetch(&self) -> OcrResult<Vec<u8>> {
        match self {
            ModelSource::Bytes(bytes) => Ok(bytes.clone()),
            ModelSource::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| OcrError::ModelLoad(format!("failed to read {:?}: {}", path, e))),
            ModelSource::Url(url) => {
                debug!("Fetching model from {}", url);
                let response = reqwest::get(url)
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| OcrError::ModelLoad(format!("failed to fetch {}: {}", url, e)))?;
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| OcrError::ModelLoad(format!("failed to read {}: {}", url, e)))?;
                Ok(bytes.to_vec())
            }
        }
    }
}

/// Manifest tracking cached models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub version: String,
    pub models: Vec<ModelInfo>,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            models: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    /// Download URL, `None` for imported files
    pub source_url: Option<String>,
    /// Unix timestamp of the download
    pub downloaded_at: u64,
}

/// Progress callback for download operations (downloaded, total)
pub type DownloadProgressCallback = Box<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Cache of trained models on disk
pub struct ModelStore {
    models_dir: PathBuf,
    offline: bool,
    timeout: Duration,
}

impl ModelStore {
    /// Create a model store from settings, defaulting to the data directory
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let models_dir = match &settings.dir {
            Some(dir) => dir.clone(),
            None => crate::storage::get_data_dir()?.join("models"),
        };
        let mut store = Self::with_dir(models_dir)?;
        store.offline = settings.offline;
        store.timeout = Duration::from_secs(settings.download_timeout_secs);
        Ok(store)
    }

    /// Create a model store with a custom directory
    pub fn with_dir(models_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)
            .with_context(|| format!("Failed to create models directory {:?}", models_dir))?;
        Ok(Self {
            models_dir,
            offline: false,
            timeout: Duration::from_secs(300),
        })
    }

    /// Refuse downloads
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Get the models directory path
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Get the path of a named model
    pub fn model_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.models_dir.join(format!("{name}.{MODEL_EXTENSION}")))
    }

    /// Check if a model is cached
    pub fn is_available(&self, name: &str) -> bool {
        self.model_path(name)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// List cached models
    pub fn list(&self) -> Result<Vec<ModelInfo>> {
        Ok(self
            .load_manifest()?
            .models
            .into_iter()
            .filter(|m| self.is_available(&m.name))
            .collect())
    }

    /// Source for a cached model
    pub fn source(&self, name: &str) -> Result<ModelSource> {
        let path = self.model_path(name)?;
        if !path.is_file() {
            anyhow::bail!("Model '{}' is not cached at {:?}", name, path);
        }
        Ok(ModelSource::File(path))
    }

    /// Copy model bytes into the cache
    pub fn import(&self, name: &str, bytes: &[u8]) -> Result<ModelInfo> {
        let path = self.model_path(name)?;
        std::fs::write(&path, bytes).with_context(|| format!("Failed to write {:?}", path))?;
        self.record(name, bytes.len() as u64, sha256_hex(bytes), None)
    }

    /// Remove a cached model
    pub fn remove(&self, name: &str) -> Result<bool> {
        let path = self.model_path(name)?;
        let existed = path.is_file();
        if existed {
            std::fs::remove_file(&path)?;
        }

        let mut manifest = self.load_manifest()?;
        manifest.models.retain(|m| m.name != name);
        self.save_manifest(&manifest)?;
        Ok(existed)
    }

    /// Download a model if not already cached, returning its path
    pub async fn ensure_model(
        &self,
        name: &str,
        url: &str,
        expected_sha256: Option<&str>,
        progress: Option<DownloadProgressCallback>,
    ) -> Result<PathBuf> {
        let path = self.model_path(name)?;

        if path.is_file() {
            info!("Model '{}' already available at {:?}", name, path);
            return Ok(path);
        }

        if self.offline {
            anyhow::bail!(
                "Offline mode: cannot download model '{}'. Download it manually from {} and place it at {:?}",
                name,
                url,
                path
            );
        }

        info!("Downloading model '{}' from {}", name, url);
        let (size, hash) = self
            .download_file(url, &path, expected_sha256, progress)
            .await?;
        self.record(name, size, hash, Some(url.to_string()))?;

        info!("Successfully downloaded model '{}'", name);
        Ok(path)
    }

    async fn download_file(
        &self,
        url: &str,
        path: &Path,
        expected_sha256: Option<&str>,
        progress: Option<DownloadProgressCallback>,
    ) -> Result<(u64, String)> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .get(url)
            .send()
            .await
            .context("Failed to send download request")?;

        if !response.status().is_success() {
            anyhow::bail!("Download failed with status {}: {}", response.status(), url);
        }

        let total_size = response.content_length();
        debug!("Download size: {:?} bytes", total_size);

        let temp_path = path.with_extension("tmp");
        let (downloaded, hash) =
            match write_stream(response, &temp_path, total_size, progress.as_ref()).await {
                Ok(written) => written,
                Err(e) => {
                    std::fs::remove_file(&temp_path).ok();
                    return Err(e);
                }
            };

        if let Some(expected) = expected_sha256 {
            if !hash.eq_ignore_ascii_case(expected) {
                std::fs::remove_file(&temp_path).ok();
                anyhow::bail!("Checksum mismatch for {}: expected {}, got {}", url, expected, hash);
            }
            info!("Checksum verified for {}", url);
        }

        std::fs::rename(&temp_path, path)
            .context("Failed to move downloaded file to final location")?;

        Ok((downloaded, hash))
    }

    fn record(
        &self,
        name: &str,
        size_bytes: u64,
        sha256: String,
        source_url: Option<String>,
    ) -> Result<ModelInfo> {
        let mut manifest = self.load_manifest().unwrap_or_else(|e| {
            warn!("Discarding unreadable model manifest: {:#}", e);
            ModelManifest::default()
        });

        let info = ModelInfo {
            name: name.to_string(),
            filename: format!("{name}.{MODEL_EXTENSION}"),
            size_bytes,
            sha256,
            source_url,
            downloaded_at: unix_now(),
        };

        if let Some(existing) = manifest.models.iter_mut().find(|m| m.name == info.name) {
            *existing = info.clone();
        } else {
            manifest.models.push(info.clone());
        }

        self.save_manifest(&manifest)?;
        Ok(info)
    }

    /// Load the model manifest
    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.models_dir.join("manifest.json");
        if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)?;
            let manifest: ModelManifest = serde_json::from_str(&content)?;
            Ok(manifest)
        } else {
            Ok(ModelManifest::default())
        }
    }

    /// Save the model manifest
    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let manifest_path = self.models_dir.join("manifest.json");
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(manifest_path, content)?;
        Ok(())
    }
}

/// Stream a response body into `path`, returning its size and SHA-256
async fn write_stream(
    response: reqwest::Response,
    path: &Path,
    total_size: Option<u64>,
    progress: Option<&DownloadProgressCallback>,
) -> Result<(u64, String)> {
    let mut file = std::fs::File::create(path).context("Failed to create temp file")?;

    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        file.write_all(&chunk).context("Failed to write to temp file")?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;

        if let Some(callback) = progress {
            callback(downloaded, total_size);
        }
    }

    file.flush().context("Failed to flush temp file")?;
    Ok((downloaded, format!("{:x}", hasher.finalize())))
}

/// Model names become file names; keep them to a safe alphabet
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !name.starts_with('.');
    if !valid {
        anyhow::bail!("Invalid model name: {:?}", name);
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
