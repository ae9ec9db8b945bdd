use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use corelib::models::{RawConfig, StoredConfig};
use tokio::sync::Mutex;
use tracing::debug;

/// Persistence for the operator's settings.
#[async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    /// The saved settings, or defaults when nothing was saved yet.
    async fn load(&self) -> anyhow::Result<StoredConfig>;

    async fn save(&self, config: &StoredConfig) -> anyhow::Result<()>;

    /// Forgets the pending scheduled instant, keeping everything else.
    async fn clear_schedule(&self) -> anyhow::Result<()> {
        let mut config = self.load().await?;
        if config.scheduled_execution_time.take().is_some() {
            self.save(&config).await?;
        }
        Ok(())
    }
}

/// Settings kept in a single JSON file, in the operator-facing encoding.
pub struct JsonFileStore {
    path: PathBuf,
    // Serialises read-modify-write cycles.
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> anyhow::Result<StoredConfig> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no saved settings; using defaults");
                return Ok(StoredConfig::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };

        let raw: RawConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(StoredConfig::try_from(raw)?)
    }

    async fn write(&self, config: &StoredConfig) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }

        let json = serde_json::to_vec_pretty(&RawConfig::from(config))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn load(&self) -> anyhow::Result<StoredConfig> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn save(&self, config: &StoredConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        self.write(config).await
    }

    async fn clear_schedule(&self) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut config = self.read().await?;
        if config.scheduled_execution_time.take().is_some() {
            self.write(&config).await?;
        }
        Ok(())
    }
}
