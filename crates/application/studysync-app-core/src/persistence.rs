use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use studysync_core::DataSnapshot;
use tracing::debug;

use crate::ports::LocalDataSource;

const QUALIFIER: &str = "com";
const ORG: &str = "studysync";
const APP: &str = "studysync";

/// Connection and behaviour settings persisted between CLI runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<Utf8PathBuf>,
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

fn default_debounce_secs() -> u64 {
    studysync_config::DEFAULT_AUTO_SYNC_DEBOUNCE.as_secs()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            user: None,
            local_path: None,
            auto_sync: true,
            debounce_secs: default_debounce_secs(),
            last_sync: None,
        }
    }
}

impl ClientConfig {
    pub const KEYS: [&'static str; 6] = [
        "endpoint",
        "api-key",
        "user",
        "local",
        "auto-sync",
        "debounce-secs",
    ];

    /// Set one value by its CLI key. An empty value clears optional keys.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let opt = || (!value.is_empty()).then(|| value.to_string());
        match key {
            "endpoint" => self.endpoint = opt(),
            "api-key" => self.api_key = opt(),
            "user" => self.user = opt(),
            "local" => self.local_path = opt().map(Utf8PathBuf::from),
            "auto-sync" => {
                self.auto_sync = value
                    .parse()
                    .with_context(|| format!("auto-sync expects true or false, got {value:?}"))?
            }
            "debounce-secs" => {
                self.debounce_secs = value
                    .parse()
                    .with_context(|| format!("debounce-secs expects seconds, got {value:?}"))?
            }
            other => bail!(
                "unknown config key {other:?} (expected one of: {})",
                Self::KEYS.join(", ")
            ),
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        studysync_config::clamp_debounce(Duration::from_secs(self.debounce_secs))
    }
}

/// Loads and saves `config.json` in the platform config directory.
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn from_project_dirs() -> Result<Self> {
        let proj_dirs = ProjectDirs::from(QUALIFIER, ORG, APP)
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(Self::at(proj_dirs.config_dir()))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    pub fn load(&self) -> Result<ClientConfig> {
        let path = self.path();
        if !path.exists() {
            return Ok(ClientConfig::default());
        }
        let content = fs::read_to_string(&path).context("Failed to read config")?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, config: &ClientConfig) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let json = serde_json::to_string_pretty(config)?;
        atomic_write(&self.path(), json.as_bytes()).context("Failed to write config")
    }
}

/// Local study data kept as one JSON snapshot file.
#[derive(Debug, Clone)]
pub struct FileLocalStore {
    path: Utf8PathBuf,
}

impl FileLocalStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// A missing file is an empty snapshot.
    pub fn read(&self) -> Result<DataSnapshot> {
        if !self.path.exists() {
            debug!(path = %self.path, "no local data file, starting empty");
            return Ok(DataSnapshot::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read local data {}", self.path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid local data file {}", self.path))
    }

    pub fn write(&self, data: &DataSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(data)?;
        atomic_write(self.path.as_std_path(), json.as_bytes())
            .with_context(|| format!("Failed to write local data {}", self.path))
    }
}

#[async_trait::async_trait]
impl LocalDataSource for FileLocalStore {
    async fn load(&self) -> Result<DataSnapshot> {
        self.read()
    }
}

/// Write through a sibling `.tmp` file and rename it into place.
fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    {
        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(contents)
            .and_then(|()| file.sync_all())
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        if e.kind() != std::io::ErrorKind::AlreadyExists {
            fs::remove_file(&tmp).ok();
            return Err(e).with_context(|| format!("Failed to move {} into place", tmp.display()));
        }
        // Some platforms refuse to rename over an existing file.
        fs::remove_file(path).ok();
        fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    }
    Ok(())
}
