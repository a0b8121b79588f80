use crate::error::ConfigError;
use livepad_core::{BuildOptions, CdnConfig, GuardConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the optional config file looked up in the working directory.
pub const CONFIG_FILE: &str = "livepad.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub cdn: CdnConfig,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// External component compiler; component previews show a diagnostic
    /// until one is configured.
    #[serde(default)]
    pub compiler: Option<CompilerCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompilerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// A compile running longer than this is killed; `0` disables the limit.
    #[serde(default = "default_compiler_timeout_ms")]
    pub timeout_ms: u64,
}

impl CompilerCommand {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

fn default_compiler_timeout_ms() -> u64 {
    10_000
}

fn default_debounce_ms() -> u64 {
    150
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".livepad")
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            guard: GuardConfig::default(),
            cdn: CdnConfig::default(),
            storage_dir: default_storage_dir(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            compiler: None,
        }
    }
}

impl PreviewConfig {
    /// Reads `path`. A missing file yields the defaults; relative
    /// `storageDir` values resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg = serde_json::from_str::<Self>(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if cfg.debounce_ms == 0 {
            return Err(ConfigError::ZeroDebounce);
        }
        if !cfg.storage_dir.is_absolute() {
            if let Some(parent) = path.parent() {
                cfg.storage_dir = parent.join(&cfg.storage_dir);
            }
        }

        Ok(cfg)
    }

    /// Looks for [`CONFIG_FILE`] inside `root`.
    pub fn load_from_dir(root: &Path) -> Result<Self, ConfigError> {
        Self::load(&root.join(CONFIG_FILE))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.max(1))
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            guard: self.guard.clone(),
            cdn: self.cdn.clone(),
        }
    }
}
