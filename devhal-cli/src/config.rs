// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use devhal_udisks::{AccessSettings, PromptSettings, UNMOUNT_TIMEOUT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LoggingLevel,
    pub log_to_disk: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub media_roots: Vec<String>,
    pub match_home: bool,
    pub unmount_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_roots: vec!["/media/".into(), "/run/media/".into()],
            match_home: true,
            unmount_timeout_ms: UNMOUNT_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    pub service: String,
    pub path: String,
    pub interface: String,
    pub return_path_prefix: String,
    pub app_id: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        let defaults = PromptSettings::default();
        Self {
            service: defaults.service,
            path: defaults.path,
            interface: defaults.interface,
            return_path_prefix: defaults.return_path_prefix,
            app_id: defaults.app_id,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub prompt: PromptConfig,
}

impl Config {
    /// Reads `path`, or the default location when `None`. A missing file
    /// yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path(),
        };

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        Self::parse(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn access_settings(&self) -> AccessSettings {
        let defaults = AccessSettings::default();
        AccessSettings {
            media_roots: self.storage.media_roots.clone(),
            home_dir: if self.storage.match_home {
                defaults.home_dir
            } else {
                None
            },
            unmount_timeout: Duration::from_millis(self.storage.unmount_timeout_ms),
        }
    }

    pub fn prompt_settings(&self) -> PromptSettings {
        PromptSettings {
            service: self.prompt.service.clone(),
            path: self.prompt.path.clone(),
            interface: self.prompt.interface.clone(),
            return_path_prefix: self.prompt.return_path_prefix.clone(),
            app_id: self.prompt.app_id.clone(),
            ..PromptSettings::default()
        }
    }
}

fn default_config_path() -> PathBuf {
    if let Some(xdg_config) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config).join("devhal").join("config.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("devhal")
            .join("config.toml");
    }

    PathBuf::from("/etc/devhal/config.toml")
}
