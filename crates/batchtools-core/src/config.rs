//! Configuration file loading.
//!
//! The file is TOML. It is looked up, in order, at an explicit path, at
//! `$BATCHTOOLS_CONFIG`, and at `<config dir>/batchtools/config.toml`.
//! Only the last one may be missing.

use batchtools_parsers::parse_duration_secs;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use thiserror::Error;

use crate::system::BatchSystem;

const APP_DIR_NAME: &str = "batchtools";
const CONFIG_FILE_NAME: &str = "config.toml";
pub const CONFIG_ENV_VAR: &str = "BATCHTOOLS_CONFIG";
const DEFAULT_SLEEP_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file {0} does not exist")]
    NotFound(Utf8PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid run limit '{value}' for queue '{queue}'")]
    InvalidRunlimit { queue: String, value: String },
    #[error("Config path is not valid UTF-8: {0}")]
    NonUtf8Path(String),
}

/// A raw scheduler option value: `true` is a bare flag, `false` drops it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Flag(bool),
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Default queue (LSF) or partition (SLURM)
    pub queue: Option<String>,
    /// Options added to every submission, in key order
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
}

impl SchedulerConfig {
    /// Options as `(key, value)` pairs for the submission builders.
    pub fn option_pairs(&self) -> Vec<(String, Option<String>)> {
        self.options
            .iter()
            .filter_map(|(key, value)| match value {
                OptionValue::Flag(true) => Some((key.clone(), None)),
                OptionValue::Flag(false) => None,
                OptionValue::Int(n) => Some((key.clone(), Some(n.to_string()))),
                OptionValue::Text(s) => Some((key.clone(), Some(s.clone()))),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Wait before submitting while this many jobs are queued
    pub max_jobs: Option<usize>,
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,
}

fn default_sleep_secs() -> u64 {
    DEFAULT_SLEEP_SECS
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_jobs: None,
            sleep_secs: DEFAULT_SLEEP_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    /// Where the local job registry lives
    pub state_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default batch system; detected when unset
    pub batch: Option<BatchSystem>,
    /// Default job name
    pub jobname: Option<String>,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub lsf: SchedulerConfig,
    #[serde(default)]
    pub slurm: SchedulerConfig,
    #[serde(default)]
    pub local: LocalConfig,
    /// Queue name to wall-clock limit, e.g. `long = "47:59:00"`
    #[serde(default)]
    pub runlimits: BTreeMap<String, String>,
}

impl Config {
    /// Parse and validate a config document.
    pub fn from_toml_str(content: &str, path: &Utf8Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        for (queue, value) in &config.runlimits {
            if parse_duration_secs(value).is_none() {
                return Err(ConfigError::InvalidRunlimit {
                    queue: queue.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(config)
    }

    /// Load the configuration, or defaults when no file is present.
    pub fn load(explicit: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let env_path = match std::env::var_os(CONFIG_ENV_VAR) {
            Some(raw) => Some(
                raw.into_string()
                    .map_err(|raw| ConfigError::NonUtf8Path(raw.to_string_lossy().into_owned()))?,
            ),
            None => None,
        };
        let Some((path, required)) = resolve_path(explicit, env_path.as_deref()) else {
            return Ok(Config::default());
        };

        if !path.exists() {
            if required {
                return Err(ConfigError::NotFound(path));
            }
            tracing::debug!(%path, "no config file, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&content, &path)?;
        tracing::debug!(%path, "loaded config");
        Ok(config)
    }

    /// Configured run limit for a queue, in seconds.
    pub fn runlimit_secs(&self, queue: &str) -> Option<u64> {
        self.runlimits
            .get(queue)
            .and_then(|value| parse_duration_secs(value))
    }

    /// Directory holding the local job registry.
    pub fn state_dir(&self) -> Utf8PathBuf {
        if let Some(dir) = &self.local.state_dir {
            return expand_home(dir);
        }
        dirs::data_local_dir()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .unwrap_or_else(|| {
                Utf8PathBuf::from_path_buf(std::env::temp_dir())
                    .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
            })
            .join(APP_DIR_NAME)
    }
}

/// Config file path and whether it must exist.
fn resolve_path(explicit: Option<&Utf8Path>, env_value: Option<&str>) -> Option<(Utf8PathBuf, bool)> {
    if let Some(path) = explicit {
        return Some((expand_home(path), true));
    }
    if let Some(value) = env_value.filter(|v| !v.trim().is_empty()) {
        return Some((expand_home(Utf8Path::new(value.trim())), true));
    }
    default_config_path().map(|path| (path, false))
}

fn default_config_path() -> Option<Utf8PathBuf> {
    let dir = dirs::config_dir()?;
    let dir = Utf8PathBuf::from_path_buf(dir).ok()?;
    Some(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &Utf8Path) -> Utf8PathBuf {
    let home = dirs::home_dir().and_then(|h| Utf8PathBuf::from_path_buf(h).ok());
    match (path.as_str(), home) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        _ => path.to_path_buf(),
    }
}
