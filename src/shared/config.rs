use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration for git-porcelain.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// How git is invoked.
    #[serde(default)]
    pub git: GitConfig,

    /// Where temporary clones are created.
    #[serde(default, rename = "clone")]
    pub cloning: CloneConfig,
}

/// Git invocation settings.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GitConfig {
    /// Git executable name or path (default: "git").
    #[serde(default = "default_program")]
    pub program: String,

    /// Extra environment variables set on every git process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            env: BTreeMap::new(),
        }
    }
}

/// Temporary clone settings.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CloneConfig {
    /// Base directory for temporary clones (default: platform temp dir).
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Name prefix of temporary clone directories (default: "gogit").
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            temp_prefix: default_temp_prefix(),
        }
    }
}

fn default_program() -> String {
    "git".to_string()
}

fn default_temp_prefix() -> String {
    "gogit".to_string()
}

impl Config {
    /// Read and parse a YAML config file.
    ///
    /// A missing file is an error; callers that treat the file as optional
    /// check for it first or fall back to [`Config::default`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
