//! Reading config files from disk.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::types::{RelayFileConfig, ServiceConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {} as {format}: {message}", path.display())]
    Parse {
        path: PathBuf,
        format: Format,
        message: String,
    },
    #[error("{}: expected a .json, .jsonc, .yaml, .yml or .toml file", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("invalid config: {0}")]
    Validation(String),
}

impl ConfigError {
    #[inline]
    pub fn error_type(&self) -> &'static str {
        spacekit_core::ERROR_CONFIG
    }
}

/// Config file syntax, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON; `//` and `/* */` comments are stripped first.
    Json,
    Yaml,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" | "jsonc" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    fn parse<T: DeserializeOwned>(self, text: &str) -> Result<T, String> {
        match self {
            Self::Json => {
                serde_json::from_reader(json_comments::StripComments::new(text.as_bytes()))
                    .map_err(|e| e.to_string())
            }
            Self::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
        })
    }
}

/// Deserialize `path` into any config type.
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let format =
        Format::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    format.parse(&text).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        format,
        message,
    })
}

pub fn load_service_config(path: impl AsRef<Path>) -> Result<ServiceConfig, ConfigError> {
    load_config(path)
}

pub fn load_relay_config(path: impl AsRef<Path>) -> Result<RelayFileConfig, ConfigError> {
    load_config(path)
}
