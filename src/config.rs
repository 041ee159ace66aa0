//! Review tool settings, read from a TOML file and overridable on the
//! command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::bandwidth::DEFAULT_MARK_COUNT;
use crate::data::loader::RecordFormat;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "specmod-review.toml";

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Filter string understood by `env_logger`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Directory holding one sub-directory per event.
    #[serde(default = "default_parent_dir")]
    pub parent_dir: PathBuf,

    /// Encoding of the per-event record files.
    #[serde(default)]
    pub format: RecordFormat,

    /// Number of slider marks.
    #[serde(default = "default_mark_count")]
    pub mark_count: usize,

    /// Used when `RUST_LOG` is not set.
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_parent_dir() -> PathBuf {
    PathBuf::from("Events")
}

fn default_mark_count() -> usize {
    DEFAULT_MARK_COUNT
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            parent_dir: default_parent_dir(),
            format: RecordFormat::default(),
            mark_count: default_mark_count(),
            log_level: LogLevel::default(),
        }
    }
}

impl ReviewConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing review config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Load `path` if given (it must exist), else the default file if it
    /// exists, else built-in defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
