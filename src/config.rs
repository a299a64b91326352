use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `base_dir`
pub const BASE_DIR_ENV: &str = "TEMP_DIR";

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root for staging files and extracted archives
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default)]
    pub detection: Detection,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// How the archive format of a download is decided.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Detection {
    /// Trailing extension of the URL path only
    #[default]
    Extension,
    /// Magic bytes of the staged file, falling back to the extension
    Content,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl FetchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Origins allowed by CORS; empty means any
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("zipinfo"))
        .unwrap_or_else(|| PathBuf::from("tmp"))
}

fn default_user_agent() -> String {
    format!("zipinfo/{}", env!("CARGO_PKG_VERSION"))
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            detection: Detection::default(),
            fetch: FetchConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Build a config rooted at `base_dir` with every other field defaulted
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from an optional TOML file, then apply the
    /// `TEMP_DIR` override.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                Self::parse(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Some(dir) = std::env::var_os(BASE_DIR_ENV).filter(|v| !v.is_empty()) {
            config.base_dir = PathBuf::from(dir);
        }

        if config.base_dir.is_relative() {
            let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
            config.base_dir = cwd.join(&config.base_dir);
        }

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Directory holding in-flight downloads
    pub fn staging_dir(&self) -> PathBuf {
        self.base_dir.join("staging")
    }

    /// Directory holding one extracted tree per fingerprint
    pub fn expand_dir(&self) -> PathBuf {
        self.base_dir.join("expand")
    }
}
