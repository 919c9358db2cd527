//! Settings loaded from YAML
//!
//! The layout mirrors the operator's `settings.yaml`:
//!
//! ```yaml
//! writ:
//!   mode: open
//!   shell: /bin/sh
//!   default_timeout_secs: 600
//! output:
//!   stream: true
//!   buffer_size: 50
//! secrets:
//!   sources: [env, dotenv]
//!   env_keys: [DEPLOY_TOKEN]
//!   dotenv_path: .env
//!   mask_in_output: true
//! variables:
//!   target: staging
//! ```

use crate::core::{error::ConfigError, security::SecurityMode};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub writ: ReplSettings,

    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub secrets: SecretSettings,

    /// Configuration-layer variables
    #[serde(default)]
    variables: HashMap<String, Value>,
}

/// Dispatcher behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplSettings {
    /// `open` or `strict`
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Shell used to run every command (`<shell> -c <command>`)
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Timeout applied when a command or step does not declare one
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
}

/// Output capture and display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Echo output live while a command runs
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Keep results in the replay buffer
    #[serde(default = "default_true")]
    pub capture: bool,

    /// Replay buffer capacity
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

/// Secret loading and masking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretSettings {
    /// Enabled sources, in load order
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Environment variables loaded as secrets by the `env` source
    #[serde(default)]
    pub env_keys: Vec<String>,

    /// Dotenv file read by the `dotenv` source
    #[serde(default = "default_dotenv_path")]
    pub dotenv_path: String,

    /// Let dotenv values win over environment values for the same key
    #[serde(default)]
    pub prefer_dotenv: bool,

    /// Mask secret values that appear inside non-secret variables on display.
    /// Secret values in command output are masked regardless.
    #[serde(default = "default_true")]
    pub mask_in_output: bool,
}

/// A place secrets are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Env,
    Dotenv,
}

fn default_mode() -> String {
    "open".to_string()
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_true() -> bool {
    true
}

fn default_buffer_size() -> usize {
    50
}

fn default_sources() -> Vec<String> {
    vec!["env".to_string(), "dotenv".to_string()]
}

fn default_dotenv_path() -> String {
    ".env".to_string()
}

impl Default for ReplSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            shell: default_shell(),
            default_timeout_secs: None,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            stream: true,
            capture: true,
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            env_keys: Vec::new(),
            dotenv_path: default_dotenv_path(),
            prefer_dotenv: false,
            mask_in_output: true,
        }
    }
}

impl Settings {
    /// Parse and validate settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Check values serde cannot check
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.security_mode()?;
        self.secret_sources()?;
        if self.output.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        Ok(())
    }

    pub fn security_mode(&self) -> Result<SecurityMode, ConfigError> {
        self.writ.mode.parse()
    }

    pub fn secret_sources(&self) -> Result<Vec<SecretSource>, ConfigError> {
        self.secrets
            .sources
            .iter()
            .map(|s| match s.as_str() {
                "env" => Ok(SecretSource::Env),
                "dotenv" => Ok(SecretSource::Dotenv),
                other => Err(ConfigError::UnknownSecretSource(other.to_string())),
            })
            .collect()
    }

    pub fn dotenv_path(&self) -> PathBuf {
        expand_home(&self.secrets.dotenv_path)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.writ.default_timeout_secs.map(Duration::from_secs)
    }

    /// Configuration variables rendered as strings
    pub fn variables(&self) -> HashMap<String, String> {
        self.variables
            .iter()
            .map(|(key, value)| (key.clone(), render_value(value)))
            .collect()
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), Value::String(value.into()));
    }
}

pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
