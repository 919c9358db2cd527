//! Secret storage and output masking

use crate::core::config::{SecretSource, Settings};
use crate::core::error::ConfigError;
use crate::variables::VariableSource;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

/// Placeholder written in place of any secret value
pub const MASK_TOKEN: &str = "***";

/// Loaded secrets plus the set of values masked in output
///
/// Values are only ever added to the masking set. Reloading replaces
/// what `get` returns for a key, but a value masked once stays masked for
/// the rest of the session.
#[derive(Debug, Default)]
pub struct SecretStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    values: BTreeMap<String, String>,
    /// Distinct values, longest first
    masks: Vec<String>,
}

impl Inner {
    fn register_mask(&mut self, value: &str) {
        if value.is_empty() || self.masks.iter().any(|m| m == value) {
            return;
        }
        let at = self
            .masks
            .iter()
            .position(|m| m.len() < value.len())
            .unwrap_or(self.masks.len());
        self.masks.insert(at, value.to_string());
    }
}

/// Which sources to read and how to break ties
#[derive(Debug, Clone)]
pub struct SecretLoadPlan {
    pub sources: Vec<SecretSource>,
    pub env_keys: Vec<String>,
    pub dotenv_path: PathBuf,
    pub prefer_dotenv: bool,
}

impl SecretLoadPlan {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            sources: settings.secret_sources()?,
            env_keys: settings.secrets.env_keys.clone(),
            dotenv_path: settings.dotenv_path(),
            prefer_dotenv: settings.secrets.prefer_dotenv,
        })
    }
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one secret and register its value for masking
    pub fn add(&self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let mut inner = self.write();
        inner.register_mask(&value);
        inner.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.read().values.get(key).cloned()
    }

    /// Secret names, sorted
    pub fn keys(&self) -> Vec<String> {
        self.read().values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().values.is_empty()
    }

    /// Secrets as environment pairs for a child process
    pub fn as_env(&self) -> Vec<(String, String)> {
        self.read()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Replace every occurrence of every registered value with `***`
    pub fn mask_all(&self, text: &str) -> String {
        let inner = self.read();
        let mut masked = text.to_string();
        for value in &inner.masks {
            if masked.contains(value.as_str()) {
                masked = masked.replace(value.as_str(), MASK_TOKEN);
            }
        }
        masked
    }

    /// Load secrets from the planned sources
    ///
    /// Keys present in both sources take the environment value unless
    /// `prefer_dotenv` is set. Every value read is registered for masking,
    /// including the one that lost the tie.
    pub fn load(&self, plan: &SecretLoadPlan, env: &dyn VariableSource) -> Result<usize, ConfigError> {
        let mut from_env = BTreeMap::new();
        let mut from_file = BTreeMap::new();

        for source in &plan.sources {
            match source {
                SecretSource::Env => {
                    for key in &plan.env_keys {
                        if let Some(value) = env.get(key) {
                            from_env.insert(key.clone(), value);
                        }
                    }
                }
                SecretSource::Dotenv => {
                    from_file.extend(read_dotenv(&plan.dotenv_path)?);
                }
            }
        }

        let (low, high) = if plan.prefer_dotenv {
            (from_env, from_file)
        } else {
            (from_file, from_env)
        };

        let mut inner = self.write();
        for value in low.values().chain(high.values()) {
            inner.register_mask(value);
        }
        let mut merged = low;
        merged.extend(high);
        let count = merged.len();
        inner.values.extend(merged);

        info!("Loaded {} secret(s)", count);
        Ok(count)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl VariableSource for SecretStore {
    fn get(&self, name: &str) -> Option<String> {
        SecretStore::get(self, name)
    }
}

/// Read a dotenv file; a missing file yields nothing
pub fn read_dotenv(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    if !path.exists() {
        debug!("No dotenv file at {}", path.display());
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_dotenv(&content))
}

/// Parse `KEY=VALUE` lines
pub fn parse_dotenv(content: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        entries.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    entries
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
