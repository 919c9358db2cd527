//! Layered `${NAME}` resolution
//!
//! Lookup order, first hit wins:
//!
//! 1. pipeline-local variables (owned by one pipeline run)
//! 2. configuration variables (replaced only on reload)
//! 3. secrets
//! 4. the process environment

pub mod secrets;

pub use secrets::{SecretLoadPlan, SecretStore, MASK_TOKEN};

use crate::core::error::VariableError;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Anything that can answer "what is the value of NAME?"
pub trait VariableSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

impl VariableSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// The live process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl VariableSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Which layer a value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Pipeline,
    Config,
    Secret,
    Environment,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Pipeline => "pipeline",
            Layer::Config => "config",
            Layer::Secret => "secret",
            Layer::Environment => "environment",
        };
        write!(f, "{}", name)
    }
}

/// A variable as shown to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableEntry {
    pub layer: Layer,
    pub name: String,
    pub value: String,
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("reference pattern is valid"))
}

/// Names referenced by `${NAME}` markers, in order of appearance
pub fn references(text: &str) -> Vec<String> {
    reference_pattern()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Resolves references against the configuration, secret and environment
/// layers, with pipeline-local variables supplied per call
///
/// Cheap to clone; a clone taken at the start of a pipeline run keeps its
/// configuration snapshot even if the session reloads meanwhile.
#[derive(Clone)]
pub struct VariableResolver {
    config: Arc<HashMap<String, String>>,
    secrets: Arc<SecretStore>,
    environment: Arc<dyn VariableSource>,
}

impl fmt::Debug for VariableResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableResolver")
            .field("config", &self.config.keys().collect::<Vec<_>>())
            .field("secrets", &self.secrets.keys())
            .finish()
    }
}

impl VariableResolver {
    pub fn new(config: HashMap<String, String>, secrets: Arc<SecretStore>) -> Self {
        Self {
            config: Arc::new(config),
            secrets,
            environment: Arc::new(ProcessEnv),
        }
    }

    /// Replace the environment layer (tests use a fixed map)
    pub fn with_environment(mut self, environment: Arc<dyn VariableSource>) -> Self {
        self.environment = environment;
        self
    }

    /// A resolver with a new configuration layer and the same secrets
    pub fn with_config(&self, config: HashMap<String, String>) -> Self {
        Self {
            config: Arc::new(config),
            secrets: self.secrets.clone(),
            environment: self.environment.clone(),
        }
    }

    pub fn secrets(&self) -> &Arc<SecretStore> {
        &self.secrets
    }

    pub fn config(&self) -> &HashMap<String, String> {
        &self.config
    }

    fn layers<'a>(
        &'a self,
        pipeline_vars: &'a HashMap<String, String>,
    ) -> [(Layer, &'a dyn VariableSource); 4] {
        [
            (Layer::Pipeline, pipeline_vars as &dyn VariableSource),
            (Layer::Config, &*self.config as &dyn VariableSource),
            (Layer::Secret, &*self.secrets as &dyn VariableSource),
            (Layer::Environment, &*self.environment),
        ]
    }

    /// Find a single variable and the layer that supplied it
    pub fn lookup(&self, name: &str, pipeline_vars: &HashMap<String, String>) -> Option<(Layer, String)> {
        self.layers(pipeline_vars)
            .into_iter()
            .find_map(|(layer, source)| source.get(name).map(|value| (layer, value)))
    }

    /// Substitute every `${NAME}` in `text`
    ///
    /// Either every reference resolves or the call fails naming the first
    /// one that did not. Substituted values are not scanned again.
    pub fn resolve(
        &self,
        text: &str,
        pipeline_vars: &HashMap<String, String>,
    ) -> Result<String, VariableError> {
        let mut values: HashMap<String, String> = HashMap::new();
        for name in references(text) {
            if values.contains_key(&name) {
                continue;
            }
            match self.lookup(&name, pipeline_vars) {
                Some((_, value)) => {
                    values.insert(name, value);
                }
                None => return Err(VariableError::Unresolved { name }),
            }
        }

        if values.is_empty() {
            return Ok(text.to_string());
        }

        let resolved = reference_pattern().replace_all(text, |caps: &Captures| {
            values.get(&caps[1]).cloned().unwrap_or_default()
        });
        Ok(resolved.into_owned())
    }

    /// Configuration, pipeline and secret variables for display
    ///
    /// Secret values are always shown as the mask token. Other values are
    /// passed through the secret mask when `mask_in_output` is set.
    pub fn listing(
        &self,
        pipeline_vars: &HashMap<String, String>,
        mask_in_output: bool,
    ) -> Vec<VariableEntry> {
        let shown = |value: &str| {
            if mask_in_output {
                self.secrets.mask_all(value)
            } else {
                value.to_string()
            }
        };

        let mut entries: Vec<VariableEntry> = pipeline_vars
            .iter()
            .map(|(name, value)| VariableEntry {
                layer: Layer::Pipeline,
                name: name.clone(),
                value: shown(value),
            })
            .chain(self.config.iter().map(|(name, value)| VariableEntry {
                layer: Layer::Config,
                name: name.clone(),
                value: shown(value),
            }))
            .chain(self.secrets.keys().into_iter().map(|name| VariableEntry {
                layer: Layer::Secret,
                name,
                value: MASK_TOKEN.to_string(),
            }))
            .collect();

        entries.sort_by(|a, b| a.layer.cmp(&b.layer).then_with(|| a.name.cmp(&b.name)));
        entries
    }
}
