//! Security mode and the gate that consults it

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Whether raw shell access is allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Shell escapes and extra shell syntax are honored
    #[default]
    Open,
    /// Only declared commands and pipeline steps run
    Strict,
}

impl SecurityMode {
    fn as_u8(self) -> u8 {
        match self {
            SecurityMode::Open => 0,
            SecurityMode::Strict => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        if value == 1 {
            SecurityMode::Strict
        } else {
            SecurityMode::Open
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityMode::Open => write!(f, "open"),
            SecurityMode::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for SecurityMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SecurityMode::Open),
            "strict" => Ok(SecurityMode::Strict),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

/// Process-scoped holder of the current mode
///
/// A single atomic cell, so a partially switched mode is never observable.
/// Create one per session and share it by `Arc`; tests create their own.
#[derive(Debug)]
pub struct ModeState {
    mode: AtomicU8,
}

impl ModeState {
    pub fn new(initial: SecurityMode) -> Self {
        Self {
            mode: AtomicU8::new(initial.as_u8()),
        }
    }

    /// Current mode
    pub fn get(&self) -> SecurityMode {
        SecurityMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    /// Switch modes, returning the previous one
    pub fn set(&self, mode: SecurityMode) -> SecurityMode {
        let previous = SecurityMode::from_u8(self.mode.swap(mode.as_u8(), Ordering::SeqCst));
        if previous != mode {
            info!("Security mode switched: {} -> {}", previous, mode);
        }
        previous
    }
}

/// Kinds of execution the gate is asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedAction {
    /// Raw shell text typed by the operator
    ShellEscape,
    /// A declared, named command
    NamedCommand,
    /// A step of a pipeline run
    PipelineStep,
}

/// Policy check in front of every execution path
#[derive(Debug, Clone)]
pub struct SecurityGate {
    state: Arc<ModeState>,
}

impl SecurityGate {
    pub fn new(state: Arc<ModeState>) -> Self {
        Self { state }
    }

    pub fn mode(&self) -> SecurityMode {
        self.state.get()
    }

    pub fn set_mode(&self, mode: SecurityMode) -> SecurityMode {
        self.state.set(mode)
    }

    /// Decide whether an action may run
    ///
    /// Named commands and pipeline steps are never blocked; whether they
    /// may carry raw shell syntax beyond their declaration is a
    /// `ShellEscape` question.
    pub fn permit(&self, action: GatedAction) -> bool {
        let mode = self.state.get();
        let allowed = match action {
            GatedAction::ShellEscape => mode == SecurityMode::Open,
            GatedAction::NamedCommand | GatedAction::PipelineStep => true,
        };
        debug!("Gate: {:?} in {} mode -> {}", action, mode, allowed);
        allowed
    }
}
