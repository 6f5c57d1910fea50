use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the monitor controller and its stores.
///
/// Collaborator failures arrive as `anyhow::Error` and are wrapped into the
/// variant matching the stage they came from.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("configuration not found at {path}; start the web viewer first to create it")]
    ConfigMissing { path: PathBuf },

    #[error("failed to read configuration at {path}: {reason}")]
    ConfigRead { path: PathBuf, reason: String },

    #[error("failed to write configuration at {path}: {reason}")]
    ConfigWrite { path: PathBuf, reason: String },

    #[error("configuration is missing required setting `{key}`")]
    MissingSetting { key: &'static str },

    #[error("screen capture failed: {0:#}")]
    Capture(anyhow::Error),

    #[error("screenshot analysis failed: {0:#}")]
    Analysis(anyhow::Error),

    #[error("note post-processing failed: {0:#}")]
    PostProcess(anyhow::Error),

    #[error("daily log storage failed: {0:#}")]
    LogStorage(anyhow::Error),

    #[error("failed to launch monitoring cycle: {reason}")]
    Launch { reason: String },

    #[error("capture sequence exceeded {secs}s")]
    Timeout { secs: f64 },
}

impl MonitorError {
    /// Short label used in status events and the transient error display.
    pub fn stage(&self) -> &'static str {
        match self {
            MonitorError::ConfigMissing { .. }
            | MonitorError::ConfigRead { .. }
            | MonitorError::ConfigWrite { .. }
            | MonitorError::MissingSetting { .. } => "config",
            MonitorError::Capture(_) => "capture",
            MonitorError::Analysis(_) => "analysis",
            MonitorError::PostProcess(_) => "post-process",
            MonitorError::LogStorage(_) => "log",
            MonitorError::Launch { .. } => "launch",
            MonitorError::Timeout { .. } => "timeout",
        }
    }
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
