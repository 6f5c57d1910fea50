use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MonitorError, MonitorResult};
use crate::utils::expand_home;

pub const DEFAULT_INTERVAL_SECS: f64 = 60.0;
const MIN_INTERVAL_SECS: f64 = 0.01;

/// The user's configuration document.
///
/// Kept as an opaque JSON object so keys owned by the settings UI or by
/// collaborators survive a load/save round trip. Equality is structural,
/// which is what drift detection compares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    doc: Map<String, Value>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.doc.insert(key.into(), value.into());
    }

    /// Builder-style `set`, handy when assembling a document in code.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Delay between background captures. Missing, non-numeric or
    /// non-positive values fall back to the default.
    pub fn interval(&self) -> Duration {
        let secs = self
            .doc
            .get("interval_seconds")
            .and_then(Value::as_f64)
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .unwrap_or(DEFAULT_INTERVAL_SECS)
            .max(MIN_INTERVAL_SECS);
        Duration::from_secs_f64(secs)
    }

    pub fn notes_dir(&self) -> Option<PathBuf> {
        self.string("notes_dir")
            .filter(|raw| !raw.trim().is_empty())
            .map(expand_home)
    }

    pub fn require_notes_dir(&self) -> MonitorResult<PathBuf> {
        self.notes_dir()
            .ok_or(MonitorError::MissingSetting { key: "notes_dir" })
    }

    pub fn sequence_timeout(&self) -> Option<Duration> {
        self.doc
            .get("sequence_timeout_seconds")
            .and_then(Value::as_f64)
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.doc.get(key).and_then(Value::as_str)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.doc.get(key).and_then(Value::as_f64)
    }

    /// Reads a command template. Accepts either an argv array or a single
    /// whitespace-separated string.
    pub fn command(&self, key: &str) -> Option<Vec<String>> {
        let argv: Vec<String> = match self.doc.get(key)? {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Value::String(line) => line.split_whitespace().map(str::to_string).collect(),
            _ => return None,
        };
        if argv.is_empty() {
            None
        } else {
            Some(argv)
        }
    }
}
