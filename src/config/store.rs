use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use super::Configuration;
use crate::error::{MonitorError, MonitorResult};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Reads and writes the configuration document at its canonical path.
///
/// The file is shared with the settings UI, which may rewrite it at any time,
/// so the store never caches: every call goes back to disk.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> MonitorResult<Configuration> {
        let contents = fs::read_to_string(&self.path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                MonitorError::ConfigMissing {
                    path: self.path.clone(),
                }
            } else {
                MonitorError::ConfigRead {
                    path: self.path.clone(),
                    reason: err.to_string(),
                }
            }
        })?;

        serde_json::from_str(&contents).map_err(|err| MonitorError::ConfigRead {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }

    /// Overwrites the document. The new contents land in a sibling temp file
    /// first and are renamed over the old one, so a concurrent reader sees
    /// either the old or the new document and never a torn write.
    pub fn save(&self, config: &Configuration) -> MonitorResult<()> {
        self.persist(config).map_err(|err| MonitorError::ConfigWrite {
            path: self.path.clone(),
            reason: format!("{err:#}"),
        })
    }

    fn persist(&self, config: &Configuration) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let serialized = serde_json::to_string_pretty(config)?;
        let mut staged = NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to stage config in {}", parent.display()))?;
        staged.write_all(serialized.as_bytes())?;
        staged.flush()?;
        staged
            .persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Re-reads the document and returns it only when it differs from
    /// `current`. Editors often leave the file missing or half-written for a
    /// moment, so read and parse failures count as "no change".
    pub fn poll_for_change(&self, current: &Configuration) -> Option<Configuration> {
        match self.load() {
            Ok(latest) if &latest != current => Some(latest),
            Ok(_) => None,
            Err(err) => {
                log_debug!("ignoring unreadable config during poll: {err}");
                None
            }
        }
    }
}
