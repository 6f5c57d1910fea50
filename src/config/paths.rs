use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};

const APP_DIR_NAME: &str = "Meadow";
const HOME_ENV: &str = "MEADOW_HOME";

/// Machine-managed notes live here; the synthesizer reads `_temp_logs`.
pub const MACHINE_NOTES_DIR: &str = "_machine";
pub const TEMP_NOTES_DIR: &str = "_temp_logs";
pub const RESEARCH_NOTES_DIR: &str = "research";

/// Layout of the application-support directory.
#[derive(Debug, Clone)]
pub struct AppDirs {
    root: PathBuf,
}

impl AppDirs {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// `$MEADOW_HOME` when set, otherwise `<platform data dir>/Meadow`
    /// (`~/Library/Application Support/Meadow` on macOS).
    pub fn resolve() -> Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
            return Ok(Self::new(PathBuf::from(root)));
        }
        let base = dirs::data_dir()
            .ok_or_else(|| anyhow!("could not determine the user data directory"))?;
        Ok(Self::new(base.join(APP_DIR_NAME)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.json")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.data_dir().join("screenshots")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Creates every directory the monitor writes into. The config file
    /// itself is left alone; it belongs to the settings UI.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.config_dir(),
            self.logs_dir(),
            self.screenshots_dir(),
            self.cache_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Creates the standard notes structure (`_machine/` and `research/`).
pub fn create_notes_structure(notes_dir: &Path) -> Result<()> {
    for dir in [
        notes_dir.to_path_buf(),
        notes_dir.join(MACHINE_NOTES_DIR),
        notes_dir.join(MACHINE_NOTES_DIR).join(TEMP_NOTES_DIR),
        notes_dir.join(RESEARCH_NOTES_DIR),
    ] {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create notes dir {}", dir.display()))?;
    }
    Ok(())
}
