use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::{fs, sync::Mutex};
use uuid::Uuid;

use super::models::{LogEntry, NotesStatus, StoredEntry};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const LOG_PREFIX: &str = "log_";
const LOG_SUFFIX: &str = ".json";

struct DailyLogInner {
    dir: PathBuf,
    /// Serializes every read-modify-write of a log file in this process.
    write_lock: Mutex<()>,
}

/// Append-only JSON log, one file per calendar day.
///
/// Each file is a JSON array. Elements written by other tools are preserved
/// as-is; only elements that parse as [`LogEntry`] are returned by readers.
#[derive(Clone)]
pub struct DailyLog {
    inner: Arc<DailyLogInner>,
}

impl DailyLog {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(DailyLogInner {
                dir,
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.inner
            .dir
            .join(format!("{LOG_PREFIX}{}{LOG_SUFFIX}", date.format("%Y%m%d")))
    }

    /// Today's log path, creating the file as an empty array if needed.
    pub async fn current_path(&self) -> Result<PathBuf> {
        let path = self.path_for(Local::now().date_naive());
        let _guard = self.inner.write_lock.lock().await;
        self.ensure_file(&path).await?;
        Ok(path)
    }

    /// Appends an entry to the file of the local day it was captured on.
    pub async fn append(&self, entry: &LogEntry) -> Result<PathBuf> {
        let date = entry.timestamp.with_timezone(&Local).date_naive();
        let path = self.path_for(date);
        let value = serde_json::to_value(entry).context("failed to serialize log entry")?;

        let _guard = self.inner.write_lock.lock().await;
        self.ensure_file(&path).await?;
        let mut items = read_array(&path).await?;
        items.push(value);
        write_array(&path, &items).await?;

        log_debug!("appended entry {} to {}", entry.id, path.display());
        Ok(path)
    }

    pub async fn entries(&self, date: NaiveDate) -> Result<Vec<LogEntry>> {
        let path = self.path_for(date);
        let _guard = self.inner.write_lock.lock().await;
        match fs::try_exists(&path).await {
            Ok(true) => Ok(parse_entries(&path, read_array(&path).await?)),
            Ok(false) => Ok(Vec::new()),
            Err(err) => Err(err).with_context(|| format!("failed to stat {}", path.display())),
        }
    }

    /// Rewrites the notes status of entry `id` in `log_path`. Returns `false`
    /// when no such entry exists.
    pub async fn set_notes_status(
        &self,
        log_path: &Path,
        id: Uuid,
        status: NotesStatus,
    ) -> Result<bool> {
        let _guard = self.inner.write_lock.lock().await;
        let mut items = read_array(log_path).await?;
        let id_text = id.to_string();

        let Some(item) = items
            .iter_mut()
            .find(|item| item.get("id").and_then(Value::as_str) == Some(id_text.as_str()))
        else {
            return Ok(false);
        };

        let Some(fields) = item.as_object_mut() else {
            bail!("log entry {id} in {} is not an object", log_path.display());
        };
        fields.insert("notes".into(), serde_json::to_value(status)?);
        write_array(log_path, &items).await?;
        Ok(true)
    }

    /// Every entry, across all days, whose notes are still owed. Oldest
    /// files first.
    pub async fn pending_notes(&self) -> Result<Vec<StoredEntry>> {
        let _guard = self.inner.write_lock.lock().await;
        let mut pending = Vec::new();

        for path in self.log_files().await? {
            let items = match read_array(&path).await {
                Ok(items) => items,
                Err(err) => {
                    log_warn!("skipping unreadable log {}: {err:#}", path.display());
                    continue;
                }
            };
            pending.extend(
                parse_entries(&path, items)
                    .into_iter()
                    .filter(|entry| entry.notes == NotesStatus::Pending)
                    .map(|entry| StoredEntry {
                        log_path: path.clone(),
                        entry,
                    }),
            );
        }

        Ok(pending)
    }

    async fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut dir = match fs::read_dir(&self.inner.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(files),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to list {}", self.inner.dir.display()))
            }
        };

        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(LOG_PREFIX) && name.ends_with(LOG_SUFFIX) {
                files.push(item.path());
            }
        }
        // log_YYYYMMDD sorts chronologically.
        files.sort();
        Ok(files)
    }

    async fn ensure_file(&self, path: &Path) -> Result<()> {
        let exists = fs::try_exists(path)
            .await
            .with_context(|| format!("failed to check {}", path.display()))?;
        if exists {
            return Ok(());
        }
        fs::create_dir_all(&self.inner.dir)
            .await
            .with_context(|| format!("failed to create {}", self.inner.dir.display()))?;
        write_array(path, &[]).await
    }
}

async fn read_array(path: &Path) -> Result<Vec<Value>> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array", path.display()))
}

async fn write_array(path: &Path, items: &[Value]) -> Result<()> {
    let serialized = serde_json::to_vec_pretty(items)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || replace_file(&path, &serialized))
        .await
        .map_err(|err| anyhow!("log writer join failed: {err}"))?
}

/// Stages `contents` in a uniquely named sibling and renames it over `path`.
/// The staging file is removed if anything fails before the rename.
fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to stage log in {}", parent.display()))?;
    staged.write_all(contents)?;
    staged.flush()?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

fn parse_entries(path: &Path, items: Vec<Value>) -> Vec<LogEntry> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<LogEntry>(item) {
            Ok(entry) => Some(entry),
            Err(err) => {
                log_debug!("skipping foreign entry in {}: {err}", path.display());
                None
            }
        })
        .collect()
}
