use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Local, Utc};
use tokio::fs;
use tokio::time::Instant;
use uuid::Uuid;

use super::{CaptureRecord, CaptureService, WindowMetadata};
use crate::config::Configuration;
use crate::utils::{render_command, run_command};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Screenshots smaller than this are blank frames from a locked or
/// sleeping display.
const MIN_SCREENSHOT_BYTES: u64 = 1000;

/// Captures the screen by shelling out to the platform screenshot tool.
///
/// `capture_command` is an argv template whose `{path}` placeholder receives
/// the destination file. `window_info_command`, when configured, must print a
/// JSON object matching [`WindowMetadata`].
pub struct CommandCapture {
    capture_command: Vec<String>,
    window_info_command: Option<Vec<String>>,
}

impl CommandCapture {
    pub fn new(capture_command: Vec<String>, window_info_command: Option<Vec<String>>) -> Self {
        Self {
            capture_command,
            window_info_command,
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(
            config
                .command("capture_command")
                .unwrap_or_else(default_capture_command),
            config.command("window_info_command"),
        )
    }

    async fn window_metadata(&self) -> WindowMetadata {
        let Some(argv) = &self.window_info_command else {
            return WindowMetadata::default();
        };

        let parsed = run_command(argv, None, None)
            .await
            .and_then(|stdout| {
                serde_json::from_str::<WindowMetadata>(stdout.trim())
                    .context("window info command printed invalid JSON")
            });

        match parsed {
            Ok(metadata) => metadata,
            Err(err) => {
                log_warn!("window metadata unavailable: {err:#}");
                WindowMetadata::default()
            }
        }
    }
}

#[async_trait]
impl CaptureService for CommandCapture {
    async fn capture(&self, destination: &Path) -> Result<CaptureRecord> {
        let started = Instant::now();
        fs::create_dir_all(destination)
            .await
            .with_context(|| format!("failed to create {}", destination.display()))?;

        // Metadata first so it describes the window that ends up in the frame.
        let window = self.window_metadata().await;

        let captured_at = Utc::now();
        let image_path = screenshot_path(destination, captured_at.with_timezone(&Local));
        let argv = render_command(&self.capture_command, &image_path);
        run_command(&argv, None, None)
            .await
            .context("screenshot command failed")?;

        let size = fs::metadata(&image_path)
            .await
            .with_context(|| format!("screenshot {} was not written", image_path.display()))?
            .len();
        if size < MIN_SCREENSHOT_BYTES {
            bail!(
                "screenshot too small ({size} bytes), display likely asleep or locked"
            );
        }

        log_debug!(
            "captured {} ({} bytes) in {}ms",
            image_path.display(),
            size,
            started.elapsed().as_millis()
        );

        Ok(CaptureRecord::new(image_path, captured_at, window))
    }
}

fn screenshot_path(destination: &Path, at: chrono::DateTime<Local>) -> PathBuf {
    // The short id keeps concurrent one-off captures in the same second apart.
    let suffix = Uuid::new_v4().simple().to_string();
    destination.join(format!(
        "screenshot_{}_{}.png",
        at.format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    ))
}

fn default_capture_command() -> Vec<String> {
    let argv: &[&str] = if cfg!(target_os = "macos") {
        &["screencapture", "-x", "-t", "png", "{path}"]
    } else {
        &["import", "-window", "root", "{path}"]
    };
    argv.iter().map(|arg| arg.to_string()).collect()
}
