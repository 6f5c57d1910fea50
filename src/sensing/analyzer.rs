use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::time::Instant;

use super::phash::{compute_hamming_distance, compute_phash};
use super::{AnalysisPipeline, AnalysisResult, CaptureRecord, WindowMetadata};
use crate::config::Configuration;
use crate::utils::{render_command, run_command};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

const DEFAULT_PHASH_THRESHOLD: u32 = 8;
const DEFAULT_COOLDOWN_SECS: f64 = 20.0;

struct AnalyzedFrame {
    phash: String,
    at: Instant,
}

/// Default analysis routine.
///
/// Every capture is perceptually hashed. Frames that look like the last
/// analyzed frame, or arrive inside the cooldown, are reported as "nothing
/// new" without running the expensive step. The expensive step is the
/// configured `analysis_command` (argv template with `{path}`) which must print
/// an [`AnalysisResult`] as JSON; without one, the result only describes the
/// active window.
pub struct LocalAnalyzer {
    analysis_command: Option<Vec<String>>,
    threshold: u32,
    cooldown: Duration,
    last_analyzed: Mutex<Option<AnalyzedFrame>>,
}

impl LocalAnalyzer {
    pub fn new(analysis_command: Option<Vec<String>>, threshold: u32, cooldown: Duration) -> Self {
        Self {
            analysis_command,
            threshold,
            cooldown,
            last_analyzed: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        let threshold = config
            .f64("phash_threshold")
            .filter(|value| *value >= 0.0)
            .map(|value| value as u32)
            .unwrap_or(DEFAULT_PHASH_THRESHOLD);
        let cooldown = config
            .f64("analysis_cooldown_seconds")
            .filter(|value| value.is_finite() && *value >= 0.0)
            .unwrap_or(DEFAULT_COOLDOWN_SECS);
        Self::new(
            config.command("analysis_command"),
            threshold,
            Duration::from_secs_f64(cooldown),
        )
    }

    /// Decides whether `phash` gets the expensive step and, if so, records
    /// it as the last analyzed frame. Check and update happen under one lock,
    /// so concurrent sequences cannot both claim the same frame.
    fn try_claim(&self, phash: &str) -> bool {
        let mut guard = match self.last_analyzed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = guard.as_ref() {
            if previous.at.elapsed() < self.cooldown {
                return false;
            }
            if compute_hamming_distance(phash, &previous.phash) < self.threshold {
                return false;
            }
        }
        *guard = Some(AnalyzedFrame {
            phash: phash.to_string(),
            at: Instant::now(),
        });
        true
    }
}

#[async_trait]
impl AnalysisPipeline for LocalAnalyzer {
    async fn analyze(&self, capture: &CaptureRecord) -> Result<Option<AnalysisResult>> {
        let bytes = fs::read(&capture.image_path)
            .await
            .with_context(|| format!("failed to read {}", capture.image_path.display()))?;

        let phash_start = Instant::now();
        let phash = tokio::task::spawn_blocking(move || compute_phash(&bytes))
            .await
            .map_err(|err| anyhow!("phash worker join failed: {err}"))??;
        log_debug!(
            "phash {} for {} in {}ms",
            phash,
            capture.id,
            phash_start.elapsed().as_millis()
        );

        if !self.try_claim(&phash) {
            log_debug!("capture {} unchanged, skipping analysis", capture.id);
            return Ok(None);
        }

        let mut result = match &self.analysis_command {
            Some(template) => {
                let argv = render_command(template, &capture.image_path);
                let stdout = run_command(&argv, None, None)
                    .await
                    .context("analysis command failed")?;
                serde_json::from_str::<AnalysisResult>(stdout.trim())
                    .context("analysis command printed invalid JSON")?
            }
            None => AnalysisResult {
                description: describe_window(&capture.window),
                ..Default::default()
            },
        };
        result.phash = Some(phash);

        log_info!(
            "analyzed capture {} (summary: {})",
            capture.id,
            if result.summary_text().is_some() { "yes" } else { "no" }
        );
        Ok(Some(result))
    }
}

fn describe_window(window: &WindowMetadata) -> Option<String> {
    match (window.app_name.trim(), window.title.trim()) {
        ("", "") => None,
        (app, "") => Some(format!("Using {app}")),
        ("", title) => Some(format!("Viewing \"{title}\"")),
        (app, title) => Some(format!("Using {app}: \"{title}\"")),
    }
}
