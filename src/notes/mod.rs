//! Turning analysis results into notes.

pub mod markdown;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::sensing::AnalysisResult;
use crate::storage::{DailyLog, NotesStatus};

pub use markdown::MarkdownNotes;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Outcome of a "process missing logs" run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReprocessSummary {
    pub processed: usize,
    pub failed: usize,
}

#[async_trait]
pub trait PostProcessor: Send + Sync {
    /// Stages one result as a note under `notes_dir`. Only called for results
    /// with a non-empty summary.
    async fn post_process(&self, result: &AnalysisResult, notes_dir: &Path) -> Result<()>;

    /// Folds staged notes into the organized note tree. Returns how many
    /// staged notes were consumed.
    async fn synthesize_notes(&self, notes_dir: &Path) -> Result<usize>;

    /// Retries every saved log entry whose notes are still pending. Entries
    /// that fail again stay pending for the next run.
    async fn reprocess_saved_logs(
        &self,
        logs: &DailyLog,
        notes_dir: &Path,
    ) -> Result<ReprocessSummary> {
        let mut summary = ReprocessSummary::default();

        for stored in logs.pending_notes().await? {
            let Some(analysis) = stored.entry.analysis.as_ref() else {
                continue;
            };
            match self.post_process(analysis, notes_dir).await {
                Ok(()) => {
                    logs.set_notes_status(&stored.log_path, stored.entry.id, NotesStatus::Written)
                        .await?;
                    summary.processed += 1;
                }
                Err(err) => {
                    log_warn!("entry {} still pending: {err:#}", stored.entry.id);
                    summary.failed += 1;
                }
            }
        }

        log_info!(
            "reprocessed saved logs: {} written, {} still pending",
            summary.processed,
            summary.failed
        );
        Ok(summary)
    }
}
