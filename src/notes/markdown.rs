use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use super::PostProcessor;
use crate::config::paths::{MACHINE_NOTES_DIR, TEMP_NOTES_DIR};
use crate::config::{create_notes_structure, Configuration};
use crate::sensing::AnalysisResult;
use crate::utils::run_command;

const ENABLE_LOGS: bool = true;

use crate::log_info;

const SYNTHESIS_INSTRUCTIONS: &str = "\
1. Read the new markdown files in _machine/_temp_logs
2. Update or create topic-specific notes in _machine/ based on the content
3. Link related concepts using [[wiki-style]] links
4. Update the knowledge files in _machine/ to reflect new information
5. Clean up and organize notes in _machine/ as needed
";

/// Writes research summaries as markdown under the notes directory.
///
/// Summaries are staged one file each in `_machine/_temp_logs/`. Synthesis
/// either hands the notes directory to `synthesis_command` (run with the
/// notes dir as cwd and instructions on stdin) or, when none is configured,
/// appends staged notes to a per-day digest and clears them.
pub struct MarkdownNotes {
    synthesis_command: Option<Vec<String>>,
}

impl MarkdownNotes {
    pub fn new(synthesis_command: Option<Vec<String>>) -> Self {
        Self { synthesis_command }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(config.command("synthesis_command"))
    }
}

#[async_trait]
impl PostProcessor for MarkdownNotes {
    async fn post_process(&self, result: &AnalysisResult, notes_dir: &Path) -> Result<()> {
        let Some(summary) = result.summary_text() else {
            return Ok(());
        };
        create_notes_structure(notes_dir)?;

        let now = Local::now();
        let id = Uuid::new_v4().simple().to_string();
        let path = temp_dir(notes_dir).join(format!(
            "{}_{}.md",
            now.format("%Y%m%d_%H%M%S"),
            &id[..8]
        ));

        let mut body = String::new();
        body.push_str("---\n");
        body.push_str(&format!("captured: {}\n", now.to_rfc3339()));
        if !result.tags.is_empty() {
            body.push_str(&format!("tags: [{}]\n", result.tags.join(", ")));
        }
        body.push_str("---\n\n## Summary\n\n");
        body.push_str(summary);
        body.push('\n');
        if let Some(description) = result.description.as_deref() {
            body.push_str("\n## Context\n\n");
            body.push_str(description);
            body.push('\n');
        }

        fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write note {}", path.display()))?;
        log_info!("staged note {}", path.display());
        Ok(())
    }

    async fn synthesize_notes(&self, notes_dir: &Path) -> Result<usize> {
        create_notes_structure(notes_dir)?;
        let staged = staged_notes(notes_dir).await?;

        if let Some(argv) = &self.synthesis_command {
            run_command(argv, Some(notes_dir), Some(SYNTHESIS_INSTRUCTIONS))
                .await
                .context("note synthesis command failed")?;
            log_info!("synthesis command processed {} staged notes", staged.len());
            return Ok(staged.len());
        }

        if staged.is_empty() {
            return Ok(0);
        }

        let digest = notes_dir
            .join(MACHINE_NOTES_DIR)
            .join(format!("digest_{}.md", Local::now().format("%Y%m%d")));
        let mut out = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&digest)
            .await
            .with_context(|| format!("failed to open {}", digest.display()))?;

        for note in &staged {
            let contents = fs::read_to_string(note)
                .await
                .with_context(|| format!("failed to read {}", note.display()))?;
            let title = note
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            out.write_all(format!("\n# {title}\n\n{}\n", contents.trim()).as_bytes())
                .await?;
        }
        out.flush().await?;

        // Only remove staged notes once the digest holds them.
        for note in &staged {
            fs::remove_file(note)
                .await
                .with_context(|| format!("failed to remove {}", note.display()))?;
        }

        log_info!("folded {} staged notes into {}", staged.len(), digest.display());
        Ok(staged.len())
    }
}

fn temp_dir(notes_dir: &Path) -> PathBuf {
    notes_dir.join(MACHINE_NOTES_DIR).join(TEMP_NOTES_DIR)
}

async fn staged_notes(notes_dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = temp_dir(notes_dir);
    let mut entries = fs::read_dir(&dir)
        .await
        .with_context(|| format!("failed to list {}", dir.display()))?;

    let mut notes = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "md") {
            notes.push(path);
        }
    }
    notes.sort();
    Ok(notes)
}
