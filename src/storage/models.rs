//! Records written to the daily log.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sensing::{AnalysisResult, CaptureRecord, WindowMetadata};

/// Which path produced a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureOrigin {
    Background,
    OneOff,
}

/// Whether the note pipeline still owes work for an entry.
///
/// `Pending` entries are picked up again by "Process Missing Logs".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotesStatus {
    NotRequired,
    Pending,
    Written,
}

impl NotesStatus {
    pub fn for_analysis(analysis: Option<&AnalysisResult>) -> Self {
        match analysis.and_then(AnalysisResult::summary_text) {
            Some(_) => NotesStatus::Pending,
            None => NotesStatus::NotRequired,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub image_path: PathBuf,
    pub window: WindowMetadata,
    pub origin: CaptureOrigin,
    pub analysis: Option<AnalysisResult>,
    pub notes: NotesStatus,
}

impl LogEntry {
    pub fn from_capture(
        capture: &CaptureRecord,
        analysis: Option<AnalysisResult>,
        origin: CaptureOrigin,
    ) -> Self {
        let notes = NotesStatus::for_analysis(analysis.as_ref());
        Self {
            id: capture.id,
            timestamp: capture.captured_at,
            image_path: capture.image_path.clone(),
            window: capture.window.clone(),
            origin,
            analysis,
            notes,
        }
    }
}

/// A pending entry together with the log file it lives in.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub log_path: PathBuf,
    pub entry: LogEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> CaptureRecord {
        CaptureRecord::new(
            PathBuf::from("/tmp/shot.png"),
            Utc::now(),
            WindowMetadata {
                app_name: "Preview".into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn entries_with_summary_start_pending() {
        let analysis = AnalysisResult {
            summary: Some("Paper on CRDTs".into()),
            ..Default::default()
        };
        let entry = LogEntry::from_capture(&capture(), Some(analysis), CaptureOrigin::OneOff);
        assert_eq!(entry.notes, NotesStatus::Pending);
    }

    #[test]
    fn entries_without_summary_need_no_notes() {
        let entry = LogEntry::from_capture(&capture(), None, CaptureOrigin::Background);
        assert_eq!(entry.notes, NotesStatus::NotRequired);

        let blank = AnalysisResult {
            summary: Some(String::new()),
            ..Default::default()
        };
        let entry = LogEntry::from_capture(&capture(), Some(blank), CaptureOrigin::Background);
        assert_eq!(entry.notes, NotesStatus::NotRequired);
    }

    #[test]
    fn entry_id_matches_capture_id() {
        let capture = capture();
        let entry = LogEntry::from_capture(&capture, None, CaptureOrigin::Background);
        assert_eq!(entry.id, capture.id);
        assert_eq!(entry.window.app_name, "Preview");
    }
}
