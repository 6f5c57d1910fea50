use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Describes the frontmost window at capture time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowMetadata {
    pub app_name: String,
    pub bundle_id: String,
    pub title: String,
    pub bounds: Option<WindowBounds>,
}

/// A single screenshot plus the context it was taken in. Lives for exactly
/// one analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: Uuid,
    pub image_path: PathBuf,
    pub captured_at: DateTime<Utc>,
    pub window: WindowMetadata,
}

impl CaptureRecord {
    pub fn new(image_path: PathBuf, captured_at: DateTime<Utc>, window: WindowMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            image_path,
            captured_at,
            window,
        }
    }
}

/// What the analysis routine made of a capture.
///
/// Fields the monitor does not understand are kept in `extra` so they end up
/// in the daily log untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "research_summary",
        skip_serializing_if = "Option::is_none"
    )]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phash: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisResult {
    /// The research summary when it carries any text. Only these results are
    /// handed to the post-processor.
    pub fn summary_text(&self) -> Option<&str> {
        self.summary
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_text_ignores_blank_summaries() {
        let mut result = AnalysisResult::default();
        assert!(result.summary_text().is_none());

        result.summary = Some("   \n".into());
        assert!(result.summary_text().is_none());

        result.summary = Some("  Reading about tokio  ".into());
        assert_eq!(result.summary_text(), Some("Reading about tokio"));
    }

    #[test]
    fn analysis_result_keeps_unknown_fields() {
        let raw = json!({
            "description": "Editing a Rust file",
            "research_summary": "Borrow checker notes",
            "confidence": 0.8,
        });
        let result: AnalysisResult = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(result.summary_text(), Some("Borrow checker notes"));
        assert_eq!(result.extra.get("confidence"), Some(&json!(0.8)));
        assert_eq!(serde_json::to_value(&result).unwrap(), raw);
    }

    #[test]
    fn window_metadata_tolerates_partial_json() {
        let window: WindowMetadata =
            serde_json::from_value(json!({ "app_name": "Safari" })).unwrap();
        assert_eq!(window.app_name, "Safari");
        assert!(window.title.is_empty());
        assert!(window.bounds.is_none());
    }
}
