//! Capture and analysis collaborators.
//!
//! The monitor only talks to these through [`CaptureService`] and
//! [`AnalysisPipeline`]; the shell-command backed implementations here are
//! the defaults wired up by the binary.

pub mod analyzer;
pub mod capture;
pub mod phash;
pub mod types;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

pub use analyzer::LocalAnalyzer;
pub use capture::CommandCapture;
pub use types::{AnalysisResult, CaptureRecord, WindowBounds, WindowMetadata};

#[async_trait]
pub trait CaptureService: Send + Sync {
    /// Takes a screenshot into `destination` and describes the active window.
    async fn capture(&self, destination: &Path) -> Result<CaptureRecord>;
}

#[async_trait]
pub trait AnalysisPipeline: Send + Sync {
    /// `Ok(None)` means the capture carried nothing worth recording beyond
    /// the fact that it happened.
    async fn analyze(&self, capture: &CaptureRecord) -> Result<Option<AnalysisResult>>;
}
