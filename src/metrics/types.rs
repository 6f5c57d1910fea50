use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::CaptureOrigin;

/// Timings for one capture→analyze→post-process sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceMetrics {
    pub timestamp: DateTime<Utc>,
    pub origin: CaptureOrigin,
    pub capture_ms: u64,
    pub analysis_ms: Option<u64>,
    pub post_process_ms: Option<u64>,
    pub total_ms: u64,
    pub succeeded: bool,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub recent_sequences: Vec<SequenceMetrics>,
    pub sequence_count: u64,
    pub failure_count: u64,
    pub notes_count: u64,
}
