use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::time::Instant;

use crate::config::{AppDirs, Configuration};
use crate::error::{MonitorError, MonitorResult};
use crate::metrics::{MetricsCollector, SequenceMetrics};
use crate::notes::{MarkdownNotes, PostProcessor};
use crate::sensing::{AnalysisPipeline, CaptureService, CommandCapture, LocalAnalyzer};
use crate::storage::{CaptureOrigin, DailyLog, LogEntry, NotesStatus};

use super::events::{MonitorEvent, StatusBoard};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// The three external services a capture sequence is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn CaptureService>,
    pub analysis: Arc<dyn AnalysisPipeline>,
    pub notes: Arc<dyn PostProcessor>,
}

impl Collaborators {
    pub fn new(
        capture: Arc<dyn CaptureService>,
        analysis: Arc<dyn AnalysisPipeline>,
        notes: Arc<dyn PostProcessor>,
    ) -> Self {
        Self {
            capture,
            analysis,
            notes,
        }
    }

    /// Shell-command backed defaults.
    pub fn from_config(config: &Configuration) -> Self {
        Self::new(
            Arc::new(CommandCapture::from_config(config)),
            Arc::new(LocalAnalyzer::from_config(config)),
            Arc::new(MarkdownNotes::from_config(config)),
        )
    }
}

/// Builds the collaborators for a configuration document. Called again
/// whenever the document changes.
pub type CollaboratorFactory = Arc<dyn Fn(&Configuration) -> Collaborators + Send + Sync>;

/// Everything a sequence needs besides the configuration snapshot.
pub(crate) struct Services {
    collaborators: RwLock<Collaborators>,
    factory: Option<CollaboratorFactory>,
    pub dirs: AppDirs,
    pub daily_log: DailyLog,
    pub metrics: MetricsCollector,
    pub board: Arc<StatusBoard>,
}

impl Services {
    pub fn new(
        collaborators: Collaborators,
        factory: Option<CollaboratorFactory>,
        dirs: AppDirs,
        board: Arc<StatusBoard>,
    ) -> Self {
        Self {
            collaborators: RwLock::new(collaborators),
            factory,
            daily_log: DailyLog::new(dirs.logs_dir()),
            dirs,
            metrics: MetricsCollector::new(),
            board,
        }
    }

    /// The collaborators as of now. A sequence keeps its snapshot even if
    /// the config changes under it.
    pub fn collaborators(&self) -> Collaborators {
        match self.collaborators.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Rebuilds the collaborators from `config`. Returns `false` when they
    /// were supplied directly and cannot be rebuilt.
    pub fn rebuild_collaborators(&self, config: &Configuration) -> bool {
        let Some(factory) = &self.factory else {
            return false;
        };
        let rebuilt = factory(config);
        match self.collaborators.write() {
            Ok(mut current) => *current = rebuilt,
            Err(poisoned) => *poisoned.into_inner() = rebuilt,
        }
        true
    }
}

#[derive(Default)]
struct Timings {
    capture_ms: u64,
    analysis_ms: Option<u64>,
    post_process_ms: Option<u64>,
}

/// Runs capture, analysis, logging and (when there is a summary) note
/// post-processing once.
///
/// The log entry is written before post-processing, so a post-process
/// failure still leaves exactly one entry, marked pending.
pub(crate) async fn run_sequence(
    services: &Services,
    config: &Configuration,
    origin: CaptureOrigin,
) -> MonitorResult<LogEntry> {
    let started = Instant::now();
    let mut timings = Timings::default();

    let result = match config.sequence_timeout() {
        Some(limit) => {
            match tokio::time::timeout(limit, execute(services, config, origin, &mut timings)).await
            {
                Ok(result) => result,
                Err(_) => Err(MonitorError::Timeout {
                    secs: limit.as_secs_f64(),
                }),
            }
        }
        None => execute(services, config, origin, &mut timings).await,
    };

    let system = services.metrics.sample_system_metrics().await;
    services
        .metrics
        .record_sequence(SequenceMetrics {
            timestamp: Utc::now(),
            origin,
            capture_ms: timings.capture_ms,
            analysis_ms: timings.analysis_ms,
            post_process_ms: timings.post_process_ms,
            total_ms: started.elapsed().as_millis() as u64,
            succeeded: result.is_ok(),
            cpu_percent: system.cpu_percent,
            memory_mb: system.memory_mb,
        })
        .await;

    result
}

async fn execute(
    services: &Services,
    config: &Configuration,
    origin: CaptureOrigin,
    timings: &mut Timings,
) -> MonitorResult<LogEntry> {
    let collaborators = services.collaborators();

    let capture_start = Instant::now();
    let capture = collaborators
        .capture
        .capture(&services.dirs.screenshots_dir())
        .await
        .map_err(MonitorError::Capture)?;
    timings.capture_ms = capture_start.elapsed().as_millis() as u64;
    log_debug!(
        "captured {} ({}) in {}ms",
        capture.image_path.display(),
        capture.window.app_name,
        timings.capture_ms
    );

    let analysis_start = Instant::now();
    let analysis = collaborators
        .analysis
        .analyze(&capture)
        .await
        .map_err(MonitorError::Analysis)?;
    timings.analysis_ms = Some(analysis_start.elapsed().as_millis() as u64);

    let mut entry = LogEntry::from_capture(&capture, analysis, origin);
    let log_path = services
        .daily_log
        .append(&entry)
        .await
        .map_err(MonitorError::LogStorage)?;

    services.board.publish(MonitorEvent::CaptureLogged {
        capture_id: entry.id,
        origin,
        notes: entry.notes,
    });

    let Some(analysis) = entry.analysis.as_ref().filter(|_| entry.notes == NotesStatus::Pending)
    else {
        return Ok(entry);
    };

    let notes_dir = config.require_notes_dir()?;
    let post_start = Instant::now();
    collaborators
        .notes
        .post_process(analysis, &notes_dir)
        .await
        .map_err(MonitorError::PostProcess)?;
    timings.post_process_ms = Some(post_start.elapsed().as_millis() as u64);

    match services
        .daily_log
        .set_notes_status(&log_path, entry.id, NotesStatus::Written)
        .await
    {
        Ok(_) => entry.notes = NotesStatus::Written,
        // Note is on disk but the entry stays pending.
        Err(err) => log_warn!("failed to mark entry {} written: {err:#}", entry.id),
    }

    log_info!("sequence for {} completed with notes", entry.id);
    Ok(entry)
}
