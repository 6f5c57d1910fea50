//! Shared fakes and fixtures for controller integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tempfile::TempDir;

use meadow_lib::config::{AppDirs, ConfigStore, Configuration};
use meadow_lib::monitor::{Collaborators, ControllerOptions, MonitorController};
use meadow_lib::notes::PostProcessor;
use meadow_lib::sensing::{
    AnalysisPipeline, AnalysisResult, CaptureRecord, CaptureService, WindowMetadata,
};

// =============================================================================
// Concurrency probe
// =============================================================================

/// Counts calls and remembers the highest number of calls in flight at once.
#[derive(Default)]
pub struct Probe {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Probe {
    /// Returns the 1-based call number.
    fn enter(&self) -> usize {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Fakes
// =============================================================================

/// Capture that writes nothing and fails on the configured call numbers.
#[derive(Default)]
pub struct FakeCapture {
    pub probe: Probe,
    fail_on: HashSet<usize>,
    delay: Duration,
}

impl FakeCapture {
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fail_on: calls.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Successful captures so far.
    pub fn successes(&self) -> usize {
        let calls = self.probe.calls();
        calls - self.fail_on.iter().filter(|n| **n <= calls).count()
    }
}

#[async_trait]
impl CaptureService for FakeCapture {
    async fn capture(&self, destination: &Path) -> Result<CaptureRecord> {
        let call = self.probe.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.probe.exit();

        if self.fail_on.contains(&call) {
            bail!("simulated capture failure on call {call}");
        }
        Ok(CaptureRecord::new(
            destination.join(format!("fake_{call}.png")),
            Utc::now(),
            WindowMetadata {
                app_name: "Fake".into(),
                title: format!("window {call}"),
                ..Default::default()
            },
        ))
    }
}

/// Analysis that returns the same result for every capture.
#[derive(Default)]
pub struct FakeAnalysis {
    pub probe: Probe,
    summary: Option<String>,
}

impl FakeAnalysis {
    pub fn with_summary(summary: &str) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl AnalysisPipeline for FakeAnalysis {
    async fn analyze(&self, capture: &CaptureRecord) -> Result<Option<AnalysisResult>> {
        self.probe.enter();
        self.probe.exit();
        Ok(Some(AnalysisResult {
            description: Some(capture.window.title.clone()),
            summary: self.summary.clone(),
            ..Default::default()
        }))
    }
}

/// Post-processor whose failure can be toggled mid-test.
#[derive(Default)]
pub struct FakeNotes {
    pub post_calls: AtomicUsize,
    pub written: AtomicUsize,
    pub synth_calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeNotes {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostProcessor for FakeNotes {
    async fn post_process(&self, _result: &AnalysisResult, _notes_dir: &Path) -> Result<()> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("simulated notes failure");
        }
        self.written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn synthesize_notes(&self, _notes_dir: &Path) -> Result<usize> {
        self.synth_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("simulated synthesis failure");
        }
        Ok(self.written())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub dirs: AppDirs,
    pub store: ConfigStore,
    pub capture: Arc<FakeCapture>,
    pub analysis: Arc<FakeAnalysis>,
    pub notes: Arc<FakeNotes>,
    pub controller: MonitorController,
}

impl Harness {
    pub fn new(config: Value) -> Self {
        Self::with_fakes(config, FakeCapture::default(), FakeAnalysis::default())
    }

    pub fn with_fakes(config: Value, capture: FakeCapture, analysis: FakeAnalysis) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let dirs = AppDirs::new(dir.path().join("app"));
        dirs.ensure().unwrap();

        let store = ConfigStore::new(dirs.config_file());
        store.save(&config_from(config)).unwrap();

        let capture = Arc::new(capture);
        let analysis = Arc::new(analysis);
        let notes = Arc::new(FakeNotes::default());
        let collaborators = Collaborators::new(capture.clone(), analysis.clone(), notes.clone());

        let controller = MonitorController::new(
            store.clone(),
            dirs.clone(),
            collaborators,
            ControllerOptions {
                drift_poll_interval: Duration::from_millis(40),
                ..Default::default()
            },
        )
        .unwrap();

        Self {
            dir,
            dirs,
            store,
            capture,
            analysis,
            notes,
            controller,
        }
    }

    pub fn notes_dir(&self) -> String {
        self.dir.path().join("notes").display().to_string()
    }

    /// Rewrites the config file the way the settings UI would.
    pub fn write_config(&self, config: Value) {
        self.store.save(&config_from(config)).unwrap();
    }

    /// All entries across every daily log file.
    pub fn log_entries(&self) -> Vec<Value> {
        let mut entries = Vec::new();
        let Ok(dir) = std::fs::read_dir(self.dirs.logs_dir()) else {
            return entries;
        };
        for file in dir.flatten() {
            let path = file.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let contents = std::fs::read_to_string(&path).unwrap();
                let items: Vec<Value> = serde_json::from_str(&contents).unwrap();
                entries.extend(items);
            }
        }
        entries
    }

    /// Lets any stopped cycle finish its last sequence.
    pub async fn settle(&self) {
        assert!(
            wait_until(Duration::from_secs(3), || self.controller.active_cycles() == 0).await,
            "cycle did not drain"
        );
    }
}

pub fn config_from(value: Value) -> Configuration {
    serde_json::from_value(value).unwrap()
}

pub fn interval(secs: f64) -> Value {
    json!({ "interval_seconds": secs })
}

/// Polls `condition` every 10ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
