use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::{create_notes_structure, AppDirs, ConfigStore, Configuration};
use crate::error::{MonitorError, MonitorResult};
use crate::metrics::MetricsCollector;
use crate::notes::ReprocessSummary;
use crate::storage::{CaptureOrigin, DailyLog, LogEntry};

use super::cycle::{spawn_cycle, CycleCounter, CycleHandle};
use super::events::{MonitorEvent, StatusBoard};
use super::pipeline::{run_sequence, CollaboratorFactory, Collaborators, Services};
use super::state::{BusyKind, DisplayState, MonitoringState};
use super::watcher::{spawn_drift_watcher, WatcherHandle};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEFAULT_DRIFT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// How often the config watcher re-reads the file.
    pub drift_poll_interval: Duration,
    pub event_capacity: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            drift_poll_interval: DEFAULT_DRIFT_POLL_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub state: MonitoringState,
    pub display: DisplayState,
    pub label: String,
    pub busy: Vec<BusyKind>,
    pub interval_ms: u64,
    pub active_cycles: usize,
    pub peak_active_cycles: usize,
    pub cycles_launched: u64,
}

/// Owns the monitoring state machine.
///
/// Start and restart are serialized on one lifecycle lock, which is what
/// keeps at most one background cycle alive. Stop never waits for that lock:
/// it flips the state and cancels the live cycle at once, and a start or
/// restart that was draining when it happened gives up instead of launching.
/// One-off actions take no lock and run next to the cycle.
#[derive(Clone)]
pub struct MonitorController {
    inner: Arc<ControllerInner>,
}

pub(crate) struct ControllerInner {
    store: ConfigStore,
    config: StdMutex<Configuration>,
    services: Arc<Services>,
    lifecycle: Mutex<Option<CycleHandle>>,
    slot: StdMutex<CycleSlot>,
    watcher: Mutex<Option<WatcherHandle>>,
    generation: AtomicU64,
    cycles: Arc<CycleCounter>,
    options: ControllerOptions,
}

/// The token of the cycle that is live right now, and a count of stops.
/// The board's monitoring state only changes while this is locked.
#[derive(Default)]
struct CycleSlot {
    token: Option<CancellationToken>,
    stop_epoch: u64,
}

impl MonitorController {
    /// Loads the configuration and wires the controller up. Fails with
    /// [`MonitorError::ConfigMissing`] when no config file exists yet.
    pub fn new(
        store: ConfigStore,
        dirs: AppDirs,
        collaborators: Collaborators,
        options: ControllerOptions,
    ) -> MonitorResult<Self> {
        let config = store.load()?;
        Ok(Self::from_parts(store, config, dirs, collaborators, None, options))
    }

    /// Like [`MonitorController::new`] with the shell-command collaborators
    /// configured from the loaded document.
    pub fn with_default_collaborators(
        store: ConfigStore,
        dirs: AppDirs,
        options: ControllerOptions,
    ) -> MonitorResult<Self> {
        Self::with_collaborator_factory(
            store,
            dirs,
            Arc::new(Collaborators::from_config),
            options,
        )
    }

    /// Builds the collaborators with `factory` now and again every time the
    /// configuration is reloaded.
    pub fn with_collaborator_factory(
        store: ConfigStore,
        dirs: AppDirs,
        factory: CollaboratorFactory,
        options: ControllerOptions,
    ) -> MonitorResult<Self> {
        let config = store.load()?;
        let collaborators = factory(&config);
        Ok(Self::from_parts(
            store,
            config,
            dirs,
            collaborators,
            Some(factory),
            options,
        ))
    }

    fn from_parts(
        store: ConfigStore,
        config: Configuration,
        dirs: AppDirs,
        collaborators: Collaborators,
        factory: Option<CollaboratorFactory>,
        options: ControllerOptions,
    ) -> Self {
        if let Some(notes_dir) = config.notes_dir() {
            if let Err(err) = create_notes_structure(&notes_dir) {
                log_warn!("could not prepare notes dir {}: {err:#}", notes_dir.display());
            }
        }

        let board = Arc::new(StatusBoard::new(options.event_capacity));
        let services = Arc::new(Services::new(collaborators, factory, dirs, board));

        Self {
            inner: Arc::new(ControllerInner {
                store,
                config: StdMutex::new(config),
                services,
                lifecycle: Mutex::new(None),
                slot: StdMutex::new(CycleSlot::default()),
                watcher: Mutex::new(None),
                generation: AtomicU64::new(0),
                cycles: Arc::new(CycleCounter::default()),
                options,
            }),
        }
    }

    pub(crate) fn upgrade(inner: &Weak<ControllerInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    fn board(&self) -> &StatusBoard {
        &self.inner.services.board
    }

    fn slot(&self) -> MutexGuard<'_, CycleSlot> {
        match self.inner.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Starts the background cycle. Returns `Ok(false)` when already running
    /// or when a stop arrived before the cycle could launch.
    pub async fn start(&self) -> MonitorResult<bool> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let epoch = {
            let slot = self.slot();
            if self.board().state() == MonitoringState::Running {
                log_debug!("start ignored: already running");
                return Ok(false);
            }
            slot.stop_epoch
        };

        // A stopped cycle may still be finishing its last sequence.
        if let Some(previous) = lifecycle.take() {
            previous.drain().await;
        }
        if self.stopped_since(epoch) {
            log_debug!("start abandoned: stopped while draining");
            return Ok(false);
        }

        let cycle = self.launch(self.config())?;
        let installed = self.install(&cycle, epoch);
        if installed {
            log_info!("monitoring started (cycle {})", cycle.generation);
        }
        *lifecycle = Some(cycle);
        Ok(installed)
    }

    /// Stops monitoring. Takes effect immediately, even while a start or
    /// restart is draining: the sleep is interrupted and an in-flight
    /// sequence finishes in the background. Returns whether it was running.
    pub async fn stop(&self) -> bool {
        let was_running = self.halt();
        if was_running {
            log_info!("monitoring stopped");
        }
        was_running
    }

    fn halt(&self) -> bool {
        let mut slot = self.slot();
        slot.stop_epoch += 1;
        if let Some(token) = slot.token.take() {
            token.cancel();
        }
        self.board().set_state(MonitoringState::Stopped)
    }

    fn stopped_since(&self, epoch: u64) -> bool {
        self.slot().stop_epoch != epoch
    }

    /// Publishes `cycle` as the live one unless a stop happened since
    /// `epoch`, in which case the cycle is cancelled before its first sleep
    /// ends.
    fn install(&self, cycle: &CycleHandle, epoch: u64) -> bool {
        let mut slot = self.slot();
        if slot.stop_epoch != epoch {
            cycle.token.cancel();
            return false;
        }
        slot.token = Some(cycle.token.clone());
        self.board().set_state(MonitoringState::Running);
        true
    }

    /// Adopts `config`, rebuilds the collaborators from it and, if running,
    /// replaces the cycle with one built from it. The old cycle is fully
    /// drained before the new one launches. Returns whether a new cycle was
    /// launched.
    pub async fn restart(&self, config: Configuration) -> MonitorResult<bool> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.set_config(config.clone());
        if self.inner.services.rebuild_collaborators(&config) {
            log_debug!("collaborators rebuilt from the new configuration");
        }

        let epoch = {
            let slot = self.slot();
            if self.board().state() != MonitoringState::Running {
                log_debug!("restart: not running, config adopted only");
                return Ok(false);
            }
            slot.stop_epoch
        };

        if let Some(previous) = lifecycle.take() {
            previous.drain().await;
        }
        if self.stopped_since(epoch) {
            log_debug!("restart abandoned: stopped while draining");
            return Ok(false);
        }

        match self.launch(config) {
            Ok(cycle) => {
                let installed = self.install(&cycle, epoch);
                if installed {
                    log_info!("monitoring restarted (cycle {})", cycle.generation);
                }
                *lifecycle = Some(cycle);
                Ok(installed)
            }
            Err(err) => {
                self.halt();
                Err(err)
            }
        }
    }

    fn launch(&self, config: Configuration) -> MonitorResult<CycleHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|err| MonitorError::Launch {
            reason: err.to_string(),
        })?;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(spawn_cycle(
            &runtime,
            generation,
            config,
            self.inner.services.clone(),
            self.inner.cycles.clone(),
        ))
    }

    /// One drift poll: re-reads the config file and restarts on change.
    /// Unreadable or unchanged files are a no-op. Returns whether the
    /// on-disk document was adopted.
    pub async fn check_config_drift(&self) -> MonitorResult<bool> {
        let current = self.config();
        let Some(updated) = self.inner.store.poll_for_change(&current) else {
            return Ok(false);
        };

        log_info!("configuration changed on disk, reloading");
        let restarted = self.restart(updated).await?;
        self.board()
            .publish(MonitorEvent::ConfigReloaded { restarted });
        Ok(true)
    }

    /// Starts the periodic drift poll. Returns `Ok(false)` if it is already
    /// running.
    pub async fn watch_config(&self) -> MonitorResult<bool> {
        let mut watcher = self.inner.watcher.lock().await;
        if watcher.is_some() {
            return Ok(false);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|err| MonitorError::Launch {
            reason: err.to_string(),
        })?;
        *watcher = Some(spawn_drift_watcher(
            &runtime,
            Arc::downgrade(&self.inner),
            self.inner.options.drift_poll_interval,
        ));
        log_debug!(
            "watching {} every {:?}",
            self.inner.store.path().display(),
            self.inner.options.drift_poll_interval
        );
        Ok(true)
    }

    /// Runs one capture sequence right now, independent of the cycle.
    pub async fn analyze_once(&self) -> MonitorResult<LogEntry> {
        let config = self.config();
        let _busy = self.board().begin_busy(BusyKind::AnalyzeOnce);

        let result = run_sequence(&self.inner.services, &config, CaptureOrigin::OneOff).await;
        if let Err(err) = &result {
            self.report_one_off(BusyKind::AnalyzeOnce, err);
        }
        result
    }

    /// Folds staged notes into the notes tree. Returns how many were consumed.
    pub async fn generate_notes(&self) -> MonitorResult<usize> {
        let config = self.config();
        let _busy = self.board().begin_busy(BusyKind::GenerateNotes);

        match self.synthesize(&config).await {
            Ok(consumed) => {
                log_info!("generated notes from {consumed} staged entries");
                self.board()
                    .publish(MonitorEvent::NotesGenerated { consumed });
                Ok(consumed)
            }
            Err(err) => {
                self.report_one_off(BusyKind::GenerateNotes, &err);
                Err(err)
            }
        }
    }

    async fn synthesize(&self, config: &Configuration) -> MonitorResult<usize> {
        let notes_dir = config.require_notes_dir()?;
        self.inner
            .services
            .collaborators()
            .notes
            .synthesize_notes(&notes_dir)
            .await
            .map_err(MonitorError::PostProcess)
    }

    /// Retries post-processing for every logged entry still marked pending.
    pub async fn process_missing_logs(&self) -> MonitorResult<ReprocessSummary> {
        let config = self.config();
        let _busy = self.board().begin_busy(BusyKind::ProcessLogs);

        match self.reprocess(&config).await {
            Ok(summary) => {
                self.board().publish(MonitorEvent::LogsProcessed {
                    processed: summary.processed,
                    failed: summary.failed,
                });
                Ok(summary)
            }
            Err(err) => {
                self.report_one_off(BusyKind::ProcessLogs, &err);
                Err(err)
            }
        }
    }

    async fn reprocess(&self, config: &Configuration) -> MonitorResult<ReprocessSummary> {
        let notes_dir = config.require_notes_dir()?;
        let services = &self.inner.services;
        services
            .collaborators()
            .notes
            .reprocess_saved_logs(&services.daily_log, &notes_dir)
            .await
            .map_err(MonitorError::LogStorage)
    }

    fn report_one_off(&self, action: BusyKind, err: &MonitorError) {
        log_warn!("{action:?} failed: {err}");
        self.board().flash_error(err.to_string());
        self.board().publish(MonitorEvent::OneOffFailed {
            action,
            stage: err.stage().to_string(),
            message: err.to_string(),
        });
    }

    /// Stops the watcher and the cycle and waits for both to finish.
    pub async fn shutdown(&self) {
        if let Some(watcher) = self.inner.watcher.lock().await.take() {
            watcher.stop().await;
        }

        self.halt();
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if let Some(cycle) = lifecycle.take() {
            cycle.drain().await;
        }
        log_info!("monitor controller shut down");
    }

    pub fn state(&self) -> MonitoringState {
        self.board().state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitoringState::Running
    }

    pub fn display(&self) -> watch::Receiver<DisplayState> {
        self.board().watch_display()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.board().subscribe()
    }

    pub fn status(&self) -> ControllerStatus {
        let flags = self.board().snapshot();
        let display = flags.display();
        ControllerStatus {
            state: flags.state,
            label: display.label(),
            display,
            busy: flags.busy_kinds(),
            interval_ms: self.config().interval().as_millis() as u64,
            active_cycles: self.active_cycles(),
            peak_active_cycles: self.peak_active_cycles(),
            cycles_launched: self.cycles_launched(),
        }
    }

    pub fn config(&self) -> Configuration {
        match self.inner.config.lock() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_config(&self, config: Configuration) {
        match self.inner.config.lock() {
            Ok(mut current) => *current = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }

    /// Cycle tasks that have been spawned and not yet exited.
    pub fn active_cycles(&self) -> usize {
        self.inner.cycles.active()
    }

    /// The most cycle tasks ever alive at the same moment.
    pub fn peak_active_cycles(&self) -> usize {
        self.inner.cycles.peak()
    }

    pub fn cycles_launched(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.inner.services.metrics.clone()
    }

    pub fn daily_log(&self) -> &DailyLog {
        &self.inner.services.daily_log
    }

    pub fn dirs(&self) -> &AppDirs {
        &self.inner.services.dirs
    }

    pub fn store(&self) -> &ConfigStore {
        &self.inner.store
    }
}
