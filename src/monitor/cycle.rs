use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Configuration;
use crate::storage::CaptureOrigin;

use super::events::MonitorEvent;
use super::pipeline::{run_sequence, Services};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// A launched background cycle.
pub(crate) struct CycleHandle {
    pub generation: u64,
    pub token: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl CycleHandle {
    /// Cancels and waits for the task to finish whatever sequence it is in.
    pub async fn drain(self) {
        self.token.cancel();
        if let Err(err) = self.handle.await {
            log_error!("monitoring cycle {} failed to join: {err}", self.generation);
        }
    }
}

/// Live cycle tasks, plus the most that were ever alive at once.
#[derive(Default)]
pub(crate) struct CycleCounter {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl CycleCounter {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Holds one slot in a [`CycleCounter`] until the task ends, however it ends.
struct ActiveGuard(Arc<CycleCounter>);

impl ActiveGuard {
    fn enter(counter: Arc<CycleCounter>) -> Self {
        let now = counter.active.fetch_add(1, Ordering::SeqCst) + 1;
        counter.peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) fn spawn_cycle(
    runtime: &tokio::runtime::Handle,
    generation: u64,
    config: Configuration,
    services: Arc<Services>,
    counter: Arc<CycleCounter>,
) -> CycleHandle {
    let token = CancellationToken::new();
    // Counted from spawn, not from the first poll.
    let guard = ActiveGuard::enter(counter);
    let handle = runtime.spawn(monitoring_cycle(
        generation,
        config,
        services,
        token.clone(),
        guard,
    ));
    CycleHandle {
        generation,
        token,
        handle,
    }
}

/// Sleep for the configured interval, then run one capture sequence, until
/// cancelled.
///
/// Only the sleep races the token. A sequence that has started runs to
/// completion and the token is checked again afterwards.
async fn monitoring_cycle(
    generation: u64,
    config: Configuration,
    services: Arc<Services>,
    token: CancellationToken,
    _active: ActiveGuard,
) {
    let interval = config.interval();
    log_info!(
        "monitoring cycle {generation} started (interval {:.2}s)",
        interval.as_secs_f64()
    );
    services.board.publish(MonitorEvent::CycleStarted {
        generation,
        interval_ms: interval.as_millis() as u64,
    });

    let mut iteration: u64 = 0;
    loop {
        if token.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = token.cancelled() => break,
        }

        iteration += 1;
        services.board.set_cycle_busy(true);
        let outcome = run_sequence(&services, &config, CaptureOrigin::Background).await;
        services.board.set_cycle_busy(false);

        if let Err(err) = outcome {
            log_warn!("cycle {generation} iteration {iteration} failed: {err}");
            services.board.publish(MonitorEvent::IterationFailed {
                generation,
                stage: err.stage().to_string(),
                message: err.to_string(),
            });
        }
    }

    log_info!("monitoring cycle {generation} stopped after {iteration} iterations");
    services
        .board
        .publish(MonitorEvent::CycleFinished { generation });
}
