use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::controller::{ControllerInner, MonitorController};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub(crate) struct WatcherHandle {
    pub token: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl WatcherHandle {
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

/// Polls the configuration file every `period` and restarts the cycle when
/// the document drifts from the one in memory.
///
/// Holds only a weak reference, so the watcher ends on its own once the
/// controller is dropped.
pub(crate) fn spawn_drift_watcher(
    runtime: &tokio::runtime::Handle,
    controller: Weak<ControllerInner>,
    period: Duration,
) -> WatcherHandle {
    let token = CancellationToken::new();
    let cancel = token.clone();

    let handle = runtime.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(controller) = MonitorController::upgrade(&controller) else {
                        break;
                    };
                    if let Err(err) = controller.check_config_drift().await {
                        log_warn!("config reload failed: {err}");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        log_info!("config watcher stopped");
    });

    WatcherHandle { token, handle }
}
