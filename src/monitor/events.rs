use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::storage::{CaptureOrigin, NotesStatus};

use super::state::{BusyKind, DisplayState, MonitoringState, StatusFlags};

/// Events pushed to whatever frontend is attached.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    StateChanged {
        state: MonitoringState,
    },
    CycleStarted {
        generation: u64,
        interval_ms: u64,
    },
    CycleFinished {
        generation: u64,
    },
    CaptureLogged {
        capture_id: Uuid,
        origin: CaptureOrigin,
        notes: NotesStatus,
    },
    IterationFailed {
        generation: u64,
        stage: String,
        message: String,
    },
    OneOffFailed {
        action: BusyKind,
        stage: String,
        message: String,
    },
    ConfigReloaded {
        restarted: bool,
    },
    NotesGenerated {
        consumed: usize,
    },
    LogsProcessed {
        processed: usize,
        failed: usize,
    },
}

/// Status flags plus the channels that publish them.
///
/// Every mutation goes through [`StatusBoard::update`] so the display watch
/// channel never disagrees with the flags.
pub(crate) struct StatusBoard {
    flags: Mutex<StatusFlags>,
    display: watch::Sender<DisplayState>,
    events: broadcast::Sender<MonitorEvent>,
}

impl StatusBoard {
    pub fn new(event_capacity: usize) -> Self {
        let (display, _) = watch::channel(DisplayState::default());
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            flags: Mutex::new(StatusFlags::new()),
            display,
            events,
        }
    }

    pub fn snapshot(&self) -> StatusFlags {
        match self.flags.lock() {
            Ok(flags) => flags.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn state(&self) -> MonitoringState {
        self.snapshot().state
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut StatusFlags) -> R) -> R {
        let mut flags = match self.flags.lock() {
            Ok(flags) => flags,
            Err(poisoned) => poisoned.into_inner(),
        };
        let out = f(&mut flags);
        let display = flags.display();
        drop(flags);

        self.display.send_if_modified(|current| {
            if *current == display {
                false
            } else {
                *current = display;
                true
            }
        });
        out
    }

    /// Sets the monitoring state, returning whether it changed.
    pub fn set_state(&self, state: MonitoringState) -> bool {
        let changed = self.update(|flags| {
            if flags.state == state {
                return false;
            }
            flags.state = state;
            flags.flash_error = None;
            true
        });
        if changed {
            self.publish(MonitorEvent::StateChanged { state });
        }
        changed
    }

    pub fn begin_busy(&self, kind: BusyKind) -> BusyGuard<'_> {
        self.update(|flags| flags.begin_busy(kind));
        BusyGuard { board: self, kind }
    }

    pub fn set_cycle_busy(&self, busy: bool) {
        self.update(|flags| {
            if busy {
                flags.flash_error = None;
            }
            flags.cycle_busy = busy;
        });
    }

    pub fn flash_error(&self, message: String) {
        self.update(|flags| flags.flash_error = Some(message));
    }

    pub fn publish(&self, event: MonitorEvent) {
        // No subscribers is fine; the event is simply dropped.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn watch_display(&self) -> watch::Receiver<DisplayState> {
        self.display.subscribe()
    }
}

/// Holds a busy slot open until dropped.
pub(crate) struct BusyGuard<'a> {
    board: &'a StatusBoard,
    kind: BusyKind,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let kind = self.kind;
        self.board.update(|flags| flags.end_busy(kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_channel_tracks_flags() {
        let board = StatusBoard::new(8);
        let display = board.watch_display();

        board.set_state(MonitoringState::Running);
        assert_eq!(*display.borrow(), DisplayState::Active);

        {
            let _busy = board.begin_busy(BusyKind::GenerateNotes);
            assert_eq!(*display.borrow(), DisplayState::Generating);
        }
        assert_eq!(*display.borrow(), DisplayState::Active);
    }

    #[test]
    fn flash_survives_end_of_busy_work() {
        let board = StatusBoard::new(8);
        let display = board.watch_display();
        {
            let _busy = board.begin_busy(BusyKind::AnalyzeOnce);
            board.flash_error("capture failed".into());
        }
        assert_eq!(*display.borrow(), DisplayState::Error("capture failed".into()));

        board.set_cycle_busy(true);
        assert_eq!(*display.borrow(), DisplayState::Analyzing);
    }

    #[test]
    fn state_changes_are_published_once() {
        let board = StatusBoard::new(8);
        let mut events = board.subscribe();

        assert!(board.set_state(MonitoringState::Running));
        assert!(!board.set_state(MonitoringState::Running));

        assert_eq!(
            events.try_recv().unwrap(),
            MonitorEvent::StateChanged {
                state: MonitoringState::Running
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let board = StatusBoard::new(1);
        board.publish(MonitorEvent::ConfigReloaded { restarted: false });
    }
}
