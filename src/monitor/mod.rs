//! The monitoring controller: lifecycle state machine, background capture
//! cycle, config drift watcher and the one-off actions.

pub mod commands;
pub mod controller;
mod cycle;
pub mod events;
mod pipeline;
pub mod state;
mod watcher;

pub use commands::{dispatch, CommandReply, FrontendCommand};
pub use controller::{ControllerOptions, ControllerStatus, MonitorController};
pub use events::MonitorEvent;
pub use pipeline::{CollaboratorFactory, Collaborators};
pub use state::{BusyKind, DisplayState, MonitoringState, StatusFlags};
