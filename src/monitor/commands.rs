//! Text commands a frontend sends to the controller.
//!
//! Lifecycle commands are awaited; the one-off actions are spawned so the
//! caller gets an immediate acknowledgement and sees completion through
//! [`MonitorEvent`](super::MonitorEvent)s.

use std::str::FromStr;

use super::controller::MonitorController;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendCommand {
    Start,
    Stop,
    AnalyzeOnce,
    ProcessLogs,
    GenerateNotes,
    Status,
    Metrics,
    Quit,
}

impl FromStr for FrontendCommand {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(FrontendCommand::Start),
            "stop" => Ok(FrontendCommand::Stop),
            "analyze" | "analyze-once" => Ok(FrontendCommand::AnalyzeOnce),
            "process-logs" | "process-missing-logs" => Ok(FrontendCommand::ProcessLogs),
            "generate-notes" | "notes" => Ok(FrontendCommand::GenerateNotes),
            "status" => Ok(FrontendCommand::Status),
            "metrics" => Ok(FrontendCommand::Metrics),
            "quit" | "exit" => Ok(FrontendCommand::Quit),
            other => Err(format!("unknown command `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Message(String),
    Quit,
}

pub async fn dispatch(
    controller: &MonitorController,
    command: FrontendCommand,
) -> Result<CommandReply, String> {
    log_debug!("dispatching {command:?}");
    match command {
        FrontendCommand::Start => {
            let started = controller.start().await.map_err(|err| err.to_string())?;
            Ok(CommandReply::Message(if started {
                "monitoring started".into()
            } else {
                "already running".into()
            }))
        }
        FrontendCommand::Stop => {
            let stopped = controller.stop().await;
            Ok(CommandReply::Message(if stopped {
                "monitoring stopped".into()
            } else {
                "already stopped".into()
            }))
        }
        FrontendCommand::AnalyzeOnce => {
            let controller = controller.clone();
            tokio::spawn(async move {
                // Failures are reported through the display and events.
                let _ = controller.analyze_once().await;
            });
            Ok(CommandReply::Message("analysis started".into()))
        }
        FrontendCommand::ProcessLogs => {
            let controller = controller.clone();
            tokio::spawn(async move {
                let _ = controller.process_missing_logs().await;
            });
            Ok(CommandReply::Message("processing missing logs".into()))
        }
        FrontendCommand::GenerateNotes => {
            let controller = controller.clone();
            tokio::spawn(async move {
                let _ = controller.generate_notes().await;
            });
            Ok(CommandReply::Message("generating notes".into()))
        }
        FrontendCommand::Status => serde_json::to_string(&controller.status())
            .map(CommandReply::Message)
            .map_err(|err| err.to_string()),
        FrontendCommand::Metrics => serde_json::to_string(&controller.metrics().get_snapshot().await)
            .map(CommandReply::Message)
            .map_err(|err| err.to_string()),
        FrontendCommand::Quit => Ok(CommandReply::Quit),
    }
}
