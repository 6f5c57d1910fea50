pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod notes;
pub mod sensing;
pub mod storage;
pub mod utils;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use config::{AppDirs, ConfigStore};
use monitor::{dispatch, CommandReply, ControllerOptions, FrontendCommand, MonitorController};

pub use error::{MonitorError, MonitorResult};

const ENABLE_LOGS: bool = true;

const AUTOSTART_ENV: &str = "MEADOW_AUTOSTART";
const DEBUG_ENV: &str = "MEADOW_DEBUG";

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Runs the headless monitor until `quit` or Ctrl-C.
pub fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log_info!("Meadow starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(serve())
}

async fn serve() -> anyhow::Result<()> {
    let dirs = AppDirs::resolve()?;
    dirs.ensure()?;
    log_info!("app directory: {}", dirs.root().display());

    let store = ConfigStore::new(dirs.config_file());
    let controller =
        MonitorController::with_default_collaborators(store, dirs, ControllerOptions::default())?;
    controller.watch_config().await?;

    let today = controller.daily_log().current_path().await?;
    log_info!("logging captures to {}", today.display());

    spawn_status_logger(&controller, env_flag(DEBUG_ENV));

    if env_flag(AUTOSTART_ENV) {
        controller.start().await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if !handle_line(&controller, &line) {
                        break;
                    }
                }
                Ok(None) => {
                    log_debug!("stdin closed; waiting for Ctrl-C");
                    stdin_open = false;
                }
                Err(err) => {
                    log_warn!("failed to read stdin: {err}");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                log_info!("received Ctrl-C");
                break;
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

/// Returns `false` once the user asked to quit. Every other command runs on
/// its own task so stdin and Ctrl-C stay responsive while it works.
fn handle_line(controller: &MonitorController, line: &str) -> bool {
    let command = match line.parse::<FrontendCommand>() {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}");
            return true;
        }
    };
    if command == FrontendCommand::Quit {
        return false;
    }

    let controller = controller.clone();
    tokio::spawn(async move {
        match dispatch(&controller, command).await {
            Ok(CommandReply::Message(message)) => println!("{message}"),
            Ok(CommandReply::Quit) => {}
            Err(err) => eprintln!("error: {err}"),
        }
    });
    true
}

fn spawn_status_logger(controller: &MonitorController, verbose: bool) {
    let mut display = controller.display();
    tokio::spawn(async move {
        while display.changed().await.is_ok() {
            let label = display.borrow_and_update().label();
            log_info!("status: {label}");
        }
    });

    if !verbose {
        return;
    }

    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => log_info!("event: {json}"),
                    Err(err) => log_warn!("unserializable event {event:?}: {err}"),
                },
                Err(RecvError::Lagged(skipped)) => log_warn!("event logger skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
