use std::{path::Path, process::Stdio};

use anyhow::{bail, Context, Result};
use tokio::{io::AsyncWriteExt, process::Command};

/// Runs an external helper to completion and returns its stdout.
///
/// A non-zero exit status is an error carrying the helper's stderr.
pub async fn run_command(argv: &[String], cwd: Option<&Path>, input: Option<&str>) -> Result<String> {
    let Some((program, args)) = argv.split_first() else {
        bail!("empty command");
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn `{program}`"))?;

    if let Some(text) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .with_context(|| format!("failed to write stdin of `{program}`"))?;
        }
    }

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("failed to wait for `{program}`"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("`{program}` exited with {}: {}", output.status, stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
