//! Running build steps as child processes

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::PlatformError;
use crate::executor::publisher::EventPublisher;

/// Run `command`, forwarding each line it writes to stdout or stderr as an
/// INFO event in arrival order, and wait for it to exit.
pub async fn run_streaming(
    mut command: Command,
    publisher: &EventPublisher,
) -> Result<ExitStatus, std::io::Error> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, tx.clone()));
    }
    drop(tx);

    while let Some(line) = rx.recv().await {
        publisher.info(line).await;
    }

    child.wait().await
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                if tx.send(line).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                debug!("Stopped reading build output: {}", e);
                return;
            }
        }
    }
}

/// Shallow-clone `repo_url` into `target_dir`
pub async fn clone_repository(
    git_bin: &str,
    repo_url: &str,
    target_dir: &Path,
    publisher: &EventPublisher,
) -> Result<(), PlatformError> {
    let mut command = Command::new(git_bin);
    command
        .args(["clone", "--depth", "1", "--", repo_url])
        .arg(target_dir)
        .env("GIT_TERMINAL_PROMPT", "0");

    let status = run_streaming(command, publisher)
        .await
        .map_err(|e| PlatformError::BuildError(format!("unable to run git clone, {}", e)))?;

    if !status.success() {
        return Err(PlatformError::BuildError(format!(
            "unable to clone the repository {}, git exited with {}",
            repo_url, status
        )));
    }
    Ok(())
}

/// Run the build command through `shell -c` inside `source_dir`
pub async fn run_build(
    shell: &str,
    build_command: &str,
    source_dir: &Path,
    publisher: &EventPublisher,
) -> Result<(), PlatformError> {
    let mut command = Command::new(shell);
    command.current_dir(source_dir).args(["-c", build_command]);

    let status = run_streaming(command, publisher)
        .await
        .map_err(|e| PlatformError::BuildError(format!("unable to start the build, {}", e)))?;

    if !status.success() {
        return Err(PlatformError::BuildError(format!(
            "unable to build the application, build command exited with {}",
            status
        )));
    }
    Ok(())
}
