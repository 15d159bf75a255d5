//! Process helpers shared by transfers and link lookups

use std::process::{ExitStatus, Stdio};

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

use crate::core::command::TransferCommand;
use crate::core::error::Result;

/// Exit code reported for a process killed with SIGKILL
pub const KILLED_CODE: i32 = -9;

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    /// Terminated by SIGKILL, usually through a cancellation
    Killed,
    Failed(i32),
}

impl ExitOutcome {
    /// Classify an exit status, signals are reported as negative codes
    pub fn from_status(status: ExitStatus) -> Self {
        Self::from_code(exit_code(status))
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ExitOutcome::Success,
            KILLED_CODE => ExitOutcome::Killed,
            other => ExitOutcome::Failed(other),
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) if signal == libc::SIGKILL => KILLED_CODE,
        (None, Some(signal)) => -signal,
        (None, None) => -1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(KILLED_CODE)
}

/// Captured result of a short-lived command
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub outcome: ExitOutcome,
}

/// Run a command to completion and capture both streams
///
/// Nothing is spawned once `cancel` has fired, and a running child is
/// killed when it fires; both cases report [`ExitOutcome::Killed`].
pub async fn run_to_completion(
    command: &TransferCommand,
    cancel: &CancellationToken,
) -> Result<ProcessOutput> {
    if cancel.is_cancelled() {
        return Ok(ProcessOutput::killed());
    }

    let mut child = command
        .to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (stdout, stderr, status) = tokio::join!(
        read_to_string(stdout),
        read_to_string(stderr),
        wait_or_kill(&mut child, cancel),
    );

    Ok(ProcessOutput {
        stdout: stdout.trim().to_string(),
        stderr: stderr.trim().to_string(),
        outcome: ExitOutcome::from_status(status?),
    })
}

impl ProcessOutput {
    fn killed() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            outcome: ExitOutcome::Killed,
        }
    }
}

/// Wait for exit, killing the child first if `cancel` fires
pub async fn wait_or_kill(
    child: &mut Child,
    cancel: &CancellationToken,
) -> std::io::Result<ExitStatus> {
    tokio::select! {
        status = child.wait() => status,
        _ = cancel.cancelled() => {
            if let Err(e) = child.start_kill() {
                debug!("Could not kill rclone: {e}");
            }
            child.wait().await
        }
    }
}

/// Drain a stream into a string, lossy on invalid UTF-8
pub async fn read_to_string<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buffer = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buffer).await {
        debug!("Stopped reading rclone output: {e}");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
