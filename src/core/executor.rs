//! Transfer execution
//!
//! Runs one rclone transfer to completion: spawns the process, streams
//! its progress while waiting for it to exit, and switches service
//! accounts when Google rate-limits the current one.

use std::process::Stdio;
use std::sync::Mutex;

use log::{debug, error, info};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;

use crate::core::command::TransferCommand;
use crate::core::error::{truncate_message, Result};
use crate::core::process::{read_to_string, wait_or_kill, ExitOutcome};
use crate::core::progress::ProgressTracker;
use crate::core::remote::DRIVE_TYPE;
use crate::core::service_accounts::{ServiceAccountPool, RATE_LIMIT_SIGNATURE};
use crate::core::settings::Settings;

/// Diagnostic used when a drive transfer with service accounts fails silently
const SERVICE_ACCOUNT_HINT: &str = "Mostly your service accounts don't have access to this drive!";

/// Lifecycle of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    Running,
    RotatingRetry,
    Completed,
    Cancelled,
    Failed,
}

/// Final result of a transfer, after any retries
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Completed,
    /// Cancellation observed, the cancelling side reports it
    Cancelled,
    /// Process was killed from outside, nothing to report
    Killed,
    /// Failure text already truncated for the listener
    Failed(String),
}

/// Executes transfer commands on behalf of a session
pub struct TransferExecutor<'a> {
    settings: &'a Settings,
    progress: &'a ProgressTracker,
    cancel: &'a CancellationToken,
    state: &'a Mutex<TransferState>,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(
        settings: &'a Settings,
        progress: &'a ProgressTracker,
        cancel: &'a CancellationToken,
        state: &'a Mutex<TransferState>,
    ) -> Self {
        Self {
            settings,
            progress,
            cancel,
            state,
        }
    }

    fn set_state(&self, state: TransferState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Run `command` until it succeeds, fails for good, or is cancelled
    ///
    /// With a pool, rate-limit failures on drive remotes rewrite the
    /// command's remote slot to the next service account and try again,
    /// at most once per account.
    pub async fn run(
        &self,
        mut command: TransferCommand,
        remote_type: &str,
        mut pool: Option<&mut ServiceAccountPool>,
    ) -> AttemptOutcome {
        loop {
            if self.cancel.is_cancelled() {
                self.set_state(TransferState::Cancelled);
                return AttemptOutcome::Cancelled;
            }

            self.set_state(TransferState::Running);
            let attempt = self.attempt(&command).await;

            if self.cancel.is_cancelled() {
                self.set_state(TransferState::Cancelled);
                return AttemptOutcome::Cancelled;
            }

            let (exit, stderr) = match attempt {
                Ok(result) => result,
                Err(e) => {
                    error!("Failed to run {}: {e}", command.program().to_string_lossy());
                    self.set_state(TransferState::Failed);
                    return AttemptOutcome::Failed(truncate_message(&e.to_string()));
                }
            };

            match exit {
                ExitOutcome::Success => {
                    self.set_state(TransferState::Completed);
                    return AttemptOutcome::Completed;
                }
                ExitOutcome::Killed => {
                    self.set_state(TransferState::Cancelled);
                    return AttemptOutcome::Killed;
                }
                ExitOutcome::Failed(code) => {
                    let accounts_active =
                        pool.as_deref().is_some_and(ServiceAccountPool::is_enabled);
                    let message = self.failure_message(stderr, remote_type, accounts_active);
                    error!("rclone exited with code {code}: {message}");

                    if let Some(pool) = pool.as_deref_mut() {
                        if pool.can_rotate(remote_type, &message) {
                            self.set_state(TransferState::RotatingRetry);
                            let remote = pool.rotate();
                            command.rewrite_remote(&remote);
                            continue;
                        }
                        if pool.is_exhausted() && message.contains(RATE_LIMIT_SIGNATURE) {
                            info!("{}", pool.exhausted_error());
                        }
                    }

                    self.set_state(TransferState::Failed);
                    return AttemptOutcome::Failed(truncate_message(&message));
                }
            }
        }
    }

    /// Error text for a failed attempt, with a hint when rclone said nothing
    fn failure_message(&self, stderr: String, remote_type: &str, accounts_active: bool) -> String {
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            stderr.to_string()
        } else if remote_type == DRIVE_TYPE && accounts_active {
            SERVICE_ACCOUNT_HINT.to_string()
        } else {
            self.settings.log_hint()
        }
    }

    /// One spawn-to-exit cycle, returns the exit outcome and stderr text
    async fn attempt(&self, command: &TransferCommand) -> Result<(ExitOutcome, String)> {
        debug!("Running {} {}", command.program().to_string_lossy(), command.args().join(" "));

        let mut child = command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (_, stderr, status) = tokio::join!(
            self.drain_progress(stdout),
            read_to_string(stderr),
            wait_or_kill(&mut child, self.cancel),
        );

        Ok((ExitOutcome::from_status(status?), stderr))
    }

    /// Feed stdout lines to the progress tracker until EOF or cancellation
    async fn drain_progress<R: AsyncRead + Unpin>(&self, stdout: Option<R>) {
        let Some(stdout) = stdout else {
            return;
        };
        let mut lines = BufReader::new(stdout).split(b'\n');

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                line = lines.next_segment() => match line {
                    Ok(Some(line)) => {
                        self.progress.update(&String::from_utf8_lossy(&line));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Stopped reading rclone output: {e}");
                        break;
                    }
                }
            }
        }
    }
}
