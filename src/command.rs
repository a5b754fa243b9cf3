//! Subprocess execution with deadlock-free stream capture.
//!
//! [`CommandRunner`] launches an executable with a typed argument list and
//! captures stdout and stderr concurrently, so a full pipe buffer can never
//! stall a process that has not exited yet. Two modes are offered:
//!
//! - [`CommandRunner::run`] buffers everything and returns a single
//!   [`CommandOutput`].
//! - [`CommandRunner::stream`] yields stdout line by line over a bounded
//!   channel while the process runs, for progress reporting.
//!
//! Errors are data, not control flow: a process that cannot be launched is
//! reported as a [`CommandOutput`] with no stdout, a descriptive stderr, and
//! no exit status. Nothing in this module panics or returns `Err`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the line channel used by [`CommandRunner::stream`].
const LINE_CHANNEL_CAPACITY: usize = 64;

/// Captured result of one subprocess invocation.
///
/// Empty output is normalized to `None` so callers can tell "ran with no
/// output" apart from "not yet run". `status` is `None` only when the
/// process could not be spawned at all.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub status: Option<ExitStatus>,
}

impl CommandOutput {
    fn from_streams(stdout: String, stderr: String, status: ExitStatus) -> Self {
        Self {
            stdout: (!stdout.is_empty()).then_some(stdout),
            stderr: (!stderr.is_empty()).then_some(stderr),
            status: Some(status),
        }
    }

    fn launch_failure(program: &Path, err: &std::io::Error) -> Self {
        Self {
            stdout: None,
            stderr: Some(format!("failed to launch {}: {}", program.display(), err)),
            status: None,
        }
    }

    fn capture_failure(message: impl Into<String>) -> Self {
        Self {
            stdout: None,
            stderr: Some(message.into()),
            status: None,
        }
    }

    /// Whether the process ran and exited successfully.
    pub fn succeeded(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }
}

/// Launches one fixed executable with per-call argument lists.
///
/// Arguments are always passed as a sequence, never as a combined shell
/// string, so values containing spaces survive intact.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: PathBuf,
}

impl CommandRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run to completion and capture both streams.
    ///
    /// `tokio::process::Command::output` drains stdout and stderr
    /// concurrently with the running child, so neither stream can fill its
    /// pipe buffer and block the process.
    pub async fn run<I, S>(&self, args: I) -> CommandOutput
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let result = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await;

        match result {
            Ok(output) => CommandOutput::from_streams(
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
                output.status,
            ),
            Err(err) => {
                tracing::warn!(program = %self.program.display(), error = %err, "spawn failed");
                CommandOutput::launch_failure(&self.program, &err)
            }
        }
    }

    /// Run while streaming stdout line by line.
    ///
    /// Lines arrive in emission order and are always whole lines; consumers
    /// never see a fragment split mid-line. stderr is collected off to the
    /// side and returned from [`StreamingCommand::wait`] together with the
    /// accumulated stdout and the exit status.
    ///
    /// If the consumer drops the line receiver early the child keeps running
    /// and its output is drained and discarded, so the process still cannot
    /// deadlock on a full pipe.
    pub fn stream<I, S>(&self, args: I) -> StreamingCommand
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (line_tx, line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let program = self.program.clone();
        let handle = tokio::spawn(async move {
            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(err) => {
                    tracing::warn!(program = %program.display(), error = %err, "spawn failed");
                    return CommandOutput::launch_failure(&program, &err);
                }
            };

            let Some(stdout) = child.stdout.take() else {
                return CommandOutput::capture_failure("stdout pipe was not captured");
            };
            let Some(stderr) = child.stderr.take() else {
                return CommandOutput::capture_failure("stderr pipe was not captured");
            };

            // stderr drains on its own task, concurrently with stdout.
            let stderr_task = tokio::spawn(async move {
                let mut buf = String::new();
                let mut reader = BufReader::new(stderr);
                let _ = reader.read_to_string(&mut buf).await;
                buf
            });

            let mut lines = BufReader::new(stdout).lines();
            let mut collected = String::new();
            let mut receiver_gone = false;
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push_str(&line);
                collected.push('\n');
                if !receiver_gone && line_tx.send(line).await.is_err() {
                    receiver_gone = true;
                }
            }

            let status = child.wait().await.ok();
            let stderr = stderr_task.await.unwrap_or_default();

            CommandOutput {
                stdout: (!collected.is_empty()).then_some(collected),
                stderr: (!stderr.is_empty()).then_some(stderr),
                status,
            }
        });

        StreamingCommand {
            lines: line_rx,
            handle,
        }
    }
}

/// A running streamed command: lines on one side, final outcome on the other.
#[derive(Debug)]
pub struct StreamingCommand {
    lines: mpsc::Receiver<String>,
    handle: JoinHandle<CommandOutput>,
}

impl StreamingCommand {
    /// Next stdout line, or `None` once the stream is exhausted.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Wait for the process to exit and return the final capture.
    ///
    /// Closes the line channel first; any lines not yet consumed are dropped
    /// while the child is drained to completion.
    pub async fn wait(mut self) -> CommandOutput {
        self.lines.close();
        match self.handle.await {
            Ok(output) => output,
            Err(err) => CommandOutput::capture_failure(format!("capture task failed: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn empty_output_normalizes_to_none() {
        use std::os::unix::process::ExitStatusExt;

        let out =
            CommandOutput::from_streams(String::new(), String::new(), ExitStatus::from_raw(0));
        assert!(out.stdout.is_none());
        assert!(out.stderr.is_none());
        assert!(out.succeeded());
    }

    #[test]
    fn launch_failure_has_no_status() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let out = CommandOutput::launch_failure(Path::new("/nonexistent/brew"), &err);
        assert!(out.stdout.is_none());
        assert!(out.status.is_none());
        assert!(!out.succeeded());
        assert!(out.stderr.unwrap().contains("/nonexistent/brew"));
    }
}
