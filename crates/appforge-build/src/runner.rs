//! Process execution with timeout and optional stdin.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::BuildError;
use crate::stage::CommandSpec;

/// Result of running a command to completion.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Command name.
    pub name: String,

    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the process exited successfully.
    pub success: bool,
}

impl ProcessOutput {
    /// Whether this command passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Last non-empty stderr line, or stdout's if stderr is blank.
    pub fn last_line(&self) -> &str {
        fn last(s: &str) -> Option<&str> {
            s.lines().rev().map(str::trim).find(|l| !l.is_empty())
        }
        last(&self.stderr).or_else(|| last(&self.stdout)).unwrap_or("")
    }
}

/// Runs a [`CommandSpec`] to completion.
pub struct ProcessRunner;

impl ProcessRunner {
    /// Execute a command and return its output.
    pub async fn execute(spec: &CommandSpec) -> anyhow::Result<ProcessOutput> {
        Self::execute_with_input(spec, None).await
    }

    /// Execute a command, writing `input` to its stdin first.
    ///
    /// A non-zero exit is not an error; callers inspect [`ProcessOutput`].
    pub async fn execute_with_input(
        spec: &CommandSpec,
        input: Option<Vec<u8>>,
    ) -> anyhow::Result<ProcessOutput> {
        let start = Instant::now();

        let Some((exe, args)) = spec.command.split_first() else {
            return Err(BuildError::EmptyCommand(spec.name.clone()).into());
        };

        let mut command = Command::new(exe);
        command
            .args(args)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        debug!(name = %spec.name, program = %exe, "Starting process");
        let mut child = command.spawn().map_err(|source| BuildError::Spawn {
            program: exe.clone(),
            source,
        })?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let (Some(mut stdin), Some(input)) = (stdin, input) {
                // The child may exit without reading everything.
                match stdin.write_all(&input).await {
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok(())
        };
        let run = async {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed?;
            output
        };

        let output = if spec.timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(spec.timeout_secs), run)
                .await
                .map_err(|_| BuildError::Timeout {
                    name: spec.name.clone(),
                    secs: spec.timeout_secs,
                })??
        } else {
            run.await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let success = output.status.success();
        debug!(name = %spec.name, exit_code, duration_ms, "Process finished");

        Ok(ProcessOutput {
            name: spec.name.clone(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            success,
        })
    }
}
