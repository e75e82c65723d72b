//! Subprocess supervision shared by the toolkit invokers
//!
//! Every invocation gets the same treatment: stdin closed, stderr drained
//! concurrently, `kill_on_drop` as a last resort, and a select over exit,
//! timeout, and cancellation so a revoked job kills its subprocess.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::ToolError;

/// One external tool invocation with a bounded timeout.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

/// Outcome of a finished invocation.
#[derive(Debug)]
pub struct ToolOutput {
    /// Captured stderr (may be empty)
    pub stderr: String,
    pub duration: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Rendered command line for task reports and logs.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    fn spawn(&self, stdout: Stdio) -> Result<Child, ToolError> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Spawn {
                program: self.program_name(),
                source: e,
            })
    }

    /// Wait for exit, killing the child on timeout or cancellation.
    async fn supervise(
        &self,
        child: &mut Child,
        cancel: &CancellationToken,
    ) -> Result<std::process::ExitStatus, ToolError> {
        tokio::select! {
            status = child.wait() => Ok(status?),
            _ = tokio::time::sleep(self.timeout) => {
                child.kill().await.ok();
                Err(ToolError::Timeout {
                    program: self.program_name(),
                    timeout_secs: self.timeout.as_secs(),
                })
            }
            _ = cancel.cancelled() => {
                child.kill().await.ok();
                Err(ToolError::Cancelled {
                    program: self.program_name(),
                })
            }
        }
    }

    /// Run with stdout redirected to `stdout_path`.
    pub async fn run_to_file(
        &self,
        stdout_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        let file = std::fs::File::create(stdout_path)?;
        let started = Instant::now();
        let mut child = self.spawn(Stdio::from(file))?;
        let stderr_task = spawn_reader(child.stderr.take());
        let result = self.supervise(&mut child, cancel).await;
        let stderr = join_reader(stderr_task).await;
        let status = result?;
        if !status.success() {
            return Err(ToolError::ExitNonZero {
                program: self.program_name(),
                code: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(ToolOutput {
            stderr,
            duration: started.elapsed(),
        })
    }

    /// Run and capture stdout in memory. Meant for short invocations such
    /// as version probes.
    pub async fn run_captured(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(ToolOutput, String), ToolError> {
        let started = Instant::now();
        let mut child = self.spawn(Stdio::piped())?;
        let stdout_task = spawn_reader(child.stdout.take());
        let stderr_task = spawn_reader(child.stderr.take());
        let result = self.supervise(&mut child, cancel).await;
        let stdout = join_reader(stdout_task).await;
        let stderr = join_reader(stderr_task).await;
        let status = result?;
        if !status.success() {
            return Err(ToolError::ExitNonZero {
                program: self.program_name(),
                code: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok((
            ToolOutput {
                stderr,
                duration: started.elapsed(),
            },
            stdout,
        ))
    }

    /// Spawn with stdout piped for line-by-line consumption.
    pub fn spawn_streaming(&self) -> Result<StreamingTool, ToolError> {
        let mut child = self.spawn(Stdio::piped())?;
        let stdout = child.stdout.take().ok_or_else(|| ToolError::Spawn {
            program: self.program_name(),
            source: std::io::Error::other("stdout not captured"),
        })?;
        let stderr_task = spawn_reader(child.stderr.take());
        let started = Instant::now();
        Ok(StreamingTool {
            program: self.program_name(),
            child,
            lines: BufReader::new(stdout).lines(),
            stderr_task,
            started,
            deadline: started + self.timeout,
            timeout_secs: self.timeout.as_secs(),
        })
    }
}

/// A spawned tool whose stdout is consumed line by line.
///
/// The timeout covers the whole invocation: the deadline is fixed at spawn
/// time and shared by every `next_line` call and the final `finish`.
#[derive(Debug)]
pub struct StreamingTool {
    program: String,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<String>>,
    started: Instant,
    deadline: Instant,
    timeout_secs: u64,
}

impl StreamingTool {
    /// Next stdout line, or `None` at end of stream. Kills the child on
    /// timeout or cancellation.
    pub async fn next_line(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ToolError> {
        tokio::select! {
            line = self.lines.next_line() => Ok(line?),
            _ = tokio::time::sleep_until(self.deadline) => {
                self.child.kill().await.ok();
                Err(ToolError::Timeout {
                    program: self.program.clone(),
                    timeout_secs: self.timeout_secs,
                })
            }
            _ = cancel.cancelled() => {
                self.child.kill().await.ok();
                Err(ToolError::Cancelled {
                    program: self.program.clone(),
                })
            }
        }
    }

    /// Wait for exit and verify it, returning captured stderr.
    pub async fn finish(mut self, cancel: &CancellationToken) -> Result<ToolOutput, ToolError> {
        let result = tokio::select! {
            status = self.child.wait() => status.map_err(ToolError::from),
            _ = tokio::time::sleep_until(self.deadline) => {
                self.child.kill().await.ok();
                Err(ToolError::Timeout {
                    program: self.program.clone(),
                    timeout_secs: self.timeout_secs,
                })
            }
            _ = cancel.cancelled() => {
                self.child.kill().await.ok();
                Err(ToolError::Cancelled {
                    program: self.program.clone(),
                })
            }
        };
        let stderr = join_reader(self.stderr_task.take()).await;
        let status = result?;
        if !status.success() {
            return Err(ToolError::ExitNonZero {
                program: self.program.clone(),
                code: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(ToolOutput {
            stderr,
            duration: self.started.elapsed(),
        })
    }
}

/// Drain a pipe to a string on a background task so the child never blocks
/// on a full pipe buffer.
fn spawn_reader<R>(pipe: Option<R>) -> Option<JoinHandle<String>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let pipe = pipe?;
    Some(tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = String::new();
        let _ = reader.read_to_string(&mut buf).await;
        buf
    }))
}

async fn join_reader(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> ToolCommand {
        ToolCommand::new("sh", timeout).arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_run_captured_collects_stdout() {
        let cancel = CancellationToken::new();
        let (_, stdout) = sh("echo hello", Duration::from_secs(5))
            .run_captured(&cancel)
            .await
            .unwrap();
        assert_eq!(stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_to_file_redirects_stdout_and_captures_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let cancel = CancellationToken::new();

        let output = sh("echo captured; echo diagnostics >&2", Duration::from_secs(5))
            .run_to_file(&out, &cancel)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "captured\n");
        assert!(output.stderr.contains("diagnostics"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_code_and_stderr() {
        let cancel = CancellationToken::new();
        let err = sh("echo boom >&2; exit 3", Duration::from_secs(5))
            .run_captured(&cancel)
            .await
            .unwrap_err();

        match err {
            ToolError::ExitNonZero { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected ExitNonZero, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let cancel = CancellationToken::new();
        let err = sh("sleep 5", Duration::from_millis(100))
            .run_captured(&cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_kills_child() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = sh("sleep 5", Duration::from_secs(10))
            .run_captured(&cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let cancel = CancellationToken::new();
        let err = ToolCommand::new("/nonexistent/tool", Duration::from_secs(1))
            .run_captured(&cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_streaming_lines_then_finish() {
        let cancel = CancellationToken::new();
        let mut stream = sh(r#"printf 'one\ntwo\n'"#, Duration::from_secs(5))
            .spawn_streaming()
            .unwrap();

        assert_eq!(
            stream.next_line(&cancel).await.unwrap(),
            Some("one".to_string())
        );
        assert_eq!(
            stream.next_line(&cancel).await.unwrap(),
            Some("two".to_string())
        );
        assert_eq!(stream.next_line(&cancel).await.unwrap(), None);

        stream.finish(&cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_streaming_finish_reports_failure() {
        let cancel = CancellationToken::new();
        let mut stream = sh("echo partial; exit 9", Duration::from_secs(5))
            .spawn_streaming()
            .unwrap();

        while stream.next_line(&cancel).await.unwrap().is_some() {}
        let err = stream.finish(&cancel).await.unwrap_err();
        assert!(matches!(err, ToolError::ExitNonZero { code: 9, .. }));
    }

    #[test]
    fn test_command_line_rendering() {
        let command = ToolCommand::new("target-query", Duration::from_secs(1))
            .arg("/evidence/disk.img")
            .arg("-f")
            .arg("browser_history")
            .arg("-q");
        assert_eq!(
            command.command_line(),
            "target-query /evidence/disk.img -f browser_history -q"
        );
    }
}
