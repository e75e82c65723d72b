//! Extraction invoker for the `target-query` tool
//!
//! `target-query <artifact> -f <query> -q` runs the selected query function
//! against an artifact and writes records to stdout, which the worker
//! captures as the dump file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::error::ToolError;
use super::runner::{ToolCommand, ToolOutput};

/// Invokes `target-query` to extract timeline records from one artifact.
pub struct TargetQuery {
    bin: PathBuf,
    timeout: Duration,
}

impl TargetQuery {
    pub fn new(bin: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    fn command(&self, artifact: &Path, query: &str) -> ToolCommand {
        ToolCommand::new(&self.bin, self.timeout)
            .arg(artifact.display().to_string())
            .arg("-f")
            .arg(query)
            .arg("-q")
    }

    /// Rendered command line for task reports.
    pub fn command_line(&self, artifact: &Path, query: &str) -> String {
        self.command(artifact, query).command_line()
    }

    /// Run `query` against `artifact`, capturing the dump to `dump_path`.
    pub async fn dump(
        &self,
        artifact: &Path,
        query: &str,
        dump_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolError> {
        if !artifact.is_file() {
            return Err(ToolError::InputNotFound {
                path: artifact.to_path_buf(),
            });
        }

        let command = self.command(artifact, query);
        tracing::debug!(command = %command.command_line(), "Running target-query");
        let output = command.run_to_file(dump_path, cancel).await?;
        tracing::debug!(
            duration_ms = output.duration.as_millis() as u64,
            "target-query finished"
        );
        Ok(output)
    }
}
