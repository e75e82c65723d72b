//! Conversion invoker for the `rdump` tool
//!
//! `rdump <dump> -J` reads a dump file and emits one JSON record per line
//! on stdout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::ToolError;
use super::runner::{StreamingTool, ToolCommand};

/// Invokes `rdump` to normalize a dump into line-delimited records.
pub struct Rdump {
    bin: PathBuf,
    timeout: Duration,
}

impl Rdump {
    pub fn new(bin: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    fn command(&self, dump: &Path) -> ToolCommand {
        ToolCommand::new(&self.bin, self.timeout)
            .arg(dump.display().to_string())
            .arg("-J")
    }

    /// Rendered command line for task reports.
    pub fn command_line(&self, dump: &Path) -> String {
        self.command(dump).command_line()
    }

    /// Spawn rdump emitting line-delimited JSON records from `dump`.
    pub fn stream_records(&self, dump: &Path) -> Result<StreamingTool, ToolError> {
        if !dump.is_file() {
            return Err(ToolError::InputNotFound {
                path: dump.to_path_buf(),
            });
        }

        let command = self.command(dump);
        tracing::debug!(command = %command.command_line(), "Running rdump");
        command.spawn_streaming()
    }
}
