//! Tool invocation error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    ExitNonZero {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{program} timed out after {timeout_secs}s")]
    Timeout { program: String, timeout_secs: u64 },

    #[error("{program} cancelled")]
    Cancelled { program: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
