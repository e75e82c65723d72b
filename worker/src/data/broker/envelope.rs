//! Wire types shared with the task orchestrator
//!
//! Everything crossing the broker is JSON: job envelopes on the task
//! streams, statuses and base64-encoded reports under result keys, revoke
//! messages on the control channel, and the worker registration hash.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One job as published to a task stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: Uuid,
    pub task: String,
    pub submitted_at: DateTime<Utc>,
    pub request: TaskRequest,
}

/// Task request: ordered inputs plus per-task configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Encoded report from the previous pipeline stage, if any.
    /// When present, its output files replace `input_files`.
    #[serde(default)]
    pub pipe_result: Option<String>,
    #[serde(default)]
    pub input_files: Vec<InputFile>,
    /// Directory where output files are materialized
    #[serde(default)]
    pub output_path: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// Task-specific configuration, decoded by the handler
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

/// Reference to one task input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFile {
    pub path: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
}

/// Reference to one produced output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: String,
    pub display_name: String,
    pub data_type: String,
}

impl OutputFile {
    /// Create a uuid-named output file reference in `output_dir`.
    /// The file itself is written by the caller.
    pub fn create(output_dir: &Path, extension: &str, data_type: &str) -> Self {
        let display_name = format!("{}.{}", Uuid::new_v4(), extension);
        Self {
            path: output_dir.join(&display_name).display().to_string(),
            display_name,
            data_type: data_type.to_string(),
        }
    }

    /// View this output as the next stage's input.
    pub fn as_input(&self) -> InputFile {
        InputFile {
            path: self.path.clone(),
            display_name: Some(self.display_name.clone()),
            data_type: Some(self.data_type.clone()),
        }
    }
}

/// Counters and tool info attached to a task report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
    #[serde(default)]
    pub records_emitted: u64,
    #[serde(default)]
    pub records_forwarded: u64,
    #[serde(default)]
    pub records_failed: u64,
    #[serde(default)]
    pub records_skipped: u64,
}

/// Result of one finished job, stored in the result backend and piped to
/// the next stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskReport {
    #[serde(default)]
    pub output_files: Vec<OutputFile>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// Command line of the last tool invocation
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub meta: ReportMeta,
}

#[derive(Error, Debug)]
pub enum DecodeReportError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid report JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TaskReport {
    /// Encode as base64 JSON for storage and stage chaining.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        Ok(BASE64.encode(serde_json::to_vec(self)?))
    }

    pub fn decode(encoded: &str) -> Result<Self, DecodeReportError> {
        let bytes = BASE64.decode(encoded.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Resolve a request's effective inputs: a piped predecessor report wins
/// over explicitly listed input files.
pub fn resolve_input_files(request: &TaskRequest) -> Result<Vec<InputFile>, DecodeReportError> {
    match &request.pipe_result {
        Some(encoded) => {
            let report = TaskReport::decode(encoded)?;
            Ok(report.output_files.iter().map(OutputFile::as_input).collect())
        }
        None => Ok(request.input_files.clone()),
    }
}

/// Job status as stored under the status key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Running {
        worker: String,
        started_at: DateTime<Utc>,
    },
    Succeeded {
        finished_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        finished_at: DateTime<Utc>,
    },
    Revoked {
        finished_at: DateTime<Utc>,
    },
}

impl JobStatus {
    pub fn running(worker: &str) -> Self {
        Self::Running {
            worker: worker.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn succeeded() -> Self {
        Self::Succeeded {
            finished_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
            finished_at: Utc::now(),
        }
    }

    pub fn revoked() -> Self {
        Self::Revoked {
            finished_at: Utc::now(),
        }
    }
}

/// Message on the control channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlMessage {
    Revoke { job_id: Uuid },
}

/// Form field type rendered by the orchestrator UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFieldType {
    Text,
    Autocomplete,
    Checkbox,
}

/// One user-facing configuration field of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: String,
    pub label: String,
    pub description: String,
    #[serde(rename = "type")]
    pub field_type: ConfigFieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

/// Metadata a task registers with the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub name: String,
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub task_config: Vec<ConfigField>,
}

/// Registration record announced under the workers hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub tasks: Vec<TaskMetadata>,
    #[serde(default)]
    pub tool_versions: BTreeMap<String, String>,
}
