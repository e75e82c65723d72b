//! Task handlers and dispatch

pub mod convert;
pub mod extract;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::data::broker::envelope::{DecodeReportError, TaskMetadata, TaskReport, TaskRequest};
use crate::data::sink::SinkError;
use crate::domain::tools::ToolError;

pub use convert::ConvertTask;
pub use extract::ExtractTask;

/// Errors surfaced by task handlers.
///
/// Everything here aborts the current job and is reported to the
/// orchestrator as a failed status; the worker loop stays alive.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Invalid task request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Piped result decode error: {0}")]
    Pipe(#[from] DecodeReportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task config decode error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Per-job execution context.
pub struct JobContext {
    pub job_id: Uuid,
    /// Scratch directory scoped to this job; removed when the job ends
    pub staging: PathBuf,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Metadata registered with the orchestrator (display name, config form).
    fn metadata(&self) -> TaskMetadata;

    async fn run(&self, ctx: &JobContext, request: &TaskRequest)
    -> Result<TaskReport, TaskError>;
}

/// Name → handler map driving dispatch, worker registration, and the
/// `tasks` subcommand. Registration order is preserved.
#[derive(Default)]
pub struct TaskRegistry {
    handlers: Vec<Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.push(handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.iter().find(|h| h.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    pub fn metadata(&self) -> Vec<TaskMetadata> {
        self.handlers.iter().map(|h| h.metadata()).collect()
    }
}

/// In-flight job cancellation tokens, keyed by job id.
///
/// The broker's revocation watcher cancels through this registry; shutdown
/// uses it to kill whatever is still running after the drain timeout.
#[derive(Default)]
pub struct RevocationRegistry {
    jobs: DashMap<Uuid, CancellationToken>,
}

impl RevocationRegistry {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    /// Register a job and return its cancellation token.
    pub fn register(&self, job_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.jobs.insert(job_id, token.clone());
        token
    }

    /// Cancel a job if it is in flight. Returns whether it was known.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.jobs.get(&job_id) {
            Some(entry) => {
                entry.value().cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a finished job's token.
    pub fn complete(&self, job_id: &Uuid) {
        self.jobs.remove(job_id);
    }

    /// Cancel everything still in flight.
    pub fn cancel_all(&self) {
        for entry in self.jobs.iter() {
            entry.value().cancel();
        }
    }

    pub fn in_flight(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revocation_register_and_cancel() {
        let registry = RevocationRegistry::new();
        let job_id = Uuid::new_v4();
        let token = registry.register(job_id);

        assert_eq!(registry.in_flight(), 1);
        assert!(!token.is_cancelled());
        assert!(registry.cancel(job_id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_revocation_unknown_job() {
        let registry = RevocationRegistry::new();
        assert!(!registry.cancel(Uuid::new_v4()));
    }

    #[test]
    fn test_revocation_complete_removes_entry() {
        let registry = RevocationRegistry::new();
        let job_id = Uuid::new_v4();
        let token = registry.register(job_id);

        registry.complete(&job_id);
        assert_eq!(registry.in_flight(), 0);
        // Completing must not cancel the token
        assert!(!token.is_cancelled());
        assert!(!registry.cancel(job_id));
    }

    #[test]
    fn test_revocation_cancel_all() {
        let registry = RevocationRegistry::new();
        let a = registry.register(Uuid::new_v4());
        let b = registry.register(Uuid::new_v4());

        registry.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }
}
