//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, BROKER_BLOCK_MS, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::core::storage::AppStorage;
use crate::data::broker::envelope::{JobStatus, WorkerRegistration};
use crate::data::broker::{Broker, DeliveredJob};
use crate::domain::tasks::{
    ConvertTask, ExtractTask, JobContext, RevocationRegistry, TaskRegistry,
};
use crate::domain::tools::ToolVersions;

pub struct WorkerApp {
    pub config: AppConfig,
    pub storage: AppStorage,
    pub broker: Arc<Broker>,
    pub registry: Arc<TaskRegistry>,
    pub revocations: Arc<RevocationRegistry>,
    pub shutdown: ShutdownService,
    pub worker_id: String,
}

impl WorkerApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Worker starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::Tasks) => return Self::print_task_metadata(&cli_config).await,
            Some(Commands::Start) | None => {}
        }

        let app = Self::init(&cli_config).await?;
        Self::start_worker(app).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let storage = AppStorage::init(&config).await?;

        let versions = ToolVersions::detect(&config.tools).await;
        let registry = Arc::new(Self::build_registry(&config, &versions));

        let broker = Arc::new(
            Broker::connect(&config.broker.url, config.worker.result_ttl_secs)
                .await
                .context("Failed to connect to broker")?,
        );
        for task in registry.names() {
            broker
                .ensure_group(&task)
                .await
                .with_context(|| format!("Failed to create consumer group for {task}"))?;
        }

        let worker_id = worker_id();
        let registration = WorkerRegistration {
            worker_id: worker_id.clone(),
            started_at: Utc::now(),
            tasks: registry.metadata(),
            tool_versions: versions.as_map(),
        };
        broker
            .register_worker(&registration)
            .await
            .context("Failed to register worker")?;

        let revocations = Arc::new(RevocationRegistry::new());
        let shutdown = ShutdownService::new(revocations.clone());

        Ok(Self {
            config,
            storage,
            broker,
            registry,
            revocations,
            shutdown,
            worker_id,
        })
    }

    fn build_registry(config: &AppConfig, versions: &ToolVersions) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry.register(Arc::new(ExtractTask::new(&config.tools, versions)));
        registry.register(Arc::new(ConvertTask::new(
            &config.tools,
            config.sink.clone(),
            versions,
        )));
        registry
    }

    /// Print registered task metadata as JSON and exit (`tasks` subcommand)
    async fn print_task_metadata(cli: &CliConfig) -> Result<()> {
        let config = AppConfig::load(cli)?;
        let versions = ToolVersions::detect(&config.tools).await;
        let registry = Self::build_registry(&config, &versions);
        println!("{}", serde_json::to_string_pretty(&registry.metadata())?);
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_worker(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        let watcher = app
            .broker
            .watch_revocations(app.revocations.clone(), app.shutdown.subscribe());
        app.shutdown.register(watcher).await;

        tracing::info!(
            worker_id = %app.worker_id,
            tasks = ?app.registry.names(),
            concurrency = app.config.worker.concurrency,
            sink_configured = app.config.sink.is_some(),
            "Worker ready"
        );

        let runner = Arc::new(JobRunner {
            broker: app.broker.clone(),
            registry: app.registry.clone(),
            revocations: app.revocations.clone(),
            storage: app.storage.clone(),
            worker_id: app.worker_id.clone(),
            debug: app.config.debug,
        });

        for slot in 0..app.config.worker.concurrency {
            let handle = tokio::spawn(
                runner
                    .clone()
                    .run_loop(slot, app.shutdown.subscribe()),
            );
            app.shutdown.register(handle).await;
        }

        app.shutdown.wait().await;
        app.shutdown.shutdown().await;

        if let Err(e) = app.broker.deregister_worker(&app.worker_id).await {
            tracing::warn!(error = %e, "Failed to deregister worker");
        }

        Ok(())
    }
}

/// Generate a worker identity for consumer names and registration
fn worker_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", APP_NAME_LOWER, &id[..8])
}

/// One worker pool slot: polls the task streams and executes jobs.
struct JobRunner {
    broker: Arc<Broker>,
    registry: Arc<TaskRegistry>,
    revocations: Arc<RevocationRegistry>,
    storage: AppStorage,
    worker_id: String,
    debug: bool,
}

impl JobRunner {
    async fn run_loop(self: Arc<Self>, slot: usize, mut shutdown_rx: watch::Receiver<bool>) {
        let consumer = format!("{}-{}", self.worker_id, slot);
        let tasks = self.registry.names();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }

                result = self.broker.next_jobs(&tasks, &consumer, BROKER_BLOCK_MS) => {
                    match result {
                        Ok(jobs) => {
                            for job in jobs {
                                self.process_job(job).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Broker poll failed, retrying...");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        tracing::debug!(consumer = %consumer, "Worker loop stopped");
    }

    async fn process_job(&self, job: DeliveredJob) {
        let DeliveredJob {
            task,
            entry_id,
            envelope,
        } = job;
        let job_id = envelope.id;

        let Some(handler) = self.registry.get(&task) else {
            tracing::warn!(job_id = %job_id, task = %task, "No handler registered for task");
            self.set_status(job_id, JobStatus::failed("no handler registered for task"))
                .await;
            self.ack(&task, &entry_id).await;
            return;
        };

        tracing::info!(job_id = %job_id, task = %task, "Job started");
        self.set_status(job_id, JobStatus::running(&self.worker_id))
            .await;

        let cancel = self.revocations.register(job_id);

        let staging = match self.storage.job_staging(job_id) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to create staging dir");
                self.set_status(job_id, JobStatus::failed("failed to create staging dir"))
                    .await;
                self.revocations.complete(&job_id);
                self.ack(&task, &entry_id).await;
                return;
            }
        };

        let ctx = JobContext {
            job_id,
            staging: staging.path().to_path_buf(),
            cancel: cancel.clone(),
        };

        match handler.run(&ctx, &envelope.request).await {
            Ok(report) => match report.encode() {
                Ok(encoded) => {
                    if let Err(e) = self.broker.store_report(job_id, &encoded).await {
                        tracing::error!(job_id = %job_id, error = %e, "Failed to store job report");
                        self.set_status(job_id, JobStatus::failed("failed to store job report"))
                            .await;
                    } else {
                        self.set_status(job_id, JobStatus::succeeded()).await;
                        tracing::info!(
                            job_id = %job_id,
                            task = %task,
                            outputs = report.output_files.len(),
                            "Job finished"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to encode job report");
                    self.set_status(job_id, JobStatus::failed("failed to encode job report"))
                        .await;
                }
            },
            Err(e) => {
                if cancel.is_cancelled() {
                    tracing::info!(job_id = %job_id, task = %task, "Job revoked");
                    self.set_status(job_id, JobStatus::revoked()).await;
                } else {
                    tracing::error!(job_id = %job_id, task = %task, error = %e, "Job failed");
                    self.set_status(job_id, JobStatus::failed(e.to_string())).await;
                }
            }
        }

        self.revocations.complete(&job_id);

        if self.debug {
            let kept = staging.keep();
            tracing::debug!(
                job_id = %job_id,
                path = %kept.display(),
                "Staging dir kept (debug mode)"
            );
        } else {
            drop(staging);
        }

        self.ack(&task, &entry_id).await;
    }

    async fn set_status(&self, job_id: Uuid, status: JobStatus) {
        if let Err(e) = self.broker.set_status(job_id, &status).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to store job status");
        }
    }

    async fn ack(&self, task: &str, entry_id: &str) {
        if let Err(e) = self.broker.ack(task, entry_id).await {
            tracing::warn!(task = %task, entry_id = %entry_id, error = %e, "Failed to ack job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_shape() {
        let id = worker_id();
        assert!(id.starts_with("timesift-"));
        assert_eq!(id.len(), "timesift-".len() + 8);
    }

    #[test]
    fn test_worker_ids_are_unique() {
        assert_ne!(worker_id(), worker_id());
    }
}
