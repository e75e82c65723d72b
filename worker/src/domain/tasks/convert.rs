//! Conversion/forwarding stage: normalize dumps with `rdump`
//!
//! Records stream through the worker line by line. Materialization writes
//! them to a JSONL output file; forwarding sends each record to the
//! configured sink, best-effort, with an optional failure threshold that
//! aborts the batch.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::core::config::{SinkConfig, ToolsConfig};
use crate::core::constants::{DATA_TYPE_JSONL, TASK_CONVERT};
use crate::data::broker::envelope::{
    ConfigField, ConfigFieldType, OutputFile, ReportMeta, TaskMetadata, TaskReport, TaskRequest,
    resolve_input_files,
};
use crate::data::sink::{RecordSink, SinkError};
use crate::domain::tools::{Rdump, StreamingTool, ToolVersions};
use crate::utils::file::persist;

use super::{JobContext, TaskError, TaskHandler};

/// Per-job configuration accepted by the conversion task.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConvertConfig {
    /// Output format for materialized records
    format: OutputFormat,
    /// Forward records to the configured sink instead of materializing
    forward: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutputFormat {
    #[default]
    Jsonl,
}

/// Record counters accumulated across all input dumps.
#[derive(Debug, Default)]
struct Counters {
    emitted: u64,
    forwarded: u64,
    failed: u64,
    skipped: u64,
}

pub struct ConvertTask {
    tool: Rdump,
    sink: Option<SinkConfig>,
    version: Option<String>,
}

impl ConvertTask {
    pub fn new(tools: &ToolsConfig, sink: Option<SinkConfig>, versions: &ToolVersions) -> Self {
        Self {
            tool: Rdump::new(&tools.rdump_bin, tools.timeout()),
            sink,
            version: versions.rdump.clone(),
        }
    }

    /// Forward every record of one dump to the sink.
    ///
    /// Per-record failures are logged and skipped; the configured failure
    /// threshold (if any) aborts the batch.
    async fn forward_dump(
        &self,
        ctx: &JobContext,
        mut stream: StreamingTool,
        sink: &mut RecordSink,
        threshold: Option<u32>,
        counters: &mut Counters,
    ) -> Result<(), TaskError> {
        while let Some(line) = stream.next_line(&ctx.cancel).await? {
            if line.trim().is_empty() {
                continue;
            }
            counters.emitted += 1;

            if serde_json::from_str::<serde_json::Value>(&line).is_err() {
                counters.skipped += 1;
                tracing::warn!(job_id = %ctx.job_id, "Skipping malformed record");
                continue;
            }

            match sink.forward(&line).await {
                Ok(()) => counters.forwarded += 1,
                Err(e) => {
                    counters.failed += 1;
                    tracing::warn!(
                        job_id = %ctx.job_id,
                        error = %e,
                        failed = counters.failed,
                        "Record forward failed"
                    );
                    if let Some(threshold) = threshold {
                        if counters.failed >= u64::from(threshold) {
                            return Err(TaskError::Sink(SinkError::ThresholdExceeded {
                                failed: threshold,
                            }));
                        }
                    }
                }
            }
        }
        stream.finish(&ctx.cancel).await?;
        Ok(())
    }

    /// Write every record of one dump to a JSONL file in the output dir.
    async fn materialize_dump(
        &self,
        ctx: &JobContext,
        mut stream: StreamingTool,
        output_dir: &Path,
        counters: &mut Counters,
    ) -> Result<OutputFile, TaskError> {
        let output = OutputFile::create(output_dir, "jsonl", DATA_TYPE_JSONL);
        let scratch = ctx.staging.join(&output.display_name);

        let file = tokio::fs::File::create(&scratch).await?;
        let mut writer = BufWriter::new(file);

        while let Some(line) = stream.next_line(&ctx.cancel).await? {
            if line.trim().is_empty() {
                continue;
            }
            counters.emitted += 1;

            if serde_json::from_str::<serde_json::Value>(&line).is_err() {
                counters.skipped += 1;
                tracing::warn!(job_id = %ctx.job_id, "Skipping malformed record");
                continue;
            }

            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;

        // Verify the tool exit before publishing the file
        stream.finish(&ctx.cancel).await?;
        persist(&scratch, Path::new(&output.path)).await?;

        Ok(output)
    }
}

#[async_trait]
impl TaskHandler for ConvertTask {
    fn name(&self) -> &'static str {
        TASK_CONVERT
    }

    fn metadata(&self) -> TaskMetadata {
        TaskMetadata {
            name: TASK_CONVERT.to_string(),
            display_name: "Dissect: rdump".to_string(),
            description: "Convert Dissect dumps to JSONL or forward records to a sink"
                .to_string(),
            task_config: vec![
                ConfigField {
                    name: "format".to_string(),
                    label: "Output format".to_string(),
                    description: "Format for materialized records".to_string(),
                    field_type: ConfigFieldType::Autocomplete,
                    required: false,
                    items: vec!["jsonl".to_string()],
                },
                ConfigField {
                    name: "forward".to_string(),
                    label: "Forward to sink".to_string(),
                    description: "Send records to the configured log-analytics sink \
                                  instead of producing a file"
                        .to_string(),
                    field_type: ConfigFieldType::Checkbox,
                    required: false,
                    items: Vec::new(),
                },
            ],
        }
    }

    async fn run(
        &self,
        ctx: &JobContext,
        request: &TaskRequest,
    ) -> Result<TaskReport, TaskError> {
        let config: ConvertConfig = match &request.config {
            Some(value) => serde_json::from_value(value.clone())?,
            None => ConvertConfig::default(),
        };
        // Only JSONL exists today; the field is kept for wire compatibility
        let OutputFormat::Jsonl = config.format;

        let input_files = resolve_input_files(request)?;
        if input_files.is_empty() {
            return Err(TaskError::InvalidRequest("no input files".to_string()));
        }

        let mut sink = if config.forward {
            let Some(sink_config) = &self.sink else {
                return Err(TaskError::InvalidRequest(
                    "record forwarding requested but no sink is configured".to_string(),
                ));
            };
            Some((
                RecordSink::connect(sink_config).await?,
                sink_config.failure_threshold,
            ))
        } else {
            None
        };

        let output_dir = Path::new(&request.output_path);
        let mut output_files = Vec::new();
        let mut counters = Counters::default();
        let mut command = None;

        for input in &input_files {
            let dump = Path::new(&input.path);
            command = Some(self.tool.command_line(dump));
            let stream = self.tool.stream_records(dump)?;

            match sink.as_mut() {
                Some((sink, threshold)) => {
                    self.forward_dump(ctx, stream, sink, *threshold, &mut counters)
                        .await?;
                    tracing::info!(
                        job_id = %ctx.job_id,
                        dump = %input.path,
                        forwarded = counters.forwarded,
                        failed = counters.failed,
                        "Dump forwarded"
                    );
                }
                None => {
                    let output = self
                        .materialize_dump(ctx, stream, output_dir, &mut counters)
                        .await?;
                    tracing::info!(
                        job_id = %ctx.job_id,
                        dump = %input.path,
                        output = %output.path,
                        records = counters.emitted,
                        "Dump converted"
                    );
                    output_files.push(output);
                }
            }
        }

        Ok(TaskReport {
            output_files,
            workflow_id: request.workflow_id.clone(),
            command,
            meta: ReportMeta {
                tool_version: self.version.clone(),
                records_emitted: counters.emitted,
                records_forwarded: counters.forwarded,
                records_failed: counters.failed,
                records_skipped: counters.skipped,
            },
        })
    }
}
