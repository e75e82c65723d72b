//! Extraction stage: drive `target-query` over each input artifact
//!
//! Every input produces exactly one dump file. Tool output is captured
//! into the job's staging directory and only moved into the shared output
//! directory once the tool exits cleanly, so partial dumps never surface.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::config::ToolsConfig;
use crate::core::constants::{DATA_TYPE_DUMP, TASK_EXTRACT};
use crate::data::broker::envelope::{
    ConfigField, ConfigFieldType, OutputFile, ReportMeta, TaskMetadata, TaskReport, TaskRequest,
    resolve_input_files,
};
use crate::domain::tools::{TargetQuery, ToolVersions};
use crate::utils::file::persist;

use super::{JobContext, TaskError, TaskHandler};

/// Per-job configuration accepted by the extraction task.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractConfig {
    /// Query function passed to `-f`
    query: Option<String>,
}

pub struct ExtractTask {
    tool: TargetQuery,
    default_query: Option<String>,
    version: Option<String>,
}

impl ExtractTask {
    pub fn new(tools: &ToolsConfig, versions: &ToolVersions) -> Self {
        Self {
            tool: TargetQuery::new(&tools.target_query_bin, tools.timeout()),
            default_query: tools.default_query.clone(),
            version: versions.target_query.clone(),
        }
    }

    fn resolve_query(&self, config: &ExtractConfig) -> Result<String, TaskError> {
        config
            .query
            .clone()
            .or_else(|| self.default_query.clone())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                TaskError::InvalidRequest(
                    "no query profile selected and no default configured".to_string(),
                )
            })
    }
}

#[async_trait]
impl TaskHandler for ExtractTask {
    fn name(&self) -> &'static str {
        TASK_EXTRACT
    }

    fn metadata(&self) -> TaskMetadata {
        TaskMetadata {
            name: TASK_EXTRACT.to_string(),
            display_name: "Dissect: target-query".to_string(),
            description: "Timeline extraction using Dissect".to_string(),
            task_config: vec![ConfigField {
                name: "query".to_string(),
                label: "Query profile".to_string(),
                description: "Dissect query function to run against each artifact \
                              (e.g. browser_history)"
                    .to_string(),
                field_type: ConfigFieldType::Autocomplete,
                required: false,
                items: Vec::new(),
            }],
        }
    }

    async fn run(
        &self,
        ctx: &JobContext,
        request: &TaskRequest,
    ) -> Result<TaskReport, TaskError> {
        let config: ExtractConfig = match &request.config {
            Some(value) => serde_json::from_value(value.clone())?,
            None => ExtractConfig::default(),
        };
        let query = self.resolve_query(&config)?;

        let input_files = resolve_input_files(request)?;
        if input_files.is_empty() {
            return Err(TaskError::InvalidRequest("no input files".to_string()));
        }

        let output_dir = Path::new(&request.output_path);
        let mut output_files = Vec::with_capacity(input_files.len());
        let mut command = None;

        for input in &input_files {
            let artifact = Path::new(&input.path);
            let output = OutputFile::create(output_dir, "dump", DATA_TYPE_DUMP);
            let scratch = ctx.staging.join(&output.display_name);

            command = Some(self.tool.command_line(artifact, &query));
            let result = self.tool.dump(artifact, &query, &scratch, &ctx.cancel).await?;
            if !result.stderr.trim().is_empty() {
                tracing::debug!(
                    job_id = %ctx.job_id,
                    stderr = %result.stderr.trim(),
                    "target-query stderr"
                );
            }

            persist(&scratch, Path::new(&output.path)).await?;
            tracing::info!(
                job_id = %ctx.job_id,
                artifact = %input.path,
                dump = %output.path,
                "Artifact extracted"
            );
            output_files.push(output);
        }

        Ok(TaskReport {
            output_files,
            workflow_id: request.workflow_id.clone(),
            command,
            meta: ReportMeta {
                tool_version: self.version.clone(),
                ..Default::default()
            },
        })
    }
}
