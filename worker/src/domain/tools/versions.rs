//! Toolkit version probes

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::config::ToolsConfig;
use crate::core::constants::VERSION_PROBE_TIMEOUT_SECS;

use super::runner::ToolCommand;

/// Versions reported by the external binaries at startup.
///
/// Carried in task report meta and in the worker registration so the
/// orchestrator can tell which toolkit produced a result.
#[derive(Debug, Clone, Default)]
pub struct ToolVersions {
    pub target_query: Option<String>,
    pub rdump: Option<String>,
}

impl ToolVersions {
    /// Probe both binaries with `--version`. A failed probe leaves the
    /// version unset; the worker still starts.
    pub async fn detect(tools: &ToolsConfig) -> Self {
        Self {
            target_query: probe(&tools.target_query_bin).await,
            rdump: probe(&tools.rdump_bin).await,
        }
    }

    /// Map form used in the worker registration.
    pub fn as_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(v) = &self.target_query {
            map.insert("target-query".to_string(), v.clone());
        }
        if let Some(v) = &self.rdump {
            map.insert("rdump".to_string(), v.clone());
        }
        map
    }
}

async fn probe(bin: &Path) -> Option<String> {
    let command =
        ToolCommand::new(bin, Duration::from_secs(VERSION_PROBE_TIMEOUT_SECS)).arg("--version");
    let cancel = CancellationToken::new();

    match command.run_captured(&cancel).await {
        Ok((_, stdout)) => {
            let version = stdout.trim().to_string();
            tracing::debug!(bin = %bin.display(), version = %version, "Tool version detected");
            (!version.is_empty()).then_some(version)
        }
        Err(e) => {
            tracing::warn!(bin = %bin.display(), error = %e, "Tool version probe failed");
            None
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::tools::testing::fake_tool;
    use std::path::PathBuf;

    fn tools_config(target_query_bin: PathBuf, rdump_bin: PathBuf) -> ToolsConfig {
        ToolsConfig {
            target_query_bin,
            rdump_bin,
            timeout_secs: 60,
            default_query: None,
        }
    }

    #[tokio::test]
    async fn test_detect_reads_versions() {
        let dir = tempfile::tempdir().unwrap();
        let tq = fake_tool(dir.path(), "target-query", r#"echo "target-query 3.15""#);
        let rd = fake_tool(dir.path(), "rdump", r#"echo "rdump 3.15""#);

        let versions = ToolVersions::detect(&tools_config(tq, rd)).await;

        assert_eq!(versions.target_query.as_deref(), Some("target-query 3.15"));
        assert_eq!(versions.rdump.as_deref(), Some("rdump 3.15"));

        let map = versions.as_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["rdump"], "rdump 3.15");
    }

    #[tokio::test]
    async fn test_detect_tolerates_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let rd = fake_tool(dir.path(), "rdump", r#"echo "rdump 3.15""#);

        let versions =
            ToolVersions::detect(&tools_config(PathBuf::from("/nonexistent/target-query"), rd))
                .await;

        assert!(versions.target_query.is_none());
        assert_eq!(versions.rdump.as_deref(), Some("rdump 3.15"));
        assert_eq!(versions.as_map().len(), 1);
    }
}
