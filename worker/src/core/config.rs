use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BROKER_URL, DEFAULT_CONCURRENCY,
    DEFAULT_RDUMP_BIN, DEFAULT_RESULT_TTL_SECS, DEFAULT_TARGET_QUERY_BIN,
    DEFAULT_TOOL_TIMEOUT_SECS,
};

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Broker configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BrokerFileConfig {
    pub url: Option<String>,
}

/// Worker pool configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WorkerFileConfig {
    pub concurrency: Option<usize>,
    pub result_ttl_secs: Option<u64>,
}

/// External tool configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ToolsFileConfig {
    pub target_query_bin: Option<String>,
    pub rdump_bin: Option<String>,
    pub timeout_secs: Option<u64>,
    pub default_query: Option<String>,
}

/// Sink configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SinkFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub failure_threshold: Option<u32>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub broker: Option<BrokerFileConfig>,
    pub worker: Option<WorkerFileConfig>,
    pub tools: Option<ToolsFileConfig>,
    pub sink: Option<SinkFileConfig>,
    pub debug: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        // Broker
        if let Some(broker) = other.broker {
            let current = self.broker.get_or_insert_with(BrokerFileConfig::default);
            if broker.url.is_some() {
                tracing::trace!(url = "***", "Merging broker.url");
                current.url = broker.url;
            }
        }

        // Worker
        if let Some(worker) = other.worker {
            let current = self.worker.get_or_insert_with(WorkerFileConfig::default);
            if worker.concurrency.is_some() {
                tracing::trace!(concurrency = ?worker.concurrency, "Merging worker.concurrency");
                current.concurrency = worker.concurrency;
            }
            if worker.result_ttl_secs.is_some() {
                tracing::trace!(result_ttl_secs = ?worker.result_ttl_secs, "Merging worker.result_ttl_secs");
                current.result_ttl_secs = worker.result_ttl_secs;
            }
        }

        // Tools
        if let Some(tools) = other.tools {
            let current = self.tools.get_or_insert_with(ToolsFileConfig::default);
            if tools.target_query_bin.is_some() {
                tracing::trace!(target_query_bin = ?tools.target_query_bin, "Merging tools.target_query_bin");
                current.target_query_bin = tools.target_query_bin;
            }
            if tools.rdump_bin.is_some() {
                tracing::trace!(rdump_bin = ?tools.rdump_bin, "Merging tools.rdump_bin");
                current.rdump_bin = tools.rdump_bin;
            }
            if tools.timeout_secs.is_some() {
                tracing::trace!(timeout_secs = ?tools.timeout_secs, "Merging tools.timeout_secs");
                current.timeout_secs = tools.timeout_secs;
            }
            if tools.default_query.is_some() {
                tracing::trace!(default_query = ?tools.default_query, "Merging tools.default_query");
                current.default_query = tools.default_query;
            }
        }

        // Sink
        if let Some(sink) = other.sink {
            let current = self.sink.get_or_insert_with(SinkFileConfig::default);
            if sink.host.is_some() {
                tracing::trace!(host = ?sink.host, "Merging sink.host");
                current.host = sink.host;
            }
            if sink.port.is_some() {
                tracing::trace!(port = ?sink.port, "Merging sink.port");
                current.port = sink.port;
            }
            if sink.failure_threshold.is_some() {
                tracing::trace!(failure_threshold = ?sink.failure_threshold, "Merging sink.failure_threshold");
                current.failure_threshold = sink.failure_threshold;
            }
        }

        // Debug
        if other.debug.is_some() {
            tracing::trace!(debug = ?other.debug, "Merging debug");
            self.debug = other.debug;
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub result_ttl_secs: u64,
}

/// External tool configuration
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub target_query_bin: PathBuf,
    pub rdump_bin: PathBuf,
    pub timeout_secs: u64,
    pub default_query: Option<String>,
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Sink configuration (present only when a sink is configured)
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub host: String,
    pub port: u16,
    /// Abort forwarding after this many failed records; unset = never
    pub failure_threshold: Option<u32>,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub worker: WorkerConfig,
    pub tools: ToolsConfig,
    pub sink: Option<SinkConfig>,
    pub debug: bool,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.timesift/timesift.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Load from profile dir (~/.timesift/timesift.json) - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. Load from CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        // 3. Extract file config values with defaults
        let file_broker = file_config.broker.unwrap_or_default();
        let file_worker = file_config.worker.unwrap_or_default();
        let file_tools = file_config.tools.unwrap_or_default();
        let file_sink = file_config.sink.unwrap_or_default();

        // 4. Layer configs: defaults -> file config -> CLI/env overrides
        let broker = BrokerConfig {
            url: cli
                .broker_url
                .clone()
                .or(file_broker.url)
                .unwrap_or_else(|| DEFAULT_BROKER_URL.to_string()),
        };

        let worker = WorkerConfig {
            concurrency: cli
                .concurrency
                .or(file_worker.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY),
            result_ttl_secs: cli
                .result_ttl_secs
                .or(file_worker.result_ttl_secs)
                .unwrap_or(DEFAULT_RESULT_TTL_SECS),
        };

        let tools = ToolsConfig {
            target_query_bin: cli
                .target_query_bin
                .clone()
                .or(file_tools.target_query_bin.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_QUERY_BIN)),
            rdump_bin: cli
                .rdump_bin
                .clone()
                .or(file_tools.rdump_bin.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RDUMP_BIN)),
            timeout_secs: cli
                .tool_timeout_secs
                .or(file_tools.timeout_secs)
                .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
            default_query: cli.default_query.clone().or(file_tools.default_query),
        };

        // Sink requires both host and port; half-configured is a hard error
        let sink_host = cli.sink_host.clone().or(file_sink.host);
        let sink_port = cli.sink_port.or(file_sink.port);
        let sink = match (sink_host, sink_port) {
            (Some(host), Some(port)) => Some(SinkConfig {
                host,
                port,
                failure_threshold: cli
                    .sink_failure_threshold
                    .or(file_sink.failure_threshold),
            }),
            (None, None) => None,
            (Some(_), None) => {
                anyhow::bail!("Configuration error: sink.host is set but sink.port is missing")
            }
            (None, Some(_)) => {
                anyhow::bail!("Configuration error: sink.port is set but sink.host is missing")
            }
        };

        // debug: CLI/env flag takes precedence, then file config, default false
        let debug = cli.debug || file_config.debug.unwrap_or(false);

        let config = Self {
            broker,
            worker,
            tools,
            sink,
            debug,
        };

        // Validate configuration
        config.validate()?;

        tracing::debug!(
            concurrency = config.worker.concurrency,
            result_ttl_secs = config.worker.result_ttl_secs,
            target_query_bin = %config.tools.target_query_bin.display(),
            rdump_bin = %config.tools.rdump_bin.display(),
            tool_timeout_secs = config.tools.timeout_secs,
            default_query = ?config.tools.default_query,
            sink_configured = config.sink.is_some(),
            debug = config.debug,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.broker.url.is_empty() {
            anyhow::bail!("Configuration error: broker.url must not be empty");
        }

        if self.worker.concurrency == 0 {
            anyhow::bail!("Configuration error: worker.concurrency must be greater than 0");
        }

        if self.tools.timeout_secs == 0 {
            anyhow::bail!("Configuration error: tools.timeout_secs must be greater than 0");
        }

        if let Some(sink) = &self.sink {
            if sink.host.is_empty() {
                anyhow::bail!("Configuration error: sink.host must not be empty");
            }
            if sink.port == 0 {
                anyhow::bail!("Configuration error: sink.port must be greater than 0");
            }
        }

        Ok(())
    }
}

/// Path to the per-user profile config file
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            broker: BrokerConfig {
                url: DEFAULT_BROKER_URL.to_string(),
            },
            worker: WorkerConfig {
                concurrency: DEFAULT_CONCURRENCY,
                result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
            },
            tools: ToolsConfig {
                target_query_bin: PathBuf::from(DEFAULT_TARGET_QUERY_BIN),
                rdump_bin: PathBuf::from(DEFAULT_RDUMP_BIN),
                timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
                default_query: None,
            },
            sink: None,
            debug: false,
        }
    }

    #[test]
    fn test_validate_defaults_ok() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_broker_url() {
        let mut config = base_config();
        config.broker.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = base_config();
        config.worker.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_tool_timeout() {
        let mut config = base_config();
        config.tools.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_sink_port() {
        let mut config = base_config();
        config.sink = Some(SinkConfig {
            host: "splunk.local".to_string(),
            port: 0,
            failure_threshold: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_config_parses_sections() {
        let json = r#"{
            "broker": { "url": "redis://queue:6379/1" },
            "worker": { "concurrency": 4 },
            "tools": { "timeout_secs": 600, "default_query": "browser_history" },
            "sink": { "host": "splunk.local", "port": 9500, "failure_threshold": 10 },
            "debug": true
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.broker.as_ref().unwrap().url.as_deref(),
            Some("redis://queue:6379/1")
        );
        assert_eq!(config.worker.as_ref().unwrap().concurrency, Some(4));
        assert_eq!(config.tools.as_ref().unwrap().timeout_secs, Some(600));
        assert_eq!(config.sink.as_ref().unwrap().port, Some(9500));
        assert_eq!(config.debug, Some(true));
    }

    #[test]
    fn test_file_config_collects_unknown_fields() {
        let json = r#"{ "borker": { "url": "oops" } }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        let map = match &config.extra {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        };
        assert!(map.contains_key("borker"));
    }

    #[test]
    fn test_merge_overlay_takes_precedence() {
        let mut base: FileConfig = serde_json::from_str(
            r#"{ "broker": { "url": "redis://a:6379" }, "worker": { "concurrency": 2 } }"#,
        )
        .unwrap();
        let overlay: FileConfig =
            serde_json::from_str(r#"{ "broker": { "url": "redis://b:6379" } }"#).unwrap();

        base.merge(overlay);

        assert_eq!(
            base.broker.as_ref().unwrap().url.as_deref(),
            Some("redis://b:6379")
        );
        // Untouched sections survive the merge
        assert_eq!(base.worker.as_ref().unwrap().concurrency, Some(2));
    }

    #[test]
    fn test_merge_preserves_unset_overlay_fields() {
        let mut base: FileConfig = serde_json::from_str(
            r#"{ "sink": { "host": "splunk.local", "port": 9500 } }"#,
        )
        .unwrap();
        let overlay: FileConfig =
            serde_json::from_str(r#"{ "sink": { "failure_threshold": 5 } }"#).unwrap();

        base.merge(overlay);

        let sink = base.sink.as_ref().unwrap();
        assert_eq!(sink.host.as_deref(), Some("splunk.local"));
        assert_eq!(sink.port, Some(9500));
        assert_eq!(sink.failure_threshold, Some(5));
    }
}
