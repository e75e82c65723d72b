// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display and platform directories)
pub const APP_NAME: &str = "TimeSift";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "timesift";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".timesift";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "timesift.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "TIMESIFT_CONFIG";

// =============================================================================
// Environment Variables - Debug & Logging
// =============================================================================

/// Environment variable for debug mode (keeps per-job staging directories)
pub const ENV_DEBUG: &str = "TIMESIFT_DEBUG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "TIMESIFT_LOG";

/// Environment variable to override the data directory
pub const ENV_DATA_DIR: &str = "TIMESIFT_DATA_DIR";

// =============================================================================
// Broker
// =============================================================================

/// Environment variable for the broker connection URL
pub const ENV_BROKER_URL: &str = "TIMESIFT_BROKER_URL";

/// Default broker URL (works with Redis, Valkey, Dragonfly)
pub const DEFAULT_BROKER_URL: &str = "redis://127.0.0.1:6379/0";

/// Environment variable for the number of concurrent job slots
pub const ENV_CONCURRENCY: &str = "TIMESIFT_CONCURRENCY";

/// Default number of concurrent job slots
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Environment variable for result/status key TTL in seconds
pub const ENV_RESULT_TTL_SECS: &str = "TIMESIFT_RESULT_TTL_SECS";

/// Default result/status key TTL (24 hours)
pub const DEFAULT_RESULT_TTL_SECS: u64 = 86_400;

/// XREADGROUP block timeout in milliseconds
pub const BROKER_BLOCK_MS: u64 = 5_000;

// =============================================================================
// External Tools
// =============================================================================

/// Environment variable for the target-query binary path
pub const ENV_TARGET_QUERY_BIN: &str = "TIMESIFT_TARGET_QUERY_BIN";

/// Environment variable for the rdump binary path
pub const ENV_RDUMP_BIN: &str = "TIMESIFT_RDUMP_BIN";

/// Environment variable for the subprocess timeout in seconds
pub const ENV_TOOL_TIMEOUT_SECS: &str = "TIMESIFT_TOOL_TIMEOUT_SECS";

/// Environment variable for the default query profile
pub const ENV_DEFAULT_QUERY: &str = "TIMESIFT_DEFAULT_QUERY";

/// Default target-query binary (resolved via PATH)
pub const DEFAULT_TARGET_QUERY_BIN: &str = "target-query";

/// Default rdump binary (resolved via PATH)
pub const DEFAULT_RDUMP_BIN: &str = "rdump";

/// Default subprocess timeout (1 hour; disk images can be large)
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 3_600;

/// Timeout for `--version` probes at startup
pub const VERSION_PROBE_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Sink
// =============================================================================

/// Environment variable for the sink hostname
pub const ENV_SINK_HOST: &str = "TIMESIFT_SINK_HOST";

/// Environment variable for the sink TCP port
pub const ENV_SINK_PORT: &str = "TIMESIFT_SINK_PORT";

/// Environment variable for the forward failure threshold
pub const ENV_SINK_FAILURE_THRESHOLD: &str = "TIMESIFT_SINK_FAILURE_THRESHOLD";

/// Sink connect timeout in seconds
pub const SINK_CONNECT_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Task Names
// =============================================================================

/// Extraction stage task name
pub const TASK_EXTRACT: &str = "target-query";

/// Conversion/forwarding stage task name
pub const TASK_CONVERT: &str = "rdump";

// =============================================================================
// Output Data Types
// =============================================================================

/// Data type tag for extraction dump files
pub const DATA_TYPE_DUMP: &str = "dissect:target:dump";

/// Data type tag for converted JSONL files
pub const DATA_TYPE_JSONL: &str = "dissect:rdump:jsonl";

// =============================================================================
// Shutdown
// =============================================================================

/// Graceful shutdown timeout in seconds
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 120;
