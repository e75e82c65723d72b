use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_BROKER_URL, ENV_CONCURRENCY, ENV_CONFIG, ENV_DEBUG, ENV_DEFAULT_QUERY, ENV_RDUMP_BIN,
    ENV_RESULT_TTL_SECS, ENV_SINK_FAILURE_THRESHOLD, ENV_SINK_HOST, ENV_SINK_PORT,
    ENV_TARGET_QUERY_BIN, ENV_TOOL_TIMEOUT_SECS,
};

#[derive(Parser)]
#[command(name = "timesift")]
#[command(version, about = "Dissect timeline worker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Broker connection URL (Redis)
    #[arg(long, short = 'b', global = true, env = ENV_BROKER_URL)]
    pub broker_url: Option<String>,

    /// Number of concurrent job slots
    #[arg(long, global = true, env = ENV_CONCURRENCY)]
    pub concurrency: Option<usize>,

    /// TTL for stored job results and statuses in seconds
    #[arg(long, global = true, env = ENV_RESULT_TTL_SECS)]
    pub result_ttl_secs: Option<u64>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Enable debug mode (keeps per-job staging directories)
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,

    /// Sink hostname for record forwarding
    #[arg(long, global = true, env = ENV_SINK_HOST)]
    pub sink_host: Option<String>,

    /// Sink TCP port for record forwarding
    #[arg(long, global = true, env = ENV_SINK_PORT)]
    pub sink_port: Option<u16>,

    /// Abort forwarding after this many failed records (unset = never)
    #[arg(long, global = true, env = ENV_SINK_FAILURE_THRESHOLD)]
    pub sink_failure_threshold: Option<u32>,

    /// Path to the target-query binary
    #[arg(long, global = true, env = ENV_TARGET_QUERY_BIN)]
    pub target_query_bin: Option<PathBuf>,

    /// Path to the rdump binary
    #[arg(long, global = true, env = ENV_RDUMP_BIN)]
    pub rdump_bin: Option<PathBuf>,

    /// Subprocess timeout in seconds
    #[arg(long, global = true, env = ENV_TOOL_TIMEOUT_SECS)]
    pub tool_timeout_secs: Option<u64>,

    /// Default query profile used when a job does not select one
    #[arg(long, global = true, env = ENV_DEFAULT_QUERY)]
    pub default_query: Option<String>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the worker (default command)
    Start,
    /// Print registered task metadata as JSON and exit
    Tasks,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub broker_url: Option<String>,
    pub concurrency: Option<usize>,
    pub result_ttl_secs: Option<u64>,
    pub config: Option<PathBuf>,
    pub debug: bool,
    pub sink_host: Option<String>,
    pub sink_port: Option<u16>,
    pub sink_failure_threshold: Option<u32>,
    pub target_query_bin: Option<PathBuf>,
    pub rdump_bin: Option<PathBuf>,
    pub tool_timeout_secs: Option<u64>,
    pub default_query: Option<String>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        broker_url: cli.broker_url,
        concurrency: cli.concurrency,
        result_ttl_secs: cli.result_ttl_secs,
        config: cli.config,
        debug: cli.debug,
        sink_host: cli.sink_host,
        sink_port: cli.sink_port,
        sink_failure_threshold: cli.sink_failure_threshold,
        target_query_bin: cli.target_query_bin,
        rdump_bin: cli.rdump_bin,
        tool_timeout_secs: cli.tool_timeout_secs,
        default_query: cli.default_query,
    };
    (config, cli.command)
}
