//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod shutdown;
pub mod storage;

pub use crate::app::WorkerApp;
pub use cli::{CliConfig, Commands};
pub use config::{AppConfig, BrokerConfig, SinkConfig, ToolsConfig, WorkerConfig};
pub use shutdown::ShutdownService;
pub use storage::{AppStorage, DataSubdir};
