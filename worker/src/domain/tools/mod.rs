//! External toolkit invocation
//!
//! The worker never parses forensic artifacts itself; these modules shell
//! out to the Dissect binaries and supervise the subprocesses (bounded
//! timeout, cancellation kill, stderr capture).

pub mod error;
pub mod rdump;
pub mod runner;
pub mod target_query;
pub mod versions;

pub use error::ToolError;
pub use rdump::Rdump;
pub use runner::{StreamingTool, ToolCommand, ToolOutput};
pub use target_query::TargetQuery;
pub use versions::ToolVersions;
