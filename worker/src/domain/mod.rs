//! Task execution logic
//!
//! - `tools` - subprocess invokers for the external Dissect binaries
//! - `tasks` - task handlers, registry, and revocation tracking

pub mod tasks;
pub mod tools;
