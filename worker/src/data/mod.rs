//! Broker and sink I/O layer
//!
//! - `broker` - Redis Streams task queue binding (jobs, results, control)
//! - `sink` - TCP line-protocol forwarder for the log-analytics endpoint

pub mod broker;
pub mod sink;

pub use broker::{Broker, DeliveredJob};
pub use broker::error::BrokerError;
pub use sink::{RecordSink, SinkError};
