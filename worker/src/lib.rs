//! TimeSift worker
//!
//! A task-queue worker that drives the Dissect toolkit (`target-query`,
//! `rdump`) to turn forensic artifacts into timeline records. Jobs arrive
//! over a Redis-backed queue; extraction captures tool output as dump
//! files, conversion normalizes dumps into line-delimited records that are
//! materialized for download or forwarded to a log-analytics sink.

pub mod app;
pub mod core;
pub mod data;
pub mod domain;
pub mod utils;
