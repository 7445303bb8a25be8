//! Taskflow library
//!
//! Workflow-driven work tracking: a configurable status graph, validated
//! transitions with rejection history, completion cascades, typed task
//! relationships and next-work selection.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;
pub mod workflow;
