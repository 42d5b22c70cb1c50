//! Metrics module for translation performance reporting.
//!
//! Independent of checkpointing: a session may have metrics without a
//! checkpoint and vice versa.
//!
//! Provides:
//! - `ChunkMetrics` / `PipelineMetrics`: per-chunk and per-session records
//! - `MetricsCollector`: cross-session loading, reports and comparison

mod collector;
mod record;

pub use collector::*;
pub use record::*;
