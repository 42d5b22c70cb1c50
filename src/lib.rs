//! lectio - Crash-safe checkpointing and metrics for literary translation pipelines.
//!
//! ## Architecture
//!
//! A translation run moves through coarse phases (brief, sourcing, costing,
//! research, glossary, translation, merge, introduction, approval,
//! publication) and, during translation, through many independently
//! processed chunks. lectio keeps that run resumable:
//!
//! - **Checkpointer**: phase-by-phase session manager; every operation is on
//!   disk before it returns
//! - **CheckpointStore**: atomic document writes, backup copies and recovery
//!   from a corrupted primary document
//! - **MetricsCollector**: per-chunk timing and quality statistics aggregated
//!   across sessions
//!
//! ## Resuming
//!
//! ```no_run
//! use lectio::Checkpointer;
//! use std::path::Path;
//!
//! let mut checkpointer = Checkpointer::new(Path::new(".cache/pipeline/checkpoints"))?;
//! if checkpointer.load_with_recovery("symposium-ca").is_some() {
//!     for chunk in checkpointer.pending_chunks() {
//!         println!("still to translate: chunk {}", chunk.id);
//!     }
//! }
//! # Ok::<(), lectio::LectioError>(())
//! ```

pub mod checkpoint;
pub mod metrics;
pub mod models;

// Re-exports for convenience
pub use checkpoint::{
    CheckpointStore, CheckpointSummary, Checkpointer, ChunkState, ChunkStatus, ChunkUpdate,
    NewSession, Phase, PipelineCheckpoint, Publication, SessionListing, StatsDelta,
};
pub use metrics::{ChunkMetrics, MetricsCollector, MetricsSummary, PipelineMetrics};
pub use models::{Config, LectioError, Payload, PayloadValue, Result, StorageConfig};
