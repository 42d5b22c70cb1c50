//! Checkpoint module for resumable translation sessions.
//!
//! Provides:
//! - `PipelineCheckpoint`: the full durable state of one session
//! - `CheckpointStore`: atomic persistence with backup and recovery
//! - `Checkpointer`: phase-by-phase session manager that persists every change

mod manager;
mod state;
mod store;

pub use manager::*;
pub use state::*;
pub use store::*;
