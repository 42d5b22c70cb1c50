//! Per-chunk and per-session performance records.
//!
//! Totals on [`PipelineMetrics`] are maintained by `add_chunk` and never
//! recomputed, so the chunk list is only reachable read-only.

use crate::checkpoint::write_atomic;
use crate::models::{ensure_finite, validate_session_id, LectioError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub(crate) const METRICS_SUFFIX: &str = "_metrics.json";

/// Timing, quality and token usage of one chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetrics {
    pub chunk_id: String,
    #[serde(default)]
    pub translate_secs: f64,
    #[serde(default)]
    pub review_secs: f64,
    #[serde(default)]
    pub polish_secs: f64,
    #[serde(default)]
    pub refinement_iterations: u32,
    #[serde(default)]
    pub initial_quality: Option<f64>,
    #[serde(default)]
    pub final_quality: Option<f64>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ChunkMetrics {
    pub fn new(chunk_id: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            ..Default::default()
        }
    }

    /// Seconds spent across translate, review and polish.
    pub fn total_time(&self) -> f64 {
        self.translate_secs + self.review_secs + self.polish_secs
    }

    /// Final minus initial quality, when both are known.
    pub fn quality_gain(&self) -> Option<f64> {
        Some(self.final_quality? - self.initial_quality?)
    }

    fn validate(&self) -> Result<()> {
        ensure_finite("translate_secs", self.translate_secs)?;
        ensure_finite("review_secs", self.review_secs)?;
        ensure_finite("polish_secs", self.polish_secs)?;
        for (field, value) in [
            ("initial_quality", self.initial_quality),
            ("final_quality", self.final_quality),
        ] {
            if let Some(value) = value {
                ensure_finite(field, value)?;
            }
        }
        Ok(())
    }
}

/// Metrics of one pipeline session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    session_id: String,
    work: String,
    author: String,
    started_at: DateTime<Utc>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    chunks: Vec<ChunkMetrics>,
    #[serde(default)]
    total_input_tokens: u64,
    #[serde(default)]
    total_output_tokens: u64,
    #[serde(default)]
    total_seconds: f64,
    /// EUR
    #[serde(default)]
    total_cost: f64,
}

/// Aggregated view of a session's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub session_id: String,
    /// "{author} - {work}"
    pub title: String,
    /// `None` while the session is still running
    pub duration_secs: Option<f64>,
    pub chunks_processed: usize,
    pub mean_quality: Option<f64>,
    pub min_quality: Option<f64>,
    pub max_quality: Option<f64>,
    pub mean_iterations: f64,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost: f64,
    pub total_errors: usize,
    /// (chunks - errors) / chunks, or 0 with no chunks
    pub success_rate: f64,
}

/// On-disk shape: the record plus a summary snapshot for readers.
#[derive(Serialize)]
struct MetricsDocument<'a> {
    #[serde(flatten)]
    metrics: &'a PipelineMetrics,
    summary: MetricsSummary,
}

impl PipelineMetrics {
    pub fn new(
        session_id: impl Into<String>,
        work: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            work: work.into(),
            author: author.into(),
            started_at: Utc::now(),
            finished_at: None,
            chunks: Vec::new(),
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_seconds: 0.0,
            total_cost: 0.0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn work(&self) -> &str {
        &self.work
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn chunks(&self) -> &[ChunkMetrics] {
        &self.chunks
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.total_input_tokens
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output_tokens
    }

    pub fn total_seconds(&self) -> f64 {
        self.total_seconds
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Append a chunk and fold it into the token and time totals.
    ///
    /// Chunks carrying NaN or infinite values are rejected and nothing changes.
    pub fn add_chunk(&mut self, metrics: ChunkMetrics) -> Result<()> {
        metrics.validate()?;
        let total_seconds = self.total_seconds + metrics.total_time();
        ensure_finite("total_seconds", total_seconds)?;

        self.total_input_tokens = self.total_input_tokens.saturating_add(metrics.input_tokens);
        self.total_output_tokens = self.total_output_tokens.saturating_add(metrics.output_tokens);
        self.total_seconds = total_seconds;
        self.chunks.push(metrics);
        Ok(())
    }

    /// Add to the session-level cost.
    pub fn add_cost(&mut self, cost: f64) -> Result<()> {
        let total_cost = self.total_cost + cost;
        ensure_finite("total_cost", total_cost)?;
        self.total_cost = total_cost;
        Ok(())
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn summary(&self) -> MetricsSummary {
        let qualities: Vec<f64> = self.chunks.iter().filter_map(|c| c.final_quality).collect();
        let total_errors: usize = self.chunks.iter().map(|c| c.errors.len()).sum();
        let chunk_count = self.chunks.len();

        let mean_iterations = if chunk_count == 0 {
            0.0
        } else {
            let iterations: u64 = self
                .chunks
                .iter()
                .map(|c| u64::from(c.refinement_iterations))
                .sum();
            iterations as f64 / chunk_count as f64
        };

        let success_rate = if chunk_count == 0 {
            0.0
        } else {
            (chunk_count as f64 - total_errors as f64) / chunk_count as f64
        };

        MetricsSummary {
            session_id: self.session_id.clone(),
            title: format!("{} - {}", self.author, self.work),
            duration_secs: self
                .finished_at
                .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0),
            chunks_processed: chunk_count,
            mean_quality: mean(&qualities),
            min_quality: qualities.iter().copied().reduce(f64::min),
            max_quality: qualities.iter().copied().reduce(f64::max),
            mean_iterations,
            total_tokens: self.total_input_tokens + self.total_output_tokens,
            input_tokens: self.total_input_tokens,
            output_tokens: self.total_output_tokens,
            estimated_cost: self.total_cost,
            total_errors,
            success_rate,
        }
    }

    /// File name of the metrics document for `session_id`.
    pub fn file_name(session_id: &str) -> String {
        format!("{session_id}{METRICS_SUFFIX}")
    }

    /// Write the metrics document into `dir`, returning its path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        validate_session_id(&self.session_id)?;
        fs::create_dir_all(dir).map_err(|e| LectioError::io("creating metrics dir", e))?;
        let path = dir.join(Self::file_name(&self.session_id));

        let document = MetricsDocument {
            metrics: self,
            summary: self.summary(),
        };
        let bytes = serde_json::to_vec_pretty(&document).map_err(LectioError::Serialize)?;
        write_atomic(&path, &bytes)?;

        debug!(session_id = %self.session_id, chunks = self.chunks.len(), "Metrics saved");
        Ok(path)
    }

    /// Read a metrics document written by `save`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .map_err(|e| LectioError::io(format!("reading {}", path.display()), e))?;
        serde_json::from_slice(&bytes).map_err(|e| LectioError::corrupt(path, e))
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
