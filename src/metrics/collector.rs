//! Cross-session metrics reporting.
//!
//! The collector reads every `{session_id}_metrics.json` document in its
//! directory. Unreadable documents are skipped, never fatal, and sessions
//! without metrics are reported as such instead of failing.

use super::record::{MetricsSummary, PipelineMetrics, METRICS_SUFFIX};
use crate::models::{validate_session_id, LectioError, Result, StorageConfig};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const COMPARE_ID_WIDTH: usize = 20;

/// Loads, aggregates and reports metrics of many sessions.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    dir: PathBuf,
}

impl MetricsCollector {
    /// Create a collector over `dir`, creating the directory if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| LectioError::io("creating metrics dir", e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Self::new(&config.resolved_metrics_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the metrics document for `session_id`, or `None` when the id
    /// cannot name a file inside this directory.
    pub fn metrics_path(&self, session_id: &str) -> Option<PathBuf> {
        validate_session_id(session_id).ok()?;
        Some(self.dir.join(PipelineMetrics::file_name(session_id)))
    }

    /// Persist `metrics` into this collector's directory.
    pub fn save(&self, metrics: &PipelineMetrics) -> Result<PathBuf> {
        metrics.save(&self.dir)
    }

    /// Summaries of every readable metrics document, ordered by session id.
    pub fn load_all(&self) -> Result<Vec<MetricsSummary>> {
        let root = glob::Pattern::escape(&self.dir.to_string_lossy());
        let pattern = format!("{root}/*{METRICS_SUFFIX}");
        let mut paths: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| LectioError::Internal(format!("Invalid glob pattern: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        paths.sort();

        let mut summaries = Vec::with_capacity(paths.len());
        for path in paths {
            match PipelineMetrics::load(&path) {
                Ok(metrics) => summaries.push(metrics.summary()),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable metrics"),
            }
        }
        Ok(summaries)
    }

    /// Full metrics of one session, or `None` if absent or unreadable.
    pub fn load_detail(&self, session_id: &str) -> Option<PipelineMetrics> {
        let path = self.metrics_path(session_id)?;
        if !path.exists() {
            return None;
        }
        match PipelineMetrics::load(&path) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(session_id, error = %e, "Metrics unreadable");
                None
            }
        }
    }

    /// Report over all sessions.
    pub fn global_report(&self) -> Result<String> {
        let summaries = self.load_all()?;
        if summaries.is_empty() {
            return Ok("No metrics recorded.".to_string());
        }

        let sessions = summaries.len();
        let total_chunks: usize = summaries.iter().map(|s| s.chunks_processed).sum();
        let qualities: Vec<f64> = summaries.iter().filter_map(|s| s.mean_quality).collect();
        let total_tokens: u64 = summaries.iter().map(|s| s.total_tokens).sum();
        let total_cost: f64 = summaries.iter().map(|s| s.estimated_cost).sum();
        let success_rate =
            summaries.iter().map(|s| s.success_rate).sum::<f64>() / sessions as f64;

        let lines = vec![
            "=== Global Metrics Report ===".to_string(),
            String::new(),
            format!("Sessions:          {sessions}"),
            format!("Chunks processed:  {total_chunks}"),
            String::new(),
            "--- Quality ---".to_string(),
            format!("Mean quality:      {}", format_quality(average(&qualities), 2)),
            format!("Success rate:      {:.1}%", success_rate * 100.0),
            String::new(),
            "--- Resources ---".to_string(),
            format!("Total tokens:      {total_tokens}"),
            format!("Estimated cost:    €{total_cost:.4}"),
            "=".repeat(35),
        ];
        Ok(lines.join("\n"))
    }

    /// Detailed report of one session, including a per-chunk breakdown.
    pub fn session_report(&self, session_id: &str) -> String {
        let Some(metrics) = self.load_detail(session_id) else {
            return format!("No metrics found for session '{session_id}'");
        };
        let s = metrics.summary();

        let duration = match s.duration_secs {
            Some(secs) => format!("{secs:.1}s"),
            None => "in progress".to_string(),
        };

        let mut lines = vec![
            format!("=== Session Report: {session_id} ==="),
            String::new(),
            format!("Work:              {}", s.title),
            format!("Duration:          {duration}"),
            String::new(),
            "--- Chunks ---".to_string(),
            format!("Processed:         {}", s.chunks_processed),
            format!("Mean iterations:   {:.1}", s.mean_iterations),
            String::new(),
            "--- Quality ---".to_string(),
            format!("Mean:              {}", format_quality(s.mean_quality, 2)),
            format!("Min:               {}", format_quality(s.min_quality, 2)),
            format!("Max:               {}", format_quality(s.max_quality, 2)),
            format!("Success rate:      {:.1}%", s.success_rate * 100.0),
            String::new(),
            "--- Resources ---".to_string(),
            format!("Input tokens:      {}", s.input_tokens),
            format!("Output tokens:     {}", s.output_tokens),
            format!("Estimated cost:    €{:.4}", s.estimated_cost),
            String::new(),
        ];

        if !metrics.chunks().is_empty() {
            lines.push("--- Per chunk ---".to_string());
            for chunk in metrics.chunks() {
                let mark = if chunk.errors.is_empty() { "✓" } else { "✗" };
                lines.push(format!(
                    "  {mark} Chunk {}: {}/10 ({} iter)",
                    chunk.chunk_id,
                    format_quality(chunk.final_quality, 1),
                    chunk.refinement_iterations
                ));
            }
            lines.push(String::new());
        }

        lines.push("=".repeat(40));
        lines.join("\n")
    }

    /// Side-by-side table of the given sessions; missing ones show N/A.
    pub fn compare<S: AsRef<str>>(&self, session_ids: &[S]) -> String {
        let header = format!(
            "{:<20} {:>8} {:>10} {:>8} {:>12}",
            "Session", "Chunks", "Quality", "Rate", "Tokens"
        );
        let width = header.chars().count();

        let mut lines = vec![
            "=== Session Comparison ===".to_string(),
            String::new(),
            header,
            "-".repeat(width),
        ];

        for session_id in session_ids {
            let session_id = session_id.as_ref();
            let label: String = session_id.chars().take(COMPARE_ID_WIDTH).collect();
            let row = match self.load_detail(session_id) {
                Some(metrics) => {
                    let s = metrics.summary();
                    format!(
                        "{:<20} {:>8} {:>10} {:>8} {:>12}",
                        label,
                        s.chunks_processed,
                        format_quality(s.mean_quality, 1),
                        format!("{:.0}%", s.success_rate * 100.0),
                        s.total_tokens
                    )
                }
                None => format!(
                    "{:<20} {:>8} {:>10} {:>8} {:>12}",
                    label, "N/A", "N/A", "N/A", "N/A"
                ),
            };
            lines.push(row);
        }

        lines.push(String::new());
        lines.push("=".repeat(width));
        lines.join("\n")
    }

    /// Remove the metrics document of `session_id`. Returns whether one existed.
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        let Some(path) = self.metrics_path(session_id) else {
            return Ok(false);
        };
        match fs::remove_file(path) {
            Ok(()) => {
                info!(session_id, "Metrics deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LectioError::io("removing metrics", e)),
        }
    }
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn format_quality(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "N/A".to_string(),
    }
}
