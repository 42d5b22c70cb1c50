//! Checkpoint record model for a translation session.
//!
//! A session accretes data phase by phase: an editorial brief, the full
//! source text, a glossary, then per-chunk translations, the merged text and
//! finally publication paths. Everything past the identity fields is
//! optional, so a document written early in a run stays valid as later
//! phases add to it.

use crate::models::{ensure_finite, Payload, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single chunk.
///
/// Forward progression is expected but not enforced; any status may be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    /// Not yet picked up
    #[default]
    Pending,
    /// First translation pass in progress
    Translating,
    /// Review loop in progress
    Reviewing,
    /// Stylistic polishing in progress
    Polishing,
    /// Annotation in progress
    Annotating,
    /// Successfully finished
    Done,
    /// Processing failed; see `error_message`
    Failed,
}

/// Coarse-grained pipeline stage of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Initializing,
    Brief,
    Sourcing,
    Costing,
    Research,
    Glossary,
    Translating,
    Merging,
    Introduction,
    Approval,
    Publishing,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Brief => "brief",
            Self::Sourcing => "sourcing",
            Self::Costing => "costing",
            Self::Research => "research",
            Self::Glossary => "glossary",
            Self::Translating => "translating",
            Self::Merging => "merging",
            Self::Introduction => "introduction",
            Self::Approval => "approval",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Sessions in a terminal phase are not offered for resumption.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// State of one chunk of source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkState {
    /// 1-based position in the chunk list, as a string
    pub id: String,
    #[serde(default)]
    pub status: ChunkStatus,
    pub source_text: String,
    #[serde(default)]
    pub translated_text: Option<String>,
    #[serde(default)]
    pub reviewed_text: Option<String>,
    #[serde(default)]
    pub polished_text: Option<String>,
    #[serde(default)]
    pub annotated_text: Option<String>,
    /// Translator notes attached by the annotation stage
    #[serde(default)]
    pub notes: Vec<Payload>,
    #[serde(default)]
    pub review_iterations: u32,
    #[serde(default)]
    pub polish_iterations: u32,
    /// Quality rating on a 0-10 scale
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: Payload,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ChunkState {
    pub fn new(id: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ChunkStatus::Pending,
            source_text: source_text.into(),
            translated_text: None,
            reviewed_text: None,
            polished_text: None,
            annotated_text: None,
            notes: Vec::new(),
            review_iterations: 0,
            polish_iterations: 0,
            quality_score: None,
            error_message: None,
            metadata: Payload::new(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == ChunkStatus::Done
    }
}

/// Field assignments for a chunk. `None` leaves a field untouched.
///
/// The source text is not assignable: it is fixed when chunks are created.
/// Use `Checkpointer::chunk_started` to retry a chunk; it clears the error and
/// finish time left by a previous attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkUpdate {
    pub status: Option<ChunkStatus>,
    pub translated_text: Option<String>,
    pub reviewed_text: Option<String>,
    pub polished_text: Option<String>,
    pub annotated_text: Option<String>,
    pub notes: Option<Vec<Payload>>,
    pub review_iterations: Option<u32>,
    pub polish_iterations: Option<u32>,
    pub quality_score: Option<f64>,
    pub error_message: Option<String>,
    pub metadata: Option<Payload>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ChunkUpdate {
    /// An update that only changes the status.
    pub fn status(status: ChunkStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Reject values that cannot be stored.
    pub fn validate(&self) -> Result<()> {
        if let Some(score) = self.quality_score {
            ensure_finite("quality_score", score)?;
        }
        Ok(())
    }

    pub fn apply(self, chunk: &mut ChunkState) {
        if let Some(status) = self.status {
            chunk.status = status;
        }
        if let Some(text) = self.translated_text {
            chunk.translated_text = Some(text);
        }
        if let Some(text) = self.reviewed_text {
            chunk.reviewed_text = Some(text);
        }
        if let Some(text) = self.polished_text {
            chunk.polished_text = Some(text);
        }
        if let Some(text) = self.annotated_text {
            chunk.annotated_text = Some(text);
        }
        if let Some(notes) = self.notes {
            chunk.notes = notes;
        }
        if let Some(n) = self.review_iterations {
            chunk.review_iterations = n;
        }
        if let Some(n) = self.polish_iterations {
            chunk.polish_iterations = n;
        }
        if let Some(score) = self.quality_score {
            chunk.quality_score = Some(score);
        }
        if let Some(message) = self.error_message {
            chunk.error_message = Some(message);
        }
        if let Some(metadata) = self.metadata {
            chunk.metadata = metadata;
        }
        if let Some(at) = self.started_at {
            chunk.started_at = Some(at);
        }
        if let Some(at) = self.finished_at {
            chunk.finished_at = Some(at);
        }
    }
}

/// Deltas added to a session's running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsDelta {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub seconds: f64,
}

/// Paths of published artifacts. Unset entries leave existing paths alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publication {
    pub epub: Option<String>,
    pub pdf: Option<String>,
    pub html: Option<String>,
}

/// Descriptive fields for a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub session_id: String,
    pub work: String,
    pub author: String,
    pub source_language: String,
    pub genre: String,
}

impl NewSession {
    pub fn new(
        session_id: impl Into<String>,
        work: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            work: work.into(),
            author: author.into(),
            source_language: "latin".to_string(),
            genre: "narrative".to_string(),
        }
    }

    pub fn source_language(mut self, language: impl Into<String>) -> Self {
        self.source_language = language.into();
        self
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }
}

/// Full durable state of one translation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    pub session_id: String,
    pub work: String,
    pub author: String,
    #[serde(default)]
    pub source_language: String,
    #[serde(default)]
    pub genre: String,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every persist
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub phase: Phase,

    // Editorial payloads
    #[serde(default)]
    pub brief: Option<Payload>,
    #[serde(default)]
    pub full_source_text: Option<String>,
    #[serde(default)]
    pub estimated_cost: Option<f64>,
    #[serde(default)]
    pub research_context: Option<Payload>,
    #[serde(default)]
    pub glossary: Option<Payload>,

    // Translation
    #[serde(default)]
    pub chunks: Vec<ChunkState>,
    /// Ordinal of the last chunk completed
    #[serde(default)]
    pub current_chunk_index: usize,

    // Final payloads
    #[serde(default)]
    pub merged_text: Option<String>,
    #[serde(default)]
    pub introduction: Option<String>,
    #[serde(default)]
    pub approved: Option<bool>,

    // Publication
    #[serde(default)]
    pub cover_path: Option<String>,
    #[serde(default)]
    pub portrait_path: Option<String>,
    #[serde(default)]
    pub epub_path: Option<String>,
    #[serde(default)]
    pub pdf_path: Option<String>,
    #[serde(default)]
    pub html_path: Option<String>,

    // Running totals, only ever increased
    #[serde(default)]
    pub total_input_tokens: u64,
    #[serde(default)]
    pub total_output_tokens: u64,
    /// EUR
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub total_seconds: f64,
    #[serde(default)]
    pub error_count: u64,
    /// Message given to the last global failure, if any
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Computed view of a session's progress and totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointSummary {
    pub session_id: String,
    pub work: String,
    pub author: String,
    pub phase: Phase,
    pub chunks_total: usize,
    pub chunks_done: usize,
    pub chunks_failed: usize,
    /// Chunks neither done nor failed
    pub chunks_pending: usize,
    /// Mean over chunks with a recorded score; `None` when no chunk has one
    pub mean_quality: Option<f64>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_seconds: f64,
    pub error_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of a session listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionListing {
    pub session_id: String,
    pub work: String,
    pub author: String,
    pub phase: Phase,
    pub chunks_total: usize,
    pub chunks_done: usize,
    pub mean_quality: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineCheckpoint {
    /// Create a fresh record: no chunks, zeroed totals, phase `initializing`.
    pub fn new(session: NewSession) -> Self {
        let now = Utc::now();
        Self {
            session_id: session.session_id,
            work: session.work,
            author: session.author,
            source_language: session.source_language,
            genre: session.genre,
            created_at: now,
            updated_at: now,
            phase: Phase::Initializing,
            brief: None,
            full_source_text: None,
            estimated_cost: None,
            research_context: None,
            glossary: None,
            chunks: Vec::new(),
            current_chunk_index: 0,
            merged_text: None,
            introduction: None,
            approved: None,
            cover_path: None,
            portrait_path: None,
            epub_path: None,
            pdf_path: None,
            html_path: None,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cost: 0.0,
            total_seconds: 0.0,
            error_count: 0,
            last_error: None,
        }
    }

    /// Replace the chunk list, numbering chunks from 1 in input order.
    pub fn init_chunks<I, S>(&mut self, source_texts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chunks = source_texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| ChunkState::new((i + 1).to_string(), text))
            .collect();
        self.current_chunk_index = 0;
    }

    pub fn chunk(&self, chunk_id: &str) -> Option<&ChunkState> {
        self.chunks.iter().find(|c| c.id == chunk_id)
    }

    /// Run `f` on the chunk with `chunk_id`. Returns `false` if there is none.
    pub fn with_chunk<F>(&mut self, chunk_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut ChunkState),
    {
        match self.chunks.iter_mut().find(|c| c.id == chunk_id) {
            Some(chunk) => {
                f(chunk);
                true
            }
            None => false,
        }
    }

    /// Chunks not yet successfully finished, in original order.
    pub fn pending_chunks(&self) -> Vec<&ChunkState> {
        self.chunks.iter().filter(|c| !c.is_done()).collect()
    }

    /// Last done chunk by list position.
    pub fn last_completed_chunk(&self) -> Option<&ChunkState> {
        self.chunks.iter().rev().find(|c| c.is_done())
    }

    pub fn count_status(&self, status: ChunkStatus) -> usize {
        self.chunks.iter().filter(|c| c.status == status).count()
    }

    /// Mean quality over chunks with a recorded score.
    pub fn mean_quality(&self) -> Option<f64> {
        let scores: Vec<f64> = self.chunks.iter().filter_map(|c| c.quality_score).collect();
        if scores.is_empty() {
            return None;
        }
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Add `delta` to the running totals.
    ///
    /// A delta that would make a total non-finite is rejected and nothing
    /// changes.
    pub fn accumulate(&mut self, delta: StatsDelta) -> Result<()> {
        let total_cost = self.total_cost + delta.cost;
        let total_seconds = self.total_seconds + delta.seconds;
        ensure_finite("total_cost", total_cost)?;
        ensure_finite("total_seconds", total_seconds)?;

        self.total_input_tokens = self.total_input_tokens.saturating_add(delta.input_tokens);
        self.total_output_tokens = self.total_output_tokens.saturating_add(delta.output_tokens);
        self.total_cost = total_cost;
        self.total_seconds = total_seconds;
        Ok(())
    }

    /// Check that every float in the record survives JSON.
    pub fn validate(&self) -> Result<()> {
        if let Some(cost) = self.estimated_cost {
            ensure_finite("estimated_cost", cost)?;
        }
        ensure_finite("total_cost", self.total_cost)?;
        ensure_finite("total_seconds", self.total_seconds)?;
        for chunk in &self.chunks {
            if let Some(score) = chunk.quality_score {
                ensure_finite(&format!("quality_score of chunk {}", chunk.id), score)?;
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> CheckpointSummary {
        let chunks_done = self.count_status(ChunkStatus::Done);
        let chunks_failed = self.count_status(ChunkStatus::Failed);
        CheckpointSummary {
            session_id: self.session_id.clone(),
            work: self.work.clone(),
            author: self.author.clone(),
            phase: self.phase,
            chunks_total: self.chunks.len(),
            chunks_done,
            chunks_failed,
            chunks_pending: self.chunks.len() - chunks_done - chunks_failed,
            mean_quality: self.mean_quality(),
            total_input_tokens: self.total_input_tokens,
            total_output_tokens: self.total_output_tokens,
            total_tokens: self.total_input_tokens + self.total_output_tokens,
            total_cost: self.total_cost,
            total_seconds: self.total_seconds,
            error_count: self.error_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn listing(&self) -> SessionListing {
        SessionListing {
            session_id: self.session_id.clone(),
            work: self.work.clone(),
            author: self.author.clone(),
            phase: self.phase,
            chunks_total: self.chunks.len(),
            chunks_done: self.count_status(ChunkStatus::Done),
            mean_quality: self.mean_quality(),
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{payload, LectioError, PayloadValue};

    fn record_with_chunks(n: usize) -> PipelineCheckpoint {
        let mut cp = PipelineCheckpoint::new(NewSession::new("s1", "Symposium", "Plato"));
        cp.init_chunks((1..=n).map(|i| format!("chunk {i}")));
        cp
    }

    #[test]
    fn test_new_session_defaults() {
        let cp = PipelineCheckpoint::new(NewSession::new("s1", "Symposium", "Plato"));
        assert_eq!(cp.phase, Phase::Initializing);
        assert_eq!(cp.source_language, "latin");
        assert_eq!(cp.genre, "narrative");
        assert!(cp.chunks.is_empty());
        assert_eq!(cp.created_at, cp.updated_at);
    }

    #[test]
    fn test_init_chunks_assigns_one_based_ids() {
        let cp = record_with_chunks(3);
        let ids: Vec<&str> = cp.chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert_eq!(cp.chunks[1].source_text, "chunk 2");
        assert!(cp.chunks.iter().all(|c| c.status == ChunkStatus::Pending));
    }

    #[test]
    fn test_with_chunk_miss_leaves_record_untouched() {
        let mut cp = record_with_chunks(2);
        let before = cp.clone();
        assert!(!cp.with_chunk("7", |c| c.status = ChunkStatus::Done));
        assert_eq!(cp, before);
    }

    #[test]
    fn test_chunk_update_only_touches_given_fields() {
        let mut chunk = ChunkState::new("1", "arma virumque cano");
        chunk.translated_text = Some("first pass".to_string());

        ChunkUpdate {
            status: Some(ChunkStatus::Reviewing),
            reviewed_text: Some("reviewed".to_string()),
            review_iterations: Some(2),
            ..Default::default()
        }
        .apply(&mut chunk);

        assert_eq!(chunk.status, ChunkStatus::Reviewing);
        assert_eq!(chunk.translated_text.as_deref(), Some("first pass"));
        assert_eq!(chunk.reviewed_text.as_deref(), Some("reviewed"));
        assert_eq!(chunk.review_iterations, 2);
        assert_eq!(chunk.source_text, "arma virumque cano");
    }

    #[test]
    fn test_pending_and_done_partition_chunks() {
        let mut cp = record_with_chunks(6);
        let statuses = [
            ChunkStatus::Done,
            ChunkStatus::Failed,
            ChunkStatus::Reviewing,
            ChunkStatus::Done,
            ChunkStatus::Annotating,
            ChunkStatus::Pending,
        ];
        for (chunk, status) in cp.chunks.iter_mut().zip(statuses) {
            chunk.status = status;
        }

        let pending: Vec<&str> = cp.pending_chunks().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(pending, ["2", "3", "5", "6"]);
        assert_eq!(pending.len() + cp.count_status(ChunkStatus::Done), cp.chunks.len());
        assert!(cp.pending_chunks().iter().all(|c| !c.is_done()));
        assert_eq!(cp.last_completed_chunk().map(|c| c.id.as_str()), Some("4"));
    }

    #[test]
    fn test_mean_quality_ignores_unscored_chunks() {
        let mut cp = record_with_chunks(4);
        assert_eq!(cp.mean_quality(), None);

        cp.chunks[0].quality_score = Some(8.0);
        cp.chunks[2].quality_score = Some(9.0);
        assert_eq!(cp.mean_quality(), Some(8.5));

        cp.chunks[3].quality_score = Some(0.0);
        assert_eq!(cp.mean_quality(), Some(17.0 / 3.0));
    }

    #[test]
    fn test_accumulate_sums_deltas() {
        let mut cp = record_with_chunks(0);
        let deltas = [
            StatsDelta { input_tokens: 100, output_tokens: 40, cost: 0.25, seconds: 1.5 },
            StatsDelta { input_tokens: 7, ..Default::default() },
            StatsDelta { cost: 0.5, seconds: 2.5, ..Default::default() },
        ];
        for delta in deltas {
            cp.accumulate(delta).unwrap();
        }
        assert_eq!(cp.total_input_tokens, 107);
        assert_eq!(cp.total_output_tokens, 40);
        assert!((cp.total_cost - 0.75).abs() < 1e-12);
        assert!((cp.total_seconds - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_accumulate_rejects_non_finite_totals() {
        let mut cp = record_with_chunks(0);
        cp.accumulate(StatsDelta { cost: 1.0, seconds: 2.0, input_tokens: 5, ..Default::default() })
            .unwrap();
        let before = cp.clone();

        for delta in [
            StatsDelta { cost: f64::INFINITY, ..Default::default() },
            StatsDelta { seconds: f64::NAN, input_tokens: 9, ..Default::default() },
        ] {
            let err = cp.accumulate(delta).unwrap_err();
            assert!(matches!(err, LectioError::InvalidInput(_)));
        }
        assert_eq!(cp, before);

        // Finite deltas can still overflow the running total.
        cp.total_cost = f64::MAX;
        let overflow = StatsDelta { cost: f64::MAX, ..Default::default() };
        assert!(cp.accumulate(overflow).is_err());
        assert_eq!(cp.total_cost, f64::MAX);
    }

    #[test]
    fn test_validate_flags_unstorable_floats() {
        let mut cp = record_with_chunks(2);
        assert!(cp.validate().is_ok());

        cp.chunks[1].quality_score = Some(f64::NAN);
        let err = cp.validate().unwrap_err();
        assert!(err.to_string().contains("chunk 2"));

        cp.chunks[1].quality_score = Some(7.0);
        cp.estimated_cost = Some(f64::NEG_INFINITY);
        assert!(cp.validate().is_err());

        let update = ChunkUpdate {
            quality_score: Some(f64::INFINITY),
            ..Default::default()
        };
        assert!(update.validate().is_err());
        assert!(ChunkUpdate::status(ChunkStatus::Done).validate().is_ok());
    }

    #[test]
    fn test_summary_counts() {
        let mut cp = record_with_chunks(3);
        cp.chunks[0].status = ChunkStatus::Done;
        cp.chunks[0].quality_score = Some(8.0);
        cp.chunks[1].status = ChunkStatus::Failed;
        cp.total_input_tokens = 10;
        cp.total_output_tokens = 5;

        let summary = cp.summary();
        assert_eq!(summary.chunks_total, 3);
        assert_eq!(summary.chunks_done, 1);
        assert_eq!(summary.chunks_failed, 1);
        assert_eq!(summary.chunks_pending, 1);
        assert_eq!(summary.mean_quality, Some(8.0));
        assert_eq!(summary.total_tokens, 15);
    }

    #[test]
    fn test_fully_populated_record_survives_json() {
        let mut cp = record_with_chunks(2);
        cp.phase = Phase::Publishing;
        cp.brief = Some(payload([("tone", "elevated")]));
        cp.glossary = Some(payload([("logos", PayloadValue::from(vec!["paraula", "raó"]))]));
        cp.estimated_cost = Some(3.2);
        cp.approved = Some(false);
        cp.epub_path = Some("out/symposium.epub".to_string());
        cp.chunks[0].status = ChunkStatus::Done;
        cp.chunks[0].quality_score = Some(7.5);
        cp.chunks[0].started_at = Some(Utc::now());
        cp.chunks[0].finished_at = Some(Utc::now());
        cp.chunks[0].notes = vec![payload([("term", "eros")])];
        cp.chunks[1].status = ChunkStatus::Failed;
        cp.chunks[1].error_message = Some("timeout".to_string());

        let json = serde_json::to_string_pretty(&cp).unwrap();
        let back: PipelineCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cp);
    }

    #[test]
    fn test_minimal_document_loads_with_defaults() {
        let json = r#"{
            "session_id": "old",
            "work": "Aeneid",
            "author": "Virgil",
            "created_at": "2026-01-02T03:04:05.123456789Z",
            "updated_at": "2026-01-02T03:04:06Z"
        }"#;
        let cp: PipelineCheckpoint = serde_json::from_str(json).unwrap();
        assert_eq!(cp.phase, Phase::Initializing);
        assert!(cp.chunks.is_empty());
        assert_eq!(cp.approved, None);
        assert_eq!(cp.created_at.timestamp_subsec_nanos(), 123_456_789);
    }
}
