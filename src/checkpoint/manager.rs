//! Session checkpointer for resumable translation runs.
//!
//! A `Checkpointer` owns at most one in-memory [`PipelineCheckpoint`] at a
//! time. Every mutating operation changes that record, sets the phase the
//! operation stands for, and persists before returning. When a call returns
//! `Ok`, its effect is on disk and a crash resumes from at least that point.

use super::state::{
    CheckpointSummary, ChunkState, ChunkStatus, ChunkUpdate, NewSession, Phase,
    PipelineCheckpoint, Publication, SessionListing, StatsDelta,
};
use super::store::CheckpointStore;
use crate::models::{ensure_finite, LectioError, Payload, Result, StorageConfig};
use chrono::Utc;
use std::path::Path;
use tracing::{debug, info, warn};

/// Phase-by-phase checkpointer bound to one storage root.
pub struct Checkpointer {
    store: CheckpointStore,
    /// Persist through `save_with_backup` instead of `save`
    backup_on_save: bool,
    checkpoint: Option<PipelineCheckpoint>,
}

impl Checkpointer {
    /// Create a checkpointer storing documents under `dir`, with backups on.
    pub fn new(dir: &Path) -> Result<Self> {
        Ok(Self {
            store: CheckpointStore::new(dir)?,
            backup_on_save: true,
            checkpoint: None,
        })
    }

    /// Create a checkpointer from the `[storage]` configuration.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(&config.resolved_checkpoint_dir())?.with_backups(config.backup_on_save))
    }

    /// Choose whether each persist keeps a backup of the previous document.
    pub fn with_backups(mut self, enabled: bool) -> Self {
        self.backup_on_save = enabled;
        self
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// The session currently bound, if any.
    pub fn checkpoint(&self) -> Option<&PipelineCheckpoint> {
        self.checkpoint.as_ref()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Session lifecycle
    // ═══════════════════════════════════════════════════════════════════

    /// Start a fresh session, overwriting any existing one with the same id.
    pub fn start(&mut self, session: NewSession) -> Result<&PipelineCheckpoint> {
        let mut checkpoint = PipelineCheckpoint::new(session);
        self.persist_record(&mut checkpoint)?;
        info!(
            session_id = %checkpoint.session_id,
            work = %checkpoint.work,
            author = %checkpoint.author,
            "Started new session"
        );
        Ok(self.checkpoint.insert(checkpoint))
    }

    /// Bind the session stored under `session_id`.
    ///
    /// `Ok(None)` when no document exists; a corrupt document is an error.
    pub fn load(&mut self, session_id: &str) -> Result<Option<&PipelineCheckpoint>> {
        match self.store.load(session_id)? {
            Some(checkpoint) => Ok(Some(self.bind(checkpoint))),
            None => Ok(None),
        }
    }

    /// Bind the session stored under `session_id`, falling back to its backup
    /// when the primary document is unreadable.
    pub fn load_with_recovery(&mut self, session_id: &str) -> Option<&PipelineCheckpoint> {
        let checkpoint = self.store.load_with_recovery(session_id)?;
        Some(self.bind(checkpoint))
    }

    fn bind(&mut self, checkpoint: PipelineCheckpoint) -> &PipelineCheckpoint {
        info!(
            session_id = %checkpoint.session_id,
            phase = %checkpoint.phase,
            pending = checkpoint.pending_chunks().len(),
            "Resuming from checkpoint"
        );
        self.checkpoint.insert(checkpoint)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Editorial phases
    // ═══════════════════════════════════════════════════════════════════

    pub fn save_brief(&mut self, brief: Payload) -> Result<()> {
        self.mutate(|cp| {
            cp.brief = Some(brief);
            cp.phase = Phase::Brief;
        })
    }

    pub fn save_source_text(&mut self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.mutate(|cp| {
            cp.full_source_text = Some(text);
            cp.phase = Phase::Sourcing;
        })
    }

    pub fn save_cost_estimate(&mut self, cost: f64) -> Result<()> {
        ensure_finite("estimated_cost", cost)?;
        self.mutate(|cp| {
            cp.estimated_cost = Some(cost);
            cp.phase = Phase::Costing;
        })
    }

    pub fn save_research_context(&mut self, context: Payload) -> Result<()> {
        self.mutate(|cp| {
            cp.research_context = Some(context);
            cp.phase = Phase::Research;
        })
    }

    /// Store the glossary; translation starts next.
    pub fn save_glossary(&mut self, glossary: Payload) -> Result<()> {
        self.mutate(|cp| {
            cp.glossary = Some(glossary);
            cp.phase = Phase::Translating;
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Translation phase
    // ═══════════════════════════════════════════════════════════════════

    /// Replace the chunk list with one pending chunk per source text.
    pub fn init_chunks<I, S>(&mut self, source_texts: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate(|cp| {
            cp.init_chunks(source_texts);
            cp.phase = Phase::Translating;
        })
    }

    /// Assign fields of chunk `chunk_id`.
    ///
    /// An unknown id changes nothing and returns `Ok(false)`.
    pub fn update_chunk(&mut self, chunk_id: &str, update: ChunkUpdate) -> Result<bool> {
        update.validate()?;
        self.mutate_chunk(chunk_id, |chunk| update.apply(chunk))
    }

    /// Begin (or retry) a chunk. Leftovers of a failed attempt are cleared.
    pub fn chunk_started(&mut self, chunk_id: &str) -> Result<bool> {
        self.mutate_chunk(chunk_id, |chunk| {
            chunk.status = ChunkStatus::Translating;
            chunk.started_at = Some(Utc::now());
            chunk.finished_at = None;
            chunk.error_message = None;
        })
    }

    /// Mark a chunk done with an optional quality score.
    pub fn chunk_completed(&mut self, chunk_id: &str, quality: Option<f64>) -> Result<bool> {
        if let Some(score) = quality {
            ensure_finite("quality_score", score)?;
        }
        let checkpoint = self.active_mut()?;
        let hit = checkpoint.with_chunk(chunk_id, |chunk| {
            chunk.status = ChunkStatus::Done;
            chunk.quality_score = quality;
            chunk.error_message = None;
            chunk.finished_at = Some(Utc::now());
        });
        if !hit {
            debug!(chunk_id, "Ignoring completion of unknown chunk");
            return Ok(false);
        }
        if let Ok(index) = chunk_id.parse::<usize>() {
            checkpoint.current_chunk_index = index;
        }
        self.persist()?;
        Ok(true)
    }

    /// Mark a chunk failed and count the error against the session.
    pub fn chunk_failed(&mut self, chunk_id: &str, message: impl Into<String>) -> Result<bool> {
        let message = message.into();
        let checkpoint = self.active_mut()?;
        let hit = checkpoint.with_chunk(chunk_id, |chunk| {
            chunk.status = ChunkStatus::Failed;
            chunk.error_message = Some(message);
            chunk.finished_at = Some(Utc::now());
        });
        if !hit {
            debug!(chunk_id, "Ignoring failure of unknown chunk");
            return Ok(false);
        }
        checkpoint.error_count += 1;
        warn!(chunk_id, "Chunk failed");
        self.persist()?;
        Ok(true)
    }

    /// Chunks not yet done (including failed ones), in original order.
    pub fn pending_chunks(&self) -> Vec<&ChunkState> {
        self.checkpoint
            .as_ref()
            .map(|cp| cp.pending_chunks())
            .unwrap_or_default()
    }

    pub fn last_completed_chunk(&self) -> Option<&ChunkState> {
        self.checkpoint.as_ref()?.last_completed_chunk()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Final phases
    // ═══════════════════════════════════════════════════════════════════

    pub fn save_merge(&mut self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.mutate(|cp| {
            cp.merged_text = Some(text);
            cp.phase = Phase::Merging;
        })
    }

    pub fn save_introduction(&mut self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.mutate(|cp| {
            cp.introduction = Some(text);
            cp.phase = Phase::Introduction;
        })
    }

    /// Record the editorial decision. Rejection fails the session.
    pub fn save_approval(&mut self, approved: bool) -> Result<()> {
        self.mutate(|cp| {
            cp.approved = Some(approved);
            cp.phase = if approved {
                Phase::Publishing
            } else {
                Phase::Failed
            };
        })
    }

    // Publication paths leave the phase unchanged.

    pub fn save_cover(&mut self, path: impl Into<String>) -> Result<()> {
        let path = path.into();
        self.mutate(|cp| cp.cover_path = Some(path))
    }

    pub fn save_portrait(&mut self, path: impl Into<String>) -> Result<()> {
        let path = path.into();
        self.mutate(|cp| cp.portrait_path = Some(path))
    }

    pub fn save_publication(&mut self, publication: Publication) -> Result<()> {
        self.mutate(|cp| {
            if let Some(epub) = publication.epub {
                cp.epub_path = Some(epub);
            }
            if let Some(pdf) = publication.pdf {
                cp.pdf_path = Some(pdf);
            }
            if let Some(html) = publication.html {
                cp.html_path = Some(html);
            }
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Totals and completion
    // ═══════════════════════════════════════════════════════════════════

    /// Add deltas to the running totals.
    ///
    /// A delta that would make a total NaN or infinite is rejected before
    /// anything changes.
    pub fn accumulate_stats(&mut self, delta: StatsDelta) -> Result<()> {
        self.active_mut()?.accumulate(delta)?;
        self.persist()
    }

    pub fn finish(&mut self) -> Result<()> {
        self.mutate(|cp| cp.phase = Phase::Done)?;
        if let Some(cp) = &self.checkpoint {
            info!(session_id = %cp.session_id, "Session finished");
        }
        Ok(())
    }

    /// Fail the whole session. A message counts as one more error.
    pub fn mark_failed(&mut self, message: Option<&str>) -> Result<()> {
        self.mutate(|cp| {
            cp.phase = Phase::Failed;
            if let Some(message) = message {
                cp.error_count += 1;
                cp.last_error = Some(message.to_string());
            }
        })?;
        if let Some(cp) = &self.checkpoint {
            warn!(session_id = %cp.session_id, error = ?message, "Session marked failed");
        }
        Ok(())
    }

    /// Progress and totals of the bound session.
    pub fn summary(&self) -> Option<CheckpointSummary> {
        self.checkpoint.as_ref().map(PipelineCheckpoint::summary)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Session catalogue
    // ═══════════════════════════════════════════════════════════════════

    /// Delete a stored session. Unbinds it if it is the current one.
    pub fn delete(&mut self, session_id: &str) -> Result<bool> {
        if self
            .checkpoint
            .as_ref()
            .is_some_and(|cp| cp.session_id == session_id)
        {
            self.checkpoint = None;
        }
        self.store.delete(session_id)
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.store.exists(session_id)
    }

    pub fn list_sessions(&self) -> Result<Vec<String>> {
        self.store.list_session_ids()
    }

    pub fn list_sessions_detailed(&self) -> Result<Vec<SessionListing>> {
        self.store.list_sessions_detailed()
    }

    /// Sessions that can still be resumed, with their progress.
    pub fn list_incomplete(&self) -> Result<Vec<SessionListing>> {
        self.store.list_incomplete()
    }

    pub fn cleanup_backups(&self, older_than_days: u64) -> Result<usize> {
        self.store.cleanup_backups(older_than_days)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════

    fn active_mut(&mut self) -> Result<&mut PipelineCheckpoint> {
        self.checkpoint.as_mut().ok_or(LectioError::NoActiveSession)
    }

    /// Apply `f` to the bound session and persist.
    fn mutate<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut PipelineCheckpoint),
    {
        f(self.active_mut()?);
        self.persist()
    }

    fn mutate_chunk<F>(&mut self, chunk_id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut ChunkState),
    {
        if !self.active_mut()?.with_chunk(chunk_id, f) {
            debug!(chunk_id, "Ignoring update of unknown chunk");
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn persist(&mut self) -> Result<()> {
        let store = &self.store;
        let backup = self.backup_on_save;
        let checkpoint = self.checkpoint.as_mut().ok_or(LectioError::NoActiveSession)?;
        if backup {
            store.save_with_backup(checkpoint)
        } else {
            store.save(checkpoint)
        }
    }

    fn persist_record(&self, checkpoint: &mut PipelineCheckpoint) -> Result<()> {
        if self.backup_on_save {
            self.store.save_with_backup(checkpoint)
        } else {
            self.store.save(checkpoint)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payload;
    use tempfile::TempDir;

    fn started(temp_dir: &TempDir) -> Checkpointer {
        let mut ck = Checkpointer::new(temp_dir.path()).unwrap();
        ck.start(NewSession::new("s1", "Symposium", "Plato")).unwrap();
        ck
    }

    fn reload(temp_dir: &TempDir, session_id: &str) -> PipelineCheckpoint {
        let mut ck = Checkpointer::new(temp_dir.path()).unwrap();
        let stored = ck.load(session_id).unwrap().unwrap().clone();
        stored
    }

    #[test]
    fn test_start_persists_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = Checkpointer::new(temp_dir.path()).unwrap();
        let cp = ck
            .start(
                NewSession::new("s1", "Symposium", "Plato")
                    .source_language("greek")
                    .genre("dialogue"),
            )
            .unwrap();
        assert_eq!(cp.phase, Phase::Initializing);

        let stored = reload(&temp_dir, "s1");
        assert_eq!(stored.work, "Symposium");
        assert_eq!(stored.source_language, "greek");
        assert_eq!(stored.genre, "dialogue");
        assert!(ck.exists("s1"));
    }

    #[test]
    fn test_operations_without_session_fail() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = Checkpointer::new(temp_dir.path()).unwrap();

        assert!(matches!(
            ck.save_source_text("text"),
            Err(LectioError::NoActiveSession)
        ));
        assert!(matches!(
            ck.chunk_completed("1", None),
            Err(LectioError::NoActiveSession)
        ));
        assert!(ck.pending_chunks().is_empty());
        assert!(ck.summary().is_none());
        assert!(ck.last_completed_chunk().is_none());
    }

    #[test]
    fn test_each_operation_advances_phase_durably() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = started(&temp_dir);

        ck.save_brief(payload([("tone", "elevated")])).unwrap();
        assert_eq!(reload(&temp_dir, "s1").phase, Phase::Brief);

        ck.save_source_text("full text").unwrap();
        assert_eq!(reload(&temp_dir, "s1").phase, Phase::Sourcing);

        ck.save_cost_estimate(4.5).unwrap();
        assert_eq!(reload(&temp_dir, "s1").phase, Phase::Costing);

        ck.save_research_context(payload([("period", "classical")])).unwrap();
        assert_eq!(reload(&temp_dir, "s1").phase, Phase::Research);

        ck.save_glossary(payload([("eros", "amor")])).unwrap();
        assert_eq!(reload(&temp_dir, "s1").phase, Phase::Translating);

        ck.save_merge("merged").unwrap();
        assert_eq!(reload(&temp_dir, "s1").phase, Phase::Merging);

        ck.save_introduction("intro").unwrap();
        assert_eq!(reload(&temp_dir, "s1").phase, Phase::Introduction);

        ck.save_approval(true).unwrap();
        let stored = reload(&temp_dir, "s1");
        assert_eq!(stored.phase, Phase::Publishing);
        assert_eq!(stored.approved, Some(true));
        assert_eq!(stored.estimated_cost, Some(4.5));
        assert_eq!(stored.full_source_text.as_deref(), Some("full text"));

        ck.save_cover("cover.png").unwrap();
        ck.save_portrait("plato.png").unwrap();
        ck.save_publication(Publication {
            epub: Some("out.epub".to_string()),
            html: Some("out.html".to_string()),
            ..Default::default()
        })
        .unwrap();
        let stored = reload(&temp_dir, "s1");
        assert_eq!(stored.phase, Phase::Publishing);
        assert_eq!(stored.cover_path.as_deref(), Some("cover.png"));
        assert_eq!(stored.portrait_path.as_deref(), Some("plato.png"));
        assert_eq!(stored.epub_path.as_deref(), Some("out.epub"));
        assert_eq!(stored.pdf_path, None);

        ck.finish().unwrap();
        assert_eq!(reload(&temp_dir, "s1").phase, Phase::Done);
    }

    #[test]
    fn test_rejection_fails_session() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = started(&temp_dir);
        ck.save_approval(false).unwrap();

        let stored = reload(&temp_dir, "s1");
        assert_eq!(stored.phase, Phase::Failed);
        assert_eq!(stored.approved, Some(false));
    }

    #[test]
    fn test_resume_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = started(&temp_dir);
        ck.init_chunks(["a", "b", "c"]).unwrap();
        assert!(ck.chunk_completed("1", Some(8.0)).unwrap());
        assert!(ck.chunk_failed("2", "timeout").unwrap());

        let pending: Vec<&str> = ck.pending_chunks().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(pending, ["2", "3"]);

        let summary = ck.summary().unwrap();
        assert_eq!(summary.chunks_done, 1);
        assert_eq!(summary.chunks_failed, 1);
        assert_eq!(summary.chunks_pending, 1);
        assert_eq!(summary.mean_quality, Some(8.0));
        assert_eq!(summary.error_count, 1);

        let mut resumed = Checkpointer::new(temp_dir.path()).unwrap();
        resumed.load_with_recovery("s1").unwrap();
        let pending: Vec<&str> = resumed.pending_chunks().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(pending, ["2", "3"]);
        assert_eq!(resumed.last_completed_chunk().map(|c| c.id.as_str()), Some("1"));

        let cp = resumed.checkpoint().unwrap();
        assert_eq!(cp.current_chunk_index, 1);
        assert_eq!(cp.chunks[1].error_message.as_deref(), Some("timeout"));
        assert!(cp.chunks[1].finished_at.is_some());
    }

    #[test]
    fn test_chunk_lifecycle_fields() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = started(&temp_dir);
        ck.init_chunks(["a"]).unwrap();

        assert!(ck.chunk_started("1").unwrap());
        let chunk = reload(&temp_dir, "s1").chunks[0].clone();
        assert_eq!(chunk.status, ChunkStatus::Translating);
        assert!(chunk.started_at.is_some());

        assert!(ck
            .update_chunk(
                "1",
                ChunkUpdate {
                    status: Some(ChunkStatus::Polishing),
                    translated_text: Some("translated".to_string()),
                    polish_iterations: Some(3),
                    ..Default::default()
                },
            )
            .unwrap());
        let chunk = reload(&temp_dir, "s1").chunks[0].clone();
        assert_eq!(chunk.status, ChunkStatus::Polishing);
        assert_eq!(chunk.translated_text.as_deref(), Some("translated"));
        assert_eq!(chunk.polish_iterations, 3);
        assert_eq!(chunk.source_text, "a");
    }

    #[test]
    fn test_unknown_chunk_is_silent_noop() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = started(&temp_dir);
        ck.init_chunks(["a", "b"]).unwrap();
        let before = reload(&temp_dir, "s1");

        assert!(!ck.update_chunk("9", ChunkUpdate::status(ChunkStatus::Done)).unwrap());
        assert!(!ck.chunk_started("9").unwrap());
        assert!(!ck.chunk_completed("9", Some(5.0)).unwrap());
        assert!(!ck.chunk_failed("9", "boom").unwrap());

        let after = reload(&temp_dir, "s1");
        assert_eq!(after, before);
        assert_eq!(after.error_count, 0);
        assert_eq!(after.current_chunk_index, 0);
    }

    #[test]
    fn test_accumulate_stats_is_additive() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = started(&temp_dir);

        ck.accumulate_stats(StatsDelta {
            input_tokens: 1000,
            output_tokens: 500,
            cost: 0.5,
            seconds: 10.0,
        })
        .unwrap();
        ck.accumulate_stats(StatsDelta {
            input_tokens: 200,
            cost: 0.25,
            ..Default::default()
        })
        .unwrap();

        let stored = reload(&temp_dir, "s1");
        assert_eq!(stored.total_input_tokens, 1200);
        assert_eq!(stored.total_output_tokens, 500);
        assert_eq!(stored.total_cost, 0.75);
        assert_eq!(stored.total_seconds, 10.0);
        assert_eq!(ck.summary().unwrap().total_tokens, 1700);
    }

    #[test]
    fn test_retry_after_failure_clears_previous_attempt() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = started(&temp_dir);
        ck.init_chunks(["a", "b"]).unwrap();
        ck.chunk_failed("2", "timeout").unwrap();

        assert!(ck.chunk_started("2").unwrap());
        let chunk = reload(&temp_dir, "s1").chunks[1].clone();
        assert_eq!(chunk.status, ChunkStatus::Translating);
        assert_eq!(chunk.error_message, None);
        assert_eq!(chunk.finished_at, None);
        assert!(chunk.started_at.is_some());

        assert!(ck.chunk_completed("2", Some(7.0)).unwrap());
        let stored = reload(&temp_dir, "s1");
        assert_eq!(stored.chunks[1].error_message, None);
        assert!(stored.chunks[1].finished_at.is_some());
        // The session keeps counting the failed attempt.
        assert_eq!(stored.error_count, 1);
    }

    #[test]
    fn test_non_finite_numbers_are_rejected_and_nothing_persists() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = started(&temp_dir);
        ck.init_chunks(["a", "b"]).unwrap();
        ck.accumulate_stats(StatsDelta { cost: 0.5, ..Default::default() })
            .unwrap();
        let before = reload(&temp_dir, "s1");

        let err = ck
            .accumulate_stats(StatsDelta { cost: f64::INFINITY, ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, LectioError::InvalidInput(_)));
        assert!(ck.save_cost_estimate(f64::NAN).is_err());
        assert!(ck.chunk_completed("1", Some(f64::NAN)).is_err());
        let update = ChunkUpdate {
            quality_score: Some(f64::NEG_INFINITY),
            ..Default::default()
        };
        assert!(ck.update_chunk("1", update).is_err());

        assert_eq!(ck.checkpoint(), Some(&before));
        let stored = reload(&temp_dir, "s1");
        assert_eq!(stored, before);
        assert_eq!(stored.total_cost, 0.5);

        // The session is still writable afterwards.
        ck.accumulate_stats(StatsDelta { cost: 0.25, ..Default::default() })
            .unwrap();
        assert_eq!(reload(&temp_dir, "s1").total_cost, 0.75);
    }

    #[test]
    fn test_restart_overwrites_previous_session() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = started(&temp_dir);
        ck.init_chunks(["a", "b"]).unwrap();
        ck.accumulate_stats(StatsDelta {
            input_tokens: 10,
            ..Default::default()
        })
        .unwrap();
        ck.finish().unwrap();

        ck.start(NewSession::new("s1", "Symposium", "Plato")).unwrap();

        let stored = reload(&temp_dir, "s1");
        assert!(stored.chunks.is_empty());
        assert_eq!(stored.total_input_tokens, 0);
        assert_eq!(stored.phase, Phase::Initializing);
    }

    #[test]
    fn test_mark_failed_counts_only_with_message() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = started(&temp_dir);

        ck.mark_failed(None).unwrap();
        assert_eq!(reload(&temp_dir, "s1").error_count, 0);

        ck.mark_failed(Some("quota exhausted")).unwrap();
        let stored = reload(&temp_dir, "s1");
        assert_eq!(stored.phase, Phase::Failed);
        assert_eq!(stored.error_count, 1);
        assert_eq!(stored.last_error.as_deref(), Some("quota exhausted"));
    }

    #[test]
    fn test_recovers_backed_up_state_after_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = started(&temp_dir);
        ck.save_brief(payload([("tone", "elevated")])).unwrap();

        std::fs::write(ck.store().checkpoint_path("s1"), "{ not json").unwrap();

        let mut resumed = Checkpointer::new(temp_dir.path()).unwrap();
        let cp = resumed.load_with_recovery("s1").unwrap();
        assert_eq!(cp.work, "Symposium");
        assert_eq!(cp.phase, Phase::Initializing);

        assert!(resumed.load("s1").is_err());
    }

    #[test]
    fn test_corruption_without_backups_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = Checkpointer::new(temp_dir.path()).unwrap().with_backups(false);
        ck.start(NewSession::new("s1", "Symposium", "Plato")).unwrap();
        ck.save_brief(payload([("tone", "elevated")])).unwrap();

        std::fs::write(ck.store().checkpoint_path("s1"), "{ not json").unwrap();

        let mut resumed = Checkpointer::new(temp_dir.path()).unwrap();
        assert!(resumed.load_with_recovery("s1").is_none());
        assert!(resumed.checkpoint().is_none());
    }

    #[test]
    fn test_catalogue_operations() {
        let temp_dir = TempDir::new().unwrap();
        let mut ck = Checkpointer::new(temp_dir.path()).unwrap();
        for id in ["done-1", "open-1", "open-2"] {
            ck.start(NewSession::new(id, "Work", "Author")).unwrap();
            ck.init_chunks(["x", "y"]).unwrap();
        }
        ck.load("done-1").unwrap();
        ck.chunk_completed("1", Some(9.0)).unwrap();
        ck.finish().unwrap();

        assert_eq!(ck.list_sessions().unwrap(), ["done-1", "open-1", "open-2"]);

        let detailed = ck.list_sessions_detailed().unwrap();
        assert_eq!(detailed.len(), 3);
        assert_eq!(detailed[0].session_id, "done-1");
        assert_eq!(detailed[0].mean_quality, Some(9.0));

        let incomplete = ck.list_incomplete().unwrap();
        let ids: Vec<&str> = incomplete.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"open-1") && ids.contains(&"open-2"));
        assert!(incomplete.iter().all(|s| s.chunks_total == 2 && s.chunks_done == 0));

        assert!(ck.delete("done-1").unwrap());
        assert!(ck.checkpoint().is_none());
        assert!(!ck.exists("done-1"));
        assert!(!ck.delete("done-1").unwrap());
    }
}
