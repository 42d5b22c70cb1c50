//! Durable storage for checkpoint documents.
//!
//! Layout inside the storage root:
//! - `{session_id}.checkpoint.json`: primary document
//! - `{session_id}.checkpoint.backup.json`: last parseable primary, kept by `save_with_backup`
//!
//! Every write goes to a hidden temp file in the same directory, is synced,
//! and is then renamed over the target, so a crash leaves either the old or
//! the new document and never a torn one. Temp files orphaned by a crash are
//! swept by `cleanup_backups`. Readers treat a missing document
//! as `None`; only `load` reports corruption as an error.

use super::state::{PipelineCheckpoint, SessionListing};
use crate::models::{validate_session_id, LectioError, Result};
use chrono::Utc;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

const CHECKPOINT_SUFFIX: &str = ".checkpoint.json";
const BACKUP_SUFFIX: &str = ".checkpoint.backup.json";
const TEMP_PATTERN: &str = ".*.tmp";
const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// File-backed store of checkpoint documents keyed by session id.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| LectioError::io("creating checkpoint dir", e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkpoint_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}{CHECKPOINT_SUFFIX}"))
    }

    pub fn backup_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}{BACKUP_SUFFIX}"))
    }

    /// Write `checkpoint` as the primary document, refreshing `updated_at` first.
    ///
    /// A record holding NaN or infinite numbers is rejected before anything
    /// is written.
    pub fn save(&self, checkpoint: &mut PipelineCheckpoint) -> Result<()> {
        validate_session_id(&checkpoint.session_id)?;
        checkpoint.validate()?;
        checkpoint.updated_at = Utc::now();

        let bytes = serde_json::to_vec_pretty(checkpoint).map_err(LectioError::Serialize)?;
        let path = self.checkpoint_path(&checkpoint.session_id);
        write_atomic(&path, &bytes)?;

        debug!(
            session_id = %checkpoint.session_id,
            phase = %checkpoint.phase,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Read the primary document for `session_id`.
    ///
    /// Returns `Ok(None)` when no document exists and `Err(Corrupt)` when it
    /// exists but cannot be parsed.
    pub fn load(&self, session_id: &str) -> Result<Option<PipelineCheckpoint>> {
        if validate_session_id(session_id).is_err() {
            return Ok(None);
        }
        read_document(&self.checkpoint_path(session_id))
    }

    /// Preserve the current primary as the backup, then `save`.
    ///
    /// The primary is copied only if it parses, so an externally damaged
    /// primary never replaces a good backup.
    pub fn save_with_backup(&self, checkpoint: &mut PipelineCheckpoint) -> Result<()> {
        validate_session_id(&checkpoint.session_id)?;
        checkpoint.validate()?;
        let primary = self.checkpoint_path(&checkpoint.session_id);

        match fs::read(&primary) {
            Ok(bytes) => {
                if serde_json::from_slice::<PipelineCheckpoint>(&bytes).is_ok() {
                    write_atomic(&self.backup_path(&checkpoint.session_id), &bytes)?;
                } else {
                    warn!(
                        session_id = %checkpoint.session_id,
                        "Primary checkpoint unreadable, keeping previous backup"
                    );
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(LectioError::io("reading checkpoint for backup", e)),
        }

        self.save(checkpoint)
    }

    /// Load the primary document, falling back to the backup if the primary
    /// cannot be read. Any failure ends in `None`.
    pub fn load_with_recovery(&self, session_id: &str) -> Option<PipelineCheckpoint> {
        let err = match self.load(session_id) {
            Ok(found) => return found,
            Err(e) => e,
        };
        warn!(session_id, error = %err, "Checkpoint unreadable, trying backup");

        match read_document(&self.backup_path(session_id)) {
            Ok(Some(checkpoint)) => {
                info!(session_id, "Recovered checkpoint from backup");
                Some(checkpoint)
            }
            Ok(None) => {
                warn!(session_id, "No backup available");
                None
            }
            Err(e) => {
                warn!(session_id, error = %e, "Backup unreadable as well");
                None
            }
        }
    }

    pub fn exists(&self, session_id: &str) -> bool {
        validate_session_id(session_id).is_ok() && self.checkpoint_path(session_id).exists()
    }

    /// Remove the primary document and its backup.
    ///
    /// Returns whether a primary document existed.
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        if validate_session_id(session_id).is_err() {
            return Ok(false);
        }
        let removed = remove_if_exists(&self.checkpoint_path(session_id))?;
        remove_if_exists(&self.backup_path(session_id))?;
        if removed {
            info!(session_id, "Checkpoint deleted");
        }
        Ok(removed)
    }

    /// Ids of every session with a primary document, sorted.
    pub fn list_session_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .glob_files(&format!("*{CHECKPOINT_SUFFIX}"))?
            .iter()
            .filter_map(|path| path.file_name()?.to_str()?.strip_suffix(CHECKPOINT_SUFFIX))
            .map(str::to_string)
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// One listing row per readable session, most recently updated first.
    ///
    /// Unreadable documents are skipped.
    pub fn list_sessions_detailed(&self) -> Result<Vec<SessionListing>> {
        let mut sessions = Vec::new();
        for session_id in self.list_session_ids()? {
            match read_document(&self.checkpoint_path(&session_id)) {
                Ok(Some(checkpoint)) => sessions.push(checkpoint.listing()),
                Ok(None) => {}
                Err(e) => warn!(session_id = %session_id, error = %e, "Skipping unreadable checkpoint"),
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Listing restricted to sessions that are neither done nor failed.
    pub fn list_incomplete(&self) -> Result<Vec<SessionListing>> {
        Ok(self
            .list_sessions_detailed()?
            .into_iter()
            .filter(|s| !s.phase.is_terminal())
            .collect())
    }

    /// Remove backups last modified more than `older_than_days` days ago.
    pub fn cleanup_backups(&self, older_than_days: u64) -> Result<usize> {
        let age = Duration::from_secs(older_than_days.saturating_mul(SECS_PER_DAY));
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.cleanup_backups_before(cutoff)
    }

    /// Remove backups last modified before `cutoff`. Returns how many were removed.
    ///
    /// Temp files older than `cutoff` are leftovers of interrupted writes and
    /// are removed as well, without being counted.
    pub fn cleanup_backups_before(&self, cutoff: SystemTime) -> Result<usize> {
        let removed = self.remove_older_than(&format!("*{BACKUP_SUFFIX}"), cutoff)?;
        let stale_temps = self.remove_older_than(TEMP_PATTERN, cutoff)?;
        if removed > 0 {
            info!(removed, "Old checkpoint backups removed");
        }
        if stale_temps > 0 {
            info!(stale_temps, "Orphaned temp files removed");
        }
        Ok(removed)
    }

    fn remove_older_than(&self, pattern: &str, cutoff: SystemTime) -> Result<usize> {
        let mut removed = 0;
        for path in self.glob_files(pattern)? {
            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot stat file, skipping");
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Cannot remove file"),
            }
        }
        Ok(removed)
    }

    /// Files in the storage root whose names match `file_pattern`.
    fn glob_files(&self, file_pattern: &str) -> Result<Vec<PathBuf>> {
        let root = glob::Pattern::escape(&self.dir.to_string_lossy());
        let pattern = format!("{root}/{file_pattern}");
        let paths = glob::glob(&pattern)
            .map_err(|e| LectioError::Internal(format!("Invalid glob pattern: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(paths)
    }
}

fn read_document(path: &Path) -> Result<Option<PipelineCheckpoint>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LectioError::io(format!("reading {}", path.display()), e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| LectioError::corrupt(path, e))
}

/// Write `bytes` to `path` via a synced temp file and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| LectioError::Internal(format!("no file name in {}", path.display())))?;
    let temp_path = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    let written = (|| -> io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(LectioError::io(format!("writing {}", path.display()), e));
    }
    sync_dir(dir)
}

/// Flush the directory entry so a completed rename survives power loss.
fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let handle = File::open(dir)
            .map_err(|e| LectioError::io(format!("opening {}", dir.display()), e))?;
        handle
            .sync_all()
            .map_err(|e| LectioError::io(format!("syncing {}", dir.display()), e))?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LectioError::io(format!("removing {}", path.display()), e)),
    }
}
