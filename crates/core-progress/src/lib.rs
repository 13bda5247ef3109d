//! Progress Store (§4.6): durable, atomic persistence of a learner's
//! position in the curriculum. Grounded in `engine.py::_load_progress` /
//! `_save_progress` and `config.py::System`'s filenames — temp-file +
//! `sync_all` + rename on the write side, single-generation backup plus
//! self-heal on the read side, matching the "never let a corrupt state
//! file brick a session" invariant §8 requires.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use core_curriculum::LessonOrdering;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("failed to write progress file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize progress: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A learner's saved state. Field names are the current schema;
/// `#[serde(alias = ...)]` accepts the legacy `completed`/`skipped` names
/// `engine.py::validate_progress_data` migrated away from (§6, §9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub current_uuid: Option<Uuid>,
    #[serde(default, alias = "completed")]
    pub completed_tasks: HashSet<Uuid>,
    #[serde(default, alias = "skipped")]
    pub skipped_tasks: HashSet<Uuid>,
    #[serde(default)]
    pub user_code: std::collections::HashMap<Uuid, String>,
}

impl Progress {
    /// Normalizes state that no longer makes sense against `ordering`: a
    /// `current_uuid` naming a lesson that doesn't exist (manifest
    /// changed, UUID typo'd) resets to `None`. The store itself can't do
    /// this — it has no curriculum to check against — so the caller
    /// (`core-engine`) calls this right after loading (§4.6).
    pub fn sanitize(&mut self, ordering: &LessonOrdering) {
        if let Some(uuid) = self.current_uuid {
            if ordering.by_uuid(uuid).is_none() {
                self.current_uuid = None;
            }
        }
        self.completed_tasks.retain(|u| ordering.by_uuid(*u).is_some());
        self.skipped_tasks.retain(|u| ordering.by_uuid(*u).is_some());
    }

    /// Completion is monotonic: passing once keeps a lesson completed
    /// forever, and clears it from `skipped` if it was there (§9 Open
    /// Questions, resolved).
    pub fn mark_completed(&mut self, uuid: Uuid) {
        self.completed_tasks.insert(uuid);
        self.skipped_tasks.remove(&uuid);
    }

    pub fn mark_skipped(&mut self, uuid: Uuid) {
        if !self.completed_tasks.contains(&uuid) {
            self.skipped_tasks.insert(uuid);
        }
    }
}

pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn backup_path(&self) -> PathBuf {
        let mut p = self.path.clone();
        let name = format!("{}.backup", p.file_name().and_then(|n| n.to_str()).unwrap_or("progress"));
        p.set_file_name(name);
        p
    }

    /// Never errors outward (§8 invariant): a missing or corrupt live file
    /// falls back to the single-generation backup, and a successful
    /// fallback self-heals by rewriting the live file.
    pub fn load(&self) -> Progress {
        match self.read_and_parse(&self.path) {
            Ok(progress) => progress,
            Err(e) => {
                warn!(target: "progress", path = %self.path.display(), error = %e, "live progress file unreadable, falling back to backup");
                match self.read_and_parse(&self.backup_path()) {
                    Ok(progress) => {
                        info!(target: "progress", "recovered progress from backup, rewriting live file");
                        let _ = self.save(&progress);
                        progress
                    }
                    Err(_) => {
                        warn!(target: "progress", "no usable backup either, starting from empty progress");
                        Progress::default()
                    }
                }
            }
        }
    }

    fn read_and_parse(&self, path: &Path) -> Result<Progress, ProgressError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes a single-generation backup of whatever is currently live,
    /// then atomically replaces the live file via temp-file + `sync_all`
    /// + rename. Any failure here is logged and swallowed (§4.6, §7
    /// `PersistenceFailure` is never propagated as a hard error).
    pub fn save(&self, progress: &Progress) -> Result<(), ProgressError> {
        if self.path.exists() {
            let _ = fs::copy(&self.path, self.backup_path());
        }

        let payload = serde_json::to_vec_pretty(progress)?;
        let tmp_path = self.path.with_extension("tmp");
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(&payload)?;
        tmp.sync_all()?;
        drop(tmp);
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));
        let mut progress = Progress::default();
        let uuid = Uuid::new_v4();
        progress.mark_completed(uuid);
        store.save(&progress).unwrap();

        let loaded = store.load();
        assert!(loaded.completed_tasks.contains(&uuid));
    }

    #[test]
    fn legacy_field_names_deserialize_into_the_new_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let uuid = Uuid::new_v4();
        fs::write(&path, format!(r#"{{"completed": ["{uuid}"], "skipped": []}}"#)).unwrap();

        let store = ProgressStore::new(path);
        let loaded = store.load();
        assert!(loaded.completed_tasks.contains(&uuid));
    }

    #[test]
    fn corrupt_live_file_falls_back_to_backup_and_self_heals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let store = ProgressStore::new(path.clone());

        let mut progress = Progress::default();
        let uuid = Uuid::new_v4();
        progress.mark_completed(uuid);
        store.save(&progress).unwrap();
        // second save promotes the now-good live file to the backup slot
        store.save(&progress).unwrap();
        // then corrupt the live file directly, leaving the backup intact
        fs::write(&path, "{not valid json").unwrap();

        let loaded = store.load();
        assert!(loaded.completed_tasks.contains(&uuid));
        // self-heal: the live file should now parse again
        let live = fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<Progress>(&live).is_ok());
    }

    #[test]
    fn missing_file_and_missing_backup_yields_empty_progress() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));
        let loaded = store.load();
        assert!(loaded.completed_tasks.is_empty());
        assert!(loaded.current_uuid.is_none());
    }

    #[test]
    fn completion_is_monotonic_and_clears_skip() {
        let mut progress = Progress::default();
        let uuid = Uuid::new_v4();
        progress.mark_skipped(uuid);
        assert!(progress.skipped_tasks.contains(&uuid));
        progress.mark_completed(uuid);
        assert!(progress.completed_tasks.contains(&uuid));
        assert!(!progress.skipped_tasks.contains(&uuid));
    }
}
