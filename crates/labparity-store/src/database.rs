//! Lock-scoped access to portal state.
//!
//! Every read and write goes through one mutex. A file-backed mutation is
//! applied to a copy of the state, persisted as a full JSONL snapshot, and
//! only then swapped in, so a failed write leaves memory untouched.
//! Callers must not hold this lock across network calls; the API never
//! hands out the guard.

use crate::jsonl::{JsonlError, load_snapshot, save_snapshot};
use crate::memory::PortalState;
use crate::record::{LeaderboardEntry, Submission, Team, TeamDraft};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub const BASELINE_URL_SETTING: &str = "baseline_url";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Jsonl(#[from] JsonlError),

    #[error("team not found: {0}")]
    TeamNotFound(u64),
}

#[derive(Debug)]
pub struct Database {
    path: Option<PathBuf>,
    state: Mutex<PortalState>,
}

impl Database {
    /// Open a file-backed store. A missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            PortalState::from_records(load_snapshot(&path)?)
        } else {
            PortalState::default()
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(PortalState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, PortalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, f: impl FnOnce(&PortalState) -> T) -> T {
        f(&self.lock())
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut PortalState) -> T) -> Result<T, StoreError> {
        let mut state = self.lock();
        let Some(path) = &self.path else {
            return Ok(f(&mut state));
        };
        let mut next = state.clone();
        let value = f(&mut next);
        save_snapshot(path, &next.records())?;
        debug!(path = %path.display(), "store snapshot written");
        *state = next;
        Ok(value)
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.read(|s| s.setting(key).map(str::to_string))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.mutate(|s| s.set_setting(key, value, Utc::now()))
    }

    pub fn baseline_url(&self) -> Option<String> {
        self.setting(BASELINE_URL_SETTING)
    }

    pub fn set_baseline_url(&self, url: &str) -> Result<(), StoreError> {
        self.set_setting(BASELINE_URL_SETTING, url)
    }

    pub fn upsert_submission(
        &self,
        lab: &str,
        name: &str,
        url: &str,
    ) -> Result<Submission, StoreError> {
        self.mutate(|s| s.upsert_submission(lab, name, url, Utc::now()))
    }

    pub fn list_submissions(&self, lab: Option<&str>) -> Vec<Submission> {
        self.read(|s| s.submissions(lab))
    }

    pub fn ensure_leaderboard_entry(
        &self,
        lab: &str,
        url: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.mutate(|s| s.ensure_leaderboard_entry(lab, url, name))
    }

    /// Idempotent upsert of one target's verdict, stamped with the current
    /// wall-clock time.
    pub fn update_leaderboard(
        &self,
        lab: &str,
        url: &str,
        name: &str,
        sync: Option<bool>,
    ) -> Result<(), StoreError> {
        self.mutate(|s| s.update_leaderboard(lab, url, name, sync, Utc::now()))
    }

    pub fn list_leaderboard(&self, lab: Option<&str>) -> Vec<LeaderboardEntry> {
        self.read(|s| s.leaderboard(lab))
    }

    pub fn leaderboard_entry(&self, lab: &str, url: &str) -> Option<LeaderboardEntry> {
        self.read(|s| s.leaderboard_entry(lab, url).cloned())
    }

    pub fn delete_submission(&self, lab: &str, url: &str) -> Result<bool, StoreError> {
        self.mutate(|s| s.delete_submission(lab, url))
    }

    pub fn list_teams(&self, lab: Option<&str>) -> Vec<Team> {
        self.read(|s| s.teams(lab))
    }

    pub fn create_team(&self, draft: TeamDraft) -> Result<Team, StoreError> {
        self.mutate(|s| s.create_team(draft, Utc::now()))
    }

    pub fn update_team(&self, id: u64, draft: TeamDraft) -> Result<Team, StoreError> {
        self.mutate(|s| s.update_team(id, draft, Utc::now()))?
            .ok_or(StoreError::TeamNotFound(id))
    }

    pub fn delete_team(&self, id: u64) -> Result<(), StoreError> {
        if self.mutate(|s| s.delete_team(id))? {
            Ok(())
        } else {
            Err(StoreError::TeamNotFound(id))
        }
    }
}
