//! Canonical in-memory representation of portal state.
//!
//! Pure data operations only; locking and persistence live in
//! [`crate::database`].

use crate::record::{LeaderboardEntry, Record, Setting, Submission, Team, TeamDraft};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

type LabUrl = (String, String);

#[derive(Debug, Clone, Default)]
pub struct PortalState {
    submissions: BTreeMap<LabUrl, Submission>,
    leaderboard: BTreeMap<LabUrl, LeaderboardEntry>,
    teams: BTreeMap<u64, Team>,
    settings: BTreeMap<String, Setting>,
}

impl PortalState {
    /// Build state from loaded records. Later records for the same key win.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut state = Self::default();
        for record in records {
            match record {
                Record::Submission(s) => {
                    state
                        .submissions
                        .insert((s.lab.clone(), s.url.clone()), s);
                }
                Record::Leaderboard(e) => {
                    state
                        .leaderboard
                        .insert((e.lab.clone(), e.url.clone()), e);
                }
                Record::Team(t) => {
                    state.teams.insert(t.id, t);
                }
                Record::Setting(s) => {
                    state.settings.insert(s.key.clone(), s);
                }
            }
        }
        state
    }

    /// Snapshot every record in deterministic order.
    pub fn records(&self) -> Vec<Record> {
        let mut out = Vec::with_capacity(
            self.settings.len() + self.teams.len() + self.submissions.len() + self.leaderboard.len(),
        );
        out.extend(self.settings.values().cloned().map(Record::Setting));
        out.extend(self.teams.values().cloned().map(Record::Team));
        out.extend(self.submissions.values().cloned().map(Record::Submission));
        out.extend(self.leaderboard.values().cloned().map(Record::Leaderboard));
        out
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(|s| s.value.as_str())
    }

    pub fn set_setting(&mut self, key: &str, value: &str, now: DateTime<Utc>) {
        self.settings.insert(
            key.to_string(),
            Setting {
                key: key.to_string(),
                value: value.to_string(),
                updated_at: now,
            },
        );
    }

    /// Insert or refresh a submission; re-submission updates name and time.
    pub fn upsert_submission(
        &mut self,
        lab: &str,
        name: &str,
        url: &str,
        now: DateTime<Utc>,
    ) -> Submission {
        let submission = Submission {
            lab: lab.to_string(),
            url: url.to_string(),
            name: name.to_string(),
            added_at: now,
        };
        self.submissions
            .insert((lab.to_string(), url.to_string()), submission.clone());
        submission
    }

    /// Submissions for `lab` (or all labs), newest first.
    pub fn submissions(&self, lab: Option<&str>) -> Vec<Submission> {
        let mut rows: Vec<Submission> = self
            .submissions
            .values()
            .filter(|s| lab.is_none_or(|lab| s.lab == lab))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.added_at.cmp(&a.added_at).then_with(|| a.url.cmp(&b.url)));
        rows
    }

    /// Create the leaderboard row if absent (unchecked, unknown sync);
    /// otherwise refresh only its name.
    pub fn ensure_leaderboard_entry(&mut self, lab: &str, url: &str, name: &str) {
        self.leaderboard
            .entry((lab.to_string(), url.to_string()))
            .and_modify(|e| e.name = name.to_string())
            .or_insert_with(|| LeaderboardEntry {
                lab: lab.to_string(),
                url: url.to_string(),
                name: name.to_string(),
                last_checked: None,
                sync: None,
            });
    }

    /// Upsert the verdict for one target. Last write wins.
    pub fn update_leaderboard(
        &mut self,
        lab: &str,
        url: &str,
        name: &str,
        sync: Option<bool>,
        now: DateTime<Utc>,
    ) {
        self.leaderboard.insert(
            (lab.to_string(), url.to_string()),
            LeaderboardEntry {
                lab: lab.to_string(),
                url: url.to_string(),
                name: name.to_string(),
                last_checked: Some(now),
                sync,
            },
        );
    }

    pub fn leaderboard_entry(&self, lab: &str, url: &str) -> Option<&LeaderboardEntry> {
        self.leaderboard.get(&(lab.to_string(), url.to_string()))
    }

    /// Leaderboard rows, most recently checked first; never-checked rows last.
    pub fn leaderboard(&self, lab: Option<&str>) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<LeaderboardEntry> = self
            .leaderboard
            .values()
            .filter(|e| lab.is_none_or(|lab| e.lab == lab))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.last_checked
                .cmp(&a.last_checked)
                .then_with(|| a.url.cmp(&b.url))
        });
        rows
    }

    /// Remove a submission and its leaderboard row. Returns whether anything
    /// was removed.
    pub fn delete_submission(&mut self, lab: &str, url: &str) -> bool {
        let key = (lab.to_string(), url.to_string());
        let removed_submission = self.submissions.remove(&key).is_some();
        let removed_entry = self.leaderboard.remove(&key).is_some();
        removed_submission || removed_entry
    }

    /// Teams for `lab` (or all labs), ordered by lab then name.
    pub fn teams(&self, lab: Option<&str>) -> Vec<Team> {
        let mut rows: Vec<Team> = self
            .teams
            .values()
            .filter(|t| lab.is_none_or(|lab| t.lab == lab))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.lab
                .cmp(&b.lab)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        rows
    }

    pub fn create_team(&mut self, draft: TeamDraft, now: DateTime<Utc>) -> Team {
        let id = self.teams.keys().next_back().map_or(1, |last| last + 1);
        let team = Team {
            id,
            lab: draft.lab,
            name: draft.name,
            members: draft.members,
            created_at: now,
            updated_at: now,
        };
        self.teams.insert(id, team.clone());
        team
    }

    pub fn update_team(&mut self, id: u64, draft: TeamDraft, now: DateTime<Utc>) -> Option<Team> {
        let team = self.teams.get_mut(&id)?;
        team.lab = draft.lab;
        team.name = draft.name;
        team.members = draft.members;
        team.updated_at = now;
        Some(team.clone())
    }

    pub fn delete_team(&mut self, id: u64) -> bool {
        self.teams.remove(&id).is_some()
    }
}
