//! Record types persisted by the portal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered student app for one lab. Keyed by `(lab, url)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub lab: String,
    pub url: String,
    pub name: String,
    pub added_at: DateTime<Utc>,
}

/// Last comparison state for one `(lab, url)` pair.
///
/// `sync = None` means the target was registered but never evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub lab: String,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    pub lab: String,
    pub name: String,
    pub members: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an admin supplies when creating or updating a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamDraft {
    pub lab: String,
    pub name: String,
    pub members: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// One JSONL line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Submission(Submission),
    Leaderboard(LeaderboardEntry),
    Team(Team),
    Setting(Setting),
}
