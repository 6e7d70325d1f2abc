//! Portal service layer.
//!
//! `Portal` owns the interaction shape used by the HTTP surface: it turns
//! already-parsed inputs into JSON bodies or a [`PortalError`] carrying the
//! HTTP status. The scheduler and store remain the source of truth; this
//! crate never holds a lock across a call into them.

pub mod http;

use labparity_sched::{
    Broadcaster, DEFAULT_LAB_ID, Lab, LiveEvent, Scheduler, SubmissionError, SubmissionRequest,
    is_valid_app_url, normalize_lab_id,
};
use labparity_store::{StoreError, TeamDraft};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use thiserror::Error;
use tracing::{debug, info};

pub use http::{HttpServeError, HttpServerConfig, serve_listener, serve_portal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortalError {
    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid admin token")]
    Unauthorized,

    #[error("admin routes are disabled (no admin token configured)")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl PortalError {
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound(_) => 404,
            Self::Internal(_) => 500,
        }
    }
}

impl From<StoreError> for PortalError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::TeamNotFound(id) => Self::NotFound(format!("team not found: {id}")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<SubmissionError> for PortalError {
    fn from(error: SubmissionError) -> Self {
        if error.is_client_error() {
            Self::BadRequest(error.to_string())
        } else {
            Self::Internal(error.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamInput {
    #[serde(default)]
    pub lab: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub members: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntervalInput {
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaselineInput {
    #[serde(default)]
    pub baseline_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionRef {
    #[serde(default)]
    pub lab: Option<String>,
    #[serde(default)]
    pub url: String,
}

pub const ROUTES: [&str; 17] = [
    "GET /",
    "GET /healthz",
    "GET /api/labs",
    "POST /api/compare",
    "GET /api/students?lab=<lab>",
    "GET /api/leaderboard?lab=<lab>",
    "GET /api/events?since=<seq>",
    "GET /api/events/stream?since=<seq>",
    "GET /admin/automation",
    "POST /admin/automation/toggle",
    "POST /admin/interval",
    "POST /admin/baseline",
    "POST /admin/submissions/delete",
    "GET /admin/teams?lab=<lab>",
    "POST /admin/teams",
    "POST /admin/teams/<id>/update",
    "POST /admin/teams/<id>/delete",
];

pub struct Portal {
    scheduler: Scheduler,
    events: Arc<Broadcaster>,
    admin_token: Option<String>,
}

impl Portal {
    pub fn new(scheduler: Scheduler, events: Arc<Broadcaster>, admin_token: Option<String>) -> Self {
        let admin_token = admin_token.filter(|token| !token.trim().is_empty());
        Self {
            scheduler,
            events,
            admin_token,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Check an `Authorization` header value against the configured token.
    pub fn authorize(&self, header: Option<&str>) -> Result<(), PortalError> {
        let Some(expected) = self.admin_token.as_deref() else {
            return Err(PortalError::Forbidden);
        };
        match header.and_then(|h| h.trim().strip_prefix("Bearer ")) {
            Some(token) if token.trim() == expected => Ok(()),
            _ => Err(PortalError::Unauthorized),
        }
    }

    fn known_lab(&self, raw: Option<&str>) -> Result<&Lab, PortalError> {
        let id = normalize_lab_id(raw.unwrap_or(DEFAULT_LAB_ID));
        self.scheduler
            .catalog()
            .get(&id)
            .ok_or_else(|| PortalError::BadRequest("Unknown lab.".to_string()))
    }

    /// Admin forms fall back to the default lab for unknown ids.
    fn admin_lab(&self, raw: &str) -> String {
        let id = normalize_lab_id(raw);
        if self.scheduler.catalog().get(&id).is_some() {
            id
        } else {
            DEFAULT_LAB_ID.to_string()
        }
    }

    pub fn index(&self) -> Value {
        json!({
            "service": "labparity.portal.v1",
            "routes": ROUTES,
            "labs": self.scheduler.catalog().labs(),
        })
    }

    pub fn healthz(&self) -> Value {
        json!({ "status": "ok" })
    }

    pub fn labs(&self) -> Value {
        json!({ "labs": self.scheduler.catalog().labs() })
    }

    pub fn compare(&self, request: SubmissionRequest) -> Result<Value, PortalError> {
        let outcome = self.scheduler.submit(request)?;
        serde_json::to_value(outcome).map_err(|e| PortalError::Internal(e.to_string()))
    }

    pub fn students(&self, lab: Option<&str>) -> Result<Value, PortalError> {
        let lab = self.known_lab(lab)?;
        let students = self.scheduler.database().list_submissions(Some(&lab.id));
        Ok(json!({ "students": students }))
    }

    pub fn leaderboard(&self, lab: Option<&str>) -> Result<Value, PortalError> {
        let lab = self.known_lab(lab)?;
        let rows = self.scheduler.database().list_leaderboard(Some(&lab.id));
        Ok(json!({ "leaderboard": rows }))
    }

    pub fn events(&self, since: u64) -> Value {
        let (events, next) = self.events.poll(since);
        json!({ "events": events, "next": next })
    }

    /// Backlog after `since` plus a live feed of everything emitted later.
    pub fn subscribe_events(&self, since: u64) -> (Vec<LiveEvent>, Receiver<LiveEvent>) {
        let subscription = self.events.subscribe(since);
        debug!(
            subscribers = self.events.subscriber_count(),
            since, "event stream opened"
        );
        subscription
    }

    pub fn automation_status(&self) -> Value {
        json!({
            "automation": self.scheduler.automation_status(),
            "baseline_url": self.scheduler.resolve_baseline_url(None),
        })
    }

    pub fn toggle_automation(&self) -> Value {
        json!({ "automation": self.scheduler.toggle_automation() })
    }

    pub fn set_interval(&self, input: IntervalInput) -> Result<Value, PortalError> {
        let bounds = self
            .scheduler
            .set_interval_bounds(input.min, input.max)
            .map_err(|e| PortalError::BadRequest(e.to_string()))?;
        Ok(json!({ "interval_min": bounds.min(), "interval_max": bounds.max() }))
    }

    pub fn set_baseline(&self, input: BaselineInput) -> Result<Value, PortalError> {
        let url = input.baseline_url.trim();
        if !is_valid_app_url(url) {
            return Err(PortalError::BadRequest("Baseline URL is invalid.".to_string()));
        }
        self.scheduler.database().set_baseline_url(url)?;
        info!(url, "baseline URL updated");
        Ok(json!({ "baseline_url": url }))
    }

    pub fn delete_submission(&self, input: SubmissionRef) -> Result<Value, PortalError> {
        let lab = self.admin_lab(input.lab.as_deref().unwrap_or(DEFAULT_LAB_ID));
        let url = input.url.trim();
        if url.is_empty() {
            return Err(PortalError::BadRequest("App URL is required.".to_string()));
        }
        let deleted = self.scheduler.database().delete_submission(&lab, url)?;
        info!(lab, url, deleted, "submission deleted");
        Ok(json!({ "lab": lab, "url": url, "deleted": deleted }))
    }

    pub fn list_teams(&self, lab: Option<&str>) -> Value {
        let lab = lab.map(normalize_lab_id);
        json!({ "teams": self.scheduler.database().list_teams(lab.as_deref()) })
    }

    fn team_draft(&self, input: TeamInput) -> Result<TeamDraft, PortalError> {
        let name = input.name.trim();
        let members = input.members.trim();
        if name.is_empty() || members.is_empty() {
            return Err(PortalError::BadRequest(
                "Team name and members are required.".to_string(),
            ));
        }
        Ok(TeamDraft {
            lab: self.admin_lab(&input.lab),
            name: name.to_string(),
            members: members.to_string(),
        })
    }

    pub fn create_team(&self, input: TeamInput) -> Result<Value, PortalError> {
        let team = self.scheduler.database().create_team(self.team_draft(input)?)?;
        Ok(json!({ "team": team }))
    }

    pub fn update_team(&self, id: u64, input: TeamInput) -> Result<Value, PortalError> {
        let team = self
            .scheduler
            .database()
            .update_team(id, self.team_draft(input)?)?;
        Ok(json!({ "team": team }))
    }

    pub fn delete_team(&self, id: u64) -> Result<Value, PortalError> {
        self.scheduler.database().delete_team(id)?;
        Ok(json!({ "deleted": id }))
    }
}
