//! Automation scheduler.
//!
//! One [`Scheduler`] owns every piece of shared automation state behind a
//! single mutex: the fill-in-progress flag, the enabled/paused accounting,
//! the interval bounds and the planned next fill. Three duties run against
//! it:
//!
//! 1. [`Scheduler::submit`]: validate, persist, compare synchronously and
//!    opportunistically start a background fill job.
//! 2. [`Scheduler::run_fill_loop`]: randomized periodic fill of the baseline
//!    and every automation-lab target, re-comparing each target after its
//!    fill.
//! 3. [`Scheduler::run_compare_loop`]: fixed-interval re-check of every
//!    compare-lab target, no fills.
//!
//! At most one fill runs process-wide. Starting one requires a
//! [`FillPermit`], which is only handed out when no other permit is alive
//! and releases the flag when dropped (including on panic).

use crate::config::{IntervalBounds, IntervalError, SchedulerConfig};
use crate::fill::{FillDriver, FillError, FillJob, FillRequest, FillSeed};
use crate::labs::{DEFAULT_LAB_ID, LabCatalog, normalize_lab_id};
use crate::load::LoadRunner;
use crate::shutdown::Shutdown;
use crate::sink::{LiveMessage, LogSink};
use crate::targets::{ComparisonTarget, is_valid_app_url};
use chrono::Utc;
use labparity_compare::{ComparisonVerdict, EndpointResult, JsonSource, compare_endpoints};
use labparity_store::{Database, StoreError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Rejections at the submission boundary. Display text is user-facing.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Unknown lab.")]
    UnknownLab(String),

    #[error("Name is required.")]
    NameRequired,

    #[error("App URL is required.")]
    UrlRequired,

    #[error("App URL must include http or https.")]
    InvalidUrl(String),

    #[error("Baseline URL is invalid.")]
    InvalidBaseline(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl SubmissionError {
    /// True when the caller sent bad input (as opposed to a server-side
    /// misconfiguration or storage failure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownLab(_) | Self::NameRequired | Self::UrlRequired | Self::InvalidUrl(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DutyError {
    #[error("failed to spawn {duty} thread: {source}")]
    Spawn {
        duty: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to build load client: {0}")]
    LoadClient(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    #[serde(default)]
    pub lab: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub baseline_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredSubmission {
    pub name: String,
    pub target_url: String,
    pub status: &'static str,
    pub compare_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparedSubmission {
    pub name: String,
    pub baseline_url: String,
    pub target_url: String,
    pub status: &'static str,
    pub elapsed_ms: u64,
    pub results: Vec<EndpointResult>,
    pub compare_enabled: bool,
    pub fill_started: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SubmissionOutcome {
    Registered(RegisteredSubmission),
    Compared(ComparedSubmission),
}

/// What one periodic fill cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Disabled,
    InvalidBaseline(String),
    Busy,
    BaselineFailed,
    /// The cycle body panicked; the loop carries on.
    Aborted,
    Completed(CycleReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub seed: u64,
    pub filled: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparePassReport {
    pub checked: Vec<(String, bool)>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutomationStatus {
    pub enabled: bool,
    pub fill_active: bool,
    pub status: &'static str,
    pub paused_seconds: u64,
    pub next_fill_in_seconds: Option<u64>,
    pub next_entry_text: Option<String>,
    pub interval_min: u64,
    pub interval_max: u64,
}

#[derive(Debug, Clone)]
struct PlannedFill {
    at: Instant,
    seed: FillSeed,
}

#[derive(Debug)]
struct AutomationState {
    fill_active: bool,
    enabled: bool,
    paused_at: Option<Instant>,
    total_paused: Duration,
    interval: IntervalBounds,
    next_fill: Option<PlannedFill>,
}

impl AutomationState {
    fn status(&self) -> &'static str {
        if !self.enabled {
            "paused"
        } else if self.next_fill.is_none() {
            "pending"
        } else {
            "scheduled"
        }
    }

    fn next_in_seconds(&self) -> Option<u64> {
        self.next_fill
            .as_ref()
            .map(|plan| plan.at.saturating_duration_since(Instant::now()).as_secs())
    }

    fn snapshot(&self) -> AutomationStatus {
        let mut paused = self.total_paused;
        if let Some(at) = self.paused_at {
            paused += at.elapsed();
        }
        AutomationStatus {
            enabled: self.enabled,
            fill_active: self.fill_active,
            status: self.status(),
            paused_seconds: paused.as_secs(),
            next_fill_in_seconds: self.next_in_seconds(),
            next_entry_text: self.next_fill.as_ref().map(|p| p.seed.entry_text.clone()),
            interval_min: self.interval.min(),
            interval_max: self.interval.max(),
        }
    }

    fn fill_meta(&self) -> LiveMessage {
        let (next_in, entry_text) = if self.enabled {
            (
                self.next_in_seconds(),
                self.next_fill.as_ref().map(|p| p.seed.entry_text.clone()),
            )
        } else {
            (None, None)
        };
        LiveMessage::meta(json!({
            "status": self.status(),
            "next_in_seconds": next_in,
            "entry_text": entry_text,
        }))
    }
}

struct Shared {
    config: SchedulerConfig,
    catalog: LabCatalog,
    db: Arc<Database>,
    source: Arc<dyn JsonSource>,
    driver: Arc<dyn FillDriver>,
    sink: Arc<dyn LogSink>,
    automation: Mutex<AutomationState>,
    shutdown: Shutdown,
}

/// Proof that the caller owns the process-wide fill slot.
pub struct FillPermit {
    shared: Arc<Shared>,
}

impl Drop for FillPermit {
    fn drop(&mut self) {
        lock_automation(&self.shared).fill_active = false;
    }
}

fn lock_automation(shared: &Shared) -> MutexGuard<'_, AutomationState> {
    shared
        .automation
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn now_seed() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        catalog: LabCatalog,
        db: Arc<Database>,
        source: Arc<dyn JsonSource>,
        driver: Arc<dyn FillDriver>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let automation = AutomationState {
            fill_active: false,
            enabled: config.automation_enabled,
            paused_at: (!config.automation_enabled).then(Instant::now),
            total_paused: Duration::ZERO,
            interval: config.interval,
            next_fill: None,
        };
        Self {
            shared: Arc::new(Shared {
                config,
                catalog,
                db,
                source,
                driver,
                sink,
                automation: Mutex::new(automation),
                shutdown: Shutdown::default(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn catalog(&self) -> &LabCatalog {
        &self.shared.catalog
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.shared.db
    }

    fn emit(&self, message: LiveMessage) {
        self.shared.sink.emit(message);
    }

    fn automation(&self) -> MutexGuard<'_, AutomationState> {
        lock_automation(&self.shared)
    }

    // ---------------------------------------------------------------------
    // Fill guard
    // ---------------------------------------------------------------------

    /// Atomically claim the fill slot. Never blocks: returns `None` when a
    /// fill is already running.
    pub fn try_begin_fill(&self) -> Option<FillPermit> {
        let mut state = self.automation();
        if state.fill_active {
            return None;
        }
        state.fill_active = true;
        Some(FillPermit {
            shared: Arc::clone(&self.shared),
        })
    }

    pub fn is_fill_active(&self) -> bool {
        self.automation().fill_active
    }

    // ---------------------------------------------------------------------
    // Shared helpers
    // ---------------------------------------------------------------------

    /// Submission payload, then operator override, then persisted setting,
    /// then the built-in default.
    pub fn resolve_baseline_url(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .or_else(|| self.shared.config.baseline_override.clone())
            .or_else(|| self.shared.db.baseline_url())
            .unwrap_or_else(|| self.shared.config.default_baseline_url.clone())
    }

    /// Run the comparison engine for one target. Never holds the database
    /// lock across the network calls.
    pub fn compare_target(&self, baseline_url: &str, target_url: &str) -> ComparisonVerdict {
        compare_endpoints(
            self.shared.source.as_ref(),
            baseline_url,
            target_url,
            &self.shared.config.endpoints,
        )
    }

    fn compare_and_record(
        &self,
        lab: &str,
        target: &ComparisonTarget,
        baseline_url: &str,
    ) -> Result<bool, StoreError> {
        let verdict = self.compare_target(baseline_url, &target.url);
        self.shared
            .db
            .update_leaderboard(lab, &target.url, &target.name, Some(verdict.ok))?;
        debug!(lab, url = %target.url, ok = verdict.ok, "leaderboard updated");
        Ok(verdict.ok)
    }

    fn mark_invalid(&self, lab: &str, target: &ComparisonTarget) {
        if let Err(error) = self
            .shared
            .db
            .update_leaderboard(lab, &target.url, &target.name, Some(false))
        {
            warn!(lab, url = %target.url, %error, "failed to flag invalid target");
        }
        self.emit(LiveMessage::log(format!("[{}] invalid URL; skipped.", target.name)));
    }

    fn targets(&self, lab: &str) -> Vec<ComparisonTarget> {
        self.shared
            .db
            .list_submissions(Some(lab))
            .into_iter()
            .map(ComparisonTarget::from)
            .collect()
    }

    fn fill_step(&self, label: &str, url: &str, seed: &FillSeed) -> Result<(), FillError> {
        self.emit(LiveMessage::log(format!("[{label}] entry: {}", seed.entry_text)));
        let request = FillRequest::new(url, &self.shared.config.fill, seed);
        let sink = Arc::clone(&self.shared.sink);
        let mut log = |line: &str| sink.emit(LiveMessage::log(format!("[{label}] {line}")));
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.shared.driver.run_fill_session(&request, &mut log)
        }))
        .unwrap_or_else(|payload| {
            Err(FillError::Driver(format!(
                "driver panicked: {}",
                panic_message(payload.as_ref())
            )))
        })
    }

    // ---------------------------------------------------------------------
    // Duty 1: on-submission comparison
    // ---------------------------------------------------------------------

    pub fn submit(&self, request: SubmissionRequest) -> Result<SubmissionOutcome, SubmissionError> {
        let lab_id = normalize_lab_id(request.lab.as_deref().unwrap_or(DEFAULT_LAB_ID));
        let lab = self
            .shared
            .catalog
            .get(&lab_id)
            .cloned()
            .ok_or_else(|| SubmissionError::UnknownLab(lab_id.clone()))?;
        let name = request.name.trim();
        if name.is_empty() {
            return Err(SubmissionError::NameRequired);
        }
        let target_url = request.url.trim();
        if target_url.is_empty() {
            return Err(SubmissionError::UrlRequired);
        }
        if !is_valid_app_url(target_url) {
            return Err(SubmissionError::InvalidUrl(target_url.to_string()));
        }
        let baseline_url = self.resolve_baseline_url(request.baseline_url.as_deref());
        if lab.compare_enabled && !is_valid_app_url(&baseline_url) {
            return Err(SubmissionError::InvalidBaseline(baseline_url));
        }

        let db = &self.shared.db;
        db.upsert_submission(&lab.id, name, target_url)?;
        db.ensure_leaderboard_entry(&lab.id, target_url, name)?;
        info!(lab = %lab.id, name, url = target_url, "submission registered");

        if !lab.compare_enabled {
            return Ok(SubmissionOutcome::Registered(RegisteredSubmission {
                name: name.to_string(),
                target_url: target_url.to_string(),
                status: "registered",
                compare_enabled: false,
            }));
        }

        let started = Instant::now();
        let verdict = self.compare_target(&baseline_url, target_url);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        db.update_leaderboard(&lab.id, target_url, name, Some(verdict.ok))?;

        let fill_started = match self.try_begin_fill() {
            Some(permit) => {
                let job = FillJob::new(
                    baseline_url.clone(),
                    name,
                    target_url,
                    FillSeed::from_seed(now_seed()),
                );
                self.emit(LiveMessage::start(format!(
                    "New app detected. Filling {target_url}."
                )));
                self.spawn_fill_job(job, permit).is_some()
            }
            None => {
                debug!(url = target_url, "fill already running; no job started");
                false
            }
        };

        Ok(SubmissionOutcome::Compared(ComparedSubmission {
            name: name.to_string(),
            baseline_url,
            target_url: target_url.to_string(),
            status: if verdict.ok { "match" } else { "mismatch" },
            elapsed_ms,
            results: verdict.results,
            compare_enabled: true,
            fill_started,
        }))
    }

    /// Run `job` on a background thread that owns `permit`.
    pub fn spawn_fill_job(&self, job: FillJob, permit: FillPermit) -> Option<JoinHandle<()>> {
        let scheduler = self.clone();
        let spawned = thread::Builder::new()
            .name("labparity-fill-job".to_string())
            .spawn(move || {
                let _permit = permit;
                scheduler.run_fill_job(&job);
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(error) => {
                warn!(%error, "failed to spawn fill job");
                self.emit(LiveMessage::error(format!("Form filling failed: {error}")));
                None
            }
        }
    }

    /// Baseline first, then the submitted target. The caller holds the
    /// permit. Returns true when both steps succeeded.
    pub fn run_fill_job(&self, job: &FillJob) -> bool {
        debug!(job = %job.id, "fill job started");
        if let Err(error) = self.fill_step("baseline", &job.baseline_url, &job.seed) {
            self.emit(LiveMessage::error(format!(
                "Auto-fill failed for baseline ({}): {error}",
                job.baseline_url
            )));
            return false;
        }
        self.emit(LiveMessage::log(format!(
            "[baseline] fill completed for {}",
            job.baseline_url
        )));

        if let Err(error) = self.fill_step(&job.target_name, &job.target_url, &job.seed) {
            self.emit(LiveMessage::error(format!(
                "Auto-fill failed for target ({}): {error}",
                job.target_url
            )));
            return false;
        }
        self.emit(LiveMessage::log(format!(
            "[{}] fill completed for {}",
            job.target_name, job.target_url
        )));
        self.emit(LiveMessage::done("Form filling complete."));
        true
    }

    // ---------------------------------------------------------------------
    // Duty 2: periodic fill loop
    // ---------------------------------------------------------------------

    /// One automatic fill cycle against the automation lab.
    pub fn run_fill_cycle(&self) -> CycleOutcome {
        if !self.automation().enabled {
            return CycleOutcome::Disabled;
        }
        let baseline_url = self.resolve_baseline_url(None);
        if !is_valid_app_url(&baseline_url) {
            warn!(url = %baseline_url, "baseline URL invalid; fill cycle skipped");
            return CycleOutcome::InvalidBaseline(baseline_url);
        }
        let Some(_permit) = self.try_begin_fill() else {
            debug!("fill already running; cycle skipped");
            return CycleOutcome::Busy;
        };

        self.emit(LiveMessage::start("Auto-fill: baseline + student apps."));
        let (seed, meta) = {
            let mut state = self.automation();
            let seed = state
                .next_fill
                .take()
                .map(|plan| plan.seed)
                .unwrap_or_else(|| FillSeed::from_seed(now_seed()));
            (seed, state.fill_meta())
        };
        self.emit(meta);

        if let Err(error) = self.fill_step("baseline", &baseline_url, &seed) {
            self.emit(LiveMessage::error(format!(
                "Auto-fill failed for baseline ({baseline_url}): {error}"
            )));
            return CycleOutcome::BaselineFailed;
        }

        let lab = self.shared.config.automation_lab.clone();
        let mut report = CycleReport {
            seed: seed.seed,
            ..CycleReport::default()
        };
        for target in self.targets(&lab) {
            if !is_valid_app_url(&target.url) {
                self.mark_invalid(&lab, &target);
                report.skipped.push(target.url);
                continue;
            }
            self.emit(LiveMessage::log(format!(
                "[{}] filling {}",
                target.name, target.url
            )));
            if let Err(error) = self.fill_step(&target.name, &target.url, &seed) {
                self.emit(LiveMessage::error(format!(
                    "Auto-fill failed for {} ({}): {error}",
                    target.name, target.url
                )));
                report.failed.push(target.url);
                continue;
            }
            self.emit(LiveMessage::log(format!(
                "[{}] fill completed for {}",
                target.name, target.url
            )));
            if let Err(error) = self.compare_and_record(&lab, &target, &baseline_url) {
                warn!(url = %target.url, %error, "failed to record verdict");
                self.emit(LiveMessage::error(format!(
                    "Failed to record result for {} ({}): {error}",
                    target.name, target.url
                )));
            }
            report.filled.push(target.url);
        }
        self.emit(LiveMessage::done("Auto-fill cycle complete."));
        CycleOutcome::Completed(report)
    }

    fn random_wait(&self) -> Duration {
        let interval = self.automation().interval;
        let seconds = rand::rng().random_range(interval.min()..=interval.max());
        Duration::from_secs(seconds)
    }

    /// Pick the next cycle's wait and its `(seed, entry_text)`, then
    /// publish them. The seed is the planned fire time in unix seconds.
    pub fn plan_next_fill(&self) -> Duration {
        let wait = self.random_wait();
        let fire_at = Utc::now() + chrono::Duration::seconds(wait.as_secs() as i64);
        let seed = FillSeed::from_seed(u64::try_from(fire_at.timestamp()).unwrap_or_default());
        let meta = {
            let mut state = self.automation();
            state.next_fill = Some(PlannedFill {
                at: Instant::now() + wait,
                seed,
            });
            state.fill_meta()
        };
        self.emit(meta);
        wait
    }

    pub fn run_fill_loop(&self) {
        info!("fill loop started");
        loop {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_fill_cycle()))
                .unwrap_or_else(|payload| {
                    let reason = panic_message(payload.as_ref());
                    warn!(%reason, "fill cycle panicked");
                    self.emit(LiveMessage::error(format!("Auto-fill cycle aborted: {reason}")));
                    CycleOutcome::Aborted
                });
            let wait = match outcome {
                CycleOutcome::Disabled => {
                    let meta = {
                        let mut state = self.automation();
                        state.next_fill = None;
                        state.fill_meta()
                    };
                    self.emit(meta);
                    self.random_wait()
                }
                _ => self.plan_next_fill(),
            };
            if self.shared.shutdown.wait(wait) {
                break;
            }
        }
        info!("fill loop stopped");
    }

    // ---------------------------------------------------------------------
    // Duty 3: periodic compare loop
    // ---------------------------------------------------------------------

    /// Re-check every compare-lab target against the current baseline.
    /// Returns `None` when the baseline URL is invalid.
    pub fn run_compare_pass(&self) -> Option<ComparePassReport> {
        let baseline_url = self.resolve_baseline_url(None);
        if !is_valid_app_url(&baseline_url) {
            warn!(url = %baseline_url, "baseline URL invalid; compare pass skipped");
            return None;
        }
        let lab = self.shared.config.compare_lab.clone();
        let targets = self.targets(&lab);
        if !targets.is_empty() {
            self.emit(LiveMessage::log("Periodic check: validating submitted apps."));
        }

        let mut report = ComparePassReport::default();
        for target in targets {
            if !is_valid_app_url(&target.url) {
                self.mark_invalid(&lab, &target);
                report.skipped.push(target.url);
                continue;
            }
            match self.compare_and_record(&lab, &target, &baseline_url) {
                Ok(ok) => report.checked.push((target.url, ok)),
                Err(error) => warn!(url = %target.url, %error, "failed to record verdict"),
            }
        }
        Some(report)
    }

    pub fn run_compare_loop(&self) {
        let interval = self.shared.config.compare_interval;
        if interval.is_zero() {
            info!("compare loop disabled (interval 0)");
            return;
        }
        info!(interval_secs = interval.as_secs(), "compare loop started");
        loop {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.run_compare_pass())) {
                warn!(reason = %panic_message(payload.as_ref()), "compare pass panicked");
            }
            if self.shared.shutdown.wait(interval) {
                break;
            }
        }
        info!("compare loop stopped");
    }

    // ---------------------------------------------------------------------
    // Optional load loop
    // ---------------------------------------------------------------------

    pub fn run_load_loop(&self, runner: &LoadRunner) {
        let config = runner.config();
        info!(lab = %config.lab, steps = ?config.concurrency_steps, "load loop started");
        let round_pause = config.round_pause.max(Duration::from_secs(5));
        loop {
            let targets = self.targets(&config.lab);
            if !targets.is_empty() && !runner.run_round(&targets, &self.shared.shutdown) {
                break;
            }
            if self.shared.shutdown.wait(round_pause) {
                break;
            }
        }
        info!("load loop stopped");
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Start the background duties on their own threads.
    pub fn spawn_duties(&self) -> Result<Vec<JoinHandle<()>>, DutyError> {
        let mut handles = Vec::new();

        let scheduler = self.clone();
        handles.push(spawn_named("fill-loop", move || scheduler.run_fill_loop())?);

        if !self.shared.config.compare_interval.is_zero() {
            let scheduler = self.clone();
            handles.push(spawn_named("compare-loop", move || {
                scheduler.run_compare_loop()
            })?);
        }

        if self.shared.config.load.enabled {
            let runner = LoadRunner::new(self.shared.config.load.clone())
                .map_err(|e| DutyError::LoadClient(e.to_string()))?;
            let scheduler = self.clone();
            handles.push(spawn_named("load-loop", move || {
                scheduler.run_load_loop(&runner)
            })?);
        }
        Ok(handles)
    }

    /// Ask every duty to stop at its next sleep.
    pub fn shutdown(&self) {
        self.shared.shutdown.trigger();
    }

    // ---------------------------------------------------------------------
    // Admin controls
    // ---------------------------------------------------------------------

    pub fn automation_status(&self) -> AutomationStatus {
        self.automation().snapshot()
    }

    /// Flip automation between enabled and paused.
    pub fn toggle_automation(&self) -> AutomationStatus {
        let enabled = !self.automation().enabled;
        self.set_automation_enabled(enabled)
    }

    pub fn set_automation_enabled(&self, enabled: bool) -> AutomationStatus {
        let (note, meta, status) = {
            let mut state = self.automation();
            let note = if enabled == state.enabled {
                None
            } else if enabled {
                state.enabled = true;
                let paused_for = state.paused_at.take().map(|at| at.elapsed());
                paused_for.map(|paused_for| {
                    state.total_paused += paused_for;
                    format!(
                        "Automation resumed after {}s paused (total paused {}s).",
                        paused_for.as_secs(),
                        state.total_paused.as_secs()
                    )
                })
            } else {
                state.enabled = false;
                state.paused_at = Some(Instant::now());
                state.next_fill = None;
                Some(format!("Automation paused at {}.", Utc::now().to_rfc3339()))
            };
            (note, state.fill_meta(), state.snapshot())
        };
        self.emit(meta);
        if let Some(note) = note {
            info!(enabled, "{note}");
            self.emit(LiveMessage::log(note));
        }
        status
    }

    pub fn set_interval_bounds(&self, min: u64, max: u64) -> Result<IntervalBounds, IntervalError> {
        let bounds = IntervalBounds::new(min, max)?;
        self.automation().interval = bounds;
        info!(min, max, "automation interval updated");
        Ok(bounds)
    }
}

fn spawn_named(
    duty: &'static str,
    body: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>, DutyError> {
    thread::Builder::new()
        .name(format!("labparity-{duty}"))
        .spawn(body)
        .map_err(|source| DutyError::Spawn { duty, source })
}
