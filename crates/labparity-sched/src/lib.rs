//! # labparity-sched
//!
//! Automation scheduler for the lab portal.
//!
//! This crate provides:
//! - `Scheduler` (fill guard, on-submission duty, periodic fill and compare
//!   loops, admin automation controls)
//! - `FillDriver` contract plus `CommandFillDriver` (external form filler)
//! - `LogSink` / `Broadcaster` (live event fan-out with bounded history)
//! - `LabCatalog`, `SchedulerConfig`, and the optional load loop
//!
//! ## Flow
//!
//! ```text
//! submission / timer tick
//!     → compare_endpoints(baseline, target)   (labparity-compare)
//!     → Database::update_leaderboard           (labparity-store)
//!     → FillPermit? → FillDriver (baseline, then targets)
//!     → LogSink events (fill_start / fill_log / fill_error / fill_done / fill_meta)
//! ```

pub mod config;
pub mod fill;
pub mod labs;
pub mod load;
pub mod scheduler;
pub mod shutdown;
pub mod sink;
pub mod targets;

pub use config::{
    DEFAULT_BASELINE_URL, IntervalBounds, IntervalError, LoadConfig, SchedulerConfig,
    parse_concurrency_steps,
};
pub use fill::{
    CommandFillDriver, DEFAULT_FILL_TIMEOUT, ENTRY_CORPUS, FillDriver, FillError, FillJob,
    FillMode, FillRequest, FillSeed, FillSettings, UnknownFillMode, entry_text_for_seed,
};
pub use labs::{DEFAULT_LAB_ID, Lab, LabCatalog, normalize_lab_id};
pub use load::{LoadCounters, LoadRunner};
pub use scheduler::{
    AutomationStatus, ComparePassReport, ComparedSubmission, CycleOutcome, CycleReport,
    DutyError, FillPermit, RegisteredSubmission, Scheduler, SubmissionError, SubmissionOutcome,
    SubmissionRequest,
};
pub use shutdown::Shutdown;
pub use sink::{Broadcaster, LiveEvent, LiveEventKind, LiveMessage, LogSink};
pub use targets::{ComparisonTarget, is_valid_app_url};
