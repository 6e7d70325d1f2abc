//! Scheduler configuration.

use crate::fill::FillSettings;
use crate::labs::DEFAULT_LAB_ID;
use labparity_compare::{DEFAULT_FETCH_TIMEOUT, parse_endpoints};
use std::time::Duration;

/// Baseline used when nothing else is configured or persisted.
pub const DEFAULT_BASELINE_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IntervalError {
    #[error("minimum interval must be at least 1 second (got {0})")]
    MinTooSmall(u64),

    #[error("minimum interval {min}s exceeds maximum {max}s")]
    MinAboveMax { min: u64, max: u64 },
}

/// Randomized wait between automatic fill cycles, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalBounds {
    min: u64,
    max: u64,
}

impl IntervalBounds {
    pub fn new(min: u64, max: u64) -> Result<Self, IntervalError> {
        if min < 1 {
            return Err(IntervalError::MinTooSmall(min));
        }
        if min > max {
            return Err(IntervalError::MinAboveMax { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }
}

impl Default for IntervalBounds {
    fn default() -> Self {
        Self { min: 10, max: 75 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    pub enabled: bool,
    pub lab: String,
    pub concurrency_steps: Vec<usize>,
    pub step_duration: Duration,
    pub step_pause: Duration,
    pub round_pause: Duration,
    pub request_timeout: Duration,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lab: "lab4".to_string(),
            concurrency_steps: vec![1, 5, 10, 25],
            step_duration: Duration::from_secs(60),
            step_pause: Duration::from_secs(5),
            round_pause: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Parse comma-separated positive concurrency steps; junk entries are
/// ignored and an empty result means `[1]`.
pub fn parse_concurrency_steps(raw: &str) -> Vec<usize> {
    let steps: Vec<usize> = raw
        .split(',')
        .filter_map(|item| item.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .collect();
    if steps.is_empty() { vec![1] } else { steps }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Lab whose targets the periodic fill loop drives.
    pub automation_lab: String,
    /// Lab whose targets the periodic compare loop re-checks.
    pub compare_lab: String,
    pub endpoints: Vec<String>,
    pub fetch_timeout: Duration,
    pub automation_enabled: bool,
    pub interval: IntervalBounds,
    /// Zero disables the periodic compare loop.
    pub compare_interval: Duration,
    pub fill: FillSettings,
    /// Operator override that wins over the persisted setting.
    pub baseline_override: Option<String>,
    pub default_baseline_url: String,
    pub load: LoadConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            automation_lab: DEFAULT_LAB_ID.to_string(),
            compare_lab: DEFAULT_LAB_ID.to_string(),
            endpoints: parse_endpoints(None),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            automation_enabled: false,
            interval: IntervalBounds::default(),
            compare_interval: Duration::from_secs(150),
            fill: FillSettings::default(),
            baseline_override: None,
            default_baseline_url: DEFAULT_BASELINE_URL.to_string(),
            load: LoadConfig::default(),
        }
    }
}
