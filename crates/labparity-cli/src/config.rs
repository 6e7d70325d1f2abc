//! `labparity.toml` loading plus environment overrides.
//!
//! Precedence is defaults, then the file, then the environment. Overrides
//! are read through a lookup closure so tests never touch process env.

use crate::support::parse_bool;
use labparity_compare::parse_endpoints;
use labparity_sched::{
    DEFAULT_BASELINE_URL, DEFAULT_FILL_TIMEOUT, FillMode, FillSettings, IntervalBounds,
    IntervalError, Lab, LabCatalog, LoadConfig, SchedulerConfig, UnknownFillMode,
    parse_concurrency_steps,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid interval: {0}")]
    Interval(#[from] IntervalError),

    #[error(transparent)]
    FillMode(#[from] UnknownFillMode),

    #[error("invalid bind address {0:?}")]
    Bind(String),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
    pub admin_token: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            admin_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub path: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: "labparity.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompareSection {
    /// Operator override; wins over the persisted admin setting.
    pub baseline_url: Option<String>,
    /// Empty means the built-in endpoint set.
    pub endpoints: Vec<String>,
    pub timeout_seconds: u64,
    /// Zero disables the periodic compare loop.
    pub interval_seconds: u64,
    pub lab: String,
}

impl Default for CompareSection {
    fn default() -> Self {
        Self {
            baseline_url: None,
            endpoints: Vec::new(),
            timeout_seconds: 20,
            interval_seconds: 150,
            lab: "lab1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutomationSection {
    pub enabled: bool,
    pub lab: String,
    pub interval_min_seconds: u64,
    pub interval_max_seconds: u64,
}

impl Default for AutomationSection {
    fn default() -> Self {
        Self {
            enabled: false,
            lab: "lab1".to_string(),
            interval_min_seconds: 10,
            interval_max_seconds: 75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FillSection {
    pub program: String,
    pub args: Vec<String>,
    pub mode: String,
    pub iterations: u32,
    pub min_wait_seconds: u64,
    pub max_wait_seconds: u64,
    pub headless: bool,
    pub timeout_seconds: u64,
}

impl Default for FillSection {
    fn default() -> Self {
        Self {
            program: "form-filler".to_string(),
            args: Vec::new(),
            mode: "all".to_string(),
            iterations: 1,
            min_wait_seconds: 1,
            max_wait_seconds: 2,
            headless: true,
            timeout_seconds: DEFAULT_FILL_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadSection {
    pub enabled: bool,
    pub lab: String,
    pub concurrency_steps: Vec<usize>,
    pub step_seconds: u64,
    pub step_pause_seconds: u64,
    pub round_pause_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for LoadSection {
    fn default() -> Self {
        let load = LoadConfig::default();
        Self {
            enabled: load.enabled,
            lab: load.lab,
            concurrency_steps: load.concurrency_steps,
            step_seconds: load.step_duration.as_secs(),
            step_pause_seconds: load.step_pause.as_secs(),
            round_pause_seconds: load.round_pause.as_secs(),
            request_timeout_seconds: load.request_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabSection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub compare_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerSection,
    pub store: StoreSection,
    pub compare: CompareSection,
    pub automation: AutomationSection,
    pub fill: FillSection,
    pub load: LoadSection,
    /// Empty means the built-in catalog.
    pub labs: Vec<LabSection>,
}

impl AppConfig {
    pub fn from_toml_str(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Load `path`. A missing file is only an error when `required`.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw, &display),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: display,
                source,
            }),
        }
    }

    /// Apply environment overrides. Blank values are ignored, and so are
    /// numbers or flags that fail to parse.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        override_parsed(&mut self.server.port, get("PORT"));
        if let Some(bind) = get("BIND") {
            self.server.bind = bind;
        }
        if let Some(path) = get("DB_PATH") {
            self.store.path = path;
        }
        if let Some(token) = get("ADMIN_TOKEN") {
            self.server.admin_token = Some(token);
        }

        if let Some(url) = get("BASELINE_URL") {
            self.compare.baseline_url = Some(url);
        }
        if let Some(raw) = get("COMPARE_ENDPOINTS") {
            self.compare.endpoints = parse_endpoints(Some(&raw));
        }
        override_parsed(&mut self.compare.timeout_seconds, get("COMPARE_TIMEOUT_SECONDS"));
        override_parsed(&mut self.compare.interval_seconds, get("COMPARE_INTERVAL_SECONDS"));

        override_parsed(
            &mut self.automation.interval_min_seconds,
            get("AUTO_INTERVAL_MIN_SECONDS"),
        );
        override_parsed(
            &mut self.automation.interval_max_seconds,
            get("AUTO_INTERVAL_MAX_SECONDS"),
        );
        if let Some(flag) = get("AUTOMATION_ENABLED").and_then(|v| parse_bool(&v)) {
            self.automation.enabled = flag;
        }

        override_parsed(&mut self.fill.iterations, get("FILL_ITERATIONS"));
        if let Some(mode) = get("FILL_MODE") {
            self.fill.mode = mode.to_ascii_lowercase();
        }
        if let Some(program) = get("FILL_PROGRAM") {
            self.fill.program = program;
        }
        override_parsed(&mut self.fill.timeout_seconds, get("FILL_TIMEOUT_SECONDS"));

        if let Some(flag) = get("LOAD_TEST_ENABLED").and_then(|v| parse_bool(&v)) {
            self.load.enabled = flag;
        }
        if let Some(lab) = get("LOAD_TEST_LAB_ID") {
            self.load.lab = lab;
        }
        if let Some(raw) = get("LOAD_CONCURRENCY_STEPS") {
            self.load.concurrency_steps = parse_concurrency_steps(&raw);
        }
        override_parsed(&mut self.load.step_seconds, get("LOAD_STEP_SECONDS"));
        override_parsed(&mut self.load.step_pause_seconds, get("LOAD_STEP_PAUSE_SECONDS"));
        override_parsed(&mut self.load.round_pause_seconds, get("LOAD_ROUND_PAUSE_SECONDS"));
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        IntervalBounds::new(
            self.automation.interval_min_seconds,
            self.automation.interval_max_seconds,
        )?;
        FillMode::from_str(&self.fill.mode)?;
        self.bind_addr()?;
        if self.fill.program.trim().is_empty() {
            return Err(ConfigError::Invalid("fill program must not be empty".to_string()));
        }
        if self.fill.min_wait_seconds > self.fill.max_wait_seconds {
            return Err(ConfigError::Invalid(format!(
                "fill min wait {}s exceeds max wait {}s",
                self.fill.min_wait_seconds, self.fill.max_wait_seconds
            )));
        }
        if self.compare.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "compare timeout must be at least 1 second".to_string(),
            ));
        }
        if let Some(lab) = self.labs.iter().find(|lab| lab.id.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "lab {:?} has an empty id",
                lab.title
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.server.bind.trim(), self.server.port);
        raw.parse().map_err(|_| ConfigError::Bind(raw))
    }

    pub fn admin_token(&self) -> Option<String> {
        self.server
            .admin_token
            .clone()
            .filter(|token| !token.trim().is_empty())
    }

    pub fn fill_timeout(&self) -> Duration {
        Duration::from_secs(self.fill.timeout_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.compare.timeout_seconds)
    }

    pub fn catalog(&self) -> LabCatalog {
        if self.labs.is_empty() {
            return LabCatalog::default();
        }
        LabCatalog::new(
            self.labs
                .iter()
                .map(|lab| Lab::new(&lab.id, &lab.title, lab.compare_enabled))
                .collect(),
        )
    }

    pub fn scheduler_config(&self) -> Result<SchedulerConfig, ConfigError> {
        let interval = IntervalBounds::new(
            self.automation.interval_min_seconds,
            self.automation.interval_max_seconds,
        )?;
        let mode = FillMode::from_str(&self.fill.mode)?;
        let endpoints = if self.compare.endpoints.is_empty() {
            parse_endpoints(None)
        } else {
            self.compare.endpoints.clone()
        };

        Ok(SchedulerConfig {
            automation_lab: self.automation.lab.trim().to_ascii_lowercase(),
            compare_lab: self.compare.lab.trim().to_ascii_lowercase(),
            endpoints,
            fetch_timeout: self.fetch_timeout(),
            automation_enabled: self.automation.enabled,
            interval,
            compare_interval: Duration::from_secs(self.compare.interval_seconds),
            fill: FillSettings {
                mode,
                iterations: self.fill.iterations.max(1),
                min_wait_seconds: self.fill.min_wait_seconds,
                max_wait_seconds: self.fill.max_wait_seconds,
                headless: self.fill.headless,
            },
            baseline_override: self
                .compare
                .baseline_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
            default_baseline_url: DEFAULT_BASELINE_URL.to_string(),
            load: LoadConfig {
                enabled: self.load.enabled,
                lab: self.load.lab.trim().to_ascii_lowercase(),
                concurrency_steps: if self.load.concurrency_steps.is_empty() {
                    vec![1]
                } else {
                    self.load.concurrency_steps.clone()
                },
                step_duration: Duration::from_secs(self.load.step_seconds),
                step_pause: Duration::from_secs(self.load.step_pause_seconds),
                round_pause: Duration::from_secs(self.load.round_pause_seconds),
                request_timeout: Duration::from_secs(self.load.request_timeout_seconds.max(1)),
            },
        })
    }
}

fn override_parsed<T: FromStr>(slot: &mut T, raw: Option<String>) {
    if let Some(value) = raw.and_then(|v| v.parse::<T>().ok()) {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_file_yields_deployment_defaults() {
        let config = AppConfig::from_toml_str("", "inline").expect("parse");
        config.validate().expect("valid");
        let scheduler = config.scheduler_config().expect("scheduler config");
        assert_eq!(scheduler, SchedulerConfig::default());
        assert_eq!(
            config.bind_addr().expect("bind").to_string(),
            "0.0.0.0:8000"
        );
        assert_eq!(config.catalog().labs().len(), 7);
    }

    #[test]
    fn file_sections_are_applied() {
        let raw = r#"
            [server]
            bind = "127.0.0.1"
            port = 9100

            [compare]
            baseline_url = "https://ref.example"
            endpoints = ["/api/a", "/api/b"]
            interval_seconds = 0

            [fill]
            mode = "random"
            iterations = 3

            [[labs]]
            id = "Lab9"
            title = "Lab 9"
            compare_enabled = true
        "#;
        let config = AppConfig::from_toml_str(raw, "inline").expect("parse");
        let scheduler = config.scheduler_config().expect("scheduler config");
        assert_eq!(scheduler.endpoints, vec!["/api/a", "/api/b"]);
        assert_eq!(scheduler.compare_interval, Duration::ZERO);
        assert_eq!(scheduler.fill.mode, FillMode::Random);
        assert_eq!(scheduler.fill.iterations, 3);
        assert_eq!(
            scheduler.baseline_override.as_deref(),
            Some("https://ref.example")
        );
        assert!(config.catalog().get("lab9").is_some());
        assert!(config.catalog().get("lab1").is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AppConfig::from_toml_str("[server]\nhost = \"x\"\n", "inline")
            .expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_win_and_junk_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env_of(&[
            ("PORT", "9000"),
            ("COMPARE_TIMEOUT_SECONDS", "soon"),
            ("AUTO_INTERVAL_MIN_SECONDS", "3"),
            ("AUTO_INTERVAL_MAX_SECONDS", "4"),
            ("AUTOMATION_ENABLED", "yes"),
            ("FILL_MODE", "RANDOM"),
            ("COMPARE_ENDPOINTS", "/api/x, ,api/y"),
            ("LOAD_CONCURRENCY_STEPS", "2,x,8"),
            ("ADMIN_TOKEN", "  "),
        ]));

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.compare.timeout_seconds, 20);
        assert!(config.automation.enabled);
        assert_eq!(config.fill.mode, "random");
        assert_eq!(config.compare.endpoints, vec!["/api/x", "api/y"]);
        assert_eq!(config.load.concurrency_steps, vec![2, 8]);
        assert_eq!(config.admin_token(), None);

        let scheduler = config.scheduler_config().expect("scheduler config");
        assert_eq!((scheduler.interval.min(), scheduler.interval.max()), (3, 4));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.automation.interval_min_seconds = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Interval(_))));

        let mut config = AppConfig::default();
        config.automation.interval_min_seconds = 80;
        assert!(matches!(config.validate(), Err(ConfigError::Interval(_))));

        let mut config = AppConfig::default();
        config.fill.mode = "some".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::FillMode(_))));

        let mut config = AppConfig::default();
        config.server.bind = "not an address".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Bind(_))));
    }

    #[test]
    fn missing_optional_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!(
            "labparity-missing-{}-config.toml",
            std::process::id()
        ));
        let config = AppConfig::load(&path, false).expect("defaults");
        assert_eq!(config, AppConfig::default());
        assert!(matches!(
            AppConfig::load(&path, true),
            Err(ConfigError::Read { .. })
        ));
    }
}
