//! Fill-Session Driver contract and a process-backed implementation.
//!
//! A fill session visits one URL and submits whatever forms it finds. The
//! scheduler only depends on [`FillDriver`]; [`CommandFillDriver`] runs an
//! external form-filler program and streams its output back as log lines.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_FILL_TIMEOUT: Duration = Duration::from_secs(300);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Local journal sentences used as synthetic entry text.
pub const ENTRY_CORPUS: [&str; 7] = [
    "A short walk outside helped clear my head today.",
    "I finished a tough task and felt relieved afterward.",
    "I paused for a deep breath and noticed the sunlight.",
    "A kind message from a friend lifted my mood.",
    "I cooked something simple and felt grounded.",
    "I focused for 25 minutes and made good progress.",
    "I listened to music and felt more present.",
];

#[derive(Debug, thiserror::Error)]
pub enum FillError {
    #[error("failed to start fill program {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("fill session for {url} timed out after {seconds}s")]
    TimedOut { url: String, seconds: u64 },

    #[error("fill program exited with {status} for {url}")]
    Exited { url: String, status: String },

    #[error("fill driver failed: {0}")]
    Driver(String),
}

#[derive(Debug, thiserror::Error)]
#[error("unknown fill mode `{0}` (expected `all` or `random`)")]
pub struct UnknownFillMode(pub String);

/// Which forms a session submits on each page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    #[default]
    All,
    Random,
}

impl FillMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for FillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FillMode {
    type Err = UnknownFillMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "random" => Ok(Self::Random),
            other => Err(UnknownFillMode(other.to_string())),
        }
    }
}

/// Session knobs shared by every fill the scheduler starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillSettings {
    pub mode: FillMode,
    pub iterations: u32,
    pub min_wait_seconds: u64,
    pub max_wait_seconds: u64,
    pub headless: bool,
}

impl Default for FillSettings {
    fn default() -> Self {
        Self {
            mode: FillMode::All,
            iterations: 1,
            min_wait_seconds: 1,
            max_wait_seconds: 2,
            headless: true,
        }
    }
}

/// One `(seed, entry_text)` pair. Generated once per job or cycle and
/// reused for the baseline and every target in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillSeed {
    pub seed: u64,
    pub entry_text: String,
}

impl FillSeed {
    /// Same seed, same text.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            entry_text: entry_text_for_seed(seed).to_string(),
        }
    }
}

pub fn entry_text_for_seed(seed: u64) -> &'static str {
    let mut rng = StdRng::seed_from_u64(seed);
    ENTRY_CORPUS[rng.random_range(0..ENTRY_CORPUS.len())]
}

/// Everything one `run_fill_session` call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillRequest {
    pub url: String,
    pub settings: FillSettings,
    pub seed: FillSeed,
}

impl FillRequest {
    pub fn new(url: impl Into<String>, settings: &FillSettings, seed: &FillSeed) -> Self {
        Self {
            url: url.into(),
            settings: settings.clone(),
            seed: seed.clone(),
        }
    }

    /// Command-line form understood by the form-filler program.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--url".to_string(),
            self.url.clone(),
            "--mode".to_string(),
            self.settings.mode.to_string(),
            "--iterations".to_string(),
            self.settings.iterations.to_string(),
            "--min-wait".to_string(),
            self.settings.min_wait_seconds.to_string(),
            "--max-wait".to_string(),
            self.settings.max_wait_seconds.to_string(),
        ];
        if self.settings.headless {
            args.push("--headless".to_string());
        }
        args.extend([
            "--seed".to_string(),
            self.seed.seed.to_string(),
            "--entry-text".to_string(),
            self.seed.entry_text.clone(),
        ]);
        args
    }
}

/// A baseline-then-target fill started by a new submission. Ephemeral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillJob {
    pub id: Uuid,
    pub baseline_url: String,
    pub target_name: String,
    pub target_url: String,
    pub seed: FillSeed,
}

impl FillJob {
    pub fn new(
        baseline_url: impl Into<String>,
        target_name: impl Into<String>,
        target_url: impl Into<String>,
        seed: FillSeed,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            baseline_url: baseline_url.into(),
            target_name: target_name.into(),
            target_url: target_url.into(),
            seed,
        }
    }
}

/// Visit a URL, populate and submit forms, report progress lines.
///
/// Blocks until the session completes or fails.
pub trait FillDriver: Send + Sync {
    fn run_fill_session(
        &self,
        request: &FillRequest,
        log: &mut dyn FnMut(&str),
    ) -> Result<(), FillError>;
}

/// Runs an external form-filler once per session.
#[derive(Debug, Clone)]
pub struct CommandFillDriver {
    program: PathBuf,
    base_args: Vec<String>,
    timeout: Duration,
}

impl CommandFillDriver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            timeout: DEFAULT_FILL_TIMEOUT,
        }
    }

    /// Arguments placed before the per-session flags (e.g. a script path
    /// when `program` is an interpreter).
    pub fn with_base_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.base_args = args.into_iter().collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self, request: &FillRequest) -> Result<Child, FillError> {
        Command::new(&self.program)
            .args(&self.base_args)
            .args(request.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FillError::Spawn {
                program: self.program.display().to_string(),
                message: e.to_string(),
            })
    }
}

impl CommandFillDriver {
    fn kill_timed_out(&self, child: &mut Child, request: &FillRequest) -> FillError {
        warn!(url = %request.url, "fill program timed out; killing");
        let _ = child.kill();
        let _ = child.wait();
        FillError::TimedOut {
            url: request.url.clone(),
            seconds: self.timeout.as_secs(),
        }
    }
}

fn forward_lines(stream: impl Read + Send + 'static, tx: mpsc::Sender<String>) {
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

impl FillDriver for CommandFillDriver {
    fn run_fill_session(
        &self,
        request: &FillRequest,
        log: &mut dyn FnMut(&str),
    ) -> Result<(), FillError> {
        let mut child = self.spawn(request)?;
        debug!(url = %request.url, pid = child.id(), "fill program started");

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx);
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(line) => {
                    let line = line.trim_end();
                    if !line.is_empty() {
                        log(line);
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(self.kill_timed_out(&mut child, request));
                }
            }
        }

        // Output closed; the child may still be running.
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    return Err(self.kill_timed_out(&mut child, request));
                }
                Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
                Err(e) => return Err(FillError::Driver(e.to_string())),
            }
        };
        if status.success() {
            Ok(())
        } else {
            Err(FillError::Exited {
                url: request.url.clone(),
                status: status.to_string(),
            })
        }
    }
}
