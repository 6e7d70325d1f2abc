use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "labparity",
    about = "Labparity: lab portal that checks student apps for API parity with a baseline",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the portal HTTP server and the background automation duties
    Serve {
        /// Path to the TOML config (default `labparity.toml`, optional when not given)
        #[arg(long)]
        config: Option<String>,

        /// Override `[server]` bind address and port (e.g. 127.0.0.1:8000)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Compare a target app's JSON endpoints against a baseline app
    Compare {
        /// Target app base URL
        #[arg(long)]
        target: String,

        /// Baseline app base URL (defaults to BASELINE_URL, then the built-in default)
        #[arg(long)]
        baseline: Option<String>,

        /// Comma-separated endpoint list (defaults to COMPARE_ENDPOINTS, then the built-in set)
        #[arg(long)]
        endpoints: Option<String>,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 20)]
        timeout_seconds: u64,

        /// Output the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one fill session through the configured form-filler program
    Fill {
        /// App URL to fill
        #[arg(long)]
        url: String,

        /// Form-filler program (defaults to FILL_PROGRAM, then `form-filler`)
        #[arg(long)]
        program: Option<String>,

        /// Which forms to submit: all or random
        #[arg(long, default_value = "all")]
        mode: String,

        /// Number of passes over the page
        #[arg(long, default_value_t = 1)]
        iterations: u32,

        /// Minimum wait between actions (seconds)
        #[arg(long, default_value_t = 1)]
        min_wait: u64,

        /// Maximum wait between actions (seconds)
        #[arg(long, default_value_t = 2)]
        max_wait: u64,

        /// Run the browser with a visible window
        #[arg(long)]
        headed: bool,

        /// Shared seed (defaults to the current unix time)
        #[arg(long)]
        seed: Option<u64>,

        /// Kill the session after this many seconds
        #[arg(long, default_value_t = 300)]
        timeout_seconds: u64,
    },
}
