use crate::support::exit_with;
use labparity_sched::{
    CommandFillDriver, FillDriver, FillMode, FillRequest, FillSeed, FillSettings,
    is_valid_app_url,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const DEFAULT_FILL_PROGRAM: &str = "form-filler";

pub struct Args {
    pub url: String,
    pub program: Option<String>,
    pub mode: String,
    pub iterations: u32,
    pub min_wait: u64,
    pub max_wait: u64,
    pub headless: bool,
    pub seed: Option<u64>,
    pub timeout_seconds: u64,
}

pub fn run(args: Args) {
    if !is_valid_app_url(&args.url) {
        exit_with(format!("invalid --url `{}` (expected http or https)", args.url));
    }
    let mode = FillMode::from_str(&args.mode).unwrap_or_else(|e| exit_with(e));
    if args.min_wait > args.max_wait {
        exit_with(format!(
            "--min-wait {} exceeds --max-wait {}",
            args.min_wait, args.max_wait
        ));
    }

    let program = args
        .program
        .or_else(|| std::env::var("FILL_PROGRAM").ok())
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILL_PROGRAM.to_string());
    let settings = FillSettings {
        mode,
        iterations: args.iterations.max(1),
        min_wait_seconds: args.min_wait,
        max_wait_seconds: args.max_wait,
        headless: args.headless,
    };
    let seed = FillSeed::from_seed(
        args.seed
            .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64),
    );
    let request = FillRequest::new(args.url.trim(), &settings, &seed);
    let driver =
        CommandFillDriver::new(&program).with_timeout(Duration::from_secs(args.timeout_seconds));

    println!("fill {} (seed {}, mode {})", request.url, seed.seed, settings.mode);
    println!("  entry: {}", seed.entry_text);
    info!(program = %program, url = %request.url, seed = seed.seed, "fill session starting");

    let result = driver.run_fill_session(&request, &mut |line| println!("  | {line}"));
    match result {
        Ok(()) => println!("fill done"),
        Err(e) => exit_with(e),
    }
}
