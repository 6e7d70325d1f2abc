use crate::support::exit_with;
use labparity_compare::{
    ComparisonVerdict, EndpointOutcome, EndpointResult, HttpJsonSource, PayloadDiff,
    compare_endpoints, parse_endpoints,
};
use labparity_sched::DEFAULT_BASELINE_URL;
use std::process;
use std::time::Duration;
use tracing::info;

pub struct Args {
    pub target: String,
    pub baseline: Option<String>,
    pub endpoints: Option<String>,
    pub timeout_seconds: u64,
    pub json: bool,
}

pub fn run(args: Args) {
    let baseline = args
        .baseline
        .or_else(|| std::env::var("BASELINE_URL").ok())
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BASELINE_URL.to_string());
    let endpoints = parse_endpoints(
        args.endpoints
            .or_else(|| std::env::var("COMPARE_ENDPOINTS").ok())
            .as_deref(),
    );
    let source = HttpJsonSource::new(Duration::from_secs(args.timeout_seconds.max(1)))
        .unwrap_or_else(|e| exit_with(e));

    let verdict = compare_endpoints(&source, &baseline, &args.target, &endpoints);
    info!(
        baseline = %baseline,
        target_url = %args.target,
        ok = verdict.ok,
        "comparison finished"
    );

    if args.json {
        match serde_json::to_string_pretty(&verdict) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => exit_with(format!("failed to render verdict: {e}")),
        }
    } else {
        for line in render_lines(&verdict) {
            println!("{line}");
        }
    }

    process::exit(if verdict.ok { 0 } else { 2 });
}

pub fn render_lines(verdict: &ComparisonVerdict) -> Vec<String> {
    let mut lines: Vec<String> = verdict.results.iter().map(render_result).collect();
    lines.push(if verdict.ok {
        "parity: ok".to_string()
    } else {
        format!(
            "parity: failed ({} of {} endpoints differ)",
            verdict.mismatched().count(),
            verdict.results.len()
        )
    });
    lines
}

fn render_result(result: &EndpointResult) -> String {
    let path = &result.endpoint;
    match &result.outcome {
        EndpointOutcome::Match => format!("[{path}] match"),
        EndpointOutcome::Error {
            baseline_error,
            target_error,
        } => format!(
            "[{path}] error baseline={} target={}",
            baseline_error.as_deref().unwrap_or("ok"),
            target_error.as_deref().unwrap_or("ok")
        ),
        EndpointOutcome::Mismatch(PayloadDiff::Rows { missing, extra }) => format!(
            "[{path}] mismatch rows missing={} extra={}",
            missing.len(),
            extra.len()
        ),
        EndpointOutcome::Mismatch(PayloadDiff::Value { .. }) => {
            format!("[{path}] mismatch payloads")
        }
    }
}
