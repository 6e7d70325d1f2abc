use crate::config::AppConfig;
use crate::support::exit_with;
use labparity_compare::HttpJsonSource;
use labparity_portal::{HttpServerConfig, Portal, ROUTES, serve_portal};
use labparity_sched::{Broadcaster, CommandFillDriver, Scheduler};
use labparity_store::Database;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "labparity.toml";

pub fn run(config_path: Option<String>, bind: Option<String>) {
    let required = config_path.is_some();
    let path = config_path.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let mut config =
        AppConfig::load(Path::new(&path), required).unwrap_or_else(|e| exit_with(e));
    config.apply_env(|name| std::env::var(name).ok());
    if let Some(bind) = bind {
        let Some((host, port)) = bind.rsplit_once(':') else {
            exit_with(format!("invalid --bind address `{bind}` (expected host:port)"));
        };
        config.server.bind = host.to_string();
        config.server.port = port
            .parse()
            .unwrap_or_else(|e| exit_with(format!("invalid --bind port `{port}`: {e}")));
    }
    if let Err(e) = config.validate() {
        exit_with(format!("invalid configuration: {e}"));
    }

    let bind_addr = config.bind_addr().unwrap_or_else(|e| exit_with(e));
    let scheduler_config = config.scheduler_config().unwrap_or_else(|e| exit_with(e));
    let db = Database::open(&config.store.path)
        .unwrap_or_else(|e| exit_with(format!("failed to open store {}: {e}", config.store.path)));
    let source = HttpJsonSource::new(config.fetch_timeout()).unwrap_or_else(|e| exit_with(e));
    let driver = CommandFillDriver::new(&config.fill.program)
        .with_base_args(config.fill.args.clone())
        .with_timeout(config.fill_timeout());
    let events = Arc::new(Broadcaster::default());

    let scheduler = Scheduler::new(
        scheduler_config,
        config.catalog(),
        Arc::new(db),
        Arc::new(source),
        Arc::new(driver),
        events.clone(),
    );
    let duties = scheduler
        .spawn_duties()
        .unwrap_or_else(|e| exit_with(format!("failed to start duties: {e}")));
    info!(duties = duties.len(), "background duties started");

    let portal = Portal::new(scheduler.clone(), events, config.admin_token());

    println!("labparity serve");
    println!("  bind: {bind_addr}");
    println!("  store: {}", config.store.path);
    println!("  baseline: {}", scheduler.resolve_baseline_url(None));
    println!("  automation: {}", if config.automation.enabled { "enabled" } else { "paused" });
    println!(
        "  admin: {}",
        if config.admin_token().is_some() { "token required" } else { "disabled" }
    );
    println!("  routes:");
    for route in ROUTES {
        println!("    {route}");
    }

    let result = serve_portal(HttpServerConfig { bind: bind_addr }, Arc::new(portal));
    scheduler.shutdown();
    if let Err(e) = result {
        exit_with(format!("portal server failed: {e}"));
    }
}
