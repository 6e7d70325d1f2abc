//! Optional load-generation duty: stepped concurrency bursts of plain GETs.

use crate::config::LoadConfig;
use crate::shutdown::Shutdown;
use crate::targets::{ComparisonTarget, is_valid_app_url};
use reqwest::blocking::Client;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadCounters {
    pub ok: u64,
    pub err: u64,
}

#[derive(Debug, Clone)]
pub struct LoadRunner {
    client: Client,
    config: LoadConfig,
}

impl LoadRunner {
    pub fn new(config: LoadConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Hammer `url` with `concurrency` workers until `duration` elapses.
    pub fn run_step(&self, url: &str, concurrency: usize, duration: Duration) -> LoadCounters {
        let end = Instant::now() + duration.max(Duration::from_secs(1));
        let ok = Arc::new(AtomicU64::new(0));
        let err = Arc::new(AtomicU64::new(0));

        thread::scope(|scope| {
            for _ in 0..concurrency.max(1) {
                let ok = Arc::clone(&ok);
                let err = Arc::clone(&err);
                scope.spawn(move || {
                    while Instant::now() < end {
                        let hit = self
                            .client
                            .get(url)
                            .send()
                            .and_then(|r| r.error_for_status())
                            .and_then(|response| {
                                let mut head = [0_u8; 64];
                                let _ = response.take(64).read(&mut head);
                                Ok(())
                            });
                        match hit {
                            Ok(()) => ok.fetch_add(1, Ordering::Relaxed),
                            Err(_) => err.fetch_add(1, Ordering::Relaxed),
                        };
                        thread::sleep(Duration::from_millis(10));
                    }
                });
            }
        });

        LoadCounters {
            ok: ok.load(Ordering::Relaxed),
            err: err.load(Ordering::Relaxed),
        }
    }

    /// One pass over `targets`. Returns false if shutdown was requested.
    pub fn run_round(&self, targets: &[ComparisonTarget], shutdown: &Shutdown) -> bool {
        for target in targets {
            if !is_valid_app_url(&target.url) {
                warn!(name = %target.name, url = %target.url, "load: invalid URL; skipped");
                continue;
            }
            for &concurrency in &self.config.concurrency_steps {
                if shutdown.is_triggered() {
                    return false;
                }
                info!(name = %target.name, url = %target.url, concurrency, "load step start");
                let counters = self.run_step(&target.url, concurrency, self.config.step_duration);
                info!(
                    name = %target.name,
                    url = %target.url,
                    concurrency,
                    ok = counters.ok,
                    err = counters.err,
                    "load step done"
                );
                if shutdown.wait(self.config.step_pause) {
                    return false;
                }
            }
        }
        true
    }
}
