//! Labparity CLI: the `labparity` command.

mod cli;
mod commands;
mod config;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    support::init_tracing();

    match cli.command {
        Commands::Serve { config, bind } => commands::serve::run(config, bind),

        Commands::Compare {
            target,
            baseline,
            endpoints,
            timeout_seconds,
            json,
        } => commands::compare::run(commands::compare::Args {
            target,
            baseline,
            endpoints,
            timeout_seconds,
            json,
        }),

        Commands::Fill {
            url,
            program,
            mode,
            iterations,
            min_wait,
            max_wait,
            headed,
            seed,
            timeout_seconds,
        } => commands::fill::run(commands::fill::Args {
            url,
            program,
            mode,
            iterations,
            min_wait,
            max_wait,
            headless: !headed,
            seed,
            timeout_seconds,
        }),
    }
}
