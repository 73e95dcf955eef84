mod app;
mod cli;
mod config;
mod db;
mod embed;
mod http;
mod paths;
mod progress;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.quiet);
    app::run(cli)
}

fn init_tracing(quiet: bool) {
    let default_filter = if quiet { "playmark=warn" } else { "playmark=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
