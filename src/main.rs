mod api;
mod application;
mod cli;
mod config;
mod data;
mod domain;
mod infra;
#[cfg(feature = "ml")]
mod ml;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("summarize_ai=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    cli.run()
}
