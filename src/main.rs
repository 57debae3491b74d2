mod app;
mod config;
mod context;
mod dsl;
mod eval;
mod filter;
mod model;
mod sinks;
mod statement;
mod storage;

use anyhow::Result;
use clap::Parser;

use app::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let start = std::time::Instant::now();
    let written = app::run(&cli)?;

    let elapsed = start.elapsed();
    tracing::info!(
        "Done! Written {} elements in {:.3}s",
        written,
        elapsed.as_secs_f64()
    );

    Ok(())
}
