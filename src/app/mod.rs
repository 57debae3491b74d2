use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::config::{FixtureConfig, RuntimeConfig};
use crate::dsl::parse_filter;
use crate::filter::{FilterStatement, QueryContext};
use crate::sinks::{ElementSink, JsonlSink, write_set};
use crate::statement::Diagnostics;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Fixture file with sets and tags (YAML)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Filter statement, e.g. `.roads(if: t["lanes"] > 2)->.wide`, or a bare expression
    #[arg(short, long, env = "TAGSIEVE_FILTER")]
    pub filter: String,

    /// Input set (overrides the statement)
    #[arg(long)]
    pub from: Option<String>,

    /// Output set (overrides the statement)
    #[arg(long)]
    pub into: Option<String>,

    /// Output file for JSON lines, `-` for stdout
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,

    /// Prefetch full tag lists instead of only the keys the filter reads
    #[arg(long)]
    pub all_tags: bool,

    /// Fail when the filter has static errors
    #[arg(long)]
    pub strict: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            from: self.from.clone(),
            into: self.into.clone(),
            trim_tags: !self.all_tags,
        }
    }
}

pub fn init_sink(output: &Path) -> Result<Box<dyn ElementSink>> {
    if output == Path::new("-") {
        tracing::info!("Sink: jsonl -> stdout");
        Ok(Box::new(JsonlSink::stdout()))
    } else {
        tracing::info!("Sink: jsonl -> {:?}", output);
        Ok(Box::new(JsonlSink::new(output)?))
    }
}

pub fn build_statement(cli: &Cli, runtime: &RuntimeConfig) -> Result<FilterStatement> {
    let mut diagnostics = Diagnostics::new();
    let stmt = parse_filter(&cli.filter, &mut diagnostics)
        .map_err(|e| anyhow!("CLI: Failed to parse filter: {}", e))?;

    if cli.strict && !diagnostics.is_empty() {
        let messages: Vec<String> = diagnostics.errors().iter().map(|e| e.to_string()).collect();
        bail!("CLI: Filter has static errors: {}", messages.join("; "));
    }
    if stmt.criterion().is_none() {
        tracing::warn!("CLI: Filter has no criterion, the input set passes unchanged");
    }
    Ok(runtime.apply(stmt))
}

/// Loads the fixture, runs the filter and writes its output set.
/// Returns the number of elements written.
pub fn run(cli: &Cli) -> Result<usize> {
    let runtime = cli.runtime_config();
    let stmt = build_statement(cli, &runtime)?;

    let fixture = FixtureConfig::load(&cli.input)?;
    let (registry, source) = fixture.build()?;
    if !registry.contains_key(stmt.input()) {
        tracing::warn!("CLI: Input set '{}' is not in the fixture", stmt.input());
    }

    let mut query = QueryContext::new(registry, &source);
    stmt.execute(&mut query)
        .context("Pipeline: Failed to run filter")?;

    let output = query
        .sets
        .get(stmt.output())
        .with_context(|| format!("Pipeline: Output set '{}' missing", stmt.output()))?;
    if output.is_empty() {
        tracing::info!("Pipeline: Output set '{}' is empty", stmt.output());
    }

    let mut sink = init_sink(&cli.output)?;
    let written = write_set(stmt.output(), output, &source, sink.as_mut())?;
    sink.finish().context("Pipeline: Failed to finalize sink")?;
    Ok(written)
}
