//! Command-line front end: argument parsing and the top-level run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{Executor, ExecutorOptions, RetryPolicy, RunReport, Scheduler, TaskGraph, definition};

/// Command-line arguments for `parago`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "parago",
    version,
    about = "Run inter-dependent shell commands in parallel.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task definition file (YAML).
    #[arg(short, long, value_name = "PATH", default_value = "parago.yaml")]
    pub file: PathBuf,

    /// Maximum number of commands running at once.
    ///
    /// Defaults to the number of available CPUs.
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Attempts per task before it counts as failed.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub retries: u32,

    /// Shell used to run each command.
    #[arg(long, value_name = "SHELL", default_value = "sh")]
    pub shell: String,

    /// Validate and print the execution plan without running anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PARAGO_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliArgs {
    pub fn executor_options(&self) -> ExecutorOptions {
        let defaults = ExecutorOptions::default();
        ExecutorOptions {
            jobs: self.jobs.unwrap_or(defaults.jobs),
            shell: self.shell.clone(),
            retry: (self.retries > 1).then(|| RetryPolicy::attempts(self.retries)),
        }
    }
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Load, validate and either print or execute the definitions named by
/// `args`. Fails if any task failed or was skipped.
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let records = definition::load_from_path(&args.file)
        .with_context(|| format!("failed to load {}", args.file.display()))?;
    let graph = TaskGraph::build(&records)?.validate()?;

    if args.dry_run {
        print_plan(&graph.levels());
        return Ok(());
    }

    let scheduler = Arc::new(Scheduler::new(graph));
    let executor = Executor::with_shell(scheduler, args.executor_options());

    let ctx = CancellationToken::new();
    let on_signal = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling run");
            on_signal.cancel();
        }
    });

    let report = executor.execute(ctx).await?;
    print_report(&report, args.json)?;

    if !report.is_success() {
        bail!(
            "{} task(s) failed, {} skipped",
            report.failed.len(),
            report.skipped.len()
        );
    }

    info!(tasks = report.succeeded.len(), "all tasks succeeded");
    Ok(())
}

fn print_plan(levels: &[Vec<String>]) {
    for (i, level) in levels.iter().enumerate() {
        println!("{}. {}", i + 1, level.join(", "));
    }
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for id in &report.execution_order {
        if let Some(output) = report.outputs.get(id) {
            print!("{}", output.stdout);
        }
    }
    for failure in &report.failed {
        eprintln!("failed: {} ({})", failure.id, failure.error);
        if let Some(output) = report.outputs.get(&failure.id) {
            eprint!("{}", output.stderr);
        }
    }
    for id in &report.skipped {
        eprintln!("skipped: {id}");
    }
    Ok(())
}
