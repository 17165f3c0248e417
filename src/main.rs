use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use compendium::config::ConfigurationContext;
use compendium::observability::log_snapshot;
use compendium::pipeline::{PipelineExecutor, PipelineResult};
use compendium::process::SystemRunner;
use compendium::provision::Provisioner;
use compendium::report::publish;
use compendium::resolve::{EntryFilter, FileSet};
use compendium::validation::validate_config;
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = configure_tracing() {
        eprintln!("warning: {err:#}");
    }

    let outcome = match cli.command {
        Commands::Run {
            config,
            print_metrics,
            metrics_json,
            metrics_prom,
        } => run_pipeline(config.as_deref(), print_metrics, metrics_json, metrics_prom),
        Commands::Validate { config } => validate_cmd(config.as_deref()),
        Commands::Provision { config } => provision_cmd(config.as_deref()),
        Commands::Resolve {
            pattern,
            base,
            include_dirs,
        } => resolve_cmd(&pattern, &base, include_dirs),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))
}

fn load_config(path: Option<&Path>) -> Result<ConfigurationContext> {
    match path {
        Some(path) => ConfigurationContext::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => ConfigurationContext::from_env().context("Failed to read action inputs"),
    }
}

fn run_pipeline(
    config: Option<&Path>,
    print_metrics: bool,
    metrics_json: Option<PathBuf>,
    metrics_prom: Option<PathBuf>,
) -> Result<()> {
    let ctx = load_config(config)?;
    let runner = SystemRunner;
    let provisioner = Provisioner::from_config(&ctx)?;

    let mut executor = PipelineExecutor::new(&ctx, &runner, &provisioner);
    let result = executor.execute();
    publish(&result, ctx.output_file.as_deref())?;

    let snapshot = executor.metrics().snapshot();
    if print_metrics {
        log_snapshot(&snapshot);
    }
    if let Some(path) = metrics_json {
        ensure_parent(&path)?;
        let file = File::create(&path)
            .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
        to_writer_pretty(file, &snapshot)
            .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
        info!(metrics = %path.display(), "Metrics JSON written");
    }
    if let Some(path) = metrics_prom {
        ensure_parent(&path)?;
        fs::write(&path, snapshot.to_prometheus())
            .with_context(|| format!("Failed to write metrics: {}", path.display()))?;
        info!(metrics = %path.display(), "Prometheus metrics written");
    }

    if let PipelineResult::Failure { failed_in, error } = &result {
        return Err(anyhow!("Pipeline failed while {failed_in}: {error}"));
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create metrics directory: {}", parent.display())
        })?;
    }
    Ok(())
}

fn validate_cmd(config: Option<&Path>) -> Result<()> {
    let ctx = load_config(config)?;
    let report = validate_config(&ctx);

    for warning in &report.warnings {
        warn!("{warning}");
    }

    if report.is_ok() {
        info!(input = %ctx.input_dir.display(), "Configuration is valid");
        Ok(())
    } else {
        for error_msg in &report.errors {
            error!("{error_msg}");
        }
        Err(anyhow!(
            "Configuration validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

fn provision_cmd(config: Option<&Path>) -> Result<()> {
    let ctx = load_config(config)?;
    let runner = SystemRunner;
    let provisioner = Provisioner::from_config(&ctx)?;
    let tool = provisioner.ensure(&ctx.converter, &runner)?;
    provisioner.verify(&tool, &runner)?;
    println!("{}", tool.binary.display());
    Ok(())
}

fn resolve_cmd(pattern: &str, base: &Path, include_dirs: bool) -> Result<()> {
    let filter = if include_dirs {
        EntryFilter::FilesAndDirs
    } else {
        EntryFilter::Files
    };
    let set = FileSet::new(pattern, base, filter)?;
    for entry in set.iter()? {
        println!("{}", entry?.display());
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "compendium",
    version,
    about = "Convert a markdown tree to HTML and publish it as a static site"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the converter, convert documents, build the site and copy assets
    Run {
        /// YAML config file; defaults to GitHub Actions environment inputs
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        print_metrics: bool,
        #[arg(long = "metrics-json")]
        metrics_json: Option<PathBuf>,
        /// Write Prometheus text exposition of the run's metrics
        #[arg(long = "metrics-prom")]
        metrics_prom: Option<PathBuf>,
    },
    /// Check the configuration without running anything
    Validate {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Download (or reuse) the converter and print its path
    Provision {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List paths matched by a glob, relative to a base directory
    Resolve {
        pattern: String,
        #[arg(long, default_value = ".")]
        base: PathBuf,
        #[arg(long)]
        include_dirs: bool,
    },
}
