use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::ConfigurationContext;
use crate::error::{PipelineError, Result};
use crate::observability::MetricsCollector;
use crate::process::ProcessRunner;
use crate::provision::Provisioner;
use crate::resolve::{EntryFilter, FileSet, resolve};
use crate::stages::{ConversionStage, SiteBuildStage, apply_overlay, archive_site, sync_all};
use crate::validation::validate_config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Provisioning,
    Converting,
    Building,
    Syncing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::Provisioning => "provisioning",
            PipelineState::Converting => "converting",
            PipelineState::Building => "building",
            PipelineState::Syncing => "syncing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum PipelineResult {
    Success {
        site_path: PathBuf,
    },
    Failure {
        /// State the pipeline was in when the error occurred.
        failed_in: PipelineState,
        error: PipelineError,
    },
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success { .. })
    }

    pub fn site_path(&self) -> Option<&Path> {
        match self {
            PipelineResult::Success { site_path } => Some(site_path),
            PipelineResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            PipelineResult::Success { .. } => None,
            PipelineResult::Failure { error, .. } => Some(error),
        }
    }
}

pub struct PipelineExecutor<'a> {
    ctx: &'a ConfigurationContext,
    runner: &'a dyn ProcessRunner,
    provisioner: &'a Provisioner,
    state: PipelineState,
    metrics: MetricsCollector,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(
        ctx: &'a ConfigurationContext,
        runner: &'a dyn ProcessRunner,
        provisioner: &'a Provisioner,
    ) -> Self {
        Self {
            ctx,
            runner,
            provisioner,
            state: PipelineState::Init,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    #[instrument(skip(self), fields(input = %self.ctx.input_dir.display()))]
    pub fn execute(&mut self) -> PipelineResult {
        self.state = PipelineState::Init;
        self.metrics.reset();
        let started = Instant::now();

        let result = match self.run_stages() {
            Ok(site_path) => {
                self.advance(PipelineState::Done);
                info!(site = %site_path.display(), "Pipeline completed");
                PipelineResult::Success { site_path }
            }
            Err(err) => {
                let failed_in = self.state;
                self.advance(PipelineState::Failed);
                error!(state = %failed_in, "Pipeline failed: {err}");
                PipelineResult::Failure {
                    failed_in,
                    error: err,
                }
            }
        };

        self.metrics.record_total_duration(started.elapsed());
        result
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            next > self.state || next == PipelineState::Failed,
            "pipeline moved backwards from {} to {}",
            self.state,
            next
        );
        info!(from = %self.state, to = %next, "Pipeline state transition");
        self.state = next;
    }

    fn run_stages(&mut self) -> Result<PathBuf> {
        let ctx = self.ctx;

        let report = validate_config(ctx);
        for warning in &report.warnings {
            warn!("{warning}");
        }
        if !report.is_ok() {
            return Err(PipelineError::Config(report.errors.join("; ")));
        }

        self.advance(PipelineState::Provisioning);
        let tool = {
            let _timer = self.metrics.start_stage(PipelineState::Provisioning.as_str());
            let tool = self.provisioner.ensure(&ctx.converter, self.runner)?;
            self.metrics.record_cache_lookup(tool.cache_hit);
            self.provisioner.verify(&tool, self.runner)?;
            tool
        };

        self.advance(PipelineState::Converting);
        {
            let _timer = self.metrics.start_stage(PipelineState::Converting.as_str());
            let sources = resolve(&ctx.input_glob, &ctx.input_dir)?;
            fs::create_dir_all(&ctx.site_dir).map_err(|err| {
                PipelineError::io(format!("Failed to create {}", ctx.site_dir.display()), err)
            })?;
            let converted = ConversionStage::new(self.runner, &tool.binary, &ctx.template)
                .convert_all(sources.iter()?, &ctx.input_dir, &ctx.site_dir)?;
            self.metrics.record_converted(converted);
            info!(converted, "Conversion finished");
        }

        self.advance(PipelineState::Building);
        let site_output = {
            let _timer = self.metrics.start_stage(PipelineState::Building.as_str());
            if let Some(overlay) = &ctx.site_overlay {
                apply_overlay(overlay, &ctx.site_dir)?;
            }
            let mut stage = SiteBuildStage::new(self.runner, &ctx.generator, &ctx.site_output);
            if !ctx.clean {
                stage = stage.keep_stale_output();
            }
            stage.build(&ctx.site_dir)?
        };

        self.advance(PipelineState::Syncing);
        {
            let _timer = self.metrics.start_stage(PipelineState::Syncing.as_str());
            if let Some(glob) = &ctx.copy_glob {
                let assets = FileSet::new(glob, &ctx.input_dir, EntryFilter::FilesAndDirs)?;
                let report = sync_all(assets.iter()?, &ctx.input_dir, &site_output)?;
                self.metrics.record_copied(report.copied);
                info!(copied = report.copied, skipped = report.skipped, "Assets synced");
            }
            // The archive sits beside the output so it never contains itself.
            if let Some(name) = &ctx.site_archive {
                archive_site(&site_output, &ctx.site_dir.join(name))?;
            }
        }

        fs::canonicalize(&site_output).map_err(|err| {
            PipelineError::io(format!("Failed to resolve {}", site_output.display()), err)
        })
    }
}
