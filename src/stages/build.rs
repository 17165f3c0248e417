use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::process::ProcessRunner;
use crate::stages::sync::copy_recursive;

pub struct SiteBuildStage<'a> {
    runner: &'a dyn ProcessRunner,
    generator: &'a str,
    output_name: &'a str,
    clean: bool,
}

impl<'a> SiteBuildStage<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, generator: &'a str, output_name: &'a str) -> Self {
        Self {
            runner,
            generator,
            output_name,
            clean: true,
        }
    }

    /// Keep a previous build's output in place instead of removing it first.
    pub fn keep_stale_output(mut self) -> Self {
        self.clean = false;
        self
    }

    pub fn build(&self, site_dir: &Path) -> Result<PathBuf> {
        let output = site_dir.join(self.output_name);
        if self.clean && output.exists() {
            debug!(path = %output.display(), "Removing stale site output");
            fs::remove_dir_all(&output).map_err(|err| {
                PipelineError::io(format!("Failed to remove {}", output.display()), err)
            })?;
        }

        info!(generator = self.generator, cwd = %site_dir.display(), "Building site");
        let exit_code = self
            .runner
            .run(OsStr::new(self.generator), &[], Some(site_dir))?;
        if exit_code != 0 {
            return Err(PipelineError::BuildFailed { exit_code });
        }
        if !output.is_dir() {
            return Err(PipelineError::BuildIncomplete { expected: output });
        }
        Ok(output)
    }
}

/// Merge the contents of `overlay_dir` into `site_dir`, overwriting clashes.
pub fn apply_overlay(overlay_dir: &Path, site_dir: &Path) -> Result<usize> {
    let entries = fs::read_dir(overlay_dir).map_err(|err| {
        PipelineError::io(format!("Failed to read overlay {}", overlay_dir.display()), err)
    })?;

    let mut merged = 0;
    for entry in entries {
        let entry = entry.map_err(|err| {
            PipelineError::io(format!("Failed to read overlay {}", overlay_dir.display()), err)
        })?;
        let target = site_dir.join(entry.file_name());
        debug!(from = %entry.path().display(), to = %target.display(), "Overlaying");
        copy_recursive(&entry.path(), &target)?;
        merged += 1;
    }
    info!(overlay = %overlay_dir.display(), entries = merged, "Site overlay applied");
    Ok(merged)
}
