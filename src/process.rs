use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Exit code reported when a child is terminated by a signal.
pub const SIGNALLED: i32 = -1;

pub trait ProcessRunner: Send + Sync {
    fn run(&self, program: &OsStr, args: &[OsString], working_dir: Option<&Path>) -> Result<i32>;
}

/// Runs commands on the host, inheriting stdout and stderr so tool output reaches the CI log.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &OsStr, args: &[OsString], working_dir: Option<&Path>) -> Result<i32> {
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }
        debug!(
            program = %program.to_string_lossy(),
            args = ?args,
            cwd = ?working_dir,
            "Spawning child process"
        );

        let status = command.status().map_err(|source| PipelineError::Spawn {
            program: program.to_string_lossy().into_owned(),
            source,
        })?;

        match status.code() {
            Some(code) => Ok(code),
            None => {
                warn!(program = %program.to_string_lossy(), "Child terminated by signal");
                Ok(SIGNALLED)
            }
        }
    }
}
