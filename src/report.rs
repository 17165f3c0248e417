//! Hands the terminal pipeline result back to the CI host.
//!
//! On success the site path is appended to the `GITHUB_OUTPUT` file as
//! `site-path=<path>`; on failure an `::error::` workflow command is printed.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::pipeline::PipelineResult;

pub const SITE_PATH_OUTPUT: &str = "site-path";

pub fn publish(result: &PipelineResult, output_file: Option<&Path>) -> Result<()> {
    match result {
        PipelineResult::Success { site_path } => {
            println!("{SITE_PATH_OUTPUT}={}", site_path.display());
            if let Some(file) = output_file {
                append_output(file, SITE_PATH_OUTPUT, &site_path.to_string_lossy())?;
            }
        }
        PipelineResult::Failure { error, .. } => {
            println!("{}", error_command(&error.to_string()));
        }
    }
    Ok(())
}

/// Format a message as a workflow `::error::` command, escaping as the runner expects.
pub fn error_command(message: &str) -> String {
    let escaped = message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A");
    format!("::error::{escaped}")
}

pub fn append_output(file: &Path, key: &str, value: &str) -> Result<()> {
    let mut handle = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .map_err(|err| PipelineError::io(format!("Failed to open {}", file.display()), err))?;
    writeln!(handle, "{key}={value}")
        .map_err(|err| PipelineError::io(format!("Failed to write {}", file.display()), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineState;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn success_appends_site_path() {
        let temp = tempdir().unwrap();
        let output = temp.path().join("github_output");
        std::fs::write(&output, "previous=1\n").unwrap();

        let result = PipelineResult::Success {
            site_path: PathBuf::from("/action/_eleventy/_site"),
        };
        publish(&result, Some(&output)).unwrap();

        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "previous=1\nsite-path=/action/_eleventy/_site\n"
        );
    }

    #[test]
    fn failure_writes_no_output() {
        let temp = tempdir().unwrap();
        let output = temp.path().join("github_output");
        let result = PipelineResult::Failure {
            failed_in: PipelineState::Building,
            error: PipelineError::BuildFailed { exit_code: 1 },
        };
        publish(&result, Some(&output)).unwrap();
        assert!(!output.exists());
    }

    #[test]
    fn error_command_escapes_newlines() {
        assert_eq!(error_command("a\nb 100%"), "::error::a%0Ab 100%25");
    }
}
