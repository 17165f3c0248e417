use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Failed to download {url}: {cause}")]
    ToolDownloadFailed { url: String, cause: String },

    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Extracting {} failed with exit code {exit_code}", .archive.display())]
    ExtractFailed { archive: PathBuf, exit_code: i32 },

    #[error("Could not find '{binary}' binary under {}", .root.display())]
    ToolNotFound { binary: String, root: PathBuf },

    #[error("{} --version exited with code {exit_code}; tool installed improperly", .binary.display())]
    ToolBroken { binary: PathBuf, exit_code: i32 },

    #[error("Converting {} failed with exit code {exit_code}", .file.display())]
    ConversionFailed { file: PathBuf, exit_code: i32 },

    #[error("Site generator exited with code {exit_code}")]
    BuildFailed { exit_code: i32 },

    #[error("Site generator succeeded but {} does not exist", .expected.display())]
    BuildIncomplete { expected: PathBuf },

    #[error("Failed to write site archive {}: {cause}", .archive.display())]
    ArchiveFailed { archive: PathBuf, cause: String },

    #[error("Failed to copy {}: {source}", .path.display())]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_failure_names_file_and_code() {
        let err = PipelineError::ConversionFailed {
            file: PathBuf::from("docs/a.md"),
            exit_code: 64,
        };
        assert_eq!(
            err.to_string(),
            "Converting docs/a.md failed with exit code 64"
        );
    }
}
