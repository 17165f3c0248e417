use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{PipelineError, Result};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub copied: usize,
    /// Entries already covered by a recursively copied ancestor.
    pub skipped: usize,
}

pub fn sync_all<I>(entries: I, source_base: &Path, dest_base: &Path) -> Result<SyncReport>
where
    I: IntoIterator<Item = Result<PathBuf>>,
{
    let mut report = SyncReport::default();
    let mut copied_dirs: Vec<PathBuf> = Vec::new();

    for entry in entries {
        let relative = entry?;
        if copied_dirs.iter().any(|dir| relative.starts_with(dir)) {
            debug!(path = %relative.display(), "Already copied with parent directory");
            report.skipped += 1;
            continue;
        }

        let source = source_base.join(&relative);
        let dest = dest_base.join(&relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|err| PipelineError::CopyFailed {
                path: relative.clone(),
                source: err,
            })?;
        }

        info!(from = %source.display(), to = %dest.display(), "Copying asset");
        copy_recursive(&source, &dest).map_err(|err| match err {
            PipelineError::CopyFailed { source, .. } => PipelineError::CopyFailed {
                path: relative.clone(),
                source,
            },
            other => other,
        })?;

        if source.is_dir() {
            copied_dirs.push(relative);
        }
        report.copied += 1;
    }

    Ok(report)
}

/// Copy a file, or a directory tree, to `dest`. Existing files are overwritten.
pub fn copy_recursive(source: &Path, dest: &Path) -> Result<()> {
    let failed = |err: std::io::Error| PipelineError::CopyFailed {
        path: source.to_path_buf(),
        source: err,
    };

    let metadata = fs::metadata(source).map_err(failed)?;
    if !metadata.is_dir() {
        fs::copy(source, dest).map_err(failed)?;
        return Ok(());
    }

    fs::create_dir_all(dest).map_err(failed)?;
    for entry in fs::read_dir(source).map_err(failed)? {
        let entry = entry.map_err(failed)?;
        copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
    }
    Ok(())
}
