use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Paths, Pattern, glob_with};
use tracing::debug;

use crate::error::{PipelineError, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryFilter {
    /// Regular files, including symlinks that resolve to one.
    #[default]
    Files,
    /// Regular files and directories.
    FilesAndDirs,
}

/// Glob pattern anchored at a base directory.
///
/// Iteration is lazy and restartable: each call to [`FileSet::iter`] walks the
/// filesystem again and yields paths relative to the base.
#[derive(Debug, Clone)]
pub struct FileSet {
    pattern: String,
    base: PathBuf,
    filter: EntryFilter,
}

pub fn resolve(pattern: &str, base: &Path) -> Result<FileSet> {
    FileSet::new(pattern, base, EntryFilter::Files)
}

impl FileSet {
    pub fn new(pattern: &str, base: &Path, filter: EntryFilter) -> Result<Self> {
        check_pattern(pattern)?;
        Ok(Self {
            pattern: pattern.to_string(),
            base: normalize_base(base),
            filter,
        })
    }

    pub fn iter(&self) -> Result<Matches> {
        let base = self.base.to_str().ok_or_else(|| {
            PipelineError::Config(format!(
                "Base directory is not valid UTF-8: {}",
                self.base.display()
            ))
        })?;
        let anchored = if base.is_empty() {
            self.pattern.clone()
        } else {
            format!(
                "{}/{}",
                Pattern::escape(base.trim_end_matches('/')),
                self.pattern
            )
        };
        let paths = glob_with(&anchored, MATCH_OPTIONS).map_err(|err| {
            PipelineError::InvalidPattern {
                pattern: self.pattern.clone(),
                message: err.msg.to_string(),
            }
        })?;
        Ok(Matches {
            paths,
            pattern: self.pattern.clone(),
            base: self.base.clone(),
            filter: self.filter,
        })
    }

    pub fn to_vec(&self) -> Result<Vec<PathBuf>> {
        self.iter()?.collect()
    }
}

// `glob` drops `.` components from the paths it yields, so the base must not carry any.
fn normalize_base(base: &Path) -> PathBuf {
    base.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// Validate glob syntax without touching the filesystem.
pub fn check_pattern(pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(PipelineError::InvalidPattern {
            pattern: pattern.to_string(),
            message: "pattern is empty".into(),
        });
    }
    if Path::new(pattern).is_absolute() {
        return Err(PipelineError::InvalidPattern {
            pattern: pattern.to_string(),
            message: "pattern must be relative to the base directory".into(),
        });
    }
    Pattern::new(pattern)
        .map(|_| ())
        .map_err(|err| PipelineError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.msg.to_string(),
        })
}

pub struct Matches {
    paths: Paths,
    pattern: String,
    base: PathBuf,
    filter: EntryFilter,
}

impl Iterator for Matches {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let path = match self.paths.next()? {
                Ok(path) => path,
                Err(err) => {
                    let context = format!("Failed to read {}", err.path().display());
                    return Some(Err(PipelineError::io(context, err.into_error())));
                }
            };

            // Entries that vanish between listing and stat count as non-files.
            let Ok(metadata) = fs::metadata(&path) else {
                debug!(path = %path.display(), "Skipping entry that could not be stat'ed");
                continue;
            };
            let wanted = match self.filter {
                EntryFilter::Files => metadata.is_file(),
                EntryFilter::FilesAndDirs => metadata.is_file() || metadata.is_dir(),
            };
            if !wanted {
                continue;
            }

            match path.strip_prefix(&self.base) {
                Ok(relative) if relative.as_os_str().is_empty() => continue,
                Ok(relative) => return Some(Ok(relative.to_path_buf())),
                Err(_) => {
                    return Some(Err(PipelineError::InvalidPattern {
                        pattern: self.pattern.clone(),
                        message: format!(
                            "match {} lies outside {}",
                            path.display(),
                            self.base.display()
                        ),
                    }));
                }
            }
        }
    }
}
