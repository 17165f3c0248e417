use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::stages::sync::copy_recursive;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolKey {
    pub name: String,
    pub version: String,
}

impl ToolKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ToolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Version-keyed store of extracted tool trees, shared across runs.
///
/// Implementations must tolerate other processes writing the same key; the
/// last completed `put` wins.
pub trait ToolCache: Send + Sync {
    fn get(&self, key: &ToolKey) -> Result<Option<PathBuf>>;
    fn put(&self, key: &ToolKey, source: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CompletionMarker {
    tool: String,
    version: String,
    cached_at: DateTime<Utc>,
}

/// Cache laid out as `<root>/<name>/<version>/<arch>` with an `<arch>.complete`
/// marker written only after the copy has finished.
#[derive(Debug, Clone)]
pub struct DirToolCache {
    root: PathBuf,
    arch: String,
}

impl DirToolCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    fn entry_dir(&self, key: &ToolKey) -> PathBuf {
        self.root.join(&key.name).join(&key.version).join(&self.arch)
    }

    fn marker(&self, key: &ToolKey) -> PathBuf {
        self.root
            .join(&key.name)
            .join(&key.version)
            .join(format!("{}.complete", self.arch))
    }
}

impl ToolCache for DirToolCache {
    fn get(&self, key: &ToolKey) -> Result<Option<PathBuf>> {
        let dir = self.entry_dir(key);
        let marker = self.marker(key);
        if dir.is_dir() && marker.is_file() {
            debug!(tool = %key, path = %dir.display(), "Tool cache hit");
            Ok(Some(dir))
        } else {
            debug!(tool = %key, "Tool cache miss");
            Ok(None)
        }
    }

    fn put(&self, key: &ToolKey, source: &Path) -> Result<PathBuf> {
        let dir = self.entry_dir(key);
        let marker = self.marker(key);

        if marker.exists() {
            fs::remove_file(&marker).map_err(|err| {
                PipelineError::io(format!("Failed to clear {}", marker.display()), err)
            })?;
        }
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|err| {
                PipelineError::io(format!("Failed to clear {}", dir.display()), err)
            })?;
        }
        fs::create_dir_all(&dir).map_err(|err| {
            PipelineError::io(format!("Failed to create {}", dir.display()), err)
        })?;

        copy_recursive(source, &dir)?;

        let stamp = CompletionMarker {
            tool: key.name.clone(),
            version: key.version.clone(),
            cached_at: Utc::now(),
        };
        let body = serde_json::to_string_pretty(&stamp).map_err(|err| {
            PipelineError::io("Failed to encode cache marker", err.into())
        })?;
        fs::write(&marker, body).map_err(|err| {
            PipelineError::io(format!("Failed to write {}", marker.display()), err)
        })?;

        debug!(tool = %key, path = %dir.display(), "Tool cached");
        Ok(dir)
    }
}
