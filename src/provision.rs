use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use glob::Pattern;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{ConfigurationContext, ToolSpec};
use crate::error::{PipelineError, Result};
use crate::process::ProcessRunner;
use crate::resolve::resolve;
use crate::toolcache::{DirToolCache, ToolCache, ToolKey};

#[cfg_attr(test, mockall::automock)]
pub trait Downloader: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("compendium/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| PipelineError::Config(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let failed = |cause: String| PipelineError::ToolDownloadFailed {
            url: url.to_string(),
            cause,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| failed(err.to_string()))?;
        let mut file = File::create(dest).map_err(|err| failed(err.to_string()))?;
        let bytes = response
            .copy_to(&mut file)
            .map_err(|err| failed(err.to_string()))?;

        debug!(url, bytes, dest = %dest.display(), "Archive downloaded");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedTool {
    pub key: ToolKey,
    /// Cached tree the archive was extracted into.
    pub root: PathBuf,
    pub binary: PathBuf,
    pub cache_hit: bool,
}

pub struct Provisioner {
    cache: Box<dyn ToolCache>,
    downloader: Box<dyn Downloader>,
    temp_dir: PathBuf,
}

impl Provisioner {
    pub fn new(
        cache: Box<dyn ToolCache>,
        downloader: Box<dyn Downloader>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            downloader,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn from_config(ctx: &ConfigurationContext) -> Result<Self> {
        Ok(Self::new(
            Box::new(DirToolCache::new(&ctx.tool_cache)),
            Box::new(HttpDownloader::new()?),
            &ctx.temp_dir,
        ))
    }

    /// Return the tool's executable, downloading and caching it on first use.
    pub fn ensure(&self, spec: &ToolSpec, runner: &dyn ProcessRunner) -> Result<ProvisionedTool> {
        let key = ToolKey::new(&spec.name, &spec.version);

        let (root, cache_hit) = match self.cache.get(&key)? {
            Some(root) => {
                info!(tool = %key, path = %root.display(), "Using cached tool");
                (root, true)
            }
            None => (self.install(&key, spec, runner)?, false),
        };

        let binary = locate_binary(&root, spec.binary_name())?;
        info!(tool = %key, binary = %binary.display(), "Tool ready");
        Ok(ProvisionedTool {
            key,
            root,
            binary,
            cache_hit,
        })
    }

    /// Run `<binary> --version` as a smoke test of the installation.
    pub fn verify(&self, tool: &ProvisionedTool, runner: &dyn ProcessRunner) -> Result<()> {
        let args = [OsString::from("--version")];
        let exit_code = runner.run(tool.binary.as_os_str(), &args, None)?;
        if exit_code != 0 {
            return Err(PipelineError::ToolBroken {
                binary: tool.binary.clone(),
                exit_code,
            });
        }
        Ok(())
    }

    fn install(&self, key: &ToolKey, spec: &ToolSpec, runner: &dyn ProcessRunner) -> Result<PathBuf> {
        fs::create_dir_all(&self.temp_dir).map_err(|err| {
            PipelineError::io(format!("Failed to create {}", self.temp_dir.display()), err)
        })?;
        let scratch = tempfile::Builder::new()
            .prefix("compendium-")
            .tempdir_in(&self.temp_dir)
            .map_err(|err| PipelineError::io("Failed to create download directory", err))?;

        let archive = scratch.path().join(archive_name(&spec.url));
        info!(tool = %key, url = %spec.url, "Downloading tool");
        self.downloader.fetch(&spec.url, &archive)?;

        if let Some(expected) = &spec.sha256 {
            let actual = compute_sha256(&archive)?;
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(PipelineError::ChecksumMismatch {
                    url: spec.url.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
            debug!(tool = %key, sha256 = %actual, "Archive digest verified");
        }

        let extracted = scratch.path().join("extracted");
        fs::create_dir_all(&extracted).map_err(|err| {
            PipelineError::io(format!("Failed to create {}", extracted.display()), err)
        })?;
        extract_tar(runner, &archive, &extracted)?;
        info!(tool = %key, path = %extracted.display(), "Tool extracted");

        self.cache.put(key, &extracted)
    }
}

fn extract_tar(runner: &dyn ProcessRunner, archive: &Path, dest: &Path) -> Result<()> {
    let args = [
        OsString::from("-xzf"),
        archive.as_os_str().to_os_string(),
        OsString::from("-C"),
        dest.as_os_str().to_os_string(),
    ];
    let exit_code = runner.run(OsStr::new("tar"), &args, None)?;
    if exit_code != 0 {
        return Err(PipelineError::ExtractFailed {
            archive: archive.to_path_buf(),
            exit_code,
        });
    }
    Ok(())
}

/// First file named `binary` anywhere beneath `root`.
pub fn locate_binary(root: &Path, binary: &str) -> Result<PathBuf> {
    let pattern = format!("**/{}", Pattern::escape(binary));
    let found = resolve(&pattern, root)?.iter()?.next().transpose()?;
    found
        .map(|relative| root.join(relative))
        .ok_or_else(|| PipelineError::ToolNotFound {
            binary: binary.to_string(),
            root: root.to_path_buf(),
        })
}

fn archive_name(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("archive.tar.gz")
        .to_string()
}

pub fn compute_sha256(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|err| {
        PipelineError::io(format!("Failed to open {} for hashing", path.display()), err)
    })?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = reader.read(&mut buffer).map_err(|err| {
            PipelineError::io(format!("Failed to read {}", path.display()), err)
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Emulates `tar -xzf <archive> -C <dest>` by laying out a nested binary.
    #[derive(Default)]
    struct TarRunner {
        calls: Mutex<Vec<String>>,
        tar_exit: i32,
        version_exit: i32,
    }

    impl ProcessRunner for TarRunner {
        fn run(&self, program: &OsStr, args: &[OsString], _cwd: Option<&Path>) -> Result<i32> {
            let program = program.to_string_lossy().into_owned();
            self.calls.lock().unwrap().push(program.clone());
            if program == "tar" {
                let dest = PathBuf::from(&args[3]);
                let bin = dest.join("pandoc-2.10").join("bin");
                fs::create_dir_all(&bin).unwrap();
                fs::write(bin.join("pandoc"), "#!/bin/sh\n").unwrap();
                return Ok(self.tar_exit);
            }
            Ok(self.version_exit)
        }
    }

    fn pandoc_tool() -> ToolSpec {
        ToolSpec {
            url: "https://example.invalid/pandoc-2.10-linux-amd64.tar.gz".into(),
            ..ToolSpec::default()
        }
    }

    fn writing_downloader(times: usize) -> MockDownloader {
        let mut downloader = MockDownloader::new();
        downloader
            .expect_fetch()
            .times(times)
            .returning(|_, dest| {
                fs::write(dest, b"archive").unwrap();
                Ok(())
            });
        downloader
    }

    #[test]
    fn second_ensure_hits_cache_without_download() {
        let temp = tempdir().unwrap();
        let provisioner = Provisioner::new(
            Box::new(DirToolCache::new(temp.path().join("cache"))),
            Box::new(writing_downloader(1)),
            temp.path().join("tmp"),
        );
        let runner = TarRunner::default();

        let first = provisioner.ensure(&pandoc_tool(), &runner).unwrap();
        let second = provisioner.ensure(&pandoc_tool(), &runner).unwrap();

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.binary, second.binary);
        assert!(first.binary.ends_with("pandoc-2.10/bin/pandoc"));
        assert_eq!(*runner.calls.lock().unwrap(), vec!["tar".to_string()]);
    }

    #[test]
    fn missing_binary_is_reported() {
        let temp = tempdir().unwrap();
        let provisioner = Provisioner::new(
            Box::new(DirToolCache::new(temp.path().join("cache"))),
            Box::new(writing_downloader(1)),
            temp.path().join("tmp"),
        );
        let mut wanted = pandoc_tool();
        wanted.binary = Some("pandoc-citeproc".into());

        let err = provisioner.ensure(&wanted, &TarRunner::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ToolNotFound { .. }));
    }

    #[test]
    fn failed_extraction_is_not_cached() {
        let temp = tempdir().unwrap();
        let cache = DirToolCache::new(temp.path().join("cache"));
        let provisioner = Provisioner::new(
            Box::new(cache.clone()),
            Box::new(writing_downloader(1)),
            temp.path().join("tmp"),
        );
        let runner = TarRunner {
            tar_exit: 2,
            ..TarRunner::default()
        };

        let err = provisioner.ensure(&pandoc_tool(), &runner).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractFailed { exit_code: 2, .. }));
        assert_eq!(cache.get(&ToolKey::new("pandoc", "2.10")).unwrap(), None);
    }

    #[test]
    fn download_error_propagates() {
        let temp = tempdir().unwrap();
        let mut downloader = MockDownloader::new();
        downloader.expect_fetch().times(1).returning(|url, _| {
            Err(PipelineError::ToolDownloadFailed {
                url: url.to_string(),
                cause: "404 Not Found".into(),
            })
        });
        let provisioner = Provisioner::new(
            Box::new(DirToolCache::new(temp.path().join("cache"))),
            Box::new(downloader),
            temp.path().join("tmp"),
        );

        let err = provisioner.ensure(&pandoc_tool(), &TarRunner::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ToolDownloadFailed { .. }));
    }

    #[test]
    fn pinned_digest_mismatch_fails() {
        let temp = tempdir().unwrap();
        let provisioner = Provisioner::new(
            Box::new(DirToolCache::new(temp.path().join("cache"))),
            Box::new(writing_downloader(1)),
            temp.path().join("tmp"),
        );
        let mut pinned = pandoc_tool();
        pinned.sha256 = Some("0".repeat(64));

        let err = provisioner.ensure(&pinned, &TarRunner::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ChecksumMismatch { .. }));
    }

    #[test]
    fn verify_rejects_non_zero_version_check() {
        let temp = tempdir().unwrap();
        let provisioner = Provisioner::new(
            Box::new(DirToolCache::new(temp.path().join("cache"))),
            Box::new(writing_downloader(1)),
            temp.path().join("tmp"),
        );
        let runner = TarRunner {
            version_exit: 127,
            ..TarRunner::default()
        };
        let tool = provisioner.ensure(&pandoc_tool(), &runner).unwrap();
        let err = provisioner.verify(&tool, &runner).unwrap_err();
        assert!(matches!(err, PipelineError::ToolBroken { exit_code: 127, .. }));
    }

    #[test]
    fn archive_name_uses_last_url_segment() {
        assert_eq!(
            archive_name("https://host/releases/download/2.10/pandoc.tar.gz?x=1"),
            "pandoc.tar.gz"
        );
        assert_eq!(archive_name("https://host/"), "archive.tar.gz");
    }

    #[test]
    fn sha256_is_stable() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("digest.bin");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            compute_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
