use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const DEFAULT_CONVERTER_NAME: &str = "pandoc";
pub const DEFAULT_CONVERTER_VERSION: &str = "2.10";
pub const DEFAULT_CONVERTER_URL: &str =
    "https://github.com/jgm/pandoc/releases/download/2.10/pandoc-2.10-linux-amd64.tar.gz";
pub const DEFAULT_INPUT_GLOB: &str = "**/*.md";
pub const DEFAULT_GENERATOR: &str = "eleventy";
pub const DEFAULT_SITE_OUTPUT: &str = "_site";
pub const TEMPLATE_FILE: &str = "_toc.html";
pub const SITE_DIR: &str = "_eleventy";

/// External tool pinned by name and version, fetched from `url` on a cache miss.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub version: String,
    pub url: String,
    /// File name of the executable inside the archive, when it differs from `name`.
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

impl ToolSpec {
    pub fn binary_name(&self) -> &str {
        self.binary.as_deref().unwrap_or(&self.name)
    }
}

impl Default for ToolSpec {
    fn default() -> Self {
        Self {
            name: DEFAULT_CONVERTER_NAME.to_string(),
            version: DEFAULT_CONVERTER_VERSION.to_string(),
            url: DEFAULT_CONVERTER_URL.to_string(),
            binary: None,
            sha256: None,
        }
    }
}

/// Options read once at startup and shared read-only by every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationContext {
    pub input_dir: PathBuf,
    pub input_glob: String,
    pub copy_glob: Option<String>,
    pub site_overlay: Option<PathBuf>,
    /// Working tree of the site generator; converted HTML lands here.
    pub site_dir: PathBuf,
    pub site_output: String,
    /// Zip file written next to the site output after assets are synced.
    pub site_archive: Option<String>,
    pub template: PathBuf,
    pub generator: String,
    pub clean: bool,
    pub converter: ToolSpec,
    pub tool_cache: PathBuf,
    pub temp_dir: PathBuf,
    pub output_file: Option<PathBuf>,
}

impl ConfigurationContext {
    /// Defaults for an action checked out at `action_dir` operating on `input_dir`.
    pub fn new(action_dir: &Path, input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            input_glob: DEFAULT_INPUT_GLOB.to_string(),
            copy_glob: None,
            site_overlay: None,
            site_dir: action_dir.join(SITE_DIR),
            site_output: DEFAULT_SITE_OUTPUT.to_string(),
            site_archive: None,
            template: action_dir.join(TEMPLATE_FILE),
            generator: DEFAULT_GENERATOR.to_string(),
            clean: true,
            converter: ToolSpec::default(),
            tool_cache: default_tool_cache(None),
            temp_dir: std::env::temp_dir(),
            output_file: None,
        }
    }

    /// Load from a YAML file. Relative paths are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::io(format!("Failed to read config file {}", path.display()), err)
        })?;
        let file: ConfigFile = serde_yaml::from_str(&content).map_err(|err| {
            PipelineError::Config(format!("Failed to parse {}: {err}", path.display()))
        })?;
        Ok(file.into_context(&config_base(path)?))
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let workspace = get("GITHUB_WORKSPACE")
            .map(PathBuf::from)
            .ok_or_else(|| PipelineError::Config("GITHUB_WORKSPACE is not set".into()))?;
        let action_dir = get("GITHUB_ACTION_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| PipelineError::Config("GITHUB_ACTION_PATH is not set".into()))?;

        let input_dir = match get("INPUT_INPUT-DIR") {
            Some(dir) => workspace.join(dir),
            None => workspace.clone(),
        };

        let mut ctx = Self::new(&action_dir, input_dir);
        if let Some(glob) = get("INPUT_INPUT-GLOB") {
            ctx.input_glob = glob;
        }
        ctx.copy_glob = get("INPUT_COPY-GLOB");
        ctx.site_overlay = get("INPUT_SITE-OVERLAY").map(|dir| workspace.join(dir));
        ctx.site_archive = get("INPUT_SITE-ARCHIVE");
        ctx.tool_cache = default_tool_cache(get("RUNNER_TOOL_CACHE"));
        if let Some(temp) = get("RUNNER_TEMP") {
            ctx.temp_dir = PathBuf::from(temp);
        }
        ctx.output_file = get("GITHUB_OUTPUT").map(PathBuf::from);
        Ok(ctx)
    }
}

fn config_base(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).map_err(|err| {
        PipelineError::io(format!("Failed to resolve {}", path.display()), err)
    })?;
    Ok(absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or(absolute))
}

fn default_tool_cache(runner_cache: Option<String>) -> PathBuf {
    if let Some(dir) = runner_cache {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("compendium")
        .join("tools")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    input_dir: PathBuf,
    #[serde(default)]
    action_dir: Option<PathBuf>,
    #[serde(default)]
    input_glob: Option<String>,
    #[serde(default)]
    copy_glob: Option<String>,
    #[serde(default)]
    site_overlay: Option<PathBuf>,
    #[serde(default)]
    site_dir: Option<PathBuf>,
    #[serde(default)]
    site_output: Option<String>,
    #[serde(default)]
    site_archive: Option<String>,
    #[serde(default)]
    template: Option<PathBuf>,
    #[serde(default)]
    generator: Option<String>,
    #[serde(default)]
    clean: Option<bool>,
    #[serde(default)]
    converter: Option<ToolSpec>,
    #[serde(default)]
    tool_cache: Option<PathBuf>,
    #[serde(default)]
    temp_dir: Option<PathBuf>,
    #[serde(default)]
    output_file: Option<PathBuf>,
}

impl ConfigFile {
    fn into_context(self, base: &Path) -> ConfigurationContext {
        let action_dir = self
            .action_dir
            .map(|dir| base.join(dir))
            .unwrap_or_else(|| base.to_path_buf());
        let mut ctx = ConfigurationContext::new(&action_dir, base.join(self.input_dir));

        if let Some(glob) = self.input_glob {
            ctx.input_glob = glob;
        }
        ctx.copy_glob = self.copy_glob.filter(|glob| !glob.trim().is_empty());
        ctx.site_overlay = self.site_overlay.map(|dir| base.join(dir));
        if let Some(dir) = self.site_dir {
            ctx.site_dir = base.join(dir);
        }
        if let Some(output) = self.site_output {
            ctx.site_output = output;
        }
        ctx.site_archive = self.site_archive.filter(|name| !name.trim().is_empty());
        if let Some(template) = self.template {
            ctx.template = base.join(template);
        }
        if let Some(generator) = self.generator {
            ctx.generator = generator;
        }
        if let Some(clean) = self.clean {
            ctx.clean = clean;
        }
        if let Some(converter) = self.converter {
            ctx.converter = converter;
        }
        if let Some(cache) = self.tool_cache {
            ctx.tool_cache = base.join(cache);
        }
        if let Some(temp) = self.temp_dir {
            ctx.temp_dir = base.join(temp);
        }
        ctx.output_file = self.output_file.map(|file| base.join(file));
        ctx
    }
}
