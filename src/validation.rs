use std::path::{Component, Path};

use serde::Serialize;

use crate::config::ConfigurationContext;
use crate::resolve::check_pattern;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

pub fn validate_config(ctx: &ConfigurationContext) -> ValidationReport {
    let mut report = ValidationReport::default();

    require_dir(&mut report, "Input directory", &ctx.input_dir);
    require_dir(&mut report, "Site directory", &ctx.site_dir);
    if let Some(overlay) = &ctx.site_overlay {
        require_dir(&mut report, "Site overlay directory", overlay);
    }

    if let Err(err) = check_pattern(&ctx.input_glob) {
        report.errors.push(format!("Input glob: {err}"));
    }
    match &ctx.copy_glob {
        Some(glob) => {
            if let Err(err) = check_pattern(glob) {
                report.errors.push(format!("Copy glob: {err}"));
            }
        }
        None => report
            .warnings
            .push("No copy glob configured; no assets will be copied".into()),
    }

    if !ctx.template.is_file() {
        report.errors.push(format!(
            "Template file not found: {}",
            ctx.template.display()
        ));
    }

    report.merge(validate_site_output(&ctx.site_output));
    if let Some(archive) = &ctx.site_archive
        && !is_plain_name(archive)
    {
        report.errors.push(format!(
            "Site archive must be a single file name, got '{archive}'"
        ));
    }
    report.merge(validate_tool(ctx));

    let generator = Path::new(&ctx.generator);
    if ctx.generator.trim().is_empty() {
        report.errors.push("Site generator command cannot be empty".into());
    } else if generator.components().count() > 1 && !generator.exists() {
        report.warnings.push(format!(
            "Site generator '{}' does not exist",
            generator.display()
        ));
    }

    report
}

fn require_dir(report: &mut ValidationReport, label: &str, path: &Path) {
    if !path.is_dir() {
        report
            .errors
            .push(format!("{label} is not a directory: {}", path.display()));
    }
}

/// True when `name` is exactly one normal path component.
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.ends_with('/')
}

fn validate_site_output(name: &str) -> ValidationReport {
    let mut report = ValidationReport::default();
    if name.trim().is_empty() {
        report
            .errors
            .push("Site output directory name cannot be empty".into());
    } else if !is_plain_name(name) {
        report.errors.push(format!(
            "Site output must be a single directory name, got '{name}'"
        ));
    }
    report
}

fn validate_tool(ctx: &ConfigurationContext) -> ValidationReport {
    let mut report = ValidationReport::default();
    let tool = &ctx.converter;
    // Name and version become cache directory names.
    if tool.name.trim().is_empty() {
        report.errors.push("Converter name cannot be empty".into());
    } else if !is_plain_name(&tool.name) {
        report.errors.push(format!(
            "Converter name must be a single path component, got '{}'",
            tool.name
        ));
    }
    if tool.version.trim().is_empty() {
        report.errors.push("Converter version cannot be empty".into());
    } else if !is_plain_name(&tool.version) {
        report.errors.push(format!(
            "Converter version must be a single path component, got '{}'",
            tool.version
        ));
    }
    if tool.url.trim().is_empty() {
        report.errors.push("Converter download URL cannot be empty".into());
    }
    if let Some(digest) = &tool.sha256 {
        let digest = digest.trim();
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            report.errors.push(format!(
                "Converter sha256 must be 64 hex characters, got '{digest}'"
            ));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn valid_context(root: &Path) -> ConfigurationContext {
        let action = root.join("action");
        fs::create_dir_all(action.join("_eleventy")).unwrap();
        fs::write(action.join("_toc.html"), "$body$").unwrap();
        fs::create_dir_all(root.join("docs")).unwrap();
        let mut ctx = ConfigurationContext::new(&action, root.join("docs"));
        ctx.copy_glob = Some("static/**".into());
        ctx
    }

    #[test]
    fn valid_context_passes() {
        let temp = tempdir().unwrap();
        let report = validate_config(&valid_context(temp.path()));
        assert!(report.is_ok(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn missing_copy_glob_is_only_a_warning() {
        let temp = tempdir().unwrap();
        let mut ctx = valid_context(temp.path());
        ctx.copy_glob = None;
        let report = validate_config(&ctx);
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn collects_every_problem() {
        let temp = tempdir().unwrap();
        let mut ctx = valid_context(temp.path());
        ctx.input_dir = temp.path().join("missing");
        ctx.input_glob = "[".into();
        ctx.site_output = "a/b".into();
        ctx.template = temp.path().join("nope.html");
        ctx.converter.sha256 = Some("xyz".into());

        let report = validate_config(&ctx);
        assert_eq!(report.errors.len(), 5, "{:?}", report.errors);
    }

    #[test]
    fn tool_names_cannot_escape_the_cache() {
        let temp = tempdir().unwrap();
        for (name, version) in [("pandoc", "../x"), ("tools/pandoc", "2.10"), ("..", "2.10"), ("pandoc", "/2.10")] {
            let mut ctx = valid_context(temp.path());
            ctx.converter.name = name.into();
            ctx.converter.version = version.into();
            let report = validate_config(&ctx);
            assert_eq!(report.errors.len(), 1, "{name}@{version}: {:?}", report.errors);
        }

        let mut ctx = valid_context(temp.path());
        ctx.converter.version = "2.10.1".into();
        assert!(validate_config(&ctx).is_ok());
    }

    #[test]
    fn site_archive_must_be_a_file_name() {
        let temp = tempdir().unwrap();
        let mut ctx = valid_context(temp.path());
        ctx.site_archive = Some("_render_site.zip".into());
        assert!(validate_config(&ctx).is_ok());

        ctx.site_archive = Some("../site.zip".into());
        assert_eq!(validate_config(&ctx).errors.len(), 1);
    }
}
