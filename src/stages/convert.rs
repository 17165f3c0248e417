use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{PipelineError, Result};
use crate::process::ProcessRunner;

/// Runs the document converter once per source file, mirroring the source tree into HTML.
pub struct ConversionStage<'a> {
    runner: &'a dyn ProcessRunner,
    binary: &'a Path,
    template: &'a Path,
}

impl<'a> ConversionStage<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, binary: &'a Path, template: &'a Path) -> Self {
        Self {
            runner,
            binary,
            template,
        }
    }

    pub fn convert_all<I>(&self, files: I, input_base: &Path, output_base: &Path) -> Result<usize>
    where
        I: IntoIterator<Item = Result<PathBuf>>,
    {
        let mut converted = 0;
        for file in files {
            let file = file?;
            let output = output_path(&file, output_base);
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent).map_err(|err| {
                    PipelineError::io(format!("Failed to create {}", parent.display()), err)
                })?;
            }

            info!(input = %file.display(), output = %output.display(), "Converting");
            let args = converter_args(self.template, &file, &output);
            // Relative links inside documents resolve against the input tree.
            let exit_code = self
                .runner
                .run(self.binary.as_os_str(), &args, Some(input_base))?;
            if exit_code != 0 {
                return Err(PipelineError::ConversionFailed { file, exit_code });
            }
            converted += 1;
        }
        Ok(converted)
    }
}

/// `docs/a.md` becomes `<output_base>/docs/a.html`.
pub fn output_path(relative: &Path, output_base: &Path) -> PathBuf {
    output_base.join(relative).with_extension("html")
}

pub fn converter_args(template: &Path, input: &Path, output: &Path) -> Vec<OsString> {
    let mut template_arg = OsString::from("--template=");
    template_arg.push(template);

    let mut args: Vec<OsString> = ["-s", "-f", "markdown", "-t", "html5", "--katex", "--toc"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(template_arg);
    args.push(input.as_os_str().to_os_string());
    args.push(OsString::from("-o"));
    args.push(output.as_os_str().to_os_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct ScriptedRunner {
        exit_codes: Mutex<Vec<i32>>,
        seen: Mutex<Vec<Vec<OsString>>>,
    }

    impl ScriptedRunner {
        fn new(mut exit_codes: Vec<i32>) -> Self {
            exit_codes.reverse();
            Self {
                exit_codes: Mutex::new(exit_codes),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&self, _program: &OsStr, args: &[OsString], _cwd: Option<&Path>) -> Result<i32> {
            self.seen.lock().unwrap().push(args.to_vec());
            Ok(self.exit_codes.lock().unwrap().pop().unwrap_or(0))
        }
    }

    fn ok_paths(paths: &[&str]) -> Vec<Result<PathBuf>> {
        paths.iter().map(|p| Ok(PathBuf::from(p))).collect()
    }

    #[test]
    fn output_replaces_final_extension_only() {
        let base = Path::new("/site");
        assert_eq!(
            output_path(Path::new("docs/a.md"), base),
            PathBuf::from("/site/docs/a.html")
        );
        assert_eq!(
            output_path(Path::new("v1.2/notes.tar.md"), base),
            PathBuf::from("/site/v1.2/notes.tar.html")
        );
        assert_eq!(
            output_path(Path::new("README"), base),
            PathBuf::from("/site/README.html")
        );
    }

    #[test]
    fn argument_contract_is_fixed() {
        let args = converter_args(
            Path::new("/action/_toc.html"),
            Path::new("a.md"),
            Path::new("/site/a.html"),
        );
        let rendered: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            rendered,
            vec![
                "-s",
                "-f",
                "markdown",
                "-t",
                "html5",
                "--katex",
                "--toc",
                "--template=/action/_toc.html",
                "a.md",
                "-o",
                "/site/a.html",
            ]
        );
    }

    #[test]
    fn creates_parent_directories_for_nested_files() {
        let temp = tempdir().unwrap();
        let runner = ScriptedRunner::new(vec![]);
        let stage = ConversionStage::new(&runner, Path::new("pandoc"), Path::new("t.html"));
        let out = temp.path().join("site");

        let count = stage
            .convert_all(ok_paths(&["notes/deep/b.md"]), temp.path(), &out)
            .unwrap();
        assert_eq!(count, 1);
        assert!(out.join("notes/deep").is_dir());
    }

    #[test]
    fn non_zero_exit_stops_remaining_files() {
        let temp = tempdir().unwrap();
        let runner = ScriptedRunner::new(vec![0, 3, 0]);
        let stage = ConversionStage::new(&runner, Path::new("pandoc"), Path::new("t.html"));

        let err = stage
            .convert_all(ok_paths(&["a.md", "b.md", "c.md"]), temp.path(), temp.path())
            .unwrap_err();
        match err {
            PipelineError::ConversionFailed { file, exit_code } => {
                assert_eq!(file, PathBuf::from("b.md"));
                assert_eq!(exit_code, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn empty_set_runs_nothing() {
        let temp = tempdir().unwrap();
        let runner = ScriptedRunner::new(vec![]);
        let stage = ConversionStage::new(&runner, Path::new("pandoc"), Path::new("t.html"));
        let count = stage
            .convert_all(Vec::<Result<PathBuf>>::new(), temp.path(), temp.path())
            .unwrap();
        assert_eq!(count, 0);
        assert!(runner.seen.lock().unwrap().is_empty());
    }
}
