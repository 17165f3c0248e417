use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{PipelineError, Result};

/// Zip every regular file under `site_output` into `dest`, named relative to `site_output`.
pub fn archive_site(site_output: &Path, dest: &Path) -> Result<usize> {
    let failed = |cause: String| PipelineError::ArchiveFailed {
        archive: dest.to_path_buf(),
        cause,
    };

    let mut files = Vec::new();
    collect_files(site_output, site_output, &mut files)?;
    files.sort();

    let file = File::create(dest).map_err(|err| failed(err.to_string()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for relative in &files {
        let name = entry_name(relative);
        debug!(entry = name.as_str(), "Adding to site archive");
        zip.start_file(name, options)
            .map_err(|err| failed(err.to_string()))?;
        let mut source = File::open(site_output.join(relative))
            .map_err(|err| failed(format!("{}: {err}", relative.display())))?;
        io::copy(&mut source, &mut zip).map_err(|err| failed(err.to_string()))?;
    }
    zip.finish().map_err(|err| failed(err.to_string()))?;

    info!(archive = %dest.display(), files = files.len(), "Site archive written");
    Ok(files.len())
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|err| PipelineError::io(format!("Failed to read {}", dir.display()), err))?;
    for entry in entries {
        let path = entry
            .map_err(|err| PipelineError::io(format!("Failed to read {}", dir.display()), err))?
            .path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if path.is_file()
            && let Ok(relative) = path.strip_prefix(root)
        {
            out.push(relative.to_path_buf());
        }
    }
    Ok(())
}

// Zip entry names always use forward slashes.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    #[test]
    fn archives_nested_files_with_relative_names() {
        let temp = tempdir().unwrap();
        let site = temp.path().join("_site");
        fs::create_dir_all(site.join("notes/empty")).unwrap();
        fs::write(site.join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(site.join("notes/b.html"), "<h1>B</h1>").unwrap();
        let dest = temp.path().join("_render_site.zip");

        let count = archive_site(&site, &dest).unwrap();
        assert_eq!(count, 2);

        let mut zip = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let mut names: Vec<_> = zip.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["index.html", "notes/b.html"]);

        let mut body = String::new();
        zip.by_name("notes/b.html")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "<h1>B</h1>");
    }

    #[test]
    fn missing_site_output_is_an_error() {
        let temp = tempdir().unwrap();
        let err = archive_site(&temp.path().join("_site"), &temp.path().join("site.zip"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
