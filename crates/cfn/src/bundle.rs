//! Local file staging: walking seed and handler directories, and zipping a
//! handler directory into a deployment package.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Files under `root`, relative to it and sorted. Symlinks to directories are
/// not followed.
pub fn list_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let ft = entry.file_type()?;
        if ft.is_dir() {
            walk(root, &path, out)?;
        } else if ft.is_symlink() && path.is_dir() {
            continue;
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_path_buf());
        }
    }
    Ok(())
}

/// Zips every file under `source` into `dest`, entry names relative to
/// `source`.
pub fn package_dir(source: &Path, dest: &Path) -> Result<PathBuf> {
    let files = list_files(source).with_context(|| format!("read {}", source.display()))?;
    if files.is_empty() {
        anyhow::bail!("handler directory {} has no files", source.display());
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let file = File::create(dest).with_context(|| format!("create {}", dest.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for rel in &files {
        let name = rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let data = std::fs::read(source.join(rel)).with_context(|| format!("read {}", rel.display()))?;
        zip.start_file(name, options)?;
        zip.write_all(&data)?;
    }
    zip.finish()?;
    info!(source = %source.display(), bundle = %dest.display(), files = files.len(), "handler packaged");
    Ok(dest.to_path_buf())
}
