//! Source tarball extraction and distribution packaging.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Archive;

/// Archive extensions we know how to decompress.
const SUPPORTED_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz"];

pub fn is_supported_archive(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    SUPPORTED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Decompress `archive` into `dest`.
///
/// Source tarballs nearly always wrap everything in a `name-version/` folder;
/// when there is exactly one top-level folder it is flattened so that `dest`
/// directly holds `configure`, `Makefile.in` and friends.
pub fn decompress(archive: &Path, dest: &Path) -> Result<()> {
    if !is_supported_archive(archive) {
        bail!("unsupported archive format: {}", archive.display());
    }

    let root = single_root(open_archive(archive)?)
        .with_context(|| format!("failed to read archive: {}", archive.display()))?;

    extract_tarball(open_archive(archive)?, dest, root.as_deref())
        .with_context(|| format!("failed to extract {}", archive.display()))
}

fn open_archive(path: &Path) -> Result<Archive<GzDecoder<BufReader<File>>>> {
    let file =
        File::open(path).with_context(|| format!("failed to open archive: {}", path.display()))?;
    Ok(Archive::new(GzDecoder::new(BufReader::new(file))))
}

/// The only top-level folder of an archive, if it has exactly one and no top-level files.
fn single_root<R: Read>(mut archive: Archive<R>) -> Result<Option<String>> {
    let mut roots = BTreeSet::new();
    let mut has_top_level_file = false;

    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let entry_path = entry.path().context("failed to get entry path")?.into_owned();
        let relative = destination_relative(&entry_path, strip_prefix)?;

        // Entry is the prefix directory itself
        if relative.as_os_str().is_empty() {
            continue;
        }

        let output_path = dest.join(&relative);

        // Create parent directories if needed
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&output_path).with_context(|| {
                    format!("failed to create directory: {}", output_path.display())
                })?;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::Symlink => {
                entry.unpack(&output_path).with_context(|| {
                    format!("failed to extract file: {}", output_path.display())
                })?;
            }
            tar::EntryType::Link => {
                // Hard link targets are archive paths, not relative to the link
                let target = entry
                    .link_name()
                    .context("failed to get hard link target")?
                    .with_context(|| format!("hard link without target: {}", entry_path.display()))?
                    .into_owned();
                let target = dest.join(destination_relative(&target, strip_prefix)?);
                if output_path.symlink_metadata().is_ok() {
                    std::fs::remove_file(&output_path).with_context(|| {
                        format!("failed to replace {}", output_path.display())
                    })?;
                }
                std::fs::hard_link(&target, &output_path).with_context(|| {
                    format!(
                        "failed to hard link {} to {}",
                        output_path.display(),
                        target.display()
                    )
                })?;
            }
            other => {
                tracing::debug!("Skipping {:?} entry: {}", other, entry_path.display());
            }
        }
    }

    Ok(())
}

/// Archive path `path` relative to the destination folder, with `strip_prefix` removed.
///
/// Paths escaping the destination are rejected.
fn destination_relative(path: &Path, strip_prefix: Option<&str>) -> Result<PathBuf> {
    let path: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let relative = match strip_prefix.and_then(|prefix| path.strip_prefix(prefix).ok()) {
        Some(stripped) => stripped.to_path_buf(),
        None => path.clone(),
    };

    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        bail!("tarball entry escapes destination directory: {}", path.display());
    }
    Ok(relative)
}

/// Package `folder` into a gzipped `tarball`, with entries under the folder's own name.
pub fn package(folder: &Path, tarball: &Path) -> Result<()> {
    let name = folder
        .file_name()
        .with_context(|| format!("cannot package folder without a name: {}", folder.display()))?;

    if let Some(parent) = tarball.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let file = File::create(tarball)
        .with_context(|| format!("failed to create tarball: {}", tarball.display()))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(name, folder)
        .with_context(|| format!("failed to archive {}", folder.display()))?;
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .with_context(|| format!("failed to finish tarball: {}", tarball.display()))?;

    Ok(())
}
