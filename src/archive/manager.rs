//! Persisted-archive restore/publish and generation zip handling.

use super::order;
use crate::config::{ERROR_LOG_FILENAME, RUN_INFO_FILENAME};
use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

/// Name of a generation's compressed diff archive.
pub fn generation_zip_name(generation: u64) -> String {
    format!("diffs_{}_.tar.zip", generation)
}

fn generation_tar_name(generation: u64) -> String {
    format!("diffs_{}_.tar", generation)
}

/// Whether `name` is any generation's compressed diff archive.
pub fn is_generation_zip(name: &str) -> bool {
    name.starts_with("diffs") && name.ends_with(".tar.zip")
}

/// Join an archive entry path under `dest`, rejecting anything that could
/// land outside it.
fn guarded_join(dest: &Path, entry: &Path) -> Result<PathBuf> {
    let mut out = dest.to_path_buf();
    for component in entry.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => bail!("Illegal archive entry: {}", entry.display()),
        }
    }
    Ok(out)
}

/// Extract every entry of a tar stream under `dest`, path-guarded.
fn unpack_guarded<R: Read>(archive: &mut tar::Archive<R>, dest: &Path) -> Result<()> {
    for entry in archive.entries().context("Failed to read archive")? {
        let mut entry = entry.context("Failed to read archive entry")?;
        let entry_path = entry
            .path()
            .context("Archive entry has an invalid path")?
            .into_owned();
        let out_path = guarded_join(dest, &entry_path)?;

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("Failed to create {}", out_path.display()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", out_path.display()))?;
    }
    Ok(())
}

/// Extract the persisted archive into `dest`. A missing archive is a no-op:
/// the first run has nothing to restore.
pub fn restore(archive_path: &Path, dest: &Path) -> Result<()> {
    if !archive_path.exists() {
        return Ok(());
    }
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive = tar::Archive::new(file);
    unpack_guarded(&mut archive, dest)?;
    debug!(archive = %archive_path.display(), "restored persisted archive");
    Ok(())
}

/// Package the staged files and atomically replace the persisted archive.
///
/// Picks up the state document, the error log, and every generation zip in
/// `staging`, in publish order. The tar is written beside the destination
/// and renamed into place; that rename is the only point at which published
/// truth changes.
pub fn publish(staging: &Path, archive_path: &Path) -> Result<()> {
    let mut names = Vec::new();
    for entry in fs::read_dir(staging)
        .with_context(|| format!("Failed to read {}", staging.display()))?
    {
        let entry = entry.context("Failed to read staging entry")?;
        if !entry.file_type().context("Failed to stat staging entry")?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == RUN_INFO_FILENAME || name == ERROR_LOG_FILENAME || is_generation_zip(&name) {
            names.push(name);
        }
    }
    order::sort_for_publish(&mut names);

    let parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;
    let temp = NamedTempFile::new_in(parent)
        .context("Failed to create temp file for atomic publish")?;
    {
        let mut builder = tar::Builder::new(temp.as_file());
        for name in &names {
            builder
                .append_path_with_name(staging.join(name), name)
                .with_context(|| format!("Failed to archive {}", name))?;
        }
        builder.finish().context("Failed to finalize archive")?;
    }
    temp.persist(archive_path)
        .with_context(|| format!("Failed to publish {}", archive_path.display()))?;
    debug!(archive = %archive_path.display(), entries = names.len(), "published archive");
    Ok(())
}

/// Build a generation's compressed diff archive from the diff tree: a zip
/// with a single `diffs` entry whose bytes are a tar of `baselines/` and
/// `patches/`.
pub fn build_generation_zip(diffs_dir: &Path, out_dir: &Path, generation: u64) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let tar_path = out_dir.join(generation_tar_name(generation));
    {
        let file = File::create(&tar_path)
            .with_context(|| format!("Failed to create {}", tar_path.display()))?;
        let mut builder = tar::Builder::new(file);
        if diffs_dir.exists() {
            for entry in WalkDir::new(diffs_dir) {
                let entry = entry.context("Failed to walk diff tree")?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(diffs_dir)
                    .context("Diff entry is outside the diff tree")?;
                builder
                    .append_path_with_name(entry.path(), relative)
                    .with_context(|| format!("Failed to archive {}", relative.display()))?;
            }
        }
        builder.finish().context("Failed to finalize diff archive")?;
    }

    let zip_path = out_dir.join(generation_zip_name(generation));
    let zip_file = File::create(&zip_path)
        .with_context(|| format!("Failed to create {}", zip_path.display()))?;
    let mut writer = zip::ZipWriter::new(zip_file);
    writer
        .start_file("diffs", SimpleFileOptions::default())
        .context("Failed to start diff archive entry")?;
    let mut tar_file = File::open(&tar_path)
        .with_context(|| format!("Failed to open {}", tar_path.display()))?;
    io::copy(&mut tar_file, &mut writer).context("Failed to compress diff archive")?;
    writer.finish().context("Failed to finalize diff archive")?;

    fs::remove_file(&tar_path)
        .with_context(|| format!("Failed to remove {}", tar_path.display()))?;
    Ok(zip_path)
}

/// Extract a generation zip's diff tree into `dest`.
pub fn extract_generation_zip(zip_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(zip_path)
        .with_context(|| format!("Failed to open {}", zip_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read {}", zip_path.display()))?;
    if archive.is_empty() {
        return Ok(());
    }
    let entry = archive
        .by_index(0)
        .with_context(|| format!("Failed to read {}", zip_path.display()))?;
    let mut tar = tar::Archive::new(entry);
    unpack_guarded(&mut tar, dest)?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
