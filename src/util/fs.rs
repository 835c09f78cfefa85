//! Filesystem utilities.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Recursively copy a directory, preserving file and directory modes.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    copy_dir_excluding(src, dst, &[])
}

/// Like [`copy_dir_all`], but never descends into `dst` or any of `exclude`.
///
/// Either may live inside `src`. Directory modes are applied after the
/// walk so read-only directories still receive their children.
pub fn copy_dir_excluding(src: &Path, dst: &Path, exclude: &[&Path]) -> Result<()> {
    let src = src
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", src.display()))?;
    ensure_dir(dst)?;

    let mut skip = vec![dst
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", dst.display()))?];
    skip.extend(exclude.iter().filter_map(|p| p.canonicalize().ok()));

    let mut dir_modes = Vec::new();
    let walker = WalkDir::new(&src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !skip.iter().any(|s| e.path() == s));

    for entry in walker {
        let entry =
            entry.with_context(|| format!("failed to read directory: {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(&src)
            .with_context(|| format!("unexpected path: {}", entry.path().display()))?;
        let dst_path = dst.join(rel);
        let ty = entry.file_type();

        if ty.is_dir() {
            fs::create_dir_all(&dst_path)
                .with_context(|| format!("failed to create directory: {}", dst_path.display()))?;
            dir_modes.push((dst_path, entry.metadata()?.permissions()));
        } else if ty.is_symlink() {
            copy_symlink(entry.path(), &dst_path)?;
        } else {
            copy_file(entry.path(), &dst_path)?;
        }
    }

    // Deepest first, so a read-only parent is locked last.
    for (path, perms) in dir_modes.into_iter().rev() {
        fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions: {}", path.display()))?;
    }
    Ok(())
}

/// Copy a single file, creating parent directories. The mode is preserved.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(src, dst).with_context(|| {
        format!("failed to copy {} to {}", src.display(), dst.display())
    })?;
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src)
        .with_context(|| format!("failed to read symlink: {}", src.display()))?;
    std::os::unix::fs::symlink(&target, dst)
        .with_context(|| format!("failed to create symlink: {}", dst.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        copy_dir_all(src, dst)
    } else {
        copy_file(src, dst)
    }
}

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Write bytes to a file, replacing it and creating parent directories.
pub fn write_bytes(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write file: {}", path.display()))
}
