//! Output distribution: zip archives and SSH uploads.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;
use zip::write::FileOptions;

use crate::core::errors::BakeError;
use crate::core::options::{OutputOptions, SshOutputOptions, ZipOptions};
use crate::util::ssh::SshClient;

fn resolve(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Pack `zip.source` (default: the artifact) into `zip.dest`
/// (default: `<artifact>.zip`). Returns the archive path.
pub fn zip_output(artifact: &Path, zip: &ZipOptions, root: &Path) -> Result<PathBuf> {
    let source = if zip.source.is_empty() {
        artifact.to_path_buf()
    } else {
        resolve(root, &zip.source)
    };
    let dest = if zip.dest.is_empty() {
        let mut name = artifact.as_os_str().to_owned();
        name.push(".zip");
        PathBuf::from(name)
    } else {
        resolve(root, &zip.dest)
    };

    if let Some(parent) = dest.parent() {
        crate::util::fs::ensure_dir(parent)?;
    }
    let file = File::create(&dest)
        .with_context(|| format!("failed to create archive: {}", dest.display()))?;
    let mut writer = zip::ZipWriter::new(file);

    let mut options = FileOptions::<()>::default()
        .compression_method(zip::CompressionMethod::Deflated);
    if !zip.password.is_empty() {
        options = options.with_aes_encryption(zip::AesMode::Aes256, &zip.password);
    }

    let base = if source.is_dir() {
        source.parent().unwrap_or(&source).to_path_buf()
    } else {
        source.parent().map(Path::to_path_buf).unwrap_or_default()
    };

    for entry in WalkDir::new(&source).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("failed to read {}", source.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let name = path
            .strip_prefix(&base)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        writer
            .start_file(name.as_str(), options.unix_permissions(file_mode(path)))
            .with_context(|| format!("failed to add {} to archive", name))?;
        let mut f = File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        io::copy(&mut f, &mut writer)
            .with_context(|| format!("failed to compress {}", path.display()))?;
    }

    writer
        .finish()
        .with_context(|| format!("failed to finish archive: {}", dest.display()))?;
    Ok(dest)
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    0o755
}

/// Upload `ssh.source` to `ssh.dest` on the configured host.
///
/// Directories are uploaded recursively. A destination ending in `/`
/// receives the file under its own name.
pub fn ssh_upload(
    default_source: &Path,
    ssh: &SshOutputOptions,
    root: &Path,
    progress: bool,
) -> Result<String> {
    if ssh.dest.is_empty() {
        return Err(BakeError::config("output.ssh.dest is empty").into());
    }
    if ssh.connection.host.is_empty() {
        return Err(BakeError::config("output.ssh.host is empty").into());
    }

    let source = if ssh.source.is_empty() {
        default_source.to_path_buf()
    } else {
        resolve(root, &ssh.source)
    };

    let client = SshClient::connect(&ssh.connection)?;
    let dest = upload_dest(&source, &ssh.dest);

    if source.is_dir() {
        client.upload_dir(&source, &dest, progress)?;
    } else {
        if let Some(parent) = dest.rsplit_once('/').map(|(p, _)| p).filter(|p| !p.is_empty()) {
            client.mkdir_all(parent)?;
        }
        client.upload_file(&source, &dest)?;
    }

    let location = format!("{}:{}", client.address(), dest);
    tracing::info!("uploaded {} to {}", source.display(), location);
    Ok(location)
}

/// Remote path a file or directory lands at.
pub fn upload_dest(source: &Path, dest: &str) -> String {
    if dest.ends_with('/') && !source.is_dir() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}{}", dest, name)
    } else {
        dest.to_string()
    }
}

/// Run the configured distribution steps for one artifact.
pub fn distribute(artifact: &Path, output: &OutputOptions, root: &Path, progress: bool) -> Result<()> {
    let mut upload_source = artifact.to_path_buf();

    if !output.zip.is_empty() || !output.zip.password.is_empty() {
        let archive = zip_output(artifact, &output.zip, root)?;
        tracing::info!("archived {}", archive.display());
        upload_source = archive;
    }

    if !output.ssh.is_empty() {
        ssh_upload(&upload_source, &output.ssh, root, progress)?;
    }

    Ok(())
}
