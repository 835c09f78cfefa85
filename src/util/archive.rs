//! Tar archives for moving project trees in and out of containers.

use std::io::{Cursor, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};

/// Pack a directory's contents into a gzip-compressed tarball.
///
/// Entry paths are relative to `dir`; file modes are recorded.
pub fn pack_dir(dir: &Path) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    builder
        .append_dir_all(".", dir)
        .with_context(|| format!("failed to archive directory: {}", dir.display()))?;

    let encoder = builder
        .into_inner()
        .context("failed to finish tarball")?;
    encoder.finish().context("failed to compress tarball")
}

/// Unpack a tarball into `dest`, which is created if needed.
///
/// Set `gzip` for compressed input. Entries that would land outside
/// `dest` are rejected.
pub fn unpack(data: &[u8], dest: &Path, gzip: bool) -> Result<()> {
    let reader: Box<dyn Read + '_> = if gzip {
        Box::new(GzDecoder::new(Cursor::new(data)))
    } else {
        Box::new(Cursor::new(data))
    };
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);

    std::fs::create_dir_all(dest)
        .with_context(|| format!("failed to create destination directory: {}", dest.display()))?;

    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let entry_path = entry.path().context("failed to get entry path")?.into_owned();

        let unpacked = entry
            .unpack_in(dest)
            .with_context(|| format!("failed to extract {}", entry_path.display()))?;
        if !unpacked {
            bail!(
                "tarball entry escapes destination directory: {}",
                entry_path.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("cmd/app")).unwrap();
        fs::create_dir_all(root.join("vendor/github.com/a/b")).unwrap();
        fs::write(root.join("go.mod"), "module example.com/app\n").unwrap();
        fs::write(root.join("cmd/app/main.go"), "package main\n\nfunc main() {}\n").unwrap();
        fs::write(root.join("vendor/github.com/a/b/b.go"), [0u8, 159, 146, 150]).unwrap();
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        sample_tree(&src);

        let data = pack_dir(&src).unwrap();
        unpack(&data, &dst, true).unwrap();

        for rel in ["go.mod", "cmd/app/main.go", "vendor/github.com/a/b/b.go"] {
            assert_eq!(
                fs::read(src.join(rel)).unwrap(),
                fs::read(dst.join(rel)).unwrap(),
                "{} differs",
                rel
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_round_trip_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        sample_tree(&src);
        fs::write(src.join("run.sh"), "#!/bin/sh\n").unwrap();
        fs::set_permissions(src.join("run.sh"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(src.join("go.mod"), fs::Permissions::from_mode(0o600)).unwrap();

        let data = pack_dir(&src).unwrap();
        unpack(&data, &dst, true).unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&dst.join("run.sh")), 0o755);
        assert_eq!(mode(&dst.join("go.mod")), 0o600);
    }

    #[test]
    fn test_unpack_plain_tar() {
        let tmp = TempDir::new().unwrap();

        let mut builder = Builder::new(Vec::new());
        let content = b"binary";
        let mut header = tar::Header::new_gnu();
        header.set_path("shadow_bin/app").unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, &content[..]).unwrap();
        let data = builder.into_inner().unwrap();

        unpack(&data, tmp.path(), false).unwrap();
        assert_eq!(fs::read(tmp.path().join("shadow_bin/app")).unwrap(), b"binary");
    }
}
