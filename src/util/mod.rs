//! Small free-standing helpers shared across the codec, data-file, and
//! engine layers: the signed zig-zag varint codec mandated by the record
//! layout, and filesystem utilities for `Stat`/`Backup`.

pub mod varint;

use crate::error::{Error, Result};
use std::path::Path;

/// Recursively sums the byte size of every regular file under `path`.
///
/// Used by `Engine::stat` to report `disk_size`. Unreadable entries are
/// skipped rather than failing the whole walk, since `Stat` is best-effort
/// reporting, not a correctness-critical path.
pub fn dir_disk_size(path: &Path) -> u64 {
    let mut total = 0u64;
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.is_dir() {
            total += dir_disk_size(&entry.path());
        } else {
            total += metadata.len();
        }
    }
    total
}

/// Recursively copies `src` into `dst`, creating `dst` if needed, skipping
/// any top-level entry whose file name matches one in `exclude`.
///
/// Backs `Engine::backup`. `fs_extra` does the recursive copy of each
/// surviving top-level entry; the exclude filter (used to leave the
/// directory's advisory lock file behind) is applied ourselves first,
/// since `fs_extra::dir::CopyOptions` has no per-name skip.
pub fn copy_dir(src: &Path, dst: &Path, exclude: &[&str]) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    let file_options = fs_extra::file::CopyOptions::new();
    let dir_options = fs_extra::dir::CopyOptions::new().content_only(true);
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if exclude.iter().any(|e| file_name == **e) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&file_name);
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            fs_extra::dir::copy(&src_path, &dst_path, &dir_options)
                .map_err(|_| Error::Io(std::io::Error::from(std::io::ErrorKind::Other)))?;
        } else {
            fs_extra::file::copy(&src_path, &dst_path, &file_options)
                .map_err(|_| Error::Io(std::io::Error::from(std::io::ErrorKind::Other)))?;
        }
    }
    Ok(())
}
