//! L7 — Merge / Compaction: builds a compacted replica of the older data
//! files in a sibling `<dir>-merge` directory and hands it off atomically
//! on the next successful `Open`.

use crate::batch::{log_record_key_with_seq, parse_log_record_key, NON_TXN_SEQ_NO};
use crate::data::{
    data_file_name, DataFile, LogRecordType, RecordPosition, DATA_FILE_NAME_SUFFIX,
    HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME,
};
use crate::db::Engine;
use crate::error::{Error, Result};
use crate::fio::IoType;
use crate::index::Indexer;
use crate::options::{IndexType, Options};
use std::fs;
use std::path::{Path, PathBuf};

const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";
const MERGE_DIR_SUFFIX: &str = "-merge";

/// Returns the sibling staging directory merge writes its compacted
/// replica into: same parent, `<base>-merge`.
fn merge_dir_path(dir_path: &Path) -> PathBuf {
    let name = dir_path.file_name().unwrap_or_default().to_string_lossy();
    dir_path.with_file_name(format!("{name}{MERGE_DIR_SUFFIX}"))
}

/// Reads the non-merge boundary recorded by a completed merge's
/// `merge-finished` marker.
pub(crate) fn read_non_merge_file_id(dir_path: &Path) -> Result<u32> {
    let file = DataFile::new_merge_finished_file(dir_path)?;
    let record = file.read_log_record(0)?.record;
    String::from_utf8_lossy(&record.value)
        .parse()
        .map_err(|_| Error::DataDirectoryCorrupted("merge-finished marker is not decimal ASCII".into()))
}

/// Called during `Engine::open`, before data files are loaded: installs
/// the result of a previously completed merge, if one is pending.
///
/// A pending merge is recognized by a `<dir>-merge` directory containing a
/// `merge-finished` marker. Original files with an id below the marker's
/// boundary are deleted, the merged files (and hint file) are moved into
/// the live directory, and the staging directory is removed. Anything
/// else — no staging directory, or one without a marker (an interrupted
/// merge) — is left untouched; a half-written staging directory is simply
/// overwritten the next time `Merge` runs.
pub(crate) fn load_merge_files(dir_path: &Path) -> Result<()> {
    let merge_path = merge_dir_path(dir_path);
    if !merge_path.is_dir() {
        return Ok(());
    }

    let finished = merge_path.join(MERGE_FINISHED_FILE_NAME);
    if !finished.is_file() {
        tracing::warn!(dir = %merge_path.display(), "discarding interrupted merge staging directory");
        fs::remove_dir_all(&merge_path)?;
        return Ok(());
    }

    let non_merge_file_id = read_non_merge_file_id(&merge_path)?;
    tracing::info!(non_merge_file_id, "installing pending merge result");

    for entry in fs::read_dir(&merge_path)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if let Some(stem) = name.strip_suffix(DATA_FILE_NAME_SUFFIX) {
            let Ok(file_id) = stem.parse::<u32>() else {
                continue;
            };
            if file_id < non_merge_file_id {
                let original = data_file_name(dir_path, file_id);
                if original.is_file() {
                    fs::remove_file(&original)?;
                }
                fs::rename(entry.path(), original)?;
            }
        } else if name == HINT_FILE_NAME {
            let dest = dir_path.join(HINT_FILE_NAME);
            if dest.is_file() {
                fs::remove_file(&dest)?;
            }
            fs::rename(entry.path(), dest)?;
        }
    }

    fs::remove_dir_all(&merge_path)?;
    Ok(())
}

/// Compacts every older data file as of the moment `merge` is called.
///
/// Preconditions (checked under `engine.merging_lock`): no merge already
/// running; the reclaimable-bytes ratio meets `DataFileMergeRatio`;
/// sufficient free disk space. The live directory is never touched by
/// this procedure — only the next `Engine::open` installs the result.
pub(crate) fn merge(engine: &Engine) -> Result<()> {
    let Some(_guard) = engine.merging_lock.try_lock() else {
        tracing::warn!("merge already in progress, rejecting concurrent request");
        return Err(Error::MergeInProgress);
    };

    if engine.older_files.read().is_empty() {
        return Ok(());
    }

    let stat = engine.stat()?;
    let reclaimable_ratio = stat.reclaim_size as f32 / stat.disk_size.max(1) as f32;
    if reclaimable_ratio < engine.options.data_file_merge_ratio {
        return Err(Error::MergeRatioUnreached);
    }
    let available = fs2::available_space(&engine.options.dir_path)?;
    let live_bytes = stat.disk_size.saturating_sub(stat.reclaim_size as u64);
    if available < live_bytes {
        return Err(Error::NoEnoughSpaceForMerge);
    }

    tracing::info!(
        dir = %engine.options.dir_path.display(),
        older_files = engine.older_files.read().len(),
        reclaimable_ratio,
        "merge starting"
    );

    let dir_path = engine.options.dir_path.clone();

    // Rotate the active file so everything already on disk is frozen as
    // "older"; the new active file's id becomes the non-merge boundary.
    let non_merge_file_id = {
        let mut active = engine.active_file.write();
        active.sync()?;
        let rotated_id = active.file_id();
        let rotated = DataFile::new(&dir_path, rotated_id, IoType::StandardFileIo)?;
        engine.older_files.write().insert(rotated_id, rotated);
        let new_active = DataFile::new(&dir_path, rotated_id + 1, IoType::StandardFileIo)?;
        *active = new_active;
        rotated_id + 1
    };

    let mut snapshot: Vec<u32> = engine.older_files.read().keys().copied().collect();
    snapshot.sort_unstable();

    let merge_path = merge_dir_path(&dir_path);
    if merge_path.is_dir() {
        fs::remove_dir_all(&merge_path)?;
    }
    fs::create_dir_all(&merge_path)?;

    let merge_options = Options {
        dir_path: merge_path.clone(),
        sync_writes: false,
        index_type: IndexType::BTree,
        ..engine.options.clone()
    };
    let merge_engine = Engine::open(merge_options)?;
    let hint_file = DataFile::new_hint_file(&merge_path)?;

    let older_files = engine.older_files.read();
    for &file_id in &snapshot {
        let data_file = older_files.get(&file_id).ok_or(Error::DataFileNotFound(file_id))?;
        let mut offset = 0u64;
        loop {
            let read = match data_file.read_log_record(offset) {
                Ok(r) => r,
                Err(Error::ReadDataFileEOF) => break,
                Err(e) => return Err(e),
            };
            let (real_key, _seq_no) = parse_log_record_key(read.record.key.clone());
            let scan_pos = RecordPosition {
                file_id,
                offset: offset as i64,
                size: read.size as u32,
            };

            if let Some(live_pos) = engine.index.get(&real_key) {
                if live_pos.file_id == scan_pos.file_id && live_pos.offset == scan_pos.offset {
                    let mut rewritten = crate::data::LogRecord {
                        key: log_record_key_with_seq(real_key.clone(), NON_TXN_SEQ_NO),
                        value: read.record.value,
                        record_type: read.record.record_type,
                    };
                    let new_pos = merge_engine.append_log_record(&mut rewritten)?;
                    hint_file.write_hint_record(real_key, new_pos)?;
                }
            }

            offset += read.size as u64;
        }
    }
    drop(older_files);

    hint_file.sync()?;
    merge_engine.sync()?;

    let finished_file = DataFile::new_merge_finished_file(&merge_path)?;
    let marker = crate::data::LogRecord {
        key: MERGE_FINISHED_KEY.to_vec(),
        value: non_merge_file_id.to_string().into_bytes(),
        record_type: LogRecordType::Normal,
    };
    finished_file.append(&marker.encode())?;
    finished_file.sync()?;

    tracing::info!(non_merge_file_id, "merge finished, pending install on next open");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_dir_path_is_a_sibling_with_suffix() {
        let dir = PathBuf::from("/tmp/bitcask-data");
        assert_eq!(merge_dir_path(&dir), PathBuf::from("/tmp/bitcask-data-merge"));
    }
}
