//! L5 — Engine Core: the `Engine` type orchestrates the active/older data
//! files, the index, the directory lock, and the startup/close lifecycle
//! that the other layers plug into.

use crate::batch::{log_record_key_with_seq, parse_log_record_key, WriteBatch, NON_TXN_SEQ_NO};
use crate::data::{
    DataFile, LogRecord, LogRecordType, RecordPosition, TransactionRecord,
    DATA_FILE_NAME_SUFFIX, MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME,
};
use crate::error::{Error, Result};
use crate::index::{self, IndexIterator, Indexer};
use crate::iterator::Iterator;
use crate::merge;
use crate::options::{IndexType, IteratorOptions, Options, WriteBatchOptions};
use crate::util;
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fs::{self, File};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub(crate) const INITIAL_FILE_ID: u32 = 0;
pub(crate) const SEQ_NO_KEY: &[u8] = b"seq.no";
pub(crate) const FILE_LOCK_NAME: &str = "flock";

/// The embedded key-value store. One `Engine` owns one directory for its
/// entire lifetime; construct with [`Engine::open`] and let it close via
/// `Drop`, or call [`Engine::close`] explicitly to observe close errors.
pub struct Engine {
    pub(crate) options: Options,
    pub(crate) active_file: RwLock<DataFile>,
    pub(crate) older_files: RwLock<FxHashMap<u32, DataFile>>,
    pub(crate) index: Box<dyn Indexer>,
    pub(crate) file_ids: Vec<u32>,
    /// Serializes every writer (`put`, `delete`, `WriteBatch::commit`)
    /// across the *entire* append-then-index-update sequence, per spec.md
    /// §5: the append and the index mutation it produces must be seen by
    /// every other writer as one atomic step, not just each half on its
    /// own. `active_file`'s own `RwLock` only covers the append/rotate
    /// step (and is also taken by readers), so it cannot provide this by
    /// itself.
    pub(crate) write_lock: Mutex<()>,
    pub(crate) batch_commit_lock: Mutex<()>,
    pub(crate) seq_no: AtomicU64,
    pub(crate) merging_lock: Mutex<()>,
    is_initial: bool,
    lock_file: File,
    bytes_since_sync: AtomicUsize,
    pub(crate) reclaim_size: AtomicUsize,
}

/// Point-in-time statistics about an open engine, returned by
/// [`Engine::stat`].
#[derive(Debug, Clone)]
pub struct Stat {
    /// Number of live keys in the index.
    pub key_num: usize,
    /// Number of data files, active file included.
    pub data_file_num: usize,
    /// Bytes made obsolete by overwrites/deletes since the last merge.
    pub reclaim_size: usize,
    /// Total size in bytes of everything under the data directory.
    pub disk_size: u64,
}

fn check_options(options: &Options) -> Result<()> {
    if options.dir_path.as_os_str().is_empty() {
        return Err(Error::InvalidOptions("dir_path must not be empty".into()));
    }
    if options.data_file_size == 0 {
        return Err(Error::InvalidOptions("data_file_size must be positive".into()));
    }
    if !(0.0..=1.0).contains(&options.data_file_merge_ratio) {
        return Err(Error::InvalidOptions(
            "data_file_merge_ratio must be between 0.0 and 1.0".into(),
        ));
    }
    Ok(())
}

fn load_data_files(dir_path: &Path, use_mmap: bool) -> Result<Vec<DataFile>> {
    let mut file_ids: Vec<u32> = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if let Some(stem) = name.strip_suffix(DATA_FILE_NAME_SUFFIX) {
            let file_id: u32 = stem
                .parse()
                .map_err(|_| Error::DataDirectoryCorrupted(name.to_string()))?;
            file_ids.push(file_id);
        }
    }
    file_ids.sort_unstable();

    let io_type = if use_mmap {
        crate::fio::IoType::MemoryMap
    } else {
        crate::fio::IoType::StandardFileIo
    };
    file_ids
        .into_iter()
        .map(|id| DataFile::new(dir_path, id, io_type))
        .collect()
}

impl Engine {
    /// Opens (creating if necessary) a Bitcask store at `options.dir_path`.
    ///
    /// Runs the full startup sequence documented in the module-level spec:
    /// acquire the directory lock, install any pending merge result, load
    /// data files, then either load the persisted sequence number (B+ tree
    /// index) or load the hint file and replay the log (the two in-memory
    /// indexes).
    pub fn open(options: Options) -> Result<Self> {
        check_options(&options)?;

        let dir_path = options.dir_path.clone();
        let mut is_initial = false;
        if !dir_path.is_dir() {
            is_initial = true;
            fs::create_dir_all(&dir_path)?;
        }

        let lock_file = fs::OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(dir_path.join(FILE_LOCK_NAME))?;
        if lock_file.try_lock_exclusive().is_err() {
            tracing::warn!(dir = %dir_path.display(), "directory already locked by another engine instance");
            return Err(Error::DatabaseInUse);
        }

        if fs::read_dir(&dir_path)?.next().is_none() {
            is_initial = true;
        }

        merge::load_merge_files(&dir_path)?;
        tracing::debug!(dir = %dir_path.display(), "opening engine");

        let mut data_files = load_data_files(&dir_path, options.mmap_at_startup)?;
        let file_ids: Vec<u32> = data_files.iter().map(DataFile::file_id).collect();

        let active_file = match data_files.pop() {
            Some(file) => file,
            None => DataFile::new(&dir_path, INITIAL_FILE_ID, crate::fio::IoType::StandardFileIo)?,
        };
        let older_files: FxHashMap<u32, DataFile> =
            data_files.into_iter().map(|f| (f.file_id(), f)).collect();

        let index = index::new_indexer(options.index_type, &dir_path, options.sync_writes)?;

        let mut engine = Self {
            options,
            active_file: RwLock::new(active_file),
            older_files: RwLock::new(older_files),
            index,
            file_ids,
            write_lock: Mutex::new(()),
            batch_commit_lock: Mutex::new(()),
            seq_no: AtomicU64::new(0),
            merging_lock: Mutex::new(()),
            is_initial,
            lock_file,
            bytes_since_sync: AtomicUsize::new(0),
            reclaim_size: AtomicUsize::new(0),
        };

        if engine.options.index_type == IndexType::BPlusTree {
            let (exists, seq_no) = engine.load_seq_no()?;
            if exists {
                engine.seq_no.store(seq_no, Ordering::SeqCst);
            }
            // The source sets this only when `active_file == nil`, which
            // inverts the evident intent (replay never runs for this index,
            // so the write offset must always be derived from file size).
            let active_file = engine.active_file.read();
            active_file.set_write_offset(active_file.file_size()?);
        } else {
            engine.load_index_from_hint_file()?;
            let curr_seq_no = engine.load_index_from_data_files()?;
            if curr_seq_no > 0 {
                engine.seq_no.store(curr_seq_no, Ordering::SeqCst);
            }
            if engine.options.mmap_at_startup {
                engine.reset_io_type()?;
            }
        }

        tracing::info!(dir = %dir_path.display(), key_num = engine.index.size(), "engine opened");
        Ok(engine)
    }

    /// Flushes and closes the active file, persists the sequence number
    /// (for the on-disk index), closes the index, and releases the
    /// directory lock. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        if !self.options.dir_path.is_dir() {
            return Ok(());
        }

        let seq_no_file = DataFile::new_seq_no_file(&self.options.dir_path)?;
        let seq_no = self.seq_no.load(Ordering::SeqCst);
        let record = LogRecord {
            key: SEQ_NO_KEY.to_vec(),
            value: seq_no.to_string().into_bytes(),
            record_type: LogRecordType::Normal,
        };
        seq_no_file.append(&record.encode())?;
        seq_no_file.sync()?;

        self.index.close()?;
        self.active_file.read().sync()?;

        fs2::FileExt::unlock(&self.lock_file)?;
        tracing::debug!(dir = %self.options.dir_path.display(), "engine closed");
        Ok(())
    }

    /// Flushes the active file to durable storage.
    pub fn sync(&self) -> Result<()> {
        self.active_file.read().sync()
    }

    /// Returns whether `open` created a brand-new, empty directory.
    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    /// Collects point-in-time statistics about this engine.
    pub fn stat(&self) -> Result<Stat> {
        let older = self.older_files.read();
        Ok(Stat {
            key_num: self.index.size(),
            data_file_num: older.len() + 1,
            reclaim_size: self.reclaim_size.load(Ordering::SeqCst),
            disk_size: util::dir_disk_size(&self.options.dir_path),
        })
    }

    /// Copies the entire data directory (excluding the lock file) to
    /// `dest`, for an offline hot backup.
    pub fn backup(&self, dest: impl AsRef<Path>) -> Result<()> {
        util::copy_dir(&self.options.dir_path, dest.as_ref(), &[FILE_LOCK_NAME])
    }

    /// Stores `value` under `key`, overwriting any existing value.
    ///
    /// Holds `write_lock` across both the log append and the index update
    /// it produces, so no other writer can observe (or race to apply) an
    /// index position for a record this call hasn't finished installing.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let _write_guard = self.write_lock.lock();
        let mut record = LogRecord {
            key: log_record_key_with_seq(key.clone(), NON_TXN_SEQ_NO),
            value,
            record_type: LogRecordType::Normal,
        };
        let pos = self.append_log_record(&mut record)?;
        if let Some(old_pos) = self.index.put(key, pos) {
            self.reclaim_size.fetch_add(old_pos.size as usize, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Removes `key`. A no-op, returning `Ok(())`, if the key is absent.
    ///
    /// Holds `write_lock` across the existence check, the tombstone
    /// append, and the index removal, for the same reason `put` does.
    pub fn delete(&self, key: Vec<u8>) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let _write_guard = self.write_lock.lock();
        if self.index.get(&key).is_none() {
            return Ok(());
        }

        let mut record = LogRecord {
            key: log_record_key_with_seq(key.clone(), NON_TXN_SEQ_NO),
            value: Vec::new(),
            record_type: LogRecordType::Tombstone,
        };
        let pos = self.append_log_record(&mut record)?;
        self.reclaim_size.fetch_add(pos.size as usize, Ordering::SeqCst);

        if let Some(old_pos) = self.index.delete(&key) {
            self.reclaim_size.fetch_add(old_pos.size as usize, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Looks up `key`, returning its current value.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let pos = self.index.get(key).ok_or(Error::KeyNotFound)?;
        self.get_value_by_position(&pos)
    }

    /// Returns every live key, in index order.
    pub fn list_keys(&self) -> Result<Vec<Vec<u8>>> {
        let mut iter = self.index.iterator(false);
        iter.rewind();
        let mut keys = Vec::with_capacity(self.index.size());
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        Ok(keys)
    }

    /// Invokes `f(key, value)` for every live key in index order, stopping
    /// early the first time `f` returns `false`.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let mut iter = self.index.iterator(false);
        iter.rewind();
        while iter.valid() {
            let value = self.get_value_by_position(&iter.value())?;
            if !f(iter.key(), &value) {
                break;
            }
            iter.next();
        }
        Ok(())
    }

    /// Opens an ordered scan over the current keyspace.
    pub fn new_iterator(&self, options: IteratorOptions) -> Iterator<'_> {
        Iterator::new(self, options)
    }

    /// Opens a new transactional write batch.
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> WriteBatch<'_> {
        WriteBatch::new(self, options)
    }

    /// Compacts older data files, reclaiming space from overwritten and
    /// deleted keys. See [`crate::merge`] for the full procedure.
    pub fn merge(&self) -> Result<()> {
        merge::merge(self)
    }

    pub(crate) fn get_value_by_position(&self, pos: &RecordPosition) -> Result<Vec<u8>> {
        let active = self.active_file.read();
        let record = if active.file_id() == pos.file_id {
            active.read_log_record(pos.offset as u64)?.record
        } else {
            let older = self.older_files.read();
            let file = older.get(&pos.file_id).ok_or(Error::DataFileNotFound(pos.file_id))?;
            file.read_log_record(pos.offset as u64)?.record
        };
        if record.record_type == LogRecordType::Tombstone {
            return Err(Error::KeyNotFound);
        }
        Ok(record.value)
    }

    /// Appends `record` to the active file, rotating it first if the
    /// write would exceed `DataFileSize`. Returns the position the record
    /// was written at.
    pub(crate) fn append_log_record(&self, record: &mut LogRecord) -> Result<RecordPosition> {
        let dir_path = &self.options.dir_path;
        let encoded = record.encode();
        let record_len = encoded.len() as u64;

        let mut active = self.active_file.write();
        if active.write_offset() + record_len > self.options.data_file_size {
            active.sync()?;
            let current_id = active.file_id();
            let rotated = DataFile::new(dir_path, current_id, crate::fio::IoType::StandardFileIo)?;
            self.older_files.write().insert(current_id, rotated);

            let new_active = DataFile::new(dir_path, current_id + 1, crate::fio::IoType::StandardFileIo)?;
            *active = new_active;
            tracing::debug!(closed_file = current_id, new_active_file = current_id + 1, "rotated active data file");
        }

        let write_offset = active.write_offset();
        active.append(&encoded)?;

        let previous = self.bytes_since_sync.fetch_add(encoded.len(), Ordering::SeqCst);
        let mut need_sync = self.options.sync_writes;
        if !need_sync
            && self.options.bytes_per_sync > 0
            && previous + encoded.len() >= self.options.bytes_per_sync
        {
            need_sync = true;
        }
        if need_sync {
            active.sync()?;
            self.bytes_since_sync.store(0, Ordering::SeqCst);
        }

        Ok(RecordPosition {
            file_id: active.file_id(),
            offset: write_offset as i64,
            size: encoded.len() as u32,
        })
    }

    fn load_seq_no(&self) -> Result<(bool, u64)> {
        let path = self.options.dir_path.join(SEQ_NO_FILE_NAME);
        if !path.is_file() {
            return Ok((false, 0));
        }
        let file = DataFile::new_seq_no_file(&self.options.dir_path)?;
        let record = file.read_log_record(0)?.record;
        let seq_no: u64 = String::from_utf8_lossy(&record.value)
            .parse()
            .map_err(|_| Error::DataDirectoryCorrupted("seq-no file is not decimal ASCII".into()))?;
        fs::remove_file(path)?;
        Ok((true, seq_no))
    }

    /// Replays every data file not already covered by a prior merge,
    /// applying non-transactional records immediately and staging
    /// transactional ones until their `TxnCommit` terminator appears.
    /// Returns the highest sequence number observed.
    fn load_index_from_data_files(&self) -> Result<u64> {
        let mut current_seq_no = NON_TXN_SEQ_NO;
        if self.file_ids.is_empty() {
            return Ok(current_seq_no);
        }

        let merge_finished_path = self.options.dir_path.join(MERGE_FINISHED_FILE_NAME);
        let (has_merged, non_merge_file_id) = if merge_finished_path.is_file() {
            (true, merge::read_non_merge_file_id(&self.options.dir_path)?)
        } else {
            (false, 0)
        };

        let mut staged: FxHashMap<u64, Vec<TransactionRecord>> = FxHashMap::default();
        let active = self.active_file.read();
        let older = self.older_files.read();

        for (i, &file_id) in self.file_ids.iter().enumerate() {
            if has_merged && file_id < non_merge_file_id {
                continue;
            }

            let mut offset = 0u64;
            loop {
                let read = if file_id == active.file_id() {
                    active.read_log_record(offset)
                } else {
                    older
                        .get(&file_id)
                        .ok_or(Error::DataFileNotFound(file_id))?
                        .read_log_record(offset)
                };
                let read = match read {
                    Ok(r) => r,
                    Err(Error::ReadDataFileEOF) => break,
                    Err(e @ Error::InvalidCRC) => {
                        tracing::error!(file_id, offset, "CRC mismatch during replay, stopping file scan");
                        return Err(e);
                    }
                    Err(e) => return Err(e),
                };

                let pos = RecordPosition {
                    file_id,
                    offset: offset as i64,
                    size: read.size as u32,
                };
                let (real_key, seq_no) = parse_log_record_key(read.record.key.clone());

                if seq_no == NON_TXN_SEQ_NO {
                    self.update_index(real_key, read.record.record_type, pos)?;
                } else if read.record.record_type == LogRecordType::TxnCommit {
                    if let Some(records) = staged.remove(&seq_no) {
                        for txn_record in records {
                            self.update_index(
                                txn_record.record.key,
                                txn_record.record.record_type,
                                txn_record.position,
                            )?;
                        }
                    }
                } else {
                    staged.entry(seq_no).or_default().push(TransactionRecord {
                        record: LogRecord {
                            key: real_key,
                            value: read.record.value,
                            record_type: read.record.record_type,
                        },
                        position: pos,
                    });
                }

                current_seq_no = current_seq_no.max(seq_no);
                offset += read.size as u64;
            }

            if i == self.file_ids.len() - 1 {
                active.set_write_offset(offset);
            }
        }

        Ok(current_seq_no)
    }

    fn load_index_from_hint_file(&self) -> Result<()> {
        let hint_path = self.options.dir_path.join(crate::data::HINT_FILE_NAME);
        if !hint_path.is_file() {
            return Ok(());
        }
        let hint_file = DataFile::new_hint_file(&self.options.dir_path)?;
        let mut offset = 0u64;
        loop {
            let read = match hint_file.read_log_record(offset) {
                Ok(r) => r,
                Err(Error::ReadDataFileEOF) => break,
                Err(e) => return Err(e),
            };
            let pos = RecordPosition::decode(&read.record.value)
                .ok_or_else(|| Error::DataDirectoryCorrupted("malformed hint-index entry".into()))?;
            self.index.put(read.record.key, pos);
            offset += read.size as u64;
        }
        Ok(())
    }

    fn update_index(&self, key: Vec<u8>, record_type: LogRecordType, pos: RecordPosition) -> Result<()> {
        match record_type {
            LogRecordType::Normal => {
                if let Some(old_pos) = self.index.put(key, pos) {
                    self.reclaim_size.fetch_add(old_pos.size as usize, Ordering::SeqCst);
                }
            }
            LogRecordType::Tombstone => {
                let mut size = pos.size as usize;
                if let Some(old_pos) = self.index.delete(&key) {
                    size += old_pos.size as usize;
                }
                self.reclaim_size.fetch_add(size, Ordering::SeqCst);
            }
            LogRecordType::TxnCommit => {
                return Err(Error::IndexUpdateFailed);
            }
        }
        Ok(())
    }

    fn reset_io_type(&self) -> Result<()> {
        self.active_file
            .read()
            .set_io_manager(&self.options.dir_path, crate::fio::IoType::StandardFileIo)?;
        for file in self.older_files.write().values_mut() {
            file.set_io_manager(&self.options.dir_path, crate::fio::IoType::StandardFileIo)?;
        }
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("error while closing engine: {e}");
        }
    }
}
