//! L6 — Write Batch: transactional group commit. Buffers pending puts and
//! deletes (last write per key wins), then on [`WriteBatch::commit`]
//! appends every staged record under one sequence number, seals the batch
//! with a [`crate::data::LogRecordType::TxnCommit`] terminator, and only
//! then applies the positions to the index — so readers never observe a
//! partial batch.

use crate::data::{LogRecord, LogRecordType, RecordPosition};
use crate::db::Engine;
use crate::error::{Error, Result};
use crate::index::Indexer;
use crate::options::WriteBatchOptions;
use crate::util::varint::{decode_varint, encode_varint};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::Ordering;

/// Reserved sequence number meaning "this record is not part of a
/// transaction"; non-batch `Engine::put`/`Engine::delete` calls use it.
pub const NON_TXN_SEQ_NO: u64 = 0;

/// Real key of the terminator record a committed batch writes, before the
/// sequence-number prefix is applied.
const TXN_FINISHED_KEY: &[u8] = b"txn-finished";

#[derive(Clone)]
enum Pending {
    Put(Vec<u8>),
    Delete,
}

/// A buffered set of puts/deletes that become visible atomically on
/// [`WriteBatch::commit`]. Constructed via [`crate::Engine::new_write_batch`].
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    pending: Mutex<FxHashMap<Vec<u8>, Pending>>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(engine: &'a Engine, options: WriteBatchOptions) -> Self {
        Self {
            engine,
            options,
            pending: Mutex::new(FxHashMap::default()),
        }
    }

    /// Stages a Put. Invisible to `Engine::get`/`list_keys` until `commit`
    /// succeeds; a later `put`/`delete` of the same key within this batch
    /// replaces it.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        self.pending.lock().insert(key, Pending::Put(value));
        Ok(())
    }

    /// Stages a Delete. If `key` is absent from both the live index and
    /// this batch's pending set, this is a no-op; if it is only pending
    /// (staged by an earlier `put` in the same batch), the pending write
    /// is simply dropped rather than staging a tombstone for a key that
    /// was never durable.
    pub fn delete(&self, key: Vec<u8>) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        let mut pending = self.pending.lock();
        if self.engine.index.get(&key).is_none() {
            pending.remove(&key);
            return Ok(());
        }
        pending.insert(key, Pending::Delete);
        Ok(())
    }

    /// Commits every staged record under one sequence number: the engine's
    /// shared `write_lock` is held across the whole append-then-index
    /// sequence (the same discipline `Engine::put`/`Engine::delete`
    /// follow), and a dedicated commit mutex additionally serializes
    /// concurrent `commit` calls so sequence numbers are allocated and
    /// consumed in strict order.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_num {
            return Err(Error::ExceedMaxBatchNum);
        }

        let _write_guard = self.engine.write_lock.lock();
        let _commit_guard = self.engine.batch_commit_lock.lock();
        let seq_no = self.engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut applied: Vec<(Vec<u8>, Pending, RecordPosition)> = Vec::with_capacity(pending.len());
        for (key, write) in pending.iter() {
            let (record_type, value) = match write {
                Pending::Put(value) => (LogRecordType::Normal, value.clone()),
                Pending::Delete => (LogRecordType::Tombstone, Vec::new()),
            };
            let mut record = LogRecord {
                key: log_record_key_with_seq(key.clone(), seq_no),
                value,
                record_type,
            };
            let pos = self.engine.append_log_record(&mut record)?;
            applied.push((key.clone(), write.clone(), pos));
        }

        let mut terminator = LogRecord {
            key: log_record_key_with_seq(TXN_FINISHED_KEY.to_vec(), seq_no),
            value: Vec::new(),
            record_type: LogRecordType::TxnCommit,
        };
        self.engine.append_log_record(&mut terminator)?;

        if self.options.sync_writes {
            self.engine.sync()?;
        }

        for (key, write, pos) in applied {
            match write {
                Pending::Put(_) => {
                    if let Some(old) = self.engine.index.put(key, pos) {
                        self.engine.reclaim_size.fetch_add(old.size as usize, Ordering::SeqCst);
                    }
                }
                Pending::Delete => {
                    self.engine.reclaim_size.fetch_add(pos.size as usize, Ordering::SeqCst);
                    if let Some(old) = self.engine.index.delete(&key) {
                        self.engine.reclaim_size.fetch_add(old.size as usize, Ordering::SeqCst);
                    }
                }
            }
        }

        pending.clear();
        Ok(())
    }
}

/// Prefixes `key` with `seq_no` encoded as a zig-zag varint — the form
/// every record's `key` field carries on disk, transactional or not (a
/// non-transactional write uses [`NON_TXN_SEQ_NO`]).
pub(crate) fn log_record_key_with_seq(key: Vec<u8>, seq_no: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10 + key.len());
    encode_varint(seq_no as i64, &mut buf);
    buf.extend_from_slice(&key);
    buf
}

/// Splits a stored key back into `(real_key, seq_no)`. Panics on a key
/// with no varint prefix, which cannot occur for any record this crate
/// itself ever wrote.
pub(crate) fn parse_log_record_key(key: Vec<u8>) -> (Vec<u8>, u64) {
    let (seq_no, n) = decode_varint(&key).expect("log record key missing seq-no prefix");
    (key[n..].to_vec(), seq_no as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn engine(dir: &std::path::Path) -> Engine {
        Engine::open(Options {
            dir_path: dir.to_path_buf(),
            ..Options::default()
        })
        .unwrap()
    }

    #[test]
    fn uncommitted_batch_is_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let batch = engine.new_write_batch(WriteBatchOptions::default());
        batch.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        batch.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        assert_eq!(engine.get(b"a"), Err(Error::KeyNotFound));
        assert_eq!(engine.get(b"b"), Err(Error::KeyNotFound));
    }

    #[test]
    fn commit_makes_batch_visible_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let batch = engine.new_write_batch(WriteBatchOptions::default());
        batch.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        batch.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        batch.commit().unwrap();
        assert_eq!(engine.get(b"a").unwrap(), b"1");
        assert_eq!(engine.get(b"b").unwrap(), b"2");
    }

    #[test]
    fn delete_of_absent_key_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let batch = engine.new_write_batch(WriteBatchOptions::default());
        batch.delete(b"never-written".to_vec()).unwrap();
        batch.commit().unwrap();
    }

    #[test]
    fn empty_batch_commit_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let batch = engine.new_write_batch(WriteBatchOptions::default());
        batch.commit().unwrap();
        assert_eq!(engine.stat().unwrap().key_num, 0);
    }

    #[test]
    fn exceeding_max_batch_num_fails() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let batch = engine.new_write_batch(WriteBatchOptions {
            max_batch_num: 1,
            sync_writes: true,
        });
        batch.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        batch.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        assert_eq!(batch.commit(), Err(Error::ExceedMaxBatchNum));
    }

    #[test]
    fn seq_no_key_round_trips() {
        let key = log_record_key_with_seq(b"real-key".to_vec(), 42);
        let (real_key, seq_no) = parse_log_record_key(key);
        assert_eq!(real_key, b"real-key");
        assert_eq!(seq_no, 42);
    }
}
