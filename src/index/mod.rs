//! L4 — In-memory Index: key → record-position map. Three interchangeable
//! implementations share the [`Indexer`]/[`IndexIterator`] contract so the
//! engine core never branches on which one is active.

mod art;
mod btree;
mod bptree;

pub use art::AdaptiveRadixTreeIndex;
pub use btree::BTreeIndex;
pub use bptree::BPlusTreeIndex;

use crate::data::RecordPosition;
use crate::error::Result;
use crate::options::IndexType;
use std::path::Path;

/// Key → [`RecordPosition`] map, implemented three different ways.
///
/// Keys are ordered lexicographically by byte. All mutating methods return
/// the position they displaced, if any, so callers can fold that into
/// `reclaim_size` bookkeeping without a second lookup.
pub trait Indexer: Send + Sync {
    fn put(&self, key: Vec<u8>, pos: RecordPosition) -> Option<RecordPosition>;
    fn get(&self, key: &[u8]) -> Option<RecordPosition>;
    fn delete(&self, key: &[u8]) -> Option<RecordPosition>;
    fn size(&self) -> usize;
    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator>;
    /// Releases resources held by the index. A no-op for the purely
    /// in-memory implementations; closes the on-disk B+ tree's handle.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Ordered, direction-aware cursor over an index's key/position pairs.
///
/// Tree-based implementations snapshot their key/position pairs at
/// iterator construction so iteration never blocks concurrent writers; the
/// B+ tree iterator instead holds a live read-only transaction cursor for
/// its lifetime.
pub trait IndexIterator {
    /// Positions at the first key (or last, if reverse).
    fn rewind(&mut self);
    /// Positions at the first key >= `key` (or <= `key` in reverse).
    fn seek(&mut self, key: &[u8]);
    /// Advances to the next entry in the iteration order.
    fn next(&mut self);
    /// Whether the cursor currently points at an entry.
    fn valid(&self) -> bool;
    /// The current entry's key. Panics if `!valid()`.
    fn key(&self) -> &[u8];
    /// The current entry's position. Panics if `!valid()`.
    fn value(&self) -> RecordPosition;
}

/// Opens the index implementation selected by `index_type`. `dir_path` is
/// only used by the on-disk B+ tree variant, which stores its file there.
pub fn new_indexer(index_type: IndexType, dir_path: &Path, sync_writes: bool) -> Result<Box<dyn Indexer>> {
    Ok(match index_type {
        IndexType::BTree => Box::new(BTreeIndex::new()),
        IndexType::ART => Box::new(AdaptiveRadixTreeIndex::new()),
        IndexType::BPlusTree => Box::new(BPlusTreeIndex::open(dir_path, sync_writes)?),
    })
}
