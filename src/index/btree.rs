use super::{IndexIterator, Indexer};
use crate::data::RecordPosition;
use crossbeam_skiplist::SkipMap;

/// The default ordered index: a concurrent skip list keyed by raw byte
/// strings, giving lock-free reads and fine-grained write locking in place
/// of the source's mutex-guarded sorted tree. Purely in-memory; rebuilt
/// from the log on every open.
pub struct BTreeIndex {
    map: SkipMap<Vec<u8>, RecordPosition>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
        }
    }
}

impl Default for BTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Vec<u8>, pos: RecordPosition) -> Option<RecordPosition> {
        let prior = self.map.get(&key).map(|e| *e.value());
        self.map.insert(key, pos);
        prior
    }

    fn get(&self, key: &[u8]) -> Option<RecordPosition> {
        self.map.get(key).map(|e| *e.value())
    }

    fn delete(&self, key: &[u8]) -> Option<RecordPosition> {
        self.map.remove(key).map(|e| *e.value())
    }

    fn size(&self) -> usize {
        self.map.len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let mut items: Vec<(Vec<u8>, RecordPosition)> = self
            .map
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        if reverse {
            items.reverse();
        }
        Box::new(SnapshotIterator { items, cursor: 0 })
    }
}

/// Shared by the BTree and ART indexes: both snapshot their contents into
/// a single ordered vector at iterator creation, with `reverse` already
/// baked into the vector's order.
pub(super) struct SnapshotIterator {
    pub(super) items: Vec<(Vec<u8>, RecordPosition)>,
    pub(super) cursor: usize,
}

impl IndexIterator for SnapshotIterator {
    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        // `items` may be in descending order (reverse iterator); partition
        // on the direction-appropriate comparison so `seek` still means
        // "the first entry at or past `key` in this iterator's order".
        let descending = self.items.len() >= 2 && self.items[0].0 > self.items[1].0;
        self.cursor = if descending {
            self.items.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.items.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    fn next(&mut self) {
        self.cursor += 1;
    }

    fn valid(&self) -> bool {
        self.cursor < self.items.len()
    }

    fn key(&self) -> &[u8] {
        &self.items[self.cursor].0
    }

    fn value(&self) -> RecordPosition {
        self.items[self.cursor].1
    }
}
