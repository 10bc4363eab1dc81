//! L8 — Iterator: a user-facing ordered scan over the live keyspace, with
//! prefix and direction filters, that materializes values on demand by
//! reading the log at the index's recorded position.

use crate::db::Engine;
use crate::error::Result;
use crate::index::{IndexIterator, Indexer};
use crate::options::IteratorOptions;

/// An ordered scan over an [`Engine`]'s keyspace.
///
/// Wraps the index's own iterator (see [`crate::index::IndexIterator`]);
/// `rewind`/`seek`/`next` delegate to it and then skip any entry whose key
/// does not start with [`IteratorOptions::prefix`]. Only `value()` touches
/// the engine: it takes the engine's read lock for the single positioned
/// log read needed to materialize the current entry, not for the
/// iteration itself.
pub struct Iterator<'a> {
    engine: &'a Engine,
    inner: Box<dyn IndexIterator>,
    options: IteratorOptions,
}

impl<'a> Iterator<'a> {
    pub(crate) fn new(engine: &'a Engine, options: IteratorOptions) -> Self {
        let inner = engine.index.iterator(options.reverse);
        let mut iter = Self { engine, inner, options };
        iter.rewind();
        iter
    }

    fn skip_to_matching_prefix(&mut self) {
        if self.options.prefix.is_empty() {
            return;
        }
        while self.inner.valid() && !self.inner.key().starts_with(&self.options.prefix) {
            self.inner.next();
        }
    }

    /// Positions at the first key (or last, if reverse) whose key matches
    /// the configured prefix, if any.
    pub fn rewind(&mut self) {
        self.inner.rewind();
        self.skip_to_matching_prefix();
    }

    /// Positions at the first key at-or-past `key` in this iterator's
    /// direction, then skips forward to the first prefix match.
    pub fn seek(&mut self, key: &[u8]) {
        self.inner.seek(key);
        self.skip_to_matching_prefix();
    }

    /// Advances to the next prefix-matching entry.
    pub fn next(&mut self) {
        self.inner.next();
        self.skip_to_matching_prefix();
    }

    /// Whether the cursor currently points at an entry.
    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    /// The current entry's key. Panics if `!valid()`.
    pub fn key(&self) -> &[u8] {
        self.inner.key()
    }

    /// Reads the current entry's value from the log. Panics if
    /// `!valid()`.
    pub fn value(&self) -> Result<Vec<u8>> {
        let pos = self.inner.value();
        self.engine.get_value_by_position(&pos)
    }
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
    fn iterates_all_keys_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        for (k, v) in [("b", "2"), ("a", "1"), ("c", "3")] {
            engine.put(k.as_bytes().to_vec(), v.as_bytes().to_vec()).unwrap();
        }
        let mut iter = engine.new_iterator(IteratorOptions::default());
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push((iter.key().to_vec(), iter.value().unwrap()));
            iter.next();
        }
        assert_eq!(
            seen,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"3".to_vec()),
            ]
        );
    }

    #[test]
    fn filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        for k in ["apple", "apricot", "banana"] {
            engine.put(k.as_bytes().to_vec(), b"v".to_vec()).unwrap();
        }
        let mut iter = engine.new_iterator(IteratorOptions {
            prefix: b"ap".to_vec(),
            reverse: false,
        });
        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(keys, vec![b"apple".to_vec(), b"apricot".to_vec()]);
    }

    #[test]
    fn reverse_direction() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        for k in ["a", "b", "c"] {
            engine.put(k.as_bytes().to_vec(), b"v".to_vec()).unwrap();
        }
        let mut iter = engine.new_iterator(IteratorOptions {
            prefix: Vec::new(),
            reverse: true,
        });
        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn seek_positions_at_first_match() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        for k in ["a", "b", "c", "d"] {
            engine.put(k.as_bytes().to_vec(), b"v".to_vec()).unwrap();
        }
        let mut iter = engine.new_iterator(IteratorOptions::default());
        iter.seek(b"c");
        assert_eq!(iter.key(), b"c");
    }
}
