//! Engine configuration. All knobs are gathered into [`Options`] and passed
//! by value to [`crate::Engine::open`] — there is no global mutable option
//! state to reason about.

use std::path::PathBuf;

/// Default threshold at which the active data file is rotated.
pub const DEFAULT_DATA_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Default minimum reclaimable-bytes ratio required before `Merge` proceeds.
pub const DEFAULT_DATA_FILE_MERGE_RATIO: f32 = 0.5;

/// Selects which in-memory index implementation an [`crate::Engine`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexType {
    /// An ordered, concurrent skip list. Rebuilt from the log on every open.
    #[default]
    BTree,
    /// A simplified adaptive radix tree. Rebuilt from the log on every open.
    ART,
    /// An on-disk B+ tree. Persists itself; not rebuilt from the log.
    BPlusTree,
}

/// Configuration accepted by [`crate::Engine::open`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory the engine owns. Created if it does not exist.
    pub dir_path: PathBuf,
    /// Byte threshold at which the active data file is rotated.
    pub data_file_size: u64,
    /// Sync the active file after every append.
    pub sync_writes: bool,
    /// Sync opportunistically once this many bytes have been written since
    /// the last sync. `0` disables the opportunistic sync.
    pub bytes_per_sync: usize,
    /// Which in-memory index implementation to use.
    pub index_type: IndexType,
    /// Memory-map older data files during startup replay for faster scans.
    pub mmap_at_startup: bool,
    /// Minimum fraction of reclaimable bytes required before `Merge` is
    /// allowed to proceed.
    pub data_file_merge_ratio: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: std::env::temp_dir().join("bitcask-rs"),
            data_file_size: DEFAULT_DATA_FILE_SIZE,
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::BTree,
            mmap_at_startup: true,
            data_file_merge_ratio: DEFAULT_DATA_FILE_MERGE_RATIO,
        }
    }
}

/// Options controlling a single [`crate::WriteBatch`] commit.
#[derive(Debug, Clone)]
pub struct WriteBatchOptions {
    /// Maximum number of pending records a batch may hold at commit time.
    pub max_batch_num: usize,
    /// Sync the active file once the batch's records have been appended.
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_batch_num: 10_000,
            sync_writes: true,
        }
    }
}

/// Options controlling a [`crate::iterator::Iterator`] scan.
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only keys starting with this prefix are yielded. Empty matches all.
    pub prefix: Vec<u8>,
    /// Scan in descending key order instead of ascending.
    pub reverse: bool,
}
