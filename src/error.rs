//! Crate-wide error taxonomy.

use thiserror::Error;

/// The result type returned by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while operating a [`crate::Engine`].
#[derive(Debug, Error)]
pub enum Error {
    /// A `Put` or `Get` was attempted with an empty key.
    #[error("key is empty")]
    KeyEmpty,

    /// The key does not exist in the index.
    #[error("key not found")]
    KeyNotFound,

    /// The in-memory index rejected an update after a successful log append.
    /// This indicates a broken invariant between the log and the index and
    /// is not recoverable.
    #[error("failed to update index, the database may be corrupted")]
    IndexUpdateFailed,

    /// The index points at a file id that is neither the active file nor a
    /// known older file.
    #[error("data file {0} not found")]
    DataFileNotFound(u32),

    /// The data directory contains a file whose name does not parse as a
    /// valid data file id.
    #[error("the database directory is corrupted: {0}")]
    DataDirectoryCorrupted(String),

    /// A decoded record's checksum did not match its stored CRC32.
    #[error("invalid crc, the log record may be corrupted")]
    InvalidCRC,

    /// A write batch was committed with more pending records than
    /// `WriteBatchOptions::max_batch_num`.
    #[error("the write batch exceeds the maximum allowed number of records")]
    ExceedMaxBatchNum,

    /// `Merge` was called while a merge was already running.
    #[error("a merge operation is already in progress")]
    MergeInProgress,

    /// `Merge` was called before enough space had become reclaimable.
    #[error("the reclaimable ratio has not reached the configured threshold")]
    MergeRatioUnreached,

    /// `Merge` was called without enough free disk space to hold the
    /// compacted replica.
    #[error("not enough disk space left to perform a merge")]
    NoEnoughSpaceForMerge,

    /// The data directory is already locked by another engine instance.
    #[error("the database directory is already in use by another process")]
    DatabaseInUse,

    /// A configuration value failed validation.
    #[error("invalid option: {0}")]
    InvalidOptions(String),

    /// A log record was read past the end of a file's live data; this is
    /// the internal EOF sentinel used by replay, not a user-visible error.
    #[error("end of data file reached")]
    ReadDataFileEOF,

    /// Any I/O failure surfaced by the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
