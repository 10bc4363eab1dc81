//! An embedded, persistent key-value store implementing the Bitcask model:
//! an append-only on-disk log paired with a fully in-memory (or, for the
//! B+ tree backend, on-disk) key index.
//!
//! ```rust,no_run
//! use bitcask::{Engine, Options};
//!
//! fn main() -> bitcask::Result<()> {
//!     let options = Options {
//!         dir_path: "/tmp/bitcask-example".into(),
//!         ..Options::default()
//!     };
//!     let engine = Engine::open(options)?;
//!     engine.put(b"key".to_vec(), b"value".to_vec())?;
//!     assert_eq!(engine.get(b"key")?, b"value");
//!     engine.delete(b"key".to_vec())?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(loom, allow(dead_code))]

#[cfg(any(test, feature = "loom-tests"))]
mod loom_tests;

pub mod batch;
pub mod data;
pub mod error;
pub mod fio;
pub mod index;
pub mod iterator;
pub mod merge;
pub mod options;
mod util;

mod db;

pub use batch::WriteBatch;
pub use db::{Engine, Stat};
pub use error::{Error, Result};
pub use iterator::Iterator;
pub use options::{IndexType, IteratorOptions, Options, WriteBatchOptions};
