//! Key-value storage for snowdag.
//!
//! The storage layer is composable:
//!
//! - [`MemDb`]: ordered in-memory store
//! - [`PrefixDb`]: namespaces another database under a key prefix
//! - [`VersionDb`]: buffers writes in memory until an atomic `commit`
//!
//! The chain owns a `VersionDb` over its base database; every acceptance
//! writes through the buffer and a single commit publishes the batch.

mod error;
mod memdb;
mod prefixdb;
mod versiondb;

pub use error::{DatabaseError, Result};
pub use memdb::MemDb;
pub use prefixdb::PrefixDb;
pub use versiondb::VersionDb;

use std::sync::Arc;

/// Read access.
pub trait KeyValueReader: Send + Sync {
    /// Whether the key exists.
    fn has(&self, key: &[u8]) -> Result<bool>;

    /// The value for `key`, or `None` when absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// Write access.
pub trait KeyValueWriter: Send + Sync {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
}

/// Delete access.
pub trait KeyValueDeleter: Send + Sync {
    fn delete(&self, key: &[u8]) -> Result<()>;
}

/// Iterator creation.
pub trait Iteratee: Send + Sync {
    /// Iterates every key-value pair in key order.
    fn new_iterator(&self) -> Box<dyn DbIterator>;

    /// Iterates pairs with `key >= start` in key order.
    fn new_iterator_with_start(&self, start: &[u8]) -> Box<dyn DbIterator>;

    /// Iterates pairs whose key begins with `prefix`, in key order.
    fn new_iterator_with_prefix(&self, prefix: &[u8]) -> Box<dyn DbIterator>;
}

/// Batch creation.
pub trait Batcher: Send + Sync {
    fn new_batch(&self) -> Box<dyn Batch>;
}

/// The full database interface.
pub trait Database:
    KeyValueReader + KeyValueWriter + KeyValueDeleter + Iteratee + Batcher
{
    fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// A set of writes applied atomically.
pub trait Batch: KeyValueWriter + KeyValueDeleter + Send + Sync {
    /// Accumulated size in bytes.
    fn size(&self) -> usize;

    /// Applies the batch. Fails if already written.
    fn write(&mut self) -> Result<()>;

    /// Clears the batch for reuse.
    fn reset(&mut self);
}

/// An iterator over key-value pairs in key order.
///
/// `key`/`value` are only valid after `next` has returned `true`.
pub trait DbIterator: Send {
    fn next(&mut self) -> bool;

    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];

    fn release(&mut self);
}

/// A database whose writes buffer until committed.
pub trait Commitable: Database {
    /// Publishes all buffered writes to the underlying database atomically.
    fn commit(&self) -> Result<()>;

    /// Discards all buffered writes.
    fn abort(&self);

    /// The underlying database.
    fn base(&self) -> Arc<dyn Database>;
}
