//! Ordered in-memory database.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    Batch, Batcher, Database, DatabaseError, DbIterator, Iteratee, KeyValueDeleter,
    KeyValueReader, KeyValueWriter, Result,
};

/// An in-memory key-value store backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemDb {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl MemDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(DatabaseError::Closed)
        } else {
            Ok(())
        }
    }
}

impl KeyValueReader for MemDb {
    fn has(&self, key: &[u8]) -> Result<bool> {
        self.check_closed()?;
        Ok(self.data.read().contains_key(key))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_closed()?;
        Ok(self.data.read().get(key).cloned())
    }
}

impl KeyValueWriter for MemDb {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_closed()?;
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

impl KeyValueDeleter for MemDb {
    fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_closed()?;
        self.data.write().remove(key);
        Ok(())
    }
}

impl Iteratee for MemDb {
    fn new_iterator(&self) -> Box<dyn DbIterator> {
        let entries = self
            .data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Box::new(VecIterator::new(entries))
    }

    fn new_iterator_with_start(&self, start: &[u8]) -> Box<dyn DbIterator> {
        let entries = self
            .data
            .read()
            .range(start.to_vec()..)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Box::new(VecIterator::new(entries))
    }

    fn new_iterator_with_prefix(&self, prefix: &[u8]) -> Box<dyn DbIterator> {
        let entries = self
            .data
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Box::new(VecIterator::new(entries))
    }
}

impl Batcher for MemDb {
    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(MemBatch::new(self.data.clone(), self.closed.clone()))
    }
}

impl Database for MemDb {
    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// A batch for [`MemDb`].
#[derive(Debug)]
pub struct MemBatch {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    closed: Arc<AtomicBool>,
    ops: RwLock<Vec<BatchOp>>,
    size: RwLock<usize>,
    written: AtomicBool,
}

impl MemBatch {
    fn new(data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>, closed: Arc<AtomicBool>) -> Self {
        Self {
            data,
            closed,
            ops: RwLock::new(Vec::new()),
            size: RwLock::new(0),
            written: AtomicBool::new(false),
        }
    }
}

impl KeyValueWriter for MemBatch {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ops.write().push(BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
        *self.size.write() += key.len() + value.len();
        Ok(())
    }
}

impl KeyValueDeleter for MemBatch {
    fn delete(&self, key: &[u8]) -> Result<()> {
        self.ops.write().push(BatchOp::Delete { key: key.to_vec() });
        *self.size.write() += key.len();
        Ok(())
    }
}

impl Batch for MemBatch {
    fn size(&self) -> usize {
        *self.size.read()
    }

    fn write(&mut self) -> Result<()> {
        if self.written.load(Ordering::Acquire) {
            return Err(DatabaseError::BatchAlreadyWritten);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(DatabaseError::Closed);
        }
        let ops = self.ops.read();
        let mut data = self.data.write();
        for op in ops.iter() {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key } => {
                    data.remove(key);
                }
            }
        }
        self.written.store(true, Ordering::Release);
        Ok(())
    }

    fn reset(&mut self) {
        self.ops.write().clear();
        *self.size.write() = 0;
        self.written.store(false, Ordering::Release);
    }
}

/// An iterator over a snapshot of entries.
pub struct VecIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    index: usize,
    started: bool,
}

impl VecIterator {
    pub(crate) fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            entries,
            index: 0,
            started: false,
        }
    }
}

impl DbIterator for VecIterator {
    fn next(&mut self) -> bool {
        if !self.started {
            self.started = true;
            return !self.entries.is_empty();
        }
        self.index += 1;
        self.index < self.entries.len()
    }

    fn key(&self) -> &[u8] {
        if self.started && self.index < self.entries.len() {
            &self.entries[self.index].0
        } else {
            &[]
        }
    }

    fn value(&self) -> &[u8] {
        if self.started && self.index < self.entries.len() {
            &self.entries[self.index].1
        } else {
            &[]
        }
    }

    fn release(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_has_delete() {
        let db = MemDb::new();
        db.put(b"key", b"value").unwrap();
        assert!(db.has(b"key").unwrap());
        assert_eq!(db.get(b"key").unwrap(), Some(b"value".to_vec()));

        db.delete(b"key").unwrap();
        assert!(!db.has(b"key").unwrap());
        assert_eq!(db.get(b"key").unwrap(), None);
        db.delete(b"missing").unwrap();
    }

    #[test]
    fn closed_db_refuses_access() {
        let db = MemDb::new();
        db.close().unwrap();
        assert!(db.is_closed());
        assert_eq!(db.get(b"k"), Err(DatabaseError::Closed));
        assert_eq!(db.put(b"k", b"v"), Err(DatabaseError::Closed));
    }

    #[test]
    fn iterators_are_ordered() {
        let db = MemDb::new();
        db.put(b"b", b"2").unwrap();
        db.put(b"a", b"1").unwrap();
        db.put(b"c", b"3").unwrap();

        let mut iter = db.new_iterator();
        let mut keys = Vec::new();
        while iter.next() {
            keys.push(iter.key().to_vec());
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        let mut iter = db.new_iterator_with_start(b"b");
        let mut keys = Vec::new();
        while iter.next() {
            keys.push(iter.key().to_vec());
        }
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn batch_applies_atomically_in_order() {
        let db = MemDb::new();
        let mut batch = db.new_batch();
        batch.put(b"k1", b"v1").unwrap();
        batch.put(b"k2", b"v2").unwrap();
        batch.delete(b"k1").unwrap();

        // Nothing lands before write.
        assert!(!db.has(b"k2").unwrap());
        batch.write().unwrap();
        assert!(!db.has(b"k1").unwrap());
        assert!(db.has(b"k2").unwrap());

        // Double write is an error.
        assert_eq!(batch.write(), Err(DatabaseError::BatchAlreadyWritten));
        batch.reset();
        batch.write().unwrap();
    }

    #[test]
    fn prefix_iterator_stops_at_prefix_end() {
        let db = MemDb::new();
        db.put(b"p/a", b"1").unwrap();
        db.put(b"p/b", b"2").unwrap();
        db.put(b"q/c", b"3").unwrap();

        let mut iter = db.new_iterator_with_prefix(b"p/");
        let mut keys = Vec::new();
        while iter.next() {
            keys.push(iter.key().to_vec());
        }
        assert_eq!(keys, vec![b"p/a".to_vec(), b"p/b".to_vec()]);
    }
}
