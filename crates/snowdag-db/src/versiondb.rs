//! Buffered database with atomic commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::memdb::VecIterator;
use crate::{
    Batch, Batcher, Commitable, Database, DatabaseError, DbIterator, Iteratee,
    KeyValueDeleter, KeyValueReader, KeyValueWriter, Result,
};

#[derive(Debug, Clone)]
enum ValueState {
    Present(Vec<u8>),
    Deleted,
}

/// Buffers writes in memory; `commit` publishes them to the base database as
/// one batch, `abort` discards them. Reads see the buffer first.
///
/// This is the "versioned batches, atomic commit" storage the chain writes
/// acceptances through.
pub struct VersionDb {
    mem: Arc<RwLock<BTreeMap<Vec<u8>, ValueState>>>,
    db: Arc<dyn Database>,
    closed: Arc<AtomicBool>,
}

impl VersionDb {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            mem: Arc::new(RwLock::new(BTreeMap::new())),
            db,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(DatabaseError::Closed)
        } else {
            Ok(())
        }
    }

    fn merged_entries(
        &self,
        start: Option<&[u8]>,
        prefix: Option<&[u8]>,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mem = self.mem.read();

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        let mut inner = match (start, prefix) {
            (Some(s), _) => self.db.new_iterator_with_start(s),
            (None, Some(p)) => self.db.new_iterator_with_prefix(p),
            (None, None) => self.db.new_iterator(),
        };
        while inner.next() {
            let key = inner.key().to_vec();
            if !mem.contains_key(&key) {
                merged.insert(key, inner.value().to_vec());
            }
        }
        inner.release();

        for (key, state) in mem.iter() {
            let after_start = start.map_or(true, |s| key.as_slice() >= s);
            let in_prefix = prefix.map_or(true, |p| key.starts_with(p));
            if after_start && in_prefix {
                if let ValueState::Present(value) = state {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }

        merged.into_iter().collect()
    }
}

impl KeyValueReader for VersionDb {
    fn has(&self, key: &[u8]) -> Result<bool> {
        self.check_closed()?;
        if let Some(state) = self.mem.read().get(key) {
            return Ok(matches!(state, ValueState::Present(_)));
        }
        self.db.has(key)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_closed()?;
        if let Some(state) = self.mem.read().get(key) {
            return match state {
                ValueState::Present(v) => Ok(Some(v.clone())),
                ValueState::Deleted => Ok(None),
            };
        }
        self.db.get(key)
    }
}

impl KeyValueWriter for VersionDb {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_closed()?;
        self.mem
            .write()
            .insert(key.to_vec(), ValueState::Present(value.to_vec()));
        Ok(())
    }
}

impl KeyValueDeleter for VersionDb {
    fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_closed()?;
        self.mem.write().insert(key.to_vec(), ValueState::Deleted);
        Ok(())
    }
}

impl Iteratee for VersionDb {
    fn new_iterator(&self) -> Box<dyn DbIterator> {
        Box::new(VecIterator::new(self.merged_entries(None, None)))
    }

    fn new_iterator_with_start(&self, start: &[u8]) -> Box<dyn DbIterator> {
        Box::new(VecIterator::new(self.merged_entries(Some(start), None)))
    }

    fn new_iterator_with_prefix(&self, prefix: &[u8]) -> Box<dyn DbIterator> {
        Box::new(VecIterator::new(self.merged_entries(None, Some(prefix))))
    }
}

impl Batcher for VersionDb {
    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(VersionBatch {
            mem: self.mem.clone(),
            closed: self.closed.clone(),
            ops: RwLock::new(Vec::new()),
            written: AtomicBool::new(false),
        })
    }
}

impl Database for VersionDb {
    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.db.is_closed()
    }
}

impl Commitable for VersionDb {
    fn commit(&self) -> Result<()> {
        self.check_closed()?;

        let mut mem = self.mem.write();
        if mem.is_empty() {
            return Ok(());
        }

        let mut batch = self.db.new_batch();
        for (key, state) in mem.iter() {
            match state {
                ValueState::Present(value) => batch.put(key, value)?,
                ValueState::Deleted => batch.delete(key)?,
            }
        }
        batch.write()?;
        mem.clear();
        Ok(())
    }

    fn abort(&self) {
        self.mem.write().clear();
    }

    fn base(&self) -> Arc<dyn Database> {
        self.db.clone()
    }
}

struct VersionBatch {
    mem: Arc<RwLock<BTreeMap<Vec<u8>, ValueState>>>,
    closed: Arc<AtomicBool>,
    ops: RwLock<Vec<(Vec<u8>, ValueState)>>,
    written: AtomicBool,
}

impl KeyValueWriter for VersionBatch {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ops
            .write()
            .push((key.to_vec(), ValueState::Present(value.to_vec())));
        Ok(())
    }
}

impl KeyValueDeleter for VersionBatch {
    fn delete(&self, key: &[u8]) -> Result<()> {
        self.ops.write().push((key.to_vec(), ValueState::Deleted));
        Ok(())
    }
}

impl Batch for VersionBatch {
    fn size(&self) -> usize {
        self.ops
            .read()
            .iter()
            .map(|(k, v)| {
                k.len()
                    + match v {
                        ValueState::Present(value) => value.len(),
                        ValueState::Deleted => 0,
                    }
            })
            .sum()
    }

    fn write(&mut self) -> Result<()> {
        if self.written.load(Ordering::Acquire) {
            return Err(DatabaseError::BatchAlreadyWritten);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(DatabaseError::Closed);
        }
        let ops = self.ops.read();
        let mut mem = self.mem.write();
        for (key, state) in ops.iter() {
            mem.insert(key.clone(), state.clone());
        }
        self.written.store(true, Ordering::Release);
        Ok(())
    }

    fn reset(&mut self) {
        self.ops.write().clear();
        self.written.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemDb;

    #[test]
    fn writes_buffer_until_commit() {
        let base = Arc::new(MemDb::new());
        let db = VersionDb::new(base.clone());

        db.put(b"key", b"value").unwrap();
        assert_eq!(db.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert!(!base.has(b"key").unwrap());

        db.commit().unwrap();
        assert!(base.has(b"key").unwrap());
    }

    #[test]
    fn abort_discards_buffer() {
        let base = Arc::new(MemDb::new());
        let db = VersionDb::new(base.clone());
        db.put(b"key", b"value").unwrap();
        db.abort();
        assert!(!db.has(b"key").unwrap());
        assert!(!base.has(b"key").unwrap());
    }

    #[test]
    fn buffered_delete_masks_base_value() {
        let base = Arc::new(MemDb::new());
        base.put(b"key", b"old").unwrap();

        let db = VersionDb::new(base.clone());
        db.delete(b"key").unwrap();
        assert!(!db.has(b"key").unwrap());
        assert!(base.has(b"key").unwrap());

        db.commit().unwrap();
        assert!(!base.has(b"key").unwrap());
    }

    #[test]
    fn iterator_merges_buffer_and_base() {
        let base = Arc::new(MemDb::new());
        base.put(b"a", b"1").unwrap();
        base.put(b"c", b"3").unwrap();

        let db = VersionDb::new(base);
        db.put(b"b", b"2").unwrap();
        db.delete(b"c").unwrap();

        let mut iter = db.new_iterator();
        let mut pairs = Vec::new();
        while iter.next() {
            pairs.push((iter.key().to_vec(), iter.value().to_vec()));
        }
        assert_eq!(
            pairs,
            vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]
        );
    }

    #[test]
    fn commit_is_idempotent_when_clean() {
        let base = Arc::new(MemDb::new());
        let db = VersionDb::new(base);
        db.commit().unwrap();
        db.commit().unwrap();
    }
}
